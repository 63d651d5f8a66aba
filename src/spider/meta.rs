//! Per-spider-type metadata.

use std::collections::BTreeMap;

/// Static description of a spider type.
///
/// `is_abstract` defaults to `false`. Only [`SpiderMeta::base`], the metadata
/// of [`BaseSpider`](super::BaseSpider), sets it; the engine refuses to run
/// abstract spiders. Free-form attributes are carried over by
/// [`inherit`](Self::inherit), the abstract flag is not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpiderMeta {
    /// Whether the spider is a template that must not be run.
    pub is_abstract: bool,
    attributes: BTreeMap<String, String>,
}

impl SpiderMeta {
    /// Metadata of the base spider type.
    #[must_use]
    pub fn base() -> Self {
        Self {
            is_abstract: true,
            attributes: BTreeMap::new(),
        }
    }

    /// Metadata for a type derived from `self`: same attributes, not abstract.
    #[must_use]
    pub fn inherit(&self) -> Self {
        Self {
            is_abstract: false,
            attributes: self.attributes.clone(),
        }
    }

    /// Sets the abstract flag.
    #[must_use]
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Sets a free-form attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Looks up a free-form attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_is_abstract() {
        assert!(SpiderMeta::base().is_abstract);
    }

    #[test]
    fn test_default_is_concrete() {
        assert!(!SpiderMeta::default().is_abstract);
    }

    #[test]
    fn test_children_are_concrete_unless_marked() {
        let child = SpiderMeta::base().inherit();
        assert!(!child.is_abstract);

        let abstract_child = SpiderMeta::base().inherit().with_abstract(true);
        assert!(abstract_child.is_abstract);

        let grandchild = child.inherit();
        assert!(!grandchild.is_abstract);

        let abstract_grandchild = child.inherit().with_abstract(true);
        assert!(abstract_grandchild.is_abstract);
    }

    #[test]
    fn test_attributes_are_inherited() {
        let parent = SpiderMeta::base().inherit().with_attribute("some_foo", "bar");
        let child = parent.inherit();
        assert_eq!(child.attribute("some_foo"), Some("bar"));
        assert!(!parent.is_abstract);
        assert_eq!(child.attribute("missing"), None);
    }
}
