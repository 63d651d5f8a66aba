//! The per-call request descriptor.
//!
//! A [`RequestDescriptor`] is built fresh for every logical request (each
//! retry and each redirect hop included) and never shared between concurrent
//! requests. It owns the output file when the body is stored on disk.

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use url::{Host, Url};

use crate::config::ProxyType;
use crate::error::GrabError;

/// Maximum length of one DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a full domain name.
const MAX_DOMAIN_LEN: usize = 253;

/// Ordered header list with case-insensitive names.
///
/// Inserting a name that already exists replaces its value in place, so the
/// list never holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Inserts every pair, later pairs overriding earlier ones.
    pub fn extend<'a>(&mut self, pairs: impl IntoIterator<Item = &'a (String, String)>) {
        for (name, value) in pairs {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Returns the value of a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Proxy routing for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxySettings {
    /// Proxy address, `host:port`.
    pub address: String,
    /// Credentials, `user:password`.
    pub credentials: Option<String>,
    /// Proxy protocol.
    pub scheme: ProxyType,
}

impl ProxySettings {
    /// Proxy URL without credentials.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme.scheme(), self.address)
    }

    /// Splits credentials into user and password.
    #[must_use]
    pub fn user_password(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_deref()
            .map(|creds| creds.split_once(':').unwrap_or((creds, "")))
    }
}

/// Timeouts applied to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on establishing the connection.
    pub connect: Duration,
    /// Bound on waiting for each chunk.
    pub read: Option<Duration>,
    /// Bound on the whole exchange, checked between chunk reads.
    pub total: Option<Duration>,
}

/// Limits on reading the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyLimits {
    /// Maximum number of bytes kept.
    pub max_bytes: Option<usize>,
    /// Skip the body entirely.
    pub no_body: bool,
}

/// Where the response body goes.
#[derive(Debug)]
pub enum ResponseSink {
    /// Keep the body in memory.
    InMemory,
    /// Write the body to an already opened file.
    FileAt {
        /// Path of the output file.
        path: PathBuf,
        /// Open handle, closed once the body is written.
        file: File,
    },
}

impl ResponseSink {
    /// Path of the output file, if the body goes to disk.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::InMemory => None,
            Self::FileAt { path, .. } => Some(path),
        }
    }

    /// Closes and removes the output file, if any.
    pub fn discard(self) {
        if let Self::FileAt { path, file } = self {
            drop(file);
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "could not remove unused body file");
            }
        }
    }
}

/// Normalized description of one HTTP request.
#[derive(Debug)]
pub struct RequestDescriptor {
    /// Upper-case method.
    pub method: String,
    /// Normalized URL.
    pub url: Url,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Request headers.
    pub headers: HeaderList,
    /// Proxy routing.
    pub proxy: Option<ProxySettings>,
    /// Timeouts.
    pub timeouts: Timeouts,
    /// Body read limits.
    pub body_limits: BodyLimits,
    /// Body destination.
    pub response_sink: ResponseSink,
    /// Charset forced on the resulting document.
    pub document_charset: Option<String>,
}

impl RequestDescriptor {
    /// Creates a body-less in-memory descriptor with default timeouts.
    #[must_use]
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
            body: None,
            headers: HeaderList::new(),
            proxy: None,
            timeouts: Timeouts {
                connect: crate::config::DEFAULT_CONNECT_TIMEOUT,
                read: Some(crate::config::DEFAULT_TIMEOUT),
                total: Some(crate::config::DEFAULT_TIMEOUT),
            },
            body_limits: BodyLimits::default(),
            response_sink: ResponseSink::InMemory,
            document_charset: None,
        }
    }

    /// Removes an output file created for this request.
    ///
    /// Used when the request is abandoned before its body was written.
    pub fn discard(self) {
        self.response_sink.discard();
    }
}

/// Parses and validates a request URL.
///
/// Besides `url` crate parsing, rejects non-HTTP schemes and hosts with an
/// empty label, a label longer than 63 bytes or a name longer than 253 bytes.
///
/// # Errors
///
/// Returns [`GrabError::InvalidUrl`] carrying the raw input.
pub fn normalize_url(raw: &str) -> Result<Url, GrabError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| GrabError::invalid_url(raw, e.to_string()))?;
    validate_http_url(&url).map_err(|reason| GrabError::invalid_url(raw, reason))?;
    Ok(url)
}

/// Checks scheme and host shape of an already parsed URL.
pub(crate) fn validate_http_url(url: &Url) -> Result<(), String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    match url.host() {
        None => Err("missing host".to_string()),
        Some(Host::Domain(domain)) => {
            let domain = domain.strip_suffix('.').unwrap_or(domain);
            if domain.len() > MAX_DOMAIN_LEN
                || domain
                    .split('.')
                    .any(|label| label.is_empty() || label.len() > MAX_LABEL_LEN)
            {
                Err("label empty or too long".to_string())
            } else {
                Ok(())
            }
        }
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A URL whose host is one label far longer than DNS allows.
    const INVALID_URL: &str = "http://13354&altProductId=6423589&productId=6423589\
        &altProductStoreId=13713&catalogId=10001&categoryId=28678&productStoreId=13713\
        http://www.textbooksnow.com/webapp/wcs/stores/servlet/ProductDisplay?langId=-1&storeId=";

    #[test]
    fn test_header_list_replaces_case_insensitively() {
        let mut headers = HeaderList::new();
        headers.insert("Content-Type", "text/plain");
        headers.insert("X-A", "1");
        headers.insert("content-type", "application/json");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Content-Type", "X-A"]);
    }

    #[test]
    fn test_header_list_remove() {
        let mut headers = HeaderList::new();
        headers.insert("Cookie", "a=1");
        assert_eq!(headers.remove("cookie").as_deref(), Some("a=1"));
        assert!(headers.is_empty());
        assert!(headers.remove("cookie").is_none());
    }

    #[test]
    fn test_normalize_url_accepts_regular_urls() {
        let url = normalize_url("  http://www.Example.com/path?q=1 ").unwrap();
        assert_eq!(url.as_str(), "http://www.example.com/path?q=1");
        assert!(normalize_url("https://[::1]:8080/").is_ok());
        assert!(normalize_url("http://127.0.0.1/").is_ok());
    }

    #[test]
    fn test_normalize_url_rejects_overlong_label() {
        let err = normalize_url(INVALID_URL).unwrap_err();
        match err {
            GrabError::InvalidUrl { url, reason } => {
                assert_eq!(url, INVALID_URL);
                assert!(reason.contains("label"), "unexpected reason: {reason}");
            }
            other => panic!("expected InvalidUrl, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_url_rejects_garbage() {
        assert!(matches!(
            normalize_url("not a url"),
            Err(GrabError::InvalidUrl { .. })
        ));
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(GrabError::InvalidUrl { .. })
        ));
        assert!(matches!(
            normalize_url("http://a..b/"),
            Err(GrabError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_proxy_settings_split_credentials() {
        let proxy = ProxySettings {
            address: "10.0.0.1:3128".to_string(),
            credentials: Some("user:secret".to_string()),
            scheme: ProxyType::Http,
        };
        assert_eq!(proxy.url(), "http://10.0.0.1:3128");
        assert_eq!(proxy.user_password(), Some(("user", "secret")));
    }

    #[test]
    fn test_discard_removes_body_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("body.bin");
        let file = File::create(&path).unwrap();
        let mut descriptor =
            RequestDescriptor::new("GET", Url::parse("http://example.com/").unwrap());
        descriptor.response_sink = ResponseSink::FileAt {
            path: path.clone(),
            file,
        };
        descriptor.discard();
        assert!(!path.exists());
    }
}
