//! The response document handed to callers.
//!
//! A [`Document`] is filled once by the transport and then read by user code.
//! Its body lives either in memory or in a file at `body_path`, never both.

use std::borrow::Cow;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::bytes::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::cookies::CookieStore;
use crate::encoding::decode_text;
use crate::error::GrabError;

/// Number of leading body bytes searched for a charset declaration.
const CHARSET_SNIFF_LEN: usize = 4096;

/// Charset assumed when nothing declares one.
pub const DEFAULT_CHARSET: &str = "utf-8";

#[allow(clippy::expect_used)]
static CONTENT_TYPE_CHARSET: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"(?i)charset\s*=\s*["']?([\w.:-]+)"#).expect("charset regex is valid")
});

#[allow(clippy::expect_used)]
static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([\w.:-]+)"#)
        .expect("meta charset regex is valid")
});

#[allow(clippy::expect_used)]
static XML_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<\?xml[^>]+encoding\s*=\s*["']([\w.:-]+)["']"#)
        .expect("xml encoding regex is valid")
});

/// A value assigned to a document body.
///
/// Only bytes are accepted; text is rejected by [`Document::set_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyValue {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Decoded text.
    Text(String),
}

impl From<Vec<u8>> for BodyValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for BodyValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for BodyValue {
    fn from(value: &[u8; N]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<String> for BodyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for BodyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Parsed result of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct Document {
    /// HTTP status code.
    pub status_code: u16,
    /// Canonical header block, `Key: Value\r\n` lines and a blank line.
    pub head: Vec<u8>,
    /// Response headers in received order.
    pub headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    /// File holding the body when it is not kept in memory.
    pub body_path: Option<PathBuf>,
    /// Redirect target if the response carried one, else the request URL.
    pub url: Url,
    /// Cookies set by the response.
    pub cookies: CookieStore,
    /// Charset used to decode the body.
    pub charset: String,
}

impl Document {
    /// Creates an empty document for `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            status_code: 0,
            head: Vec::new(),
            headers: Vec::new(),
            body: None,
            body_path: None,
            url,
            cookies: CookieStore::new(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }

    /// In-memory body, `None` when the body is stored in a file.
    #[must_use]
    pub fn body_in_memory(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Body bytes, read from `body_path` when stored on disk.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Io`] if the body file cannot be read.
    pub fn body(&self) -> Result<Cow<'_, [u8]>, GrabError> {
        match (&self.body, &self.body_path) {
            (Some(bytes), _) => Ok(Cow::Borrowed(bytes)),
            (None, Some(path)) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| GrabError::io(path.clone(), e)),
            (None, None) => Ok(Cow::Borrowed(&[])),
        }
    }

    /// Replaces the body.
    ///
    /// A file-backed document rewrites its file; otherwise the bytes are kept
    /// in memory.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Misuse`] for text values and [`GrabError::Io`]
    /// if the body file cannot be written.
    pub fn set_body(&mut self, value: impl Into<BodyValue>) -> Result<(), GrabError> {
        let bytes = match value.into() {
            BodyValue::Bytes(bytes) => bytes,
            BodyValue::Text(_) => {
                return Err(GrabError::misuse(
                    "document body must be bytes, encode text before assigning it",
                ));
            }
        };
        match &self.body_path {
            Some(path) => std::fs::write(path, &bytes).map_err(|e| GrabError::io(path.clone(), e)),
            None => {
                self.body = Some(bytes);
                Ok(())
            }
        }
    }

    /// Body decoded with the document charset.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Io`] if a file-backed body cannot be read.
    pub fn text(&self) -> Result<String, GrabError> {
        Ok(decode_text(&self.body()?, &self.charset))
    }

    /// First value of a response header, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether this is a 301, 302, 303, 307 or 308 response with a `Location` header.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status_code, 301 | 302 | 303 | 307 | 308) && self.header("Location").is_some()
    }

    /// Stores the headers and settles the body charset.
    ///
    /// Order: explicit `charset`, then the `Content-Type` header, then a
    /// `<meta>` or XML declaration near the start of the body, else UTF-8.
    pub fn parse(&mut self, charset: Option<&str>, headers: Vec<(String, String)>) {
        self.headers = headers;
        self.charset = charset
            .map(str::to_string)
            .or_else(|| self.charset_from_headers())
            .or_else(|| self.charset_from_body())
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string())
            .to_ascii_lowercase();
    }

    fn charset_from_headers(&self) -> Option<String> {
        let content_type = self.header("Content-Type")?;
        CONTENT_TYPE_CHARSET
            .captures(content_type)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn charset_from_body(&self) -> Option<String> {
        let prefix = self.body_prefix()?;
        [&*META_CHARSET, &*XML_ENCODING].iter().find_map(|re| {
            re.captures(&prefix)
                .and_then(|caps| caps.get(1))
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        })
    }

    fn body_prefix(&self) -> Option<Vec<u8>> {
        if let Some(bytes) = &self.body {
            return Some(bytes[..bytes.len().min(CHARSET_SNIFF_LEN)].to_vec());
        }
        let file = std::fs::File::open(self.body_path.as_ref()?).ok()?;
        let mut prefix = Vec::with_capacity(CHARSET_SNIFF_LEN);
        file.take(CHARSET_SNIFF_LEN as u64)
            .read_to_end(&mut prefix)
            .ok()?;
        Some(prefix)
    }

    /// Writes the body to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Io`] on filesystem failure.
    pub fn save(&self, path: &Path) -> Result<(), GrabError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| GrabError::io(parent, e))?;
        }
        std::fs::write(path, self.body()?).map_err(|e| GrabError::io(path, e))
    }

    /// Writes the body under `base_dir` at a path derived from `location`.
    ///
    /// The path is `ab/cd/<rest of the hex digest>` plus the extension of the
    /// location's path, if any. Returns that path relative to `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Io`] on filesystem failure.
    pub fn save_hash(&self, location: &Url, base_dir: &Path) -> Result<PathBuf, GrabError> {
        let relative = hash_path(location);
        self.save(&base_dir.join(&relative))?;
        Ok(relative)
    }
}

/// Hash-derived relative storage path for a URL.
#[must_use]
pub fn hash_path(location: &Url) -> PathBuf {
    let digest = format!("{:x}", Sha256::digest(location.as_str().as_bytes()));
    let extension = Path::new(location.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    PathBuf::from(&digest[..2])
        .join(&digest[2..4])
        .join(format!("{}{extension}", &digest[4..]))
}
