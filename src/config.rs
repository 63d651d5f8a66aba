//! Request configuration consumed by the transport.
//!
//! [`RequestConfig`] is the mapping-like configuration object the transport
//! turns into a request descriptor. It deserializes from JSON with every field
//! optional; durations are written in seconds. Payloads (`post`,
//! `multipart_post`) are set programmatically only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::GrabError;
use crate::upload::UploadItem;

/// Default total timeout (also the default per-chunk read timeout).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default maximum number of redirects followed by a session.
pub const DEFAULT_REDIRECT_LIMIT: u32 = 10;

/// Payload of a simple (non-multipart) request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostPayload {
    /// Pre-encoded bytes sent as-is.
    Raw(Vec<u8>),
    /// Text encoded under the configured charset.
    Text(String),
    /// Key/value pairs sent as `application/x-www-form-urlencoded`.
    Fields(Vec<(String, String)>),
}

/// One value of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    /// Plain text field.
    Text(String),
    /// File field.
    Upload(UploadItem),
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<UploadItem> for FormValue {
    fn from(value: UploadItem) -> Self {
        Self::Upload(value)
    }
}

/// Payload of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPayload {
    /// A pre-encoded multipart body, sent unchanged.
    Raw(Vec<u8>),
    /// Decoded text. Rejected: multipart payloads must be pre-encoded bytes.
    Text(String),
    /// Named fields encoded by the transport.
    Fields(Vec<(String, FormValue)>),
}

/// Proxy protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    /// Plain HTTP proxy.
    #[default]
    Http,
    /// HTTPS proxy.
    Https,
    /// SOCKS5 proxy.
    Socks5,
}

impl ProxyType {
    /// URL scheme used to address the proxy.
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyType {
    type Err = GrabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            other => Err(GrabError::misuse(format!("unsupported proxy type: {other}"))),
        }
    }
}

/// Options for one logical request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Target URL.
    pub url: Option<String>,
    /// Explicit method; detected from the payload when unset.
    pub method: Option<String>,
    /// Maximum number of body bytes kept.
    pub body_maxsize: Option<usize>,
    /// Skip reading the body.
    pub nobody: bool,
    /// Total time allowed for the exchange, including the body read.
    #[serde(with = "duration_secs_opt")]
    pub timeout: Option<Duration>,
    /// Time allowed to wait for each chunk; defaults to `timeout`.
    #[serde(with = "duration_secs_opt")]
    pub read_timeout: Option<Duration>,
    /// Time allowed to establish a connection.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Keep the body in memory instead of writing it to a file.
    pub body_inmemory: bool,
    /// Directory for body files when `body_inmemory` is off.
    pub body_storage_dir: Option<PathBuf>,
    /// Fixed body file name; a unique name is generated when unset.
    pub body_storage_filename: Option<String>,
    /// Create `body_storage_dir` when missing.
    pub body_storage_create_dir: bool,
    /// Multipart body.
    #[serde(skip)]
    pub multipart_post: Option<MultipartPayload>,
    /// Simple body.
    #[serde(skip)]
    pub post: Option<PostPayload>,
    /// Proxy address (`host:port`).
    pub proxy: Option<String>,
    /// Proxy credentials (`user:password`).
    pub proxy_userpwd: Option<String>,
    /// Proxy protocol; `http` when unset.
    pub proxy_type: Option<ProxyType>,
    /// Explicit User-Agent.
    pub user_agent: Option<String>,
    /// File with one User-Agent per line, picked at random.
    pub user_agent_file: Option<PathBuf>,
    /// Headers sent with every request.
    pub common_headers: Vec<(String, String)>,
    /// Per-request headers; they override everything else.
    pub headers: Vec<(String, String)>,
    /// Simple name/value cookies attached to the request host.
    pub cookies: BTreeMap<String, String>,
    /// Netscape-format cookie file loaded before each request.
    pub cookiefile: Option<PathBuf>,
    /// Charset forced on the parsed document.
    pub document_charset: Option<String>,
    /// Charset used to encode text payloads.
    pub charset: String,
    /// Follow 3xx redirects in a session.
    pub follow_location: bool,
    /// Maximum redirects followed by a session.
    pub redirect_limit: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            url: None,
            method: None,
            body_maxsize: None,
            nobody: false,
            timeout: Some(DEFAULT_TIMEOUT),
            read_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            body_inmemory: true,
            body_storage_dir: None,
            body_storage_filename: None,
            body_storage_create_dir: false,
            multipart_post: None,
            post: None,
            proxy: None,
            proxy_userpwd: None,
            proxy_type: None,
            user_agent: None,
            user_agent_file: None,
            common_headers: default_common_headers(),
            headers: Vec::new(),
            cookies: BTreeMap::new(),
            cookiefile: None,
            document_charset: None,
            charset: "utf-8".to_string(),
            follow_location: true,
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
        }
    }
}

fn default_common_headers() -> Vec<(String, String)> {
    vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("Accept-Charset".to_string(), "utf-8,*;q=0.7".to_string()),
    ]
}

impl RequestConfig {
    /// Creates a configuration targeting `url` with default options.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Io`] if the file cannot be read and
    /// [`GrabError::Misuse`] if it is not a valid configuration.
    pub fn from_json_file(path: &Path) -> Result<Self, GrabError> {
        let raw = std::fs::read_to_string(path).map_err(|e| GrabError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            GrabError::misuse(format!("invalid configuration in {}: {e}", path.display()))
        })
    }

    /// Determines the request method.
    ///
    /// An explicit method wins (upper-cased); otherwise `POST` when a payload
    /// is configured, else `GET`.
    #[must_use]
    pub fn detect_request_method(&self) -> String {
        if let Some(method) = self.method.as_deref().filter(|m| !m.trim().is_empty()) {
            return method.trim().to_ascii_uppercase();
        }
        if self.post.is_some() || self.multipart_post.is_some() {
            "POST".to_string()
        } else {
            "GET".to_string()
        }
    }

    /// Per-chunk read timeout: `read_timeout` when set, else `timeout`.
    #[must_use]
    pub fn effective_read_timeout(&self) -> Option<Duration> {
        self.read_timeout.or(self.timeout)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
