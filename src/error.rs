//! Error taxonomy shared by the transport, the document model and the spider.
//!
//! Every failure raised by this crate lands in one of a small closed set of
//! kinds. Each error additionally carries a classification name (for example
//! `ReadTimeoutError` or `SSLError`) that is preserved for observability; the
//! spider counts terminal failures under `error:<slug>` where the slug is the
//! kebab-case form of that name.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed low-level cause attached to network failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller configuration error.
    Misuse,
    /// Malformed request URL.
    InvalidUrl,
    /// The server sent something that could not be interpreted.
    InvalidResponse,
    /// Connect, read or total-elapsed-time overrun.
    Timeout,
    /// Protocol, TLS or connection fault.
    Connection,
    /// Local filesystem fault (body storage, cookie files).
    Io,
}

/// Errors raised by request preparation, network exchange and response handling.
#[derive(Debug, Error)]
pub enum GrabError {
    /// The caller supplied an inconsistent or unsupported configuration.
    #[error("misuse: {message}")]
    Misuse {
        /// What was wrong with the configuration.
        message: String,
    },

    /// The request URL could not be normalized.
    #[error("invalid URL ({reason}): {url}")]
    InvalidUrl {
        /// The offending raw value.
        url: String,
        /// Why normalization failed.
        reason: String,
    },

    /// The response could not be interpreted (e.g. an unparsable redirect target).
    #[error("invalid response ({name}): {message}")]
    InvalidResponse {
        /// Classification name.
        name: &'static str,
        /// Human-readable detail.
        message: String,
        /// Underlying cause, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// A connect, read or total-time limit was exceeded.
    #[error("timeout ({name}) requesting {url}")]
    Timeout {
        /// Classification name.
        name: &'static str,
        /// The URL being requested.
        url: String,
        /// Underlying cause, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// The connection failed at the protocol or TLS layer.
    #[error("connection error ({name}) requesting {url}")]
    Connection {
        /// Classification name.
        name: &'static str,
        /// The URL being requested.
        url: String,
        /// Underlying cause, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// Filesystem error while storing a body or reading a helper file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl GrabError {
    /// Creates a misuse error.
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error that reports the raw input.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(
        name: &'static str,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::InvalidResponse {
            name,
            message: message.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(name: &'static str, url: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Timeout {
            name,
            url: url.into(),
            source,
        }
    }

    /// Creates a connection error.
    pub fn connection(
        name: &'static str,
        url: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Connection {
            name,
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Misuse { .. } => ErrorKind::Misuse,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Returns the classification name, e.g. `ReadTimeoutError`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Misuse { .. } => "MisuseError",
            Self::InvalidUrl { .. } => "InvalidUrl",
            Self::InvalidResponse { name, .. }
            | Self::Timeout { name, .. }
            | Self::Connection { name, .. } => name,
            Self::Io { .. } => "IoError",
        }
    }

    /// Returns the kebab-case classification, e.g. `read-timeout-error`.
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(self.name())
    }

    /// Whether the spider may retry the task that raised this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Connection)
    }
}

/// Converts a `CamelCase` classification name into kebab-case.
///
/// Acronym runs stay together: `SSLError` becomes `ssl-error`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut slug = String::with_capacity(name.len() + 4);
    for (idx, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && idx > 0 {
            let prev = chars[idx - 1];
            let next_is_lower = chars.get(idx + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                slug.push('-');
            }
        }
        if ch == '_' || ch == ' ' {
            slug.push('-');
        } else {
            slug.push(ch.to_ascii_lowercase());
        }
    }
    slug
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_names() {
        assert_eq!(slugify("ReadTimeoutError"), "read-timeout-error");
        assert_eq!(slugify("ConnectTimeoutError"), "connect-timeout-error");
        assert_eq!(slugify("SSLError"), "ssl-error");
        assert_eq!(slugify("ProtocolError"), "protocol-error");
        assert_eq!(slugify("InvalidUrl"), "invalid-url");
        assert_eq!(slugify("Http404"), "http404");
    }

    #[test]
    fn test_invalid_url_reports_raw_value() {
        let error = GrabError::invalid_url("http://bad host/", "invalid domain character");
        let msg = error.to_string();
        assert!(msg.contains("http://bad host/"), "Expected raw URL in: {msg}");
        assert!(msg.contains("invalid domain character"));
        assert_eq!(error.kind(), ErrorKind::InvalidUrl);
        assert_eq!(error.slug(), "invalid-url");
    }

    #[test]
    fn test_timeout_keeps_classification_name() {
        let error = GrabError::timeout("ReadTimeoutError", "http://example.com/", None);
        assert_eq!(error.name(), "ReadTimeoutError");
        assert_eq!(error.slug(), "read-timeout-error");
        assert!(error.is_retryable());
        assert!(error.to_string().contains("http://example.com/"));
    }

    #[test]
    fn test_only_network_kinds_are_retryable() {
        assert!(GrabError::connection("SSLError", "https://x.test/", None).is_retryable());
        assert!(!GrabError::misuse("bad option").is_retryable());
        assert!(!GrabError::invalid_url("x", "y").is_retryable());
        assert!(
            !GrabError::invalid_response("LocationParseError", "bad location", None)
                .is_retryable()
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!GrabError::io("/tmp/x", io).is_retryable());
    }

    #[test]
    fn test_connection_error_exposes_source() {
        use std::error::Error as _;

        let cause: BoxError = Box::new(std::io::Error::other("handshake failure"));
        let error = GrabError::connection("SSLError", "https://x.test/", Some(cause));
        assert!(error.source().is_some());
        assert_eq!(error.kind(), ErrorKind::Connection);
    }
}
