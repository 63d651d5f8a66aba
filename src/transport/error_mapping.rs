//! Translation of client-library faults into the crate's error taxonomy.
//!
//! Every network call site and the streaming body reader route their
//! failures through here so that no raw `reqwest` or IO error escapes the
//! transport.

use std::error::Error as _;
use std::io;

use crate::error::{BoxError, GrabError};

/// Classification names attached to mapped errors.
pub mod names {
    /// No byte arrived within the per-chunk read timeout.
    pub const READ_TIMEOUT: &str = "ReadTimeoutError";
    /// The connection could not be established in time.
    pub const CONNECT_TIMEOUT: &str = "ConnectTimeoutError";
    /// The exchange outlived the total timeout.
    pub const TOTAL_TIMEOUT: &str = "TotalTimeoutError";
    /// Generic protocol or connection fault.
    pub const PROTOCOL: &str = "ProtocolError";
    /// Connection refused or unreachable.
    pub const NEW_CONNECTION: &str = "NewConnectionError";
    /// TLS negotiation or certificate failure.
    pub const SSL: &str = "SSLError";
    /// The redirect target could not be parsed.
    pub const LOCATION_PARSE: &str = "LocationParseError";
    /// A session followed more redirects than allowed.
    pub const TOO_MANY_REDIRECTS: &str = "TooManyRedirects";
}

/// Coarse shape of a low-level fault, independent of the client library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultFlags {
    /// A timer fired.
    pub timeout: bool,
    /// The fault happened while connecting.
    pub connect: bool,
    /// TLS appears somewhere in the cause chain.
    pub tls: bool,
    /// The request could not even be built (bad URL).
    pub builder: bool,
}

/// Maps fault flags to a taxonomy entry.
#[must_use]
pub fn classify_fault(flags: FaultFlags, url: &str, source: Option<BoxError>) -> GrabError {
    if flags.builder {
        let reason = source
            .as_ref()
            .map_or_else(|| "request could not be built".to_string(), ToString::to_string);
        return GrabError::invalid_url(url, reason);
    }
    match (flags.timeout, flags.connect, flags.tls) {
        (true, true, _) => GrabError::connection(names::CONNECT_TIMEOUT, url, source),
        (true, false, _) => GrabError::timeout(names::READ_TIMEOUT, url, source),
        (false, _, true) => GrabError::connection(names::SSL, url, source),
        (false, true, false) => GrabError::connection(names::NEW_CONNECTION, url, source),
        (false, false, false) => GrabError::connection(names::PROTOCOL, url, source),
    }
}

/// Maps a `reqwest` failure for a request to `url`.
#[must_use]
pub fn map_reqwest_error(error: reqwest::Error, url: &str) -> GrabError {
    let flags = FaultFlags {
        timeout: error.is_timeout(),
        connect: error.is_connect(),
        tls: is_tls_error(&error),
        builder: error.is_builder(),
    };
    classify_fault(flags, url, Some(Box::new(error)))
}

/// Maps an IO failure raised while streaming the body.
///
/// The stream adapter wraps client errors in `io::Error`; those are unwrapped
/// and mapped like any other client error.
#[must_use]
pub fn map_body_io_error(error: io::Error, url: &str) -> GrabError {
    if error.kind() == io::ErrorKind::TimedOut {
        return GrabError::timeout(names::READ_TIMEOUT, url, Some(Box::new(error)));
    }
    if error.get_ref().is_some_and(|inner| inner.is::<reqwest::Error>()) {
        if let Some(inner) = error.into_inner() {
            return match inner.downcast::<reqwest::Error>() {
                Ok(client_error) => map_reqwest_error(*client_error, url),
                Err(other) => GrabError::connection(names::PROTOCOL, url, Some(other)),
            };
        }
        return GrabError::connection(names::PROTOCOL, url, None);
    }
    GrabError::connection(names::PROTOCOL, url, Some(Box::new(error)))
}

/// Whether TLS negotiation failed somewhere in the cause chain.
///
/// The walk starts below the top-level error, whose message carries the
/// request URL.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut current = error.source();
    while let Some(err) = current {
        if is_tls_cause(err) {
            return true;
        }
        current = err.source();
    }
    false
}

/// Matches one link of a cause chain.
///
/// `io::Error` hides its payload from `source()`, so a rustls error wrapped
/// by the TLS stream is looked up through `get_ref`.
fn is_tls_cause(err: &(dyn std::error::Error + 'static)) -> bool {
    if err.is::<rustls::Error>() {
        return true;
    }
    err.downcast_ref::<io::Error>()
        .and_then(io::Error::get_ref)
        .is_some_and(|inner| inner.is::<rustls::Error>())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const URL: &str = "http://example.com/";

    #[test]
    fn test_read_timeout_is_timeout_kind() {
        let flags = FaultFlags {
            timeout: true,
            ..FaultFlags::default()
        };
        let err = classify_fault(flags, URL, None);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.name(), names::READ_TIMEOUT);
    }

    #[test]
    fn test_connect_timeout_is_connection_kind() {
        let flags = FaultFlags {
            timeout: true,
            connect: true,
            ..FaultFlags::default()
        };
        let err = classify_fault(flags, URL, None);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.slug(), "connect-timeout-error");
    }

    #[test]
    fn test_tls_and_protocol_faults() {
        let tls = classify_fault(
            FaultFlags {
                tls: true,
                connect: true,
                ..FaultFlags::default()
            },
            URL,
            None,
        );
        assert_eq!(tls.name(), names::SSL);
        assert_eq!(tls.kind(), ErrorKind::Connection);

        let refused = classify_fault(
            FaultFlags {
                connect: true,
                ..FaultFlags::default()
            },
            URL,
            None,
        );
        assert_eq!(refused.name(), names::NEW_CONNECTION);

        let protocol = classify_fault(FaultFlags::default(), URL, None);
        assert_eq!(protocol.slug(), "protocol-error");
    }

    #[test]
    fn test_builder_fault_is_invalid_url() {
        let flags = FaultFlags {
            builder: true,
            ..FaultFlags::default()
        };
        let err = classify_fault(flags, "http://bad/", None);
        assert!(matches!(err, GrabError::InvalidUrl { ref url, .. } if url == "http://bad/"));
    }

    #[test]
    fn test_rustls_cause_is_tls() {
        let direct = rustls::Error::General("bad record".to_string());
        assert!(is_tls_cause(&direct));

        let wrapped = io::Error::new(io::ErrorKind::InvalidData, direct);
        assert!(is_tls_cause(&wrapped));
    }

    #[test]
    fn test_plain_causes_are_not_tls() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert!(!is_tls_cause(&refused));
        let reset = io::Error::other("connection reset by peer");
        assert!(!is_tls_cause(&reset));
        let mentions_tls = io::Error::other("error sending request for url (http://host/ssl/tls)");
        assert!(!is_tls_cause(&mentions_tls));
    }

    #[test]
    fn test_body_io_timeout_maps_to_read_timeout() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "stalled");
        let err = map_body_io_error(io_err, URL);
        assert_eq!(err.name(), names::READ_TIMEOUT);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_body_io_other_maps_to_protocol_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err = map_body_io_error(io_err, URL);
        assert_eq!(err.name(), names::PROTOCOL);
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
