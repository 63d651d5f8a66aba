//! Glue between the cookie store, the request descriptor and raw responses.
//!
//! The store only needs a narrow view of each side: the URL, method and
//! headers of the outgoing request, and the header list of the response.
//! [`RequestView`] and [`ResponseView`] expose exactly that.

use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, warn};
use url::Url;

use super::store::CookieStore;
use crate::config::RequestConfig;
use crate::encoding::decode_utf8_ignore;
use crate::transport::RequestDescriptor;

/// What the cookie store needs to know about an outgoing request.
pub trait RequestView {
    /// Target URL.
    fn url(&self) -> &Url;
    /// Upper-case method.
    fn method(&self) -> &str;
    /// Value of a request header.
    fn header(&self, name: &str) -> Option<&str>;
}

/// What the cookie store needs to know about a response.
pub trait ResponseView {
    /// All values of a response header, in the order received.
    fn header_values(&self, name: &str) -> Vec<String>;
}

impl RequestView for RequestDescriptor {
    fn url(&self) -> &Url {
        &self.url
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

impl ResponseView for HeaderMap {
    fn header_values(&self, name: &str) -> Vec<String> {
        self.get_all(name)
            .iter()
            .map(|value| decode_utf8_ignore(value.as_bytes()))
            .collect()
    }
}

impl ResponseView for [(String, String)] {
    fn header_values(&self, name: &str) -> Vec<String> {
        self.iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
            .collect()
    }
}

/// Domain used for cookies given without one: the request host minus `www.`.
#[must_use]
pub fn guess_cookie_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    })
}

/// Merges configured cookies into `store` and sets the `Cookie` header.
///
/// The cookie file, when configured, is loaded first; a failed load is
/// logged and otherwise ignored. Simple `cookies` entries are attached to
/// the guessed domain of the request host. Calling this twice yields the
/// same header.
pub fn process_cookie_options(
    config: &RequestConfig,
    store: &mut CookieStore,
    descriptor: &mut RequestDescriptor,
) {
    if let Some(path) = &config.cookiefile {
        match store.load_from_file(path) {
            Ok(summary) => {
                for reason in &summary.skipped {
                    warn!(path = %path.display(), %reason, "skipping malformed cookie line");
                }
                debug!(path = %path.display(), count = summary.loaded, "loaded cookie file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "could not load cookie file"),
        }
    }

    if !config.cookies.is_empty() {
        if let Some(domain) = guess_cookie_domain(&descriptor.url) {
            for (name, value) in &config.cookies {
                store.set_simple(name, value, &domain);
            }
        }
    }

    match store.cookie_header(&descriptor.url) {
        Some(header) => descriptor.headers.insert("Cookie", header),
        None => {
            descriptor.headers.remove("Cookie");
        }
    }
}

/// Collects the `Set-Cookie` directives of a response into a fresh store.
///
/// Without a response the store is empty.
#[must_use]
pub fn extract_cookies(
    response: Option<&dyn ResponseView>,
    request: &dyn RequestView,
) -> CookieStore {
    let mut jar = CookieStore::new();
    if let Some(response) = response {
        jar.store_response_cookies(request.url(), response.header_values(SET_COOKIE.as_str()));
    }
    jar
}
