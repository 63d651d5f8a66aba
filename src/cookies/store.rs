//! In-memory cookie store keyed by `(domain, path, name)`.
//!
//! `Set-Cookie` handling follows the subset of RFC 6265 a scraper needs:
//! `Domain`, `Path`, `Expires`, `Max-Age`, `Secure` and `HttpOnly`. Expired
//! cookies are never sent and are dropped when a server expires them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument};
use url::Url;

use super::netscape::{CookieLine, read_cookie_file, write_cookie_file};

/// A single cookie with its scope and expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    value: String,
    /// Domain without a leading dot.
    pub domain: String,
    /// Only send to exactly `domain`, not to its subdomains.
    pub host_only: bool,
    /// Path scope.
    pub path: String,
    /// Only send over HTTPS.
    pub secure: bool,
    /// Not exposed to scripts; kept for persistence.
    pub http_only: bool,
    /// Expiry; `None` for session cookies.
    pub expires: Option<SystemTime>,
}

impl Cookie {
    /// Creates a session cookie valid for `domain` and its subdomains.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only: false,
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    /// Cookie value. Avoid logging it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the cookie has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Whether this cookie should be sent with a request to `url`.
    #[must_use]
    pub fn matches(&self, url: &Url, now: SystemTime) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.is_expired_at(now) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        domain_matches(&host.to_ascii_lowercase(), &self.domain, self.host_only)
            && path_matches(url.path(), &self.path)
    }

    fn key(&self) -> (String, String, String) {
        (self.domain.clone(), self.path.clone(), self.name.clone())
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("host_only", &self.host_only)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .finish()
    }
}

fn domain_matches(host: &str, domain: &str, host_only: bool) -> bool {
    if host == domain {
        return true;
    }
    !host_only
        && host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path[cookie_path.len()..].starts_with('/'))
}

/// Directory part of the request path, used when `Set-Cookie` has no `Path`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Collection of cookies, unique per `(domain, path, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieStore {
    cookies: BTreeMap<(String, String, String), Cookie>,
}

impl CookieStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Iterates all cookies.
    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    /// Returns the first cookie named `name`, whatever its scope.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.values().find(|cookie| cookie.name == name)
    }

    /// Inserts a cookie, replacing one with the same domain, path and name.
    pub fn set(&mut self, cookie: Cookie) {
        self.cookies.insert(cookie.key(), cookie);
    }

    /// Inserts a plain session cookie valid for `domain` and its subdomains.
    pub fn set_simple(&mut self, name: &str, value: &str, domain: &str) {
        self.set(Cookie::new(name, value, domain));
    }

    /// Copies every cookie of `other` into this store.
    pub fn update(&mut self, other: &CookieStore) {
        for cookie in other.iter() {
            self.set(cookie.clone());
        }
    }

    /// Removes every cookie.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Builds the `Cookie` header value for a request to `url`.
    ///
    /// Cookies with longer paths come first. Returns `None` when nothing applies.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let now = SystemTime::now();
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|cookie| cookie.matches(url, now))
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Applies `Set-Cookie` header values received from `url`.
    ///
    /// Cookies whose `Domain` does not cover the request host are ignored.
    /// A `Max-Age` of zero or less, or a past `Expires`, deletes the cookie.
    pub fn store_response_cookies<I, S>(&mut self, url: &Url, set_cookie_values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return;
        };
        let now = SystemTime::now();
        for raw in set_cookie_values {
            let Some(cookie) = parse_set_cookie(raw.as_ref(), url, &host, now) else {
                debug!(url = %url, "ignoring unusable Set-Cookie header");
                continue;
            };
            if cookie.is_expired_at(now) {
                self.cookies.remove(&cookie.key());
            } else {
                debug!(domain = %cookie.domain, name = %cookie.name, "stored response cookie");
                self.set(cookie);
            }
        }
    }

    /// Loads cookies from a Netscape-format cookie file.
    ///
    /// Malformed lines do not fail the load; they are reported in the
    /// returned summary.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be opened or read.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn load_from_file(&mut self, path: &Path) -> io::Result<LoadSummary> {
        let file = read_cookie_file(BufReader::new(File::open(path)?))?;
        let loaded = file.cookies.len();
        for line in file.cookies {
            self.set(Cookie::from(line));
        }
        Ok(LoadSummary {
            loaded,
            skipped: file.skipped,
        })
    }

    /// Writes every unexpired cookie to a Netscape-format cookie file.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be written.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn save_to_file(&self, path: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let lines: Vec<CookieLine> = self
            .cookies
            .values()
            .filter(|cookie| !cookie.is_expired_at(now))
            .map(CookieLine::from)
            .collect();
        let mut writer = BufWriter::new(File::create(path)?);
        write_cookie_file(&mut writer, &lines)?;
        writer.flush()
    }
}

/// Outcome of [`CookieStore::load_from_file`].
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Cookies added to the store.
    pub loaded: usize,
    /// `line N: reason` for each malformed line.
    pub skipped: Vec<String>,
}

impl From<CookieLine> for Cookie {
    fn from(line: CookieLine) -> Self {
        let expires = (line.expires > 0)
            .then(|| UNIX_EPOCH.checked_add(Duration::from_secs(line.expires)))
            .flatten();
        Self {
            value: line.value().to_string(),
            name: line.name,
            domain: line.domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only: !line.include_subdomains,
            path: if line.path.is_empty() {
                "/".to_string()
            } else {
                line.path
            },
            secure: line.secure,
            http_only: line.http_only,
            expires,
        }
    }
}

impl From<&Cookie> for CookieLine {
    fn from(cookie: &Cookie) -> Self {
        let domain = if cookie.host_only {
            cookie.domain.clone()
        } else {
            format!(".{}", cookie.domain)
        };
        let expires = cookie
            .expires
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        let mut line = CookieLine::new(domain, cookie.name.clone(), cookie.value.clone());
        line.include_subdomains = !cookie.host_only;
        line.path.clone_from(&cookie.path);
        line.secure = cookie.secure;
        line.http_only = cookie.http_only;
        line.expires = expires;
        line
    }
}

fn parse_set_cookie(raw: &str, url: &Url, host: &str, now: SystemTime) -> Option<Cookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        domain: host.to_string(),
        host_only: true,
        path: default_path(url),
        secure: false,
        http_only: false,
        expires: None,
    };
    let mut max_age: Option<i64> = None;

    for attr in parts {
        let attr = attr.trim();
        let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
        let val = val.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(host, &domain, false) {
                    return None;
                }
                cookie.domain = domain;
                cookie.host_only = false;
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "expires" => {
                if let Ok(at) = httpdate::parse_http_date(val) {
                    cookie.expires = Some(at);
                }
            }
            "max-age" => max_age = val.parse().ok(),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }

    if let Some(seconds) = max_age {
        cookie.expires = Some(match u64::try_from(seconds) {
            Ok(secs) if secs > 0 => now.checked_add(Duration::from_secs(secs))?,
            _ => UNIX_EPOCH,
        });
    }
    Some(cookie)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_simple_cookie_matches_subdomains() {
        let mut store = CookieStore::new();
        store.set_simple("session", "abc", "example.com");
        assert_eq!(
            store.cookie_header(&url("http://www.example.com/page")),
            Some("session=abc".to_string())
        );
        assert_eq!(
            store.cookie_header(&url("http://example.com/")),
            Some("session=abc".to_string())
        );
        assert!(store.cookie_header(&url("http://notexample.com/")).is_none());
    }

    #[test]
    fn test_set_replaces_same_key() {
        let mut store = CookieStore::new();
        store.set_simple("a", "1", "example.com");
        store.set_simple("a", "2", ".example.com");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().value(), "2");
    }

    #[test]
    fn test_set_cookie_host_only_by_default() {
        let mut store = CookieStore::new();
        store.store_response_cookies(&url("http://example.com/a/b"), ["token=xyz"]);
        let cookie = store.get("token").unwrap();
        assert!(cookie.host_only);
        assert_eq!(cookie.path, "/a");
        assert!(store.cookie_header(&url("http://sub.example.com/a/")).is_none());
        assert_eq!(
            store.cookie_header(&url("http://example.com/a/c")),
            Some("token=xyz".to_string())
        );
        assert!(store.cookie_header(&url("http://example.com/ab")).is_none());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let mut store = CookieStore::new();
        store.store_response_cookies(
            &url("https://www.example.com/"),
            ["id=7; Domain=.example.com; Path=/; Secure; HttpOnly; Max-Age=3600"],
        );
        let cookie = store.get("id").unwrap();
        assert_eq!(cookie.domain, "example.com");
        assert!(!cookie.host_only);
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert!(cookie.expires.is_some());
        assert!(store.cookie_header(&url("http://example.com/")).is_none());
        assert!(store.cookie_header(&url("https://api.example.com/")).is_some());
    }

    #[test]
    fn test_set_cookie_foreign_domain_is_ignored() {
        let mut store = CookieStore::new();
        store.store_response_cookies(&url("http://example.com/"), ["x=1; Domain=evil.com"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_cookie_deletes_existing() {
        let mut store = CookieStore::new();
        let target = url("http://example.com/");
        store.store_response_cookies(&target, ["x=1"]);
        assert_eq!(store.len(), 1);
        store.store_response_cookies(&target, ["x=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"]);
        assert!(store.is_empty());
        store.store_response_cookies(&target, ["y=1", "y=2; Max-Age=0"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_longer_paths_come_first() {
        let mut store = CookieStore::new();
        let mut deep = Cookie::new("deep", "1", "example.com");
        deep.path = "/a/b".to_string();
        store.set(Cookie::new("root", "0", "example.com"));
        store.set(deep);
        assert_eq!(
            store.cookie_header(&url("http://example.com/a/b/c")),
            Some("deep=1; root=0".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_value() {
        let cookie = Cookie::new("session", "super-secret", "example.com");
        let debug = format!("{cookie:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_file_round_trip_keeps_scope() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");

        let mut store = CookieStore::new();
        store.set_simple("wide", "1", "example.com");
        store.store_response_cookies(&url("http://host.test/"), ["narrow=2; Max-Age=600"]);
        store.save_to_file(&path).unwrap();

        let mut loaded = CookieStore::new();
        assert_eq!(loaded.load_from_file(&path).unwrap().loaded, 2);
        assert!(!loaded.get("wide").unwrap().host_only);
        let narrow = loaded.get("narrow").unwrap();
        assert!(narrow.host_only);
        assert!(narrow.expires.is_some());
    }

    #[test]
    fn test_file_round_trip_keeps_http_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");

        let mut store = CookieStore::new();
        store.store_response_cookies(
            &url("http://example.com/"),
            ["sid=abc; HttpOnly", "theme=dark"],
        );
        store.save_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("#HttpOnly_example.com\tFALSE\t/\tFALSE\t0\tsid\tabc"));

        let mut loaded = CookieStore::new();
        loaded.load_from_file(&path).unwrap();
        assert!(loaded.get("sid").unwrap().http_only);
        assert!(!loaded.get("theme").unwrap().http_only);
        loaded.save_to_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_load_reports_skipped_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "broken\n.example.com\tTRUE\t/\tFALSE\t0\tok\t1\n").unwrap();

        let mut store = CookieStore::new();
        let summary = store.load_from_file(&path).unwrap();
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].starts_with("line 1:"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let mut store = CookieStore::new();
        let err = store.load_from_file(Path::new("/no/such/cookies.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
