//! Netscape cookie file format.
//!
//! Seven TAB-separated fields per line: `domain`, `include_subdomains`,
//! `path`, `secure`, `expires`, `name`, `value`. Comment lines start with
//! `#`, except the `#HttpOnly_` domain prefix written by curl, which marks an
//! HTTP-only cookie.

use std::fmt;
use std::io::{self, BufRead, Write};

const HEADER_LINE: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One cookie as stored in a cookie file.
///
/// `Debug` output redacts the value.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieLine {
    /// Domain, with a leading dot when subdomains match.
    pub domain: String,
    /// Whether subdomains match.
    pub include_subdomains: bool,
    /// Path scope.
    pub path: String,
    /// HTTPS only.
    pub secure: bool,
    /// Written with the `#HttpOnly_` prefix.
    pub http_only: bool,
    /// Unix timestamp of expiry, 0 for session cookies.
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    value: String,
}

/// Cookies read from a file, plus a reason for every line that was skipped.
#[derive(Debug, Default)]
pub struct CookieFile {
    /// Lines that parsed.
    pub cookies: Vec<CookieLine>,
    /// `line N: reason` for each malformed line. Never includes values.
    pub skipped: Vec<String>,
}

impl CookieLine {
    /// A session cookie for every path of `domain`, not HTTPS-only.
    #[must_use]
    pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            include_subdomains: domain.starts_with('.'),
            domain,
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: 0,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn parse(line: &str) -> Result<Self, String> {
        let (http_only, line) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let fields: Vec<&str> = line.split('\t').collect();
        let [domain, include_subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(format!("expected 7 TAB-separated fields, found {}", fields.len()));
        };
        if domain.is_empty() {
            return Err("empty domain".to_string());
        }
        if name.is_empty() {
            return Err("empty cookie name".to_string());
        }
        let expires = expires
            .parse::<u64>()
            .map_err(|_| format!("expires must be a non-negative integer, got '{expires}'"))?;

        Ok(Self {
            domain: domain.to_string(),
            include_subdomains: parse_flag(include_subdomains, "include_subdomains")?,
            path: path.to_string(),
            secure: parse_flag(secure, "secure")?,
            http_only,
            expires,
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let prefix = if self.http_only { HTTP_ONLY_PREFIX } else { "" };
        writeln!(
            writer,
            "{prefix}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.domain,
            flag(self.include_subdomains),
            self.path,
            flag(self.secure),
            self.expires,
            self.name,
            self.value
        )
    }
}

impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("include_subdomains", &self.include_subdomains)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Reads a cookie file. Malformed lines are skipped and listed in
/// [`CookieFile::skipped`]; only read failures are errors.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn read_cookie_file(reader: impl BufRead) -> io::Result<CookieFile> {
    let mut file = CookieFile::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() || (line.starts_with('#') && !line.starts_with(HTTP_ONLY_PREFIX)) {
            continue;
        }
        match CookieLine::parse(line) {
            Ok(cookie) => file.cookies.push(cookie),
            Err(reason) => file.skipped.push(format!("line {}: {reason}", idx + 1)),
        }
    }
    Ok(file)
}

/// Writes cookies in Netscape format, header line first.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn write_cookie_file(writer: &mut impl Write, cookies: &[CookieLine]) -> io::Result<()> {
    writeln!(writer, "{HEADER_LINE}")?;
    cookies.iter().try_for_each(|cookie| cookie.write_to(&mut *writer))
}

fn flag(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

fn parse_flag(value: &str, field: &str) -> Result<bool, String> {
    match value {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        _ => Err(format!("{field} must be TRUE or FALSE, got '{value}'")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(input: &str) -> CookieFile {
        read_cookie_file(Cursor::new(input.as_bytes())).unwrap()
    }

    #[test]
    fn test_read_valid_file() {
        let file = read(
            "# Netscape HTTP Cookie File\n\
             .example.com\tTRUE\t/\tFALSE\t0\tsession\tabc123\n\
             other.com\tFALSE\t/path\tTRUE\t1700000000\ttoken\txyz789\n",
        );
        assert!(file.skipped.is_empty());
        assert_eq!(file.cookies.len(), 2);
        assert_eq!(file.cookies[0].domain, ".example.com");
        assert!(file.cookies[0].include_subdomains);
        assert_eq!(file.cookies[0].value(), "abc123");
        assert!(!file.cookies[1].include_subdomains);
        assert!(file.cookies[1].secure);
        assert_eq!(file.cookies[1].expires, 1_700_000_000);
    }

    #[test]
    fn test_http_only_prefix_sets_flag() {
        let file = read("#HttpOnly_.example.com\tTRUE\t/\tFALSE\t0\tsid\tv\n# comment\n");
        assert_eq!(file.cookies.len(), 1);
        assert_eq!(file.cookies[0].domain, ".example.com");
        assert!(file.cookies[0].http_only);
    }

    #[test]
    fn test_malformed_lines_are_skipped_with_reason() {
        let file = read(
            ".good.com\tTRUE\t/\tFALSE\t0\tname\tvalue\n\
             bad line without tabs\n\
             .example.com\tYES\t/\tFALSE\t0\tname\tsecret\n\
             .example.com\tTRUE\t/\tFALSE\tsoon\tname\tsecret\n\
             \tTRUE\t/\tFALSE\t0\tname\tsecret\n\
             .example.com\tTRUE\t/\tFALSE\t0\t\tsecret\n",
        );
        assert_eq!(file.cookies.len(), 1);
        assert_eq!(file.skipped.len(), 5);
        assert!(file.skipped[0].starts_with("line 2: expected 7 TAB-separated fields"));
        assert!(file.skipped.iter().all(|reason| !reason.contains("secret")));
    }

    #[test]
    fn test_all_malformed_is_not_an_error() {
        let file = read("bad one\nbad two\n");
        assert!(file.cookies.is_empty());
        assert_eq!(file.skipped.len(), 2);
    }

    #[test]
    fn test_empty_and_comment_only_files() {
        assert!(read("").cookies.is_empty());
        assert!(read("# Netscape HTTP Cookie File\n").cookies.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let file = read("# Header\r\n.example.com\tTRUE\t/\tFALSE\t0\tname\tvalue\r\n");
        assert_eq!(file.cookies[0].value(), "value");
    }

    #[test]
    fn test_written_file_reads_back_identically() {
        let mut secure = CookieLine::new("shop.example.com", "cart", "3");
        secure.path = "/basket".to_string();
        secure.secure = true;
        secure.expires = 42;
        let mut hidden = CookieLine::new(".example.com", "sid", "abc");
        hidden.http_only = true;
        let lines = vec![secure, hidden];

        let mut out = Vec::new();
        write_cookie_file(&mut out, &lines).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with(HEADER_LINE));
        assert!(text.contains("shop.example.com\tFALSE\t/basket\tTRUE\t42\tcart\t3"));
        assert!(text.contains("#HttpOnly_.example.com\tTRUE\t/\tFALSE\t0\tsid\tabc"));

        let file = read_cookie_file(Cursor::new(out)).unwrap();
        assert_eq!(file.cookies, lines);
    }

    #[test]
    fn test_debug_redacts_value() {
        let cookie = CookieLine::new(".example.com", "session", "super_secret_token");
        assert!(!format!("{cookie:?}").contains("super_secret_token"));
    }
}
