//! Text encoding helpers for payloads and header bytes.
//!
//! Charset labels are resolved with `encoding_rs`, which knows the WHATWG
//! label set (`cp1251`, `koi8-r`, `windows-1252`, ...). `ascii` is kept
//! strict rather than aliased to windows-1252.

use encoding_rs::{Encoding, UTF_8};

use crate::error::GrabError;

/// Resolves a charset label, accepting a few common non-WHATWG spellings.
fn lookup_encoding(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().to_ascii_lowercase();
    let label = match label.as_str() {
        "latin-1" => "latin1",
        "utf_8" => "utf-8",
        other => other,
    };
    Encoding::for_label(label.as_bytes())
}

fn is_strict_ascii(label: &str) -> bool {
    matches!(label.trim().to_ascii_lowercase().as_str(), "ascii" | "us-ascii")
}

/// Encodes `text` under the named charset.
///
/// # Errors
///
/// Returns [`GrabError::Misuse`] for unknown charsets, for charsets that
/// cannot be used for output (UTF-16) and for characters the charset cannot
/// represent.
pub fn encode_text(text: &str, charset: &str) -> Result<Vec<u8>, GrabError> {
    let encoding = lookup_encoding(charset)
        .ok_or_else(|| GrabError::misuse(format!("unsupported charset: {charset}")))?;
    if is_strict_ascii(charset) {
        if let Some(ch) = text.chars().find(|ch| !ch.is_ascii()) {
            return Err(GrabError::misuse(format!(
                "character {ch:?} cannot be encoded as {charset}"
            )));
        }
        return Ok(text.as_bytes().to_vec());
    }
    if encoding.output_encoding() != encoding {
        return Err(GrabError::misuse(format!(
            "charset {charset} cannot be used to encode payloads"
        )));
    }
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(GrabError::misuse(format!(
            "text contains characters that cannot be encoded as {charset}"
        )));
    }
    Ok(bytes.into_owned())
}

/// Decodes `bytes` under the named charset, replacing what cannot be decoded.
///
/// Unknown charsets fall back to lossy UTF-8.
#[must_use]
pub fn decode_text(bytes: &[u8], charset: &str) -> String {
    let encoding = lookup_encoding(charset).unwrap_or(UTF_8);
    encoding
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

/// Decodes bytes as UTF-8, silently dropping undecodable sequences.
#[must_use]
pub fn decode_utf8_ignore(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}
