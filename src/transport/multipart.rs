//! `multipart/form-data` and form-urlencoded body encoding.

use rand::Rng;

use crate::config::{FormValue, MultipartPayload, PostPayload};
use crate::encoding::encode_text;
use crate::error::GrabError;

/// Content type of encoded simple `post` fields.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An encoded request body and the content type it requires, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// Body bytes.
    pub bytes: Vec<u8>,
    /// `Content-Type` to announce; `None` leaves the header to the caller.
    pub content_type: Option<String>,
}

/// Generates a random 32-character hex boundary.
#[must_use]
pub fn choose_boundary() -> String {
    format!("{:032x}", rand::thread_rng().r#gen::<u128>())
}

/// Encodes a multipart payload.
///
/// Raw bytes pass through unchanged. Field lists are encoded with a fresh
/// boundary; text values use `charset`, uploads keep their bytes.
///
/// # Errors
///
/// Returns [`GrabError::Misuse`] for a text payload or an unencodable value,
/// and [`GrabError::Io`] when a referenced upload file cannot be read.
pub fn encode_multipart_payload(
    payload: &MultipartPayload,
    charset: &str,
) -> Result<EncodedBody, GrabError> {
    match payload {
        MultipartPayload::Raw(bytes) => Ok(EncodedBody {
            bytes: bytes.clone(),
            content_type: None,
        }),
        MultipartPayload::Text(_) => Err(GrabError::misuse(
            "multipart_post does not accept decoded text, pass encoded bytes or fields",
        )),
        MultipartPayload::Fields(fields) => {
            let boundary = choose_boundary();
            let bytes = encode_multipart_fields(fields, charset, &boundary)?;
            Ok(EncodedBody {
                bytes,
                content_type: Some(format!("multipart/form-data; boundary={boundary}")),
            })
        }
    }
}

/// Encodes form fields between `boundary` markers.
///
/// # Errors
///
/// Same as [`encode_multipart_payload`].
pub fn encode_multipart_fields(
    fields: &[(String, FormValue)],
    charset: &str,
    boundary: &str,
) -> Result<Vec<u8>, GrabError> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match value {
            FormValue::Text(text) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        quote(name)
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&encode_text(text, charset)?);
            }
            FormValue::Upload(item) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        quote(name),
                        quote(item.filename()),
                        item.content_type()
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&item.read_bytes()?);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok(body)
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Encodes a simple post payload.
///
/// Fields are form-urlencoded after `charset` encoding of names and values.
///
/// # Errors
///
/// Returns [`GrabError::Misuse`] if text cannot be encoded under `charset`.
pub fn encode_post_payload(payload: &PostPayload, charset: &str) -> Result<EncodedBody, GrabError> {
    match payload {
        PostPayload::Raw(bytes) => Ok(EncodedBody {
            bytes: bytes.clone(),
            content_type: None,
        }),
        PostPayload::Text(text) => Ok(EncodedBody {
            bytes: encode_text(text, charset)?,
            content_type: None,
        }),
        PostPayload::Fields(pairs) => {
            let mut encoded = Vec::with_capacity(pairs.len());
            for (name, value) in pairs {
                let name = encode_text(name, charset)?;
                let value = encode_text(value, charset)?;
                encoded.push(format!(
                    "{}={}",
                    urlencoding::encode_binary(&name),
                    urlencoding::encode_binary(&value)
                ));
            }
            Ok(EncodedBody {
                bytes: encoded.join("&").into_bytes(),
                content_type: Some(FORM_URLENCODED.to_string()),
            })
        }
    }
}
