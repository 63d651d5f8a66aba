//! Upload descriptors for multipart form fields.
//!
//! An [`UploadItem`] is either in-memory content or a reference to a file
//! whose bytes are read when the request body is encoded. Both variants
//! resolve a filename and a MIME type at construction and are immutable
//! afterwards.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::GrabError;

/// MIME type used when the filename extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Length of generated filenames for inline content.
const RANDOM_FILENAME_LEN: usize = 10;

/// Content to send as a file field of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadItem {
    /// Bytes held in memory.
    InlineContent {
        /// Raw content.
        content: Vec<u8>,
        /// Filename announced to the server.
        filename: String,
        /// MIME type announced to the server.
        content_type: String,
    },
    /// A file read from disk when the body is encoded.
    FileRef {
        /// Path to the file.
        path: PathBuf,
        /// Filename announced to the server.
        filename: String,
        /// MIME type announced to the server.
        content_type: String,
    },
}

impl UploadItem {
    /// Describes in-memory content.
    ///
    /// Without a filename a short random token is used; without a content
    /// type it is guessed from the filename.
    #[must_use]
    pub fn content(
        content: impl Into<Vec<u8>>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Self {
        let filename = filename.map_or_else(random_filename, str::to_string);
        let content_type = content_type.map_or_else(
            || resolve_content_type(&filename).to_string(),
            str::to_string,
        );
        Self::InlineContent {
            content: content.into(),
            filename,
            content_type,
        }
    }

    /// Describes a file on disk.
    ///
    /// Without a filename the path's basename is used.
    #[must_use]
    pub fn file(
        path: impl Into<PathBuf>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Self {
        let path = path.into();
        let filename = filename.map_or_else(
            || {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            },
            str::to_string,
        );
        let content_type = content_type.map_or_else(
            || resolve_content_type(&filename).to_string(),
            str::to_string,
        );
        Self::FileRef {
            path,
            filename,
            content_type,
        }
    }

    /// Filename announced to the server.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::InlineContent { filename, .. } | Self::FileRef { filename, .. } => filename,
        }
    }

    /// MIME type announced to the server.
    #[must_use]
    pub fn content_type(&self) -> &str {
        match self {
            Self::InlineContent { content_type, .. } | Self::FileRef { content_type, .. } => {
                content_type
            }
        }
    }

    /// Returns the bytes to upload, reading the file for [`UploadItem::FileRef`].
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Io`] if the referenced file cannot be read.
    pub fn read_bytes(&self) -> Result<Vec<u8>, GrabError> {
        match self {
            Self::InlineContent { content, .. } => Ok(content.clone()),
            Self::FileRef { path, .. } => {
                std::fs::read(path).map_err(|e| GrabError::io(path.clone(), e))
            }
        }
    }
}

/// Looks up a MIME type by filename extension.
///
/// Never fails: unknown or missing extensions map to
/// `application/octet-stream`.
#[must_use]
pub fn resolve_content_type(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Generates a short filename token derived from the current time.
#[must_use]
pub fn random_filename() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = Sha256::digest(nanos.to_string().as_bytes());
    let mut token = format!("{digest:x}");
    token.truncate(RANDOM_FILENAME_LEN);
    token
}
