//! Attachment transcoding: local files to embeddable data URIs.
//!
//! Payloads travel base64-encoded without the `data:` prefix; the prefix is
//! reattached at the wire boundary as `data:{mime};base64,{payload}`.
//! Size ceilings are chosen by the caller, not enforced globally.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use thiserror::Error;

use crate::models::AttachmentPayload;

/// Ceiling for attachments on postings and chat messages (5 MB).
pub const POST_ATTACHMENT_LIMIT: u64 = 5 * 1024 * 1024;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("{file_name} is {}, larger than the {} limit", human_size(.size.to_owned()), human_size(.limit.to_owned()))]
    TooLarge {
        file_name: String,
        size: u64,
        limit: u64,
    },
    #[error("{file_name} is not a regular file")]
    NotAFile { file_name: String },
    #[error("failed to read {file_name}: {source}")]
    Read {
        file_name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("not a base64 data URI")]
    InvalidDataUri,
}

impl AttachmentError {
    /// File the error is about, when there is one.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            AttachmentError::TooLarge { file_name, .. }
            | AttachmentError::NotAFile { file_name }
            | AttachmentError::Read { file_name, .. } => Some(file_name),
            AttachmentError::InvalidDataUri => None,
        }
    }
}

/// A file ready to be sent inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAttachment {
    pub mime_type: String,
    /// Base64 without the data URI prefix.
    pub base64_payload: String,
    pub file_name: String,
    /// Size of the original file in bytes.
    pub size: u64,
}

impl EncodedAttachment {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_payload)
    }

    pub fn to_payload(&self) -> AttachmentPayload {
        AttachmentPayload {
            url: self.data_uri(),
            file_name: self.file_name.clone(),
            file_type: self.mime_type.clone(),
            size: self.size,
        }
    }
}

/// Files from one selection: what encoded and what did not.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub encoded: Vec<EncodedAttachment>,
    pub failures: Vec<AttachmentError>,
}

impl BatchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Format a byte count for error messages (e.g. "5 MB", "6.2 MB", "812 bytes").
pub fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    let (value, unit) = if b >= MB {
        (b / MB, "MB")
    } else if b >= KB {
        (b / KB, "KB")
    } else {
        return format!("{} bytes", bytes);
    };
    if value.fract() < 0.05 {
        format!("{:.0} {}", value, unit)
    } else {
        format!("{:.1} {}", value, unit)
    }
}

/// MIME type from the file extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => FALLBACK_MIME,
    }
}

/// Encode in-memory bytes.
pub fn encode_bytes(
    file_name: &str,
    bytes: &[u8],
    limit: u64,
) -> Result<EncodedAttachment, AttachmentError> {
    let size = bytes.len() as u64;
    if size > limit {
        return Err(AttachmentError::TooLarge {
            file_name: file_name.to_string(),
            size,
            limit,
        });
    }
    Ok(EncodedAttachment {
        mime_type: mime_type_for(file_name).to_string(),
        base64_payload: STANDARD.encode(bytes),
        file_name: file_name.to_string(),
        size,
    })
}

/// Read and encode one file, rejecting it before reading when it is too large.
pub async fn encode(path: &Path, limit: u64) -> Result<EncodedAttachment, AttachmentError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| AttachmentError::Read {
            file_name: file_name.clone(),
            source,
        })?;
    if !meta.is_file() {
        return Err(AttachmentError::NotAFile { file_name });
    }
    if meta.len() > limit {
        return Err(AttachmentError::TooLarge {
            file_name,
            size: meta.len(),
            limit,
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError::Read {
            file_name: file_name.clone(),
            source,
        })?;
    tracing::debug!("Encoded {} ({} bytes)", file_name, bytes.len());
    encode_bytes(&file_name, &bytes, limit)
}

/// Encode every file of a selection; failures are collected, not fatal.
///
/// Successfully encoded files keep their selection order.
pub async fn encode_batch(paths: &[PathBuf], limit: u64) -> BatchOutcome {
    let results = join_all(paths.iter().map(|p| encode(p, limit))).await;

    let mut outcome = BatchOutcome::default();
    for result in results {
        match result {
            Ok(encoded) => outcome.encoded.push(encoded),
            Err(e) => {
                tracing::warn!("Skipping attachment: {}", e);
                outcome.failures.push(e);
            }
        }
    }
    outcome
}

/// Split `data:{mime};base64,{payload}` into MIME type and payload.
pub fn parse_data_uri(uri: &str) -> Result<(&str, &str), AttachmentError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or(AttachmentError::InvalidDataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(AttachmentError::InvalidDataUri)?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or(AttachmentError::InvalidDataUri)?;
    let mime = if mime.is_empty() { FALLBACK_MIME } else { mime };
    Ok((mime, payload))
}
