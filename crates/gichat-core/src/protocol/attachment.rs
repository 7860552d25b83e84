//! Attachment encoding and media-link classification
//!
//! Pure half of the attachment transport. Inline attachments travel as
//! base64 inside a `file` envelope; out-of-band attachments travel as a
//! `[Image] <url>` text message whose URL points at the companion server.
//! Reading files and talking HTTP happens in the runtime crate.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use crate::errors::AttachmentError;

/// Prefix of a text message that references an uploaded image
pub const IMAGE_PREFIX: &str = "[Image]";
/// Prefix of a text message that references an uploaded file
pub const FILE_PREFIX: &str = "[File]";

// ----------------------------------------------------------------------------
// Inline Attachments
// ----------------------------------------------------------------------------

/// File bytes destined for (or recovered from) a `file` envelope
#[derive(Clone, PartialEq, Eq)]
pub struct InlineAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl core::fmt::Debug for InlineAttachment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InlineAttachment")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl InlineAttachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Name the file by the last component of `path`
    pub fn from_path_bytes(path: &Path, bytes: Vec<u8>) -> Self {
        Self::new(file_name(path), bytes)
    }

    /// Decode the `data` field of a received `file` envelope
    pub fn from_base64(filename: impl Into<String>, data: &str) -> Result<Self, AttachmentError> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| AttachmentError::InvalidEncoding {
                reason: e.to_string(),
            })?;
        Ok(Self::new(filename, bytes))
    }

    /// Base64 text for the `data` field
    pub fn encode(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Length of `encode()` without allocating it
    pub fn encoded_len(&self) -> usize {
        base64_len(self.bytes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Padded base64 length of `raw_len` bytes
pub fn base64_len(raw_len: usize) -> usize {
    raw_len.div_ceil(3).saturating_mul(4)
}

/// Last path component, or `attachment` when the path has none
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

/// Reject frames the transport would refuse; nothing is ever sent partially
pub fn check_frame_size(frame_len: usize, max_frame_bytes: usize) -> Result<(), AttachmentError> {
    if frame_len > max_frame_bytes {
        return Err(AttachmentError::TooLarge {
            size: frame_len,
            max: max_frame_bytes,
        });
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Media Links
// ----------------------------------------------------------------------------

/// Reserved text prefixes, classified once at decode time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLink {
    Image(String),
    File(String),
}

impl MediaLink {
    /// Classify a text payload. `None` means plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(url) = strip_link(text, IMAGE_PREFIX) {
            return Some(MediaLink::Image(url));
        }
        strip_link(text, FILE_PREFIX).map(MediaLink::File)
    }

    /// Text payload carrying this link
    pub fn to_message(&self) -> String {
        match self {
            MediaLink::Image(url) => format!("{} {}", IMAGE_PREFIX, url),
            MediaLink::File(url) => format!("{} {}", FILE_PREFIX, url),
        }
    }
}

// A prefix with nothing after it, or text running straight into the prefix,
// stays plain text.
fn strip_link(text: &str, prefix: &str) -> Option<String> {
    let rest = text.strip_prefix(prefix)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let url = rest.trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    Some(url.to_string())
}

// ----------------------------------------------------------------------------
// Companion Server URLs
// ----------------------------------------------------------------------------

/// Append path segments to a base URL, percent-encoding each one
pub fn join_segments<'a>(
    base: &str,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, AttachmentError> {
    let mut url = Url::parse(base).map_err(|e| AttachmentError::InvalidUrl {
        reason: format!("{}: {}", base, e),
    })?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| AttachmentError::InvalidUrl {
                reason: format!("{} cannot be used as a base URL", base),
            })?;
        path.pop_if_empty();
        for segment in segments {
            for part in segment.split('/').filter(|part| !part.is_empty()) {
                path.push(part);
            }
        }
    }
    Ok(url)
}

/// `POST` target for uploads
pub fn upload_endpoint(upload_url: &str) -> Result<Url, AttachmentError> {
    join_segments(upload_url, ["upload"])
}

/// Canonical URL of a stored file: `<upload_url>/<download_path>/<filename>`
pub fn media_url(
    upload_url: &str,
    download_path: &str,
    filename: &str,
) -> Result<Url, AttachmentError> {
    if filename.is_empty() || filename.contains('/') {
        return Err(AttachmentError::InvalidUrl {
            reason: format!("stored filename {:?} is not a single path segment", filename),
        });
    }
    join_segments(upload_url, [download_path, filename])
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
