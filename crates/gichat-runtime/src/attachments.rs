//! Attachment I/O
//!
//! Reads files, talks to the companion upload server and prepares the frame
//! an attachment send will put on the wire. Everything here runs on
//! short-lived tasks spawned by the runner, never on the runner itself.

use std::path::{Path, PathBuf};

use gichat_core::{
    protocol::{base64_len, check_frame_size, media_url, upload_endpoint, InlineAttachment, WireCodec},
    AttachmentConfig, AttachmentError, AttachmentMode, Event, Timestamp,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

// ----------------------------------------------------------------------------
// Companion Server Client
// ----------------------------------------------------------------------------

/// Reply of `POST /upload`
#[derive(Debug, Deserialize)]
struct UploadResponse {
    filename: String,
}

/// HTTP client for out-of-band uploads and receiver-side fetches
#[derive(Debug, Clone)]
pub struct MediaClient {
    client: reqwest::Client,
    upload_url: Option<String>,
    download_path: String,
}

impl MediaClient {
    pub fn new(config: &AttachmentConfig) -> Result<Self, AttachmentError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AttachmentError::UploadFailed {
                reason: format!("HTTP client unavailable: {}", e),
            })?;
        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
            download_path: config.download_path.clone(),
        })
    }

    pub fn can_upload(&self) -> bool {
        self.upload_url.is_some()
    }

    /// Upload one file; returns the canonical URL it is served from
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Url, AttachmentError> {
        let base = self
            .upload_url
            .as_deref()
            .ok_or(AttachmentError::UploadUnavailable)?;
        let endpoint = upload_endpoint(base)?;
        debug!("Uploading {} ({} bytes) to {}", filename, bytes.len(), endpoint);

        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AttachmentError::UploadFailed {
                reason: e.to_string(),
            })?;
        let stored: UploadResponse =
            response
                .json()
                .await
                .map_err(|e| AttachmentError::UploadFailed {
                    reason: format!("unexpected upload response: {}", e),
                })?;

        let url = media_url(base, &self.download_path, &stored.filename)?;
        info!("Uploaded {} as {}", filename, url);
        Ok(url)
    }

    /// Download a URL-referenced attachment
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
        let target = Url::parse(url).map_err(|e| AttachmentError::InvalidUrl {
            reason: format!("{}: {}", url, e),
        })?;
        let fetch_failed = |reason: String| AttachmentError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(target)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| fetch_failed(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ----------------------------------------------------------------------------
// Send Preparation
// ----------------------------------------------------------------------------

/// Read a file into an inline attachment named after the path
pub async fn read_attachment(path: &Path) -> Result<InlineAttachment, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AttachmentError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(InlineAttachment::from_path_bytes(path, bytes))
}

/// A frame ready for the wire, plus the event to emit once it is sent
#[derive(Debug, Clone)]
pub struct PreparedSend {
    pub frame: String,
    pub sent_event: Event,
}

/// Encode a file as a base64 `file` envelope, refusing oversized frames
pub async fn prepare_inline(
    codec: &WireCodec,
    path: &Path,
    max_frame_bytes: usize,
) -> Result<PreparedSend, AttachmentError> {
    // Size from metadata first so huge files are never loaded
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AttachmentError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    let raw_len = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    check_frame_size(base64_len(raw_len), max_frame_bytes)?;

    let attachment = read_attachment(path).await?;
    check_frame_size(attachment.encoded_len(), max_frame_bytes)?;

    let frame = WireCodec::to_frame(&codec.encode_inline_file(&attachment)).map_err(|e| {
        AttachmentError::InvalidEncoding {
            reason: e.to_string(),
        }
    })?;
    check_frame_size(frame.len(), max_frame_bytes)?;

    Ok(PreparedSend {
        frame,
        sent_event: Event::AttachmentSent {
            filename: attachment.filename,
            mode: AttachmentMode::Inline,
            timestamp: Timestamp::now(),
        },
    })
}

/// Upload a file and encode the `[Image] <url>` message referencing it
pub async fn prepare_upload(
    codec: &WireCodec,
    media: &MediaClient,
    path: &Path,
) -> Result<PreparedSend, AttachmentError> {
    if !media.can_upload() {
        return Err(AttachmentError::UploadUnavailable);
    }
    let attachment = read_attachment(path).await?;
    let url = media.upload(&attachment.filename, attachment.bytes).await?;

    let frame = WireCodec::to_frame(&codec.encode_image_link(url.as_str())).map_err(|e| {
        AttachmentError::InvalidEncoding {
            reason: e.to_string(),
        }
    })?;

    Ok(PreparedSend {
        frame,
        sent_event: Event::AttachmentSent {
            filename: attachment.filename,
            mode: AttachmentMode::Upload,
            timestamp: Timestamp::now(),
        },
    })
}

// ----------------------------------------------------------------------------
// Task Outcomes
// ----------------------------------------------------------------------------

/// What a spawned attachment task reports back to the runner
#[derive(Debug)]
pub enum AttachmentOutcome {
    /// Send frame prepared; the runner puts it on the wire
    Ready(PreparedSend),
    Fetched { url: String, bytes: Vec<u8> },
    Failed { path: Option<PathBuf>, error: AttachmentError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use gichat_core::{protocol::Inbound, ImageSource};
    use std::io::Write;

    fn create_test_codec() -> WireCodec {
        WireCodec::new("alice", None)
    }

    #[tokio::test]
    async fn test_prepare_inline_zero_byte_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let codec = create_test_codec();

        let prepared = prepare_inline(&codec, file.path(), 1024).await.unwrap();
        match codec.decode_inbound(&prepared.frame).unwrap() {
            Inbound::InlineImage { attachment, .. } => assert!(attachment.bytes.is_empty()),
            other => panic!("expected inline image, got {:?}", other),
        }
        assert!(matches!(
            prepared.sent_event,
            Event::AttachmentSent {
                mode: AttachmentMode::Inline,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_prepare_inline_keeps_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5]).unwrap();
        let codec = create_test_codec();

        let prepared = prepare_inline(&codec, file.path(), 1024).await.unwrap();
        let event = codec
            .decode_inbound(&prepared.frame)
            .unwrap()
            .into_event(Timestamp::new(0))
            .unwrap();
        match event {
            Event::ImageReceived {
                image: ImageSource::Inline { bytes, .. },
                ..
            } => assert_eq!(bytes, vec![1, 2, 3, 4, 5]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prepare_inline_rejects_oversized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 300]).unwrap();

        let error = prepare_inline(&create_test_codec(), file.path(), 256)
            .await
            .unwrap_err();
        assert!(error.to_string().starts_with("attachment too large"));
    }

    #[tokio::test]
    async fn test_prepare_inline_sizes_from_metadata() {
        // Sparse: nothing near this size is ever read
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(1 << 30).unwrap();

        match prepare_inline(&create_test_codec(), file.path(), 1024).await {
            Err(AttachmentError::TooLarge { size, max }) => {
                assert_eq!(size, base64_len(1 << 30));
                assert_eq!(max, 1024);
            }
            other => panic!("expected a size rejection, got {:?}", other.map(|p| p.frame.len())),
        }
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let error = prepare_inline(
            &create_test_codec(),
            Path::new("/definitely/not/here.png"),
            1024,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, AttachmentError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_upload_requires_endpoint() {
        let media = MediaClient::new(&AttachmentConfig::default()).unwrap();
        assert!(!media.can_upload());

        let file = tempfile::NamedTempFile::new().unwrap();
        let error = prepare_upload(&create_test_codec(), &media, file.path())
            .await
            .unwrap_err();
        assert!(matches!(error, AttachmentError::UploadUnavailable));
    }
}
