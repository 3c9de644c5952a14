//! Media ingestion handler: download, classify, store, link.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use chatvault_core::{
    Error, MediaJob, MessageRepository, MessagingService, ObjectStore, RemoteMedia, Result,
};

use crate::handler::{JobResult, MediaJobHandler};

/// Content type of photos. The service always re-encodes them as JPEG.
pub const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Content type used when nothing better is known.
pub const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

/// Declared content type of an attachment before its bytes are seen.
///
/// Unsupported media cannot be stored and fails classification.
pub fn declared_content_type(media: &RemoteMedia) -> Result<Option<String>> {
    match media {
        RemoteMedia::Photo { .. } => Ok(Some(PHOTO_CONTENT_TYPE.to_string())),
        RemoteMedia::Document { mime_type, .. } => Ok(mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_ascii_lowercase)),
        RemoteMedia::Unsupported => Err(Error::Classification(
            "unsupported media kind".to_string(),
        )),
    }
}

/// Final content type: the declared one, refined from magic bytes when it is
/// absent or generic.
pub fn content_type_for(media: &RemoteMedia, data: &[u8]) -> Result<String> {
    let declared = declared_content_type(media)?;
    match declared {
        Some(ct) if ct != GENERIC_CONTENT_TYPE => Ok(ct),
        _ => Ok(infer::get(data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| GENERIC_CONTENT_TYPE.to_string())),
    }
}

/// File extension for a content type, including the dot.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "application/pdf" => ".pdf",
        "video/mp4" => ".mp4",
        "video/mpeg" => ".mpeg",
        "audio/mpeg" => ".mp3",
        "application/zip" => ".zip",
        "audio/ogg" | "application/ogg" => ".ogg",
        _ => ".dat",
    }
}

/// Reduce a display name to a single safe path segment.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Deterministic object name: `<name>/<mime major type>/<message id><ext>`.
pub fn build_object_name(display_name: &str, content_type: &str, remote_message_id: i64) -> String {
    let major = content_type
        .split('/')
        .next()
        .map(sanitize_segment)
        .unwrap_or_else(|| "application".to_string());
    format!(
        "{}/{}/{}{}",
        sanitize_segment(display_name),
        major,
        remote_message_id,
        extension_for(content_type)
    )
}

/// Handler that moves one attachment from the remote service into object
/// storage and links it to its message.
pub struct MediaIngestHandler {
    remote: Arc<dyn MessagingService>,
    messages: Arc<dyn MessageRepository>,
    store: Arc<dyn ObjectStore>,
}

impl MediaIngestHandler {
    pub fn new(
        remote: Arc<dyn MessagingService>,
        messages: Arc<dyn MessageRepository>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            remote,
            messages,
            store,
        }
    }

    async fn ingest(&self, job: &MediaJob) -> Result<String> {
        // Unsupported kinds fail before any transfer.
        declared_content_type(&job.media)?;

        let data = self.remote.download_media(&job.media).await?;
        let content_type = content_type_for(&job.media, &data)?;
        let name = build_object_name(&job.naming_hint, &content_type, job.remote_message_id);
        debug!(
            object = %name,
            content_type = %content_type,
            size = data.len(),
            "Storing media"
        );

        let locator = self.store.put_object(&name, data, &content_type).await?;

        let linked = self
            .messages
            .set_media_locator(job.remote_message_id, job.conversation_id, &locator)
            .await?;
        if !linked {
            return Err(Error::NotFound(format!(
                "message {} in conversation {}",
                job.remote_message_id, job.conversation_id
            )));
        }
        Ok(locator)
    }
}

#[async_trait]
impl MediaJobHandler for MediaIngestHandler {
    async fn execute(&self, job: MediaJob) -> JobResult {
        match self.ingest(&job).await {
            Ok(locator) => JobResult::Success(Some(locator)),
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
