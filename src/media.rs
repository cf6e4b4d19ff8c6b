//! Media metadata extraction and the background download worker.
//!
//! Ingestion records a metadata row for every media message; eligible items
//! (per the auto-download filter) get a detached download task so a slow or
//! dead CDN never blocks the event stream. Payload bytes are written
//! atomically under the media root, grouped by MIME top-level type.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::MediaConfig;
use crate::protocol::{ProtocolError, ProtocolPort};
use crate::store::models::download_status;
use crate::store::{MediaMetadata, MessageStore};
use crate::types::message::{MediaDescriptor, MediaKind};

const MAX_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

pub struct MediaManager {
    config: MediaConfig,
    store: Arc<MessageStore>,
    port: Arc<dyn ProtocolPort>,
    cancel: CancellationToken,
}

impl MediaManager {
    pub fn new(
        config: MediaConfig,
        store: Arc<MessageStore>,
        port: Arc<dyn ProtocolPort>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            port,
            cancel,
        })
    }

    /// Initial download status for a freshly extracted descriptor. History
    /// media is gated behind its own flag; everything else goes through the
    /// type/size filter.
    pub fn initial_status(&self, descriptor: &MediaDescriptor, from_history: bool) -> &'static str {
        if from_history && !self.config.auto_download_from_history {
            return download_status::SKIPPED;
        }
        if self.should_auto_download(descriptor.filter_type(), descriptor.file_length) {
            download_status::PENDING
        } else {
            download_status::SKIPPED
        }
    }

    pub fn should_auto_download(&self, media_type: &str, file_size: u64) -> bool {
        if !self.config.auto_download_enabled {
            return false;
        }
        if !self.config.auto_download_types.contains(media_type) {
            debug!("Media type {media_type} not in auto-download types");
            return false;
        }
        // max size of zero means unbounded
        if self.config.auto_download_max_size > 0 && file_size > self.config.auto_download_max_size
        {
            debug!(
                "Media size {file_size} bytes exceeds max {} bytes",
                self.config.auto_download_max_size
            );
            return false;
        }
        true
    }

    /// Builds the metadata row for a descriptor. Media without a wire-level
    /// file name (everything except documents) gets one synthesised from
    /// the message id.
    pub fn metadata_row(
        &self,
        message_id: &str,
        descriptor: &MediaDescriptor,
        status: &str,
    ) -> MediaMetadata {
        let prefix = id_prefix(message_id);
        let file_name = match descriptor.kind {
            MediaKind::Sticker => format!("sticker_{prefix}.webp"),
            MediaKind::Image => format!("image_{prefix}.jpg"),
            MediaKind::Video => format!("video_{prefix}.mp4"),
            MediaKind::Audio => {
                if descriptor.ptt {
                    format!("{prefix}_voice_note.ogg")
                } else {
                    format!("{prefix}_audio.ogg")
                }
            }
            MediaKind::Document => {
                if descriptor.file_name.is_empty() {
                    format!(
                        "document_{prefix}{}",
                        mime_to_extension(&descriptor.mime_type)
                    )
                } else {
                    descriptor.file_name.clone()
                }
            }
        };

        MediaMetadata {
            message_id: message_id.to_string(),
            file_name,
            file_size: descriptor.file_length as i64,
            mime_type: descriptor.mime_type.clone(),
            width: descriptor.width.map(|w| w as i32),
            height: descriptor.height.map(|h| h as i32),
            duration: descriptor.seconds.map(|s| s as i32),
            media_key: descriptor.media_key.clone(),
            direct_path: descriptor.direct_path.clone(),
            file_sha256: descriptor.file_sha256.clone(),
            file_enc_sha256: descriptor.file_enc_sha256.clone(),
            file_path: String::new(),
            download_status: status.to_string(),
            download_timestamp: None,
            download_error: None,
        }
    }

    /// Launches the background download task for one media item.
    pub fn spawn_download(self: &Arc<Self>, meta: MediaMetadata, descriptor: MediaDescriptor) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.download_with_retry(meta, descriptor).await;
        });
    }

    /// Runs up to three attempts with exponential backoff from one second.
    /// Gone-errors (404/410-like) are terminal and mark the row `expired`;
    /// any other terminal failure marks it `failed` with the concatenated
    /// error trail. Cancellation abandons the download and leaves the row
    /// in its prior state.
    pub async fn download_with_retry(&self, meta: MediaMetadata, descriptor: MediaDescriptor) {
        let message_id = meta.message_id.clone();
        let mut backoff = INITIAL_BACKOFF;
        let mut trail: Vec<String> = Vec::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if self.cancel.is_cancelled() {
                return;
            }

            match self.download_once(&meta, &descriptor).await {
                Ok(rel_path) => {
                    if let Err(e) = self.store.mark_media_downloaded(&message_id, &rel_path) {
                        warn!("Failed to record media download for {message_id}: {e}");
                    }
                    info!(
                        "Downloaded media {message_id} to {rel_path} ({} bytes)",
                        meta.file_size
                    );
                    return;
                }
                Err(err) => {
                    trail.push(format!("attempt {attempt}: {err}"));

                    if let MediaError::Protocol(p) = &err {
                        if p.is_gone() {
                            let trail = trail.join("; ");
                            if let Err(e) = self.store.mark_media_failed(
                                &message_id,
                                download_status::EXPIRED,
                                &trail,
                            ) {
                                warn!("Failed to record expired media for {message_id}: {e}");
                            }
                            return;
                        }
                    }

                    warn!("Download attempt {attempt}/{MAX_ATTEMPTS} for {message_id} failed: {err}");

                    if attempt < MAX_ATTEMPTS {
                        tokio::select! {
                            _ = self.cancel.cancelled() => return,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff *= 2;
                    }
                }
            }
        }

        let trail = format!(
            "download failed after {MAX_ATTEMPTS} attempts: {}",
            trail.join("; ")
        );
        if let Err(e) =
            self.store
                .mark_media_failed(&message_id, download_status::FAILED, &trail)
        {
            warn!("Failed to record media failure for {message_id}: {e}");
        }
    }

    async fn download_once(
        &self,
        meta: &MediaMetadata,
        descriptor: &MediaDescriptor,
    ) -> Result<String, MediaError> {
        let bytes = tokio::time::timeout(ATTEMPT_TIMEOUT, self.port.download_media(descriptor))
            .await
            .map_err(|_| MediaError::Protocol(ProtocolError::Timeout))?
            .map_err(MediaError::Protocol)?;

        if bytes.is_empty() {
            return Err(MediaError::EmptyFile);
        }

        let (abs_path, rel_path) = self.target_path(meta);
        if let Some(dir) = abs_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Write to a scratch name and rename so a crashed download never
        // leaves a half-written file at the final path.
        let part_path = abs_path.with_extension("part");
        tokio::fs::write(&part_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&part_path, &abs_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e.into());
        }

        let written = tokio::fs::metadata(&abs_path).await?;
        if written.len() == 0 {
            let _ = tokio::fs::remove_file(&abs_path).await;
            return Err(MediaError::EmptyFile);
        }
        if written.len() as i64 != meta.file_size {
            debug!(
                "File size differs from metadata for {}: wrote {} bytes, metadata claimed {}",
                meta.message_id,
                written.len(),
                meta.file_size
            );
        }

        Ok(rel_path)
    }

    /// `<subdir>/<msgid8>_<YYYYMMDD_HHMMSS>_<sanitised name>` under the
    /// media root.
    fn target_path(&self, meta: &MediaMetadata) -> (PathBuf, String) {
        let subdir = subdir_for_mime(&meta.mime_type);
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut safe_name = sanitize_filename(&meta.file_name);
        if safe_name.is_empty() {
            safe_name = format!("media_{stamp}{}", mime_to_extension(&meta.mime_type));
        }
        let file_name = format!("{}_{stamp}_{safe_name}", id_prefix(&meta.message_id));
        let rel = format!("{subdir}/{file_name}");
        (self.config.storage_path.join(&rel), rel)
    }

    /// Resolves a stored relative path against the media root, refusing
    /// paths that escape it.
    pub fn resolve_media_path(&self, relative: &str) -> Option<PathBuf> {
        crate::paths::contained_path(&self.config.storage_path, relative)
    }

    pub fn media_root(&self) -> &Path {
        &self.config.storage_path
    }
}

#[derive(Debug, thiserror::Error)]
enum MediaError {
    #[error(transparent)]
    Protocol(ProtocolError),
    #[error("downloaded file is empty")]
    EmptyFile,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn id_prefix(message_id: &str) -> &str {
    message_id.get(..8).unwrap_or(message_id)
}

fn subdir_for_mime(mime: &str) -> &'static str {
    if mime.starts_with("image/") {
        "images"
    } else if mime.starts_with("video/") {
        "videos"
    } else if mime.starts_with("audio/") {
        "audio"
    } else {
        "documents"
    }
}

/// Replaces path separators and `/\:*?"<>|` with `_`, drops non-printable
/// characters, and truncates to 200 bytes preserving any extension.
pub fn sanitize_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => result.push('_'),
            c if c.is_control() => {}
            c => result.push(c),
        }
    }

    if result.len() <= 200 {
        return result;
    }

    let ext = Path::new(&result)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let budget = 200usize.saturating_sub(ext.len());
    let mut base = String::with_capacity(budget);
    for c in result.chars() {
        if base.len() + c.len_utf8() > budget {
            break;
        }
        base.push(c);
    }
    base + &ext
}

fn mime_to_extension(mime: &str) -> String {
    let known = match mime {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "video/mp4" => ".mp4",
        "video/3gpp" => ".3gp",
        "video/quicktime" => ".mov",
        "audio/ogg" => ".ogg",
        "audio/mpeg" => ".mp3",
        "audio/mp4" => ".m4a",
        "audio/aac" => ".aac",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "text/plain" => ".txt",
        _ => "",
    };
    if !known.is_empty() {
        return known.to_string();
    }
    match mime.split_once('/') {
        Some((_, sub)) if !sub.is_empty() => format!(".{sub}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
    }

    #[test]
    fn sanitize_drops_control_characters() {
        assert_eq!(sanitize_filename("a\u{0}b\nc"), "abc");
    }

    #[test]
    fn sanitize_truncates_preserving_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let out = sanitize_filename(&long);
        assert!(out.len() <= 200);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn mime_subdirs() {
        assert_eq!(subdir_for_mime("image/jpeg"), "images");
        assert_eq!(subdir_for_mime("video/mp4"), "videos");
        assert_eq!(subdir_for_mime("audio/ogg"), "audio");
        assert_eq!(subdir_for_mime("application/pdf"), "documents");
    }

    #[test]
    fn mime_extension_fallback() {
        assert_eq!(mime_to_extension("image/jpeg"), ".jpg");
        assert_eq!(mime_to_extension("application/x-tar"), ".x-tar");
        assert_eq!(mime_to_extension("garbage"), "");
    }

    #[test]
    fn short_message_ids_do_not_panic() {
        assert_eq!(id_prefix("ABC"), "ABC");
        assert_eq!(id_prefix("ABCDEFGH123"), "ABCDEFGH");
    }
}
