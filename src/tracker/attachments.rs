//! Attachment downloader
//!
//! Files are stored under `<attachments-dir>/<issue_id>/<filename>`. Plain
//! text formats also have their content captured on the attachment record.

use crate::tracker::session::AuthSession;
use crate::tracker::traits::{AttachmentError, AttachmentProcessor};
use crate::tracker::types::AttachmentInfo;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Extensions whose content is kept as extracted text
const TEXT_EXTENSIONS: &[&str] = &["txt", "log", "csv", "md", "json", "xml"];

/// Extracted text is cut at this many characters
const MAX_EXTRACTED_CHARS: usize = 100_000;

/// Downloads attachments with the owning worker's session
#[derive(Debug, Clone)]
pub struct HttpAttachmentDownloader {
    root: PathBuf,
}

impl HttpAttachmentDownloader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory receiving one issue's attachments
    pub fn issue_dir(&self, issue_id: &str) -> PathBuf {
        self.root.join(sanitize_filename(issue_id))
    }
}

#[async_trait]
impl AttachmentProcessor for HttpAttachmentDownloader {
    async fn download(
        &self,
        session: &AuthSession,
        issue_id: &str,
        attachment: &mut AttachmentInfo,
    ) -> Result<(), AttachmentError> {
        let url = attachment
            .url
            .clone()
            .ok_or_else(|| AttachmentError::MissingUrl(attachment.filename.clone()))?;

        let response = session
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|source| AttachmentError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| AttachmentError::Http {
                url: url.clone(),
                source,
            })?;

        let dir = self.issue_dir(issue_id);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(sanitize_filename(&attachment.filename));
        tokio::fs::write(&path, &bytes).await?;

        attachment.file_path = Some(path.display().to_string());
        attachment.file_size = Some(bytes.len() as u64);
        if is_text_file(&path) {
            let text: String = String::from_utf8_lossy(&bytes)
                .chars()
                .take(MAX_EXTRACTED_CHARS)
                .collect();
            attachment.extracted_text = Some(text);
        }

        tracing::debug!(
            issue_id,
            filename = %attachment.filename,
            "Downloaded {} bytes",
            bytes.len()
        );

        Ok(())
    }
}

/// Replaces path separators and other unsafe characters
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "attachment".to_string(),
        _ => cleaned,
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
