//! Issue record model shared by the fetcher, the workers and storage

use serde::{Deserialize, Serialize};

/// A reference to an issue: its identifier and where to fetch it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub id: String,
    pub url: String,
}

impl IssueRef {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// A comment on an issue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: Option<String>,
    pub date: Option<String>,
    pub content: String,
}

/// One entry of an issue's change history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who made the change
    pub user: Option<String>,
    pub date: Option<String>,
    /// What kind of change it was (e.g. "Status changed")
    pub action: Option<String>,
    pub details: Option<String>,
}

/// Attachment metadata, filled in further by the attachment processor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// File name as displayed by the tracker
    pub filename: String,

    /// Absolute download URL
    pub url: Option<String>,

    /// Local path once downloaded
    #[serde(default)]
    pub file_path: Option<String>,

    /// Size in bytes once downloaded
    #[serde(default)]
    pub file_size: Option<u64>,

    #[serde(default)]
    pub downloaded: bool,

    /// Text content for plain-text attachments
    #[serde(default)]
    pub extracted_text: Option<String>,

    /// Why the download failed, if it did
    #[serde(default)]
    pub error: Option<String>,
}

/// A fully parsed issue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub issue_id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub product: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
    /// Change history in page order
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Issues this one links to (identifiers and URLs only)
    #[serde(default)]
    pub related: Vec<IssueRef>,
    /// RFC 3339 timestamp of the fetch
    pub crawled_at: String,
}

impl IssueRecord {
    /// Number of attachments that were actually downloaded
    pub fn downloaded_attachments(&self) -> usize {
        self.attachments.iter().filter(|a| a.downloaded).count()
    }

    /// Identifiers of the related issues, in page order
    pub fn related_ids(&self) -> Vec<String> {
        self.related.iter().map(|r| r.id.clone()).collect()
    }
}
