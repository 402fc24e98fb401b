//! Content item models.

use serde::{Deserialize, Serialize};

/// Identifier of an item in the content repository.
pub type ItemId = i64;

/// Publication status of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Publish => "publish",
            ContentStatus::Draft => "draft",
            ContentStatus::Pending => "pending",
            ContentStatus::Private => "private",
            ContentStatus::Trash => "trash",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "publish" => Some(ContentStatus::Publish),
            "draft" => Some(ContentStatus::Draft),
            "pending" => Some(ContentStatus::Pending),
            "private" => Some(ContentStatus::Private),
            "trash" => Some(ContentStatus::Trash),
            _ => None,
        }
    }

    /// Returns true if the item is publicly visible.
    pub fn is_published(&self) -> bool {
        matches!(self, ContentStatus::Publish)
    }
}

/// A stored content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    /// Content type, e.g. `post`, `page` or `entity`.
    pub content_type: String,
    pub status: ContentStatus,
    pub title: String,
    pub body: String,
    pub modified_at: i64,
}

/// Input for creating a content item.
#[derive(Debug, Clone, Deserialize)]
pub struct NewContentItem {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_status")]
    pub status: ContentStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

fn default_content_type() -> String {
    "post".to_string()
}

fn default_status() -> ContentStatus {
    ContentStatus::Publish
}

impl NewContentItem {
    pub fn new(content_type: &str, status: ContentStatus, body: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            status,
            title: String::new(),
            body: body.to_string(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
}

/// Filter used when scanning the repository.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    /// Only items of these types; empty means any type.
    pub content_types: Vec<String>,
    /// Only items with this status.
    pub status: Option<ContentStatus>,
}
