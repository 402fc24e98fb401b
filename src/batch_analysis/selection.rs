//! Auto-selection of content that has never been analyzed.

use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use super::models::{JobState, DEFAULT_LINK_MODE};
use super::queue::QueueManager;
use crate::content_store::{ContentFilter, ContentItem, ContentStatus, ContentStore, ItemId};

/// Content type holding entity records, never analyzed.
pub const ENTITY_CONTENT_TYPE: &str = "entity";

lazy_static! {
    /// Inline markup left behind by a previous analysis, e.g.
    /// `<span id="urn:enhancement-1" class="textannotation" itemid="...">`.
    static ref ANNOTATION_MARKER: Regex =
        Regex::new(r#"<[a-z]+ id="urn:[^"]+" class="[^"]+" itemid="[^"]+">"#)
            .expect("annotation marker regex");
}

/// Whether `body` already carries analysis annotations.
pub fn has_annotation_marker(body: &str) -> bool {
    ANNOTATION_MARKER.is_match(body)
}

pub struct AutoSelector {
    content: Arc<dyn ContentStore>,
    analyzable_types: Vec<String>,
}

impl AutoSelector {
    pub fn new(content: Arc<dyn ContentStore>, analyzable_types: Vec<String>) -> Self {
        let analyzable_types = analyzable_types
            .into_iter()
            .filter(|t| t != ENTITY_CONTENT_TYPE)
            .collect();
        Self {
            content,
            analyzable_types,
        }
    }

    /// Ids of items that should be analyzed but are not tracked yet.
    pub fn eligible(&self, queue: &QueueManager) -> Result<Vec<ItemId>> {
        if self.analyzable_types.is_empty() {
            return Ok(vec![]);
        }
        let filter = ContentFilter {
            content_types: self.analyzable_types.clone(),
            status: Some(ContentStatus::Publish),
        };

        let mut eligible = Vec::new();
        for item in self.content.find_items(&filter)? {
            if self.is_eligible(&item, queue)? {
                eligible.push(item.id);
            }
        }
        Ok(eligible)
    }

    fn is_eligible(&self, item: &ContentItem, queue: &QueueManager) -> Result<bool> {
        if !item.status.is_published() || item.content_type == ENTITY_CONTENT_TYPE {
            return Ok(false);
        }
        if has_annotation_marker(&item.body) {
            debug!("Item {} already annotated", item.id);
            return Ok(false);
        }
        match queue.state_of(item.id)? {
            Some(JobState::Success) => Ok(false),
            // Already on its way; re-enqueueing would reset its progress.
            Some(JobState::Queued | JobState::Submitted | JobState::AwaitingResult) => Ok(false),
            Some(JobState::Failure) | None => Ok(true),
        }
    }

    /// Enqueue every eligible item with the default link mode and return how
    /// many were enqueued.
    pub fn submit(&self, queue: &QueueManager) -> Result<usize> {
        let ids = self.eligible(queue)?;
        if ids.is_empty() {
            return Ok(0);
        }
        queue.enqueue(&ids, DEFAULT_LINK_MODE)?;
        info!("Auto-selected {} items for analysis", ids.len());
        Ok(ids.len())
    }
}
