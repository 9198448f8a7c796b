//! Feedback Manager (C12, spec §4.12)
//!
//! Owns the queue of assignments that Phase 1/Phase 2 could not auto-accept.
//! Resolving an item updates the prototype store and knowledge graph so the next
//! run does better on similar files.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{EntityType, KnowledgeGraph};
use crate::model::{CategoryId, FileId};
use crate::prototypes::PrototypeStore;

pub type FeedbackItemId = Uuid;

/// Keyword-edge weight used when a human accepts a suggestion outright.
pub const ACCEPT_KEYWORD_WEIGHT: f32 = 0.6;
/// Keyword-edge weight used when a human corrects a suggestion — higher, because
/// filename-derived keywords confirmed via explicit correction are strong signals
/// (spec §4.12).
pub const CORRECTION_KEYWORD_WEIGHT: f32 = 0.8;
/// How long a skipped item waits before it is eligible to be retried (spec §4.12).
pub const SKIP_COOLOFF: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    AutoAccepted,
    HumanAccepted,
    HumanCorrected,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    pub id: FeedbackItemId,
    pub file_id: FileId,
    pub suggested_category: CategoryId,
    pub confidence: f32,
    pub rationale: String,
    pub keywords: Vec<String>,
    pub status: FeedbackStatus,
    pub human_category: Option<CategoryId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("feedback item not found: {0}")]
    NotFound(FeedbackItemId),
    #[error("feedback item {0} is not pending")]
    NotPending(FeedbackItemId),
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

pub struct FeedbackManager {
    items: Vec<FeedbackItem>,
}

impl Default for FeedbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackManager {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn enqueue(
        &mut self,
        file_id: FileId,
        suggested_category: CategoryId,
        confidence: f32,
        rationale: impl Into<String>,
        keywords: Vec<String>,
        now: DateTime<Utc>,
    ) -> FeedbackItemId {
        let id = Uuid::new_v4();
        self.items.push(FeedbackItem {
            id,
            file_id,
            suggested_category,
            confidence,
            rationale: rationale.into(),
            keywords,
            status: FeedbackStatus::Pending,
            human_category: None,
            reviewed_at: None,
            created_at: now,
        });
        id
    }

    /// Items eligible for review right now: `Pending`, or `Skipped` past the
    /// cool-off window (spec "retried after a cool-off period").
    pub fn list_pending(&self, now: DateTime<Utc>) -> Vec<&FeedbackItem> {
        self.items
            .iter()
            .filter(|item| match item.status {
                FeedbackStatus::Pending => true,
                FeedbackStatus::Skipped => item
                    .reviewed_at
                    .is_some_and(|reviewed_at| now - reviewed_at >= SKIP_COOLOFF),
                _ => false,
            })
            .collect()
    }

    fn item_mut(&mut self, id: FeedbackItemId) -> Result<&mut FeedbackItem> {
        self.items.iter_mut().find(|i| i.id == id).ok_or(FeedbackError::NotFound(id))
    }

    /// Accept the suggested category as-is: EMA-updates the prototype and adds
    /// positive keyword edges (spec "Accept → human-accepted").
    pub fn accept(
        &mut self,
        id: FeedbackItemId,
        embedding: &[f32],
        prototypes: &mut PrototypeStore,
        graph: &mut KnowledgeGraph,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let item = self.item_mut(id)?;
        if item.status != FeedbackStatus::Pending && item.status != FeedbackStatus::Skipped {
            return Err(FeedbackError::NotPending(id));
        }
        let category = item.suggested_category;
        let keywords = item.keywords.clone();
        item.status = FeedbackStatus::HumanAccepted;
        item.human_category = Some(category);
        item.reviewed_at = Some(now);

        prototypes.update(category, embedding, now).ok();
        for keyword in &keywords {
            let keyword_entity = graph.keyword_entity(keyword);
            let _ = graph.record_human_confirmation(keyword_entity, category, ACCEPT_KEYWORD_WEIGHT);
        }
        Ok(())
    }

    /// Correct the suggestion to a new path, creating intermediate taxonomy nodes
    /// via `graph.get_or_create_category_path` if needed, recording a rejection of
    /// the old category and a confirmation of the new one (spec "Correct →").
    pub fn correct(
        &mut self,
        id: FeedbackItemId,
        new_category: CategoryId,
        embedding: &[f32],
        prototypes: &mut PrototypeStore,
        graph: &mut KnowledgeGraph,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let item = self.item_mut(id)?;
        if item.status != FeedbackStatus::Pending && item.status != FeedbackStatus::Skipped {
            return Err(FeedbackError::NotPending(id));
        }
        let old_category = item.suggested_category;
        let keywords = item.keywords.clone();
        item.status = FeedbackStatus::HumanCorrected;
        item.human_category = Some(new_category);
        item.reviewed_at = Some(now);

        prototypes.update(new_category, embedding, now).ok();
        for keyword in &keywords {
            let keyword_entity = graph.keyword_entity(keyword);
            let _ = graph.record_human_rejection(keyword_entity, old_category);
            let _ = graph.record_human_confirmation(keyword_entity, new_category, CORRECTION_KEYWORD_WEIGHT);
        }
        Ok(())
    }

    /// Start a brand-new category from scratch for this item (spec "create
    /// new category"). Delegates id minting to `graph` so the resulting category id
    /// is consistent everywhere, then behaves like [`FeedbackManager::correct`].
    pub fn create_new_category(
        &mut self,
        id: FeedbackItemId,
        path: &[String],
        embedding: &[f32],
        prototypes: &mut PrototypeStore,
        graph: &mut KnowledgeGraph,
        now: DateTime<Utc>,
    ) -> Result<CategoryId> {
        let new_category = *graph.get_or_create_category_path(path).last().unwrap();
        self.correct(id, new_category, embedding, prototypes, graph, now)?;
        Ok(new_category)
    }

    pub fn skip(&mut self, id: FeedbackItemId, now: DateTime<Utc>) -> Result<()> {
        let item = self.item_mut(id)?;
        item.status = FeedbackStatus::Skipped;
        item.reviewed_at = Some(now);
        Ok(())
    }

    pub fn item(&self, id: FeedbackItemId) -> Option<&FeedbackItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Convenience used by callers that only have a keyword string, not yet an entity
/// id, when checking graph state.
pub fn keyword_entity_type() -> EntityType {
    EntityType::Keyword
}
