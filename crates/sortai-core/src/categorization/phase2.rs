//! Phase 2: background deep categorization (spec §4.11).
//!
//! Runs for every assignment below the review threshold. Unlike Phase 1, this may
//! call out to the media inspector and the LLM router, so it is organized as a
//! bounded priority queue rather than a synchronous pass.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::external::{ClassificationRequest, MediaInspector};
use crate::graph::KnowledgeGraph;
use crate::guardrails::{Gatekeeper, SuggestionId, SuggestionKind};
use crate::model::{CategoryId, CoarseType, FileId};
use crate::router::LlmRouter;
use crate::taxonomy::TaxonomyTree;

/// Priority levels for Phase-2 work items (spec §4.11 "Cancellation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Phase2Job {
    pub file_id: FileId,
    pub path: std::path::PathBuf,
    pub filename: String,
    pub keywords: Vec<String>,
    pub coarse_type: CoarseType,
    pub candidate_paths: Vec<String>,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
    pub attempt: u32,
    /// Where Phase 1 left this file. If the router lands somewhere else,
    /// `process_job` proposes a reassignment through the gatekeeper rather
    /// than silently overriding Phase 1's decision (spec §4.11).
    pub current_category: CategoryId,
}

impl PartialEq for Phase2Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueued_at == other.enqueued_at
    }
}
impl Eq for Phase2Job {}

impl PartialOrd for Phase2Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase2Job {
    /// Higher priority first; within the same priority, older jobs first (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Phase2Error {
    #[error("queue is at capacity ({0})")]
    QueueFull(usize),
}

pub type Result<T> = std::result::Result<T, Phase2Error>;

#[derive(Debug, Clone)]
pub struct Phase2Outcome {
    pub file_id: FileId,
    pub category_path: Vec<String>,
    pub resolved_category: CategoryId,
    pub confidence: f32,
    pub rationale: String,
    pub provider_id: String,
    /// Set when the router's destination differs from `Phase2Job::current_category`
    /// and a [`crate::guardrails::Gatekeeper`] reassignment proposal was queued for
    /// it. `None` when the router agreed with Phase 1 and there is nothing to
    /// reassign.
    pub suggestion_id: Option<SuggestionId>,
}

/// Bounded priority queue plus the collaborators Phase 2 needs to process an item.
/// Concurrency is the caller's responsibility (spec §5 dynamic concurrency caps);
/// this struct only owns ordering and backpressure.
pub struct Phase2Queue {
    heap: BinaryHeap<Phase2Job>,
    max_queue_size: usize,
}

impl Phase2Queue {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            max_queue_size,
        }
    }

    pub fn enqueue(&mut self, job: Phase2Job) -> Result<()> {
        if self.heap.len() >= self.max_queue_size {
            return Err(Phase2Error::QueueFull(self.max_queue_size));
        }
        self.heap.push(job);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Phase2Job> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Process one job: consult the (optional, fallible) media inspector, then route
/// through the LLM cascade. Media-inspector failure degrades to filename-only
/// rather than aborting the job (spec §6 "failures degrade to filename-only").
/// If the resolved category differs from where Phase 1 already put the file,
/// propose a reassignment through `gatekeeper` instead of moving it directly
/// (spec §4.11, §4.9).
pub fn process_job(
    job: &Phase2Job,
    media_inspector: Option<&dyn MediaInspector>,
    router: &mut LlmRouter,
    taxonomy: &mut TaxonomyTree,
    graph: &mut KnowledgeGraph,
    gatekeeper: &mut Gatekeeper,
    now: DateTime<Utc>,
) -> Phase2Outcome {
    let mut keywords = job.keywords.clone();
    if let Some(inspector) = media_inspector {
        if let Ok(refined_type) = inspector.inspect(&job.path) {
            keywords.push(refined_type.as_str().to_string());
        }
    }

    let request = ClassificationRequest {
        filename: job.filename.clone(),
        keywords,
        coarse_type: job.coarse_type,
        candidate_paths: job.candidate_paths.clone(),
    };

    let (category_path, confidence, rationale, provider_id) = match router.route(&request, now) {
        Ok(outcome) => (
            outcome.response.category_path,
            outcome.response.confidence,
            outcome.response.rationale.unwrap_or_default(),
            outcome.provider_id,
        ),
        Err(_) => (
            vec![job.coarse_type.as_str().to_string()],
            0.0,
            "all providers failed".to_string(),
            "none".to_string(),
        ),
    };

    let resolved_category = taxonomy
        .get_or_create_path(graph, &category_path)
        .ok()
        .and_then(|ids| ids.last().copied())
        .unwrap_or(job.current_category);

    let suggestion_id = if resolved_category != job.current_category {
        Some(
            gatekeeper
                .propose(
                    SuggestionKind::Reassign {
                        file_id: job.file_id,
                        from: job.current_category,
                        to: resolved_category,
                    },
                    format!("phase2 provider {provider_id} suggests {}", category_path.join("/")),
                    now,
                )
                .id,
        )
    } else {
        None
    };

    Phase2Outcome {
        file_id: job.file_id,
        category_path,
        resolved_category,
        confidence,
        rationale,
        provider_id,
        suggestion_id,
    }
}
