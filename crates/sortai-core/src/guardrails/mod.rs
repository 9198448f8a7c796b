//! Depth Enforcer + Merge/Split Gatekeeper + User-Edit Guardrails (C9, spec §4.9)
//!
//! Three related policies that gate automatic taxonomy mutation:
//! - depth enforcement bounds how deep the auto-categorizer may nest categories
//! - the gatekeeper turns merge/split proposals into a reviewable queue
//! - user-edit guardrails veto automatic changes to nodes a human has touched

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{EventBus, SortAiEvent};
use crate::model::{CategoryId, FileId};
use crate::taxonomy::TaxonomyTree;

/// Default maximum taxonomy depth (spec §2 Open Question resolution: Advisory,
/// `max_taxonomy_depth = 5`).
pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepthStrategy {
    /// Depth violations are logged and surfaced but the operation proceeds.
    #[default]
    Advisory,
    /// Depth violations are rejected outright.
    Strict,
    /// The proposed node is attached at `max_depth` instead of further down.
    Flatten,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthVerdict {
    pub allowed: bool,
    pub would_be_depth: usize,
    /// Present only under `Flatten`, the depth the node should be attached at instead.
    pub clamp_to_depth: Option<usize>,
}

/// Enforces `max_taxonomy_depth` per [`DepthStrategy`] (spec §4.9).
pub struct DepthEnforcer {
    pub strategy: DepthStrategy,
    pub max_depth: usize,
}

impl Default for DepthEnforcer {
    fn default() -> Self {
        Self {
            strategy: DepthStrategy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DepthEnforcer {
    pub fn check(&self, proposed_depth: usize) -> DepthVerdict {
        if proposed_depth <= self.max_depth {
            return DepthVerdict {
                allowed: true,
                would_be_depth: proposed_depth,
                clamp_to_depth: None,
            };
        }
        match self.strategy {
            DepthStrategy::Advisory => DepthVerdict {
                allowed: true,
                would_be_depth: proposed_depth,
                clamp_to_depth: None,
            },
            DepthStrategy::Strict => DepthVerdict {
                allowed: false,
                would_be_depth: proposed_depth,
                clamp_to_depth: None,
            },
            DepthStrategy::Flatten => DepthVerdict {
                allowed: true,
                would_be_depth: proposed_depth,
                clamp_to_depth: Some(self.max_depth),
            },
        }
    }
}

pub type SuggestionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Merge { source: CategoryId, target: CategoryId },
    Split { source: CategoryId },
    /// Phase 2 (spec §4.11) found a better home for an already-assigned file.
    Reassign { file_id: FileId, from: CategoryId, to: CategoryId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureSuggestion {
    pub id: SuggestionId,
    pub kind: SuggestionKind,
    pub status: SuggestionStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatekeeperError {
    #[error("suggestion not found: {0}")]
    NotFound(SuggestionId),
    #[error("suggestion {0} is not pending")]
    NotPending(SuggestionId),
    #[error("node {0} has been edited by the user and cannot be auto-modified")]
    UserEdited(CategoryId),
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;

/// Whether a proposal touches a node a human has edited, across every kind.
/// `Reassign` touches both the category a file is leaving and the one it
/// would move to.
fn touches_user_edited(taxonomy: &TaxonomyTree, kind: SuggestionKind) -> bool {
    match kind {
        SuggestionKind::Merge { source, target } => taxonomy.is_user_edited(source) || taxonomy.is_user_edited(target),
        SuggestionKind::Split { source } => taxonomy.is_user_edited(source),
        SuggestionKind::Reassign { from, to, .. } => taxonomy.is_user_edited(from) || taxonomy.is_user_edited(to),
    }
}

/// Pending→approved/rejected→applied lifecycle for structure-change proposals,
/// plus the user-edit veto that gates auto-approval (spec §4.9).
pub struct Gatekeeper {
    suggestions: Vec<StructureSuggestion>,
    events: Option<EventBus>,
}

impl Default for Gatekeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Gatekeeper {
    pub fn new() -> Self {
        Self {
            suggestions: Vec::new(),
            events: None,
        }
    }

    /// Attach an [`EventBus`] so approve/reject decisions become observable
    /// (spec §4.9, §6 "Outputs").
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn publish_decision(&self, suggestion_id: SuggestionId, approved: bool, now: DateTime<Utc>) {
        if let Some(bus) = &self.events {
            bus.publish(SortAiEvent::GatekeeperDecision {
                suggestion_id: suggestion_id.to_string(),
                approved,
                timestamp: now,
            });
        }
    }

    /// A node may be auto-modified (merged, split, re-parented by the engine)
    /// only if it has never been touched by a human edit (spec "user-edit
    /// guardrails").
    pub fn can_auto_modify(&self, taxonomy: &TaxonomyTree, node: CategoryId) -> bool {
        !taxonomy.is_user_edited(node)
    }

    /// Queue a merge/split/reassign proposal. Every proposal starts `Pending`,
    /// full stop -- `propose()` never decides anything on its own, it only
    /// records what was asked for (spec §4.9 "Pending -> Approved -> Applied").
    /// Call [`Gatekeeper::auto_approve_eligible`] as the explicit approval step
    /// that promotes the ones the user-edit veto doesn't block.
    pub fn propose(
        &mut self,
        kind: SuggestionKind,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> StructureSuggestion {
        let suggestion = StructureSuggestion {
            id: Uuid::new_v4(),
            kind,
            status: SuggestionStatus::Pending,
            reason: reason.into(),
            created_at: now,
            decided_at: None,
        };
        self.suggestions.push(suggestion.clone());
        suggestion
    }

    /// Explicit approval pass: every still-`Pending` suggestion that doesn't
    /// touch a user-edited node is promoted to `Approved`. Returns the ids that
    /// were promoted, for the caller to publish as gatekeeper decisions (spec
    /// §4.9, §6 "Outputs"). Suggestions that touch a user-edited node are left
    /// `Pending` for a human to decide via [`Gatekeeper::approve`]/[`Gatekeeper::reject`].
    pub fn auto_approve_eligible(&mut self, taxonomy: &TaxonomyTree, now: DateTime<Utc>) -> Vec<SuggestionId> {
        let mut approved = Vec::new();
        for suggestion in &mut self.suggestions {
            if suggestion.status != SuggestionStatus::Pending {
                continue;
            }
            if touches_user_edited(taxonomy, suggestion.kind) {
                continue;
            }
            suggestion.status = SuggestionStatus::Approved;
            suggestion.decided_at = Some(now);
            approved.push(suggestion.id);
        }
        for id in &approved {
            self.publish_decision(*id, true, now);
        }
        approved
    }

    fn find_mut(&mut self, id: SuggestionId) -> Result<&mut StructureSuggestion> {
        self.suggestions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(GatekeeperError::NotFound(id))
    }

    pub fn approve(&mut self, id: SuggestionId, now: DateTime<Utc>) -> Result<()> {
        let suggestion = self.find_mut(id)?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(GatekeeperError::NotPending(id));
        }
        suggestion.status = SuggestionStatus::Approved;
        suggestion.decided_at = Some(now);
        self.publish_decision(id, true, now);
        Ok(())
    }

    pub fn reject(&mut self, id: SuggestionId, now: DateTime<Utc>) -> Result<()> {
        let suggestion = self.find_mut(id)?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(GatekeeperError::NotPending(id));
        }
        suggestion.status = SuggestionStatus::Rejected;
        suggestion.decided_at = Some(now);
        self.publish_decision(id, false, now);
        Ok(())
    }

    pub fn mark_applied(&mut self, id: SuggestionId) -> Result<()> {
        let suggestion = self.find_mut(id)?;
        if suggestion.status != SuggestionStatus::Approved {
            return Err(GatekeeperError::NotPending(id));
        }
        suggestion.status = SuggestionStatus::Applied;
        Ok(())
    }

    pub fn pending(&self) -> impl Iterator<Item = &StructureSuggestion> {
        self.suggestions.iter().filter(|s| s.status == SuggestionStatus::Pending)
    }

    pub fn approved_unapplied(&self) -> impl Iterator<Item = &StructureSuggestion> {
        self.suggestions.iter().filter(|s| s.status == SuggestionStatus::Approved)
    }

    pub fn all(&self) -> &[StructureSuggestion] {
        &self.suggestions
    }

    pub fn status_of(&self, id: SuggestionId) -> Option<SuggestionStatus> {
        self.suggestions.iter().find(|s| s.id == id).map(|s| s.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::KnowledgeGraph;

    #[test]
    fn advisory_allows_but_reports_overdepth() {
        let enforcer = DepthEnforcer::default();
        let verdict = enforcer.check(7);
        assert!(verdict.allowed);
        assert_eq!(verdict.would_be_depth, 7);
    }

    #[test]
    fn strict_rejects_overdepth() {
        let enforcer = DepthEnforcer {
            strategy: DepthStrategy::Strict,
            max_depth: 5,
        };
        assert!(!enforcer.check(6).allowed);
    }

    #[test]
    fn flatten_clamps_to_max_depth() {
        let enforcer = DepthEnforcer {
            strategy: DepthStrategy::Flatten,
            max_depth: 5,
        };
        let verdict = enforcer.check(8);
        assert!(verdict.allowed);
        assert_eq!(verdict.clamp_to_depth, Some(5));
    }

    #[test]
    fn every_fresh_proposal_starts_pending() {
        let mut graph = KnowledgeGraph::new();
        let mut taxonomy = TaxonomyTree::new(&mut graph);
        let root = taxonomy.root();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        taxonomy.create_child(root, a, "A").unwrap();
        taxonomy.create_child(root, b, "B").unwrap();

        let mut gatekeeper = Gatekeeper::new();
        let suggestion = gatekeeper.propose(
            SuggestionKind::Merge { source: a, target: b },
            "near-duplicate categories",
            Utc::now(),
        );
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
        assert!(suggestion.decided_at.is_none());
    }

    #[test]
    fn auto_approve_eligible_skips_suggestions_touching_a_user_edited_node() {
        let mut graph = KnowledgeGraph::new();
        let mut taxonomy = TaxonomyTree::new(&mut graph);
        let root = taxonomy.root();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        taxonomy.create_child(root, a, "A").unwrap();
        taxonomy.create_child(root, b, "B").unwrap();
        taxonomy.mark_user_edited(a).unwrap();

        let mut gatekeeper = Gatekeeper::new();
        let suggestion = gatekeeper.propose(
            SuggestionKind::Merge { source: a, target: b },
            "near-duplicate categories",
            Utc::now(),
        );

        let approved = gatekeeper.auto_approve_eligible(&taxonomy, Utc::now());
        assert!(approved.is_empty());
        assert_eq!(gatekeeper.pending().count(), 1);
        assert_eq!(gatekeeper.status_of(suggestion.id).unwrap(), SuggestionStatus::Pending);
    }

    #[test]
    fn auto_approve_eligible_promotes_suggestions_with_no_user_edits() {
        let mut graph = KnowledgeGraph::new();
        let mut taxonomy = TaxonomyTree::new(&mut graph);
        let root = taxonomy.root();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        taxonomy.create_child(root, a, "A").unwrap();
        taxonomy.create_child(root, b, "B").unwrap();

        let mut gatekeeper = Gatekeeper::new();
        let suggestion = gatekeeper.propose(
            SuggestionKind::Merge { source: a, target: b },
            "near-duplicate categories",
            Utc::now(),
        );

        let approved = gatekeeper.auto_approve_eligible(&taxonomy, Utc::now());
        assert_eq!(approved, vec![suggestion.id]);
        assert_eq!(gatekeeper.status_of(suggestion.id).unwrap(), SuggestionStatus::Approved);
    }

    #[test]
    fn reassign_proposal_touching_either_side_queues_pending() {
        let mut graph = KnowledgeGraph::new();
        let mut taxonomy = TaxonomyTree::new(&mut graph);
        let root = taxonomy.root();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        taxonomy.create_child(root, from, "From").unwrap();
        taxonomy.create_child(root, to, "To").unwrap();
        taxonomy.mark_user_edited(to).unwrap();

        let mut gatekeeper = Gatekeeper::new();
        let suggestion = gatekeeper.propose(
            SuggestionKind::Reassign { file_id: Uuid::new_v4(), from, to },
            "phase2 found a better match",
            Utc::now(),
        );
        let approved = gatekeeper.auto_approve_eligible(&taxonomy, Utc::now());
        assert!(approved.is_empty());
        assert_eq!(gatekeeper.status_of(suggestion.id).unwrap(), SuggestionStatus::Pending);
    }
}
