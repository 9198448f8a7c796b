//! Two-Phase Categorization Engine (C11, spec §4.11)
//!
//! Phase 1 is instant and synchronous; Phase 2 is a background, potentially
//! network-bound refinement pass for whatever Phase 1 left in the review band.
//! This module only wires the two phases together and applies confidence bands —
//! the actual inference lives in [`phase1`]/[`phase2`].

pub mod phase1;
pub mod phase2;

pub use phase1::{blend_confidence, run_phase1, Phase1Input, Phase1Outcome};
pub use phase2::{process_job, Phase2Error, Phase2Job, Phase2Outcome, Phase2Queue, Priority};

use crate::model::{ConfidenceBands, FileAssignment};

/// What to do next with a completed assignment, per the confidence bands (spec
/// §4.11 "Confidence bands").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    AutoAccept,
    QueueForReview,
    Escalate,
}

pub fn route_assignment(assignment: &FileAssignment, bands: &ConfidenceBands) -> RoutingDecision {
    if bands.is_auto_accept(assignment.confidence) {
        RoutingDecision::AutoAccept
    } else if bands.is_escalate(assignment.confidence) {
        RoutingDecision::Escalate
    } else {
        RoutingDecision::QueueForReview
    }
}
