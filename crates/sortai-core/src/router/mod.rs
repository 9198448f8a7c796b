//! LLM Router (C10, spec §4.10)
//!
//! Owns the provider cascade: tries providers in priority order, backs off
//! providers that fail, and tracks an overall operating mode (full / degraded /
//! offline) that the rest of the engine and the CLI observe via [`crate::events`].

pub mod heuristic;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LlmPreference;
use crate::events::{EventBus, SortAiEvent};
use crate::external::{ClassificationRequest, ClassificationResponse, LlmProvider, ProviderError, ProviderKind};

pub use heuristic::HeuristicProvider;

/// Overall router health, derived from how many registered providers are
/// currently reachable (spec §4.10 "mode transitions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    /// All preferred providers are reachable.
    Full,
    /// At least one preferred provider is down; the cascade fell through to a
    /// lower-priority provider.
    Degraded,
    /// Every provider but the always-available local heuristic is down.
    Offline,
}

#[derive(Debug, Clone, Copy)]
struct BackoffState {
    consecutive_failures: u32,
    backed_off_until: Option<DateTime<Utc>>,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            backed_off_until: None,
        }
    }
}

/// Base delay for exponential backoff; doubled per consecutive failure and capped
/// at [`MAX_BACKOFF_SECS`] (spec §4.10 "exponential backoff").
pub const BASE_BACKOFF_SECS: u64 = 2;
pub const MAX_BACKOFF_SECS: u64 = 300;

fn backoff_duration(consecutive_failures: u32) -> Duration {
    let secs = BASE_BACKOFF_SECS.saturating_mul(1u64 << consecutive_failures.min(10));
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

pub struct RouteOutcome {
    pub provider_id: String,
    pub response: ClassificationResponse,
    /// Providers that were tried and failed before `provider_id` succeeded, in order.
    pub escalated_from: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no provider could classify the request: {0:?}")]
    AllProvidersFailed(Vec<String>),
}

pub type Result<T> = std::result::Result<T, RouterError>;

/// Orders registered providers by `preference`, runs the cascade, and tracks
/// per-provider exponential backoff. The local heuristic provider is always
/// registered and always last in priority so it is only reached once everything
/// else has failed or been excluded by preference (spec §4.10).
pub struct LlmRouter {
    providers: Vec<Box<dyn LlmProvider>>,
    backoff: HashMap<String, BackoffState>,
    preference: LlmPreference,
    escalation_threshold: f32,
    mode: RouterMode,
    events: Option<EventBus>,
}

impl LlmRouter {
    /// Construct a router with just the always-available local heuristic. Callers
    /// add real providers with [`LlmRouter::register`].
    pub fn new(preference: LlmPreference, escalation_threshold: f32) -> Self {
        Self {
            providers: vec![Box::new(HeuristicProvider)],
            backoff: HashMap::new(),
            preference,
            escalation_threshold,
            mode: RouterMode::Full,
            events: None,
        }
    }

    /// Attach an [`EventBus`] so mode changes and cascade escalations become
    /// observable (spec §4.10, §6 "Outputs"). Optional; a router with no bus
    /// attached behaves identically, just silently.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Register a provider. Inserted before the always-last heuristic fallback.
    pub fn register(&mut self, provider: Box<dyn LlmProvider>) {
        let insert_at = self.providers.len().saturating_sub(1);
        self.providers.insert(insert_at, provider);
    }

    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    fn is_eligible(&self, provider: &dyn LlmProvider, now: DateTime<Utc>) -> bool {
        let preference_allows = match self.preference {
            LlmPreference::Automatic => true,
            LlmPreference::LocalOnly => provider.kind() != ProviderKind::Cloud,
            LlmPreference::PreferLocalLarge => true,
            LlmPreference::Cloud => provider.kind() != ProviderKind::LocalHeuristic || self.all_non_heuristic_backed_off(now),
        };
        if !preference_allows {
            return false;
        }
        match self.backoff.get(provider.id()) {
            Some(state) => state.backed_off_until.is_none_or(|until| now >= until),
            None => true,
        }
    }

    fn all_non_heuristic_backed_off(&self, now: DateTime<Utc>) -> bool {
        self.providers
            .iter()
            .filter(|p| p.kind() != ProviderKind::LocalHeuristic)
            .all(|p| {
                self.backoff
                    .get(p.id())
                    .is_some_and(|s| s.backed_off_until.is_some_and(|until| now < until))
            })
    }

    /// Ordered list of providers eligible to try right now, respecting
    /// `preference` and backoff state. `PreferLocalLarge` sorts local-model
    /// providers ahead of cloud ones without excluding cloud entirely.
    fn ordered_candidates(&self, now: DateTime<Utc>) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.providers.len())
            .filter(|&i| self.is_eligible(self.providers[i].as_ref(), now))
            .collect();
        if self.preference == LlmPreference::PreferLocalLarge {
            indices.sort_by_key(|&i| match self.providers[i].kind() {
                ProviderKind::LocalModel => 0,
                ProviderKind::LocalHeuristic => 1,
                ProviderKind::Cloud => 2,
            });
        }
        indices
    }

    fn record_failure(&mut self, provider_id: &str, now: DateTime<Utc>) {
        let state = self.backoff.entry(provider_id.to_string()).or_default();
        state.consecutive_failures += 1;
        let delay = backoff_duration(state.consecutive_failures);
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        state.backed_off_until = Some(now + delay);
    }

    fn record_success(&mut self, provider_id: &str) {
        self.backoff.insert(provider_id.to_string(), BackoffState::default());
    }

    fn recompute_mode(&mut self, now: DateTime<Utc>) {
        let previous = self.mode;
        let non_heuristic_available = self
            .providers
            .iter()
            .filter(|p| p.kind() != ProviderKind::LocalHeuristic)
            .any(|p| self.is_eligible(p.as_ref(), now));
        let any_non_heuristic_registered = self.providers.iter().any(|p| p.kind() != ProviderKind::LocalHeuristic);

        self.mode = if !any_non_heuristic_registered {
            RouterMode::Full
        } else if non_heuristic_available && self.backoff.values().all(|s| s.consecutive_failures == 0) {
            RouterMode::Full
        } else if non_heuristic_available {
            RouterMode::Degraded
        } else {
            RouterMode::Offline
        };

        if self.mode != previous {
            if let Some(bus) = &self.events {
                let reason = match self.mode {
                    RouterMode::Full => "all registered providers are reachable".to_string(),
                    RouterMode::Degraded => "a preferred provider is down; cascade is falling through".to_string(),
                    RouterMode::Offline => "every provider but the local heuristic is backed off".to_string(),
                };
                bus.publish(SortAiEvent::RouterModeChanged {
                    previous,
                    current: self.mode,
                    reason,
                    timestamp: now,
                });
            }
        }
    }

    /// Try providers in priority order. A success at or above the escalation
    /// threshold returns immediately. Under `automatic` preference, a success
    /// below the threshold is kept as the current best but the cascade keeps
    /// going; the *best* result seen is returned once the candidates are
    /// exhausted or a high-enough-confidence one is found (spec §4.10). Every
    /// provider tried before the one finally returned — whether it failed or
    /// only escalated on low confidence — is recorded in `escalated_from`.
    pub fn route(&mut self, request: &ClassificationRequest, now: DateTime<Utc>) -> Result<RouteOutcome> {
        let candidates = self.ordered_candidates(now);
        let mut tried = Vec::new();
        let mut best: Option<RouteOutcome> = None;
        let mut previous_provider: Option<String> = None;

        for index in candidates {
            let provider_id = self.providers[index].id().to_string();
            if let Some(from_provider) = previous_provider.take() {
                if let Some(bus) = &self.events {
                    bus.publish(SortAiEvent::RouterEscalated {
                        from_provider,
                        to_provider: provider_id.clone(),
                        confidence: best.as_ref().map(|b| b.response.confidence).unwrap_or(0.0),
                        timestamp: now,
                    });
                }
            }
            previous_provider = Some(provider_id.clone());
            match self.providers[index].classify(request) {
                Ok(response) => {
                    self.record_success(&provider_id);
                    let should_escalate = response.confidence < self.escalation_threshold && self.preference == LlmPreference::Automatic;
                    let is_new_best = best.as_ref().is_none_or(|b| response.confidence > b.response.confidence);

                    if is_new_best {
                        if let Some(previous_best) = best.take() {
                            tried.push(previous_best.provider_id);
                        }
                        best = Some(RouteOutcome {
                            provider_id,
                            response,
                            escalated_from: Vec::new(),
                        });
                    } else {
                        tried.push(provider_id);
                    }

                    if !should_escalate {
                        break;
                    }
                }
                Err(_err) => {
                    self.record_failure(&provider_id, now);
                    tried.push(provider_id);
                }
            }
        }

        self.recompute_mode(now);
        match best {
            Some(mut outcome) => {
                outcome.escalated_from = tried;
                Ok(outcome)
            }
            None => Err(RouterError::AllProvidersFailed(tried)),
        }
    }

    pub fn health_check_all(&self) -> Vec<(String, std::result::Result<(), ProviderError>)> {
        self.providers.iter().map(|p| (p.id().to_string(), p.health_check())).collect()
    }
}
