//! # sortai-core
//!
//! Local-first file-organization engine. Watches and scans folders, extracts
//! keywords and embeddings, clusters similar files, learns a personal taxonomy
//! from user feedback, and moves files into it without ever deleting the
//! original content.
//!
//! ## Pipeline
//!
//! 1. [`scan`] walks a root directory into file records and folder units.
//! 2. [`keywords`] extracts deterministic tokens from filenames.
//! 3. [`embeddings`] turns text into fixed-dimension vectors, cached by content hash.
//! 4. [`similarity`]/[`clustering`] group files that have no obvious category yet.
//! 5. [`prototypes`] holds one EMA-updated centroid per category.
//! 6. [`graph`] learns keyword → category associations over time.
//! 7. [`taxonomy`]/[`guardrails`] own the category tree and its structural edits.
//! 8. [`router`] dispatches low-confidence files to local or cloud LLM providers.
//! 9. [`categorization`] blends all of the above into a routed assignment.
//! 10. [`feedback`] queues what categorization couldn't auto-accept.
//! 11. [`organizer`] executes moves; [`movement`] makes every move undoable.
//! 12. [`watch`] streams new files from a live folder into the same pipeline.
//! 13. [`storage`] persists everything; [`export`] produces a portable archive.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sortai_core::{Config, Storage};
//!
//! let config = Config::default();
//! let storage = Storage::open_in_memory()?;
//! ```

pub mod categorization;
pub mod clustering;
pub mod config;
pub mod embeddings;
pub mod events;
pub mod export;
pub mod external;
pub mod feedback;
pub mod graph;
pub mod guardrails;
pub mod keywords;
pub mod model;
pub mod movement;
pub mod organizer;
pub mod prototypes;
pub mod router;
pub mod scan;
pub mod similarity;
pub mod storage;
pub mod taxonomy;
pub mod watch;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{Config, ConfigError, DestinationMode, LlmPreference};
pub use events::{EventBus, SortAiEvent};
pub use export::{Archive, ArchiveError, ArchiveStatistics, PatternRecord};
pub use external::{ClassificationRequest, ClassificationResponse, LlmProvider, MediaInspector, ProviderError, ProviderKind};

pub use model::{
    clamp_confidence, AssignmentSource, CategoryId, CoarseType, ConfidenceBands, ExtractedSignals, FileAssignment,
    FileId, FileRecord, ScannedFolder,
};

pub use scan::{scan, ScanConfig, ScanError, ScanResult};
pub use storage::{Storage, StorageError};

pub use categorization::{route_assignment, RoutingDecision};
pub use categorization::phase1::{run_phase1, Phase1Input, Phase1Outcome};
pub use categorization::phase2::{process_job, Phase2Error, Phase2Job, Phase2Outcome, Phase2Queue, Priority};

pub use embeddings::{
    cosine_similarity, is_valid_embedding, l2_normalize, CachingEmbeddingService, EmbeddingCache, EmbeddingService,
    InMemoryEmbeddingCache, LocalEmbeddingService, EMBEDDING_DIMENSIONS,
};

pub use feedback::{FeedbackError, FeedbackItem, FeedbackItemId, FeedbackManager, FeedbackStatus};

pub use graph::{Entity, EntityId, EntityType, GraphError, KnowledgeGraph, Relationship, RelationshipId, RelationshipType};

pub use guardrails::{
    DepthEnforcer, DepthStrategy, DepthVerdict, Gatekeeper, GatekeeperError, StructureSuggestion, SuggestionId, SuggestionKind,
    SuggestionStatus,
};

pub use movement::{Command, MoveKind, MovementError, MovementId, MovementLog, MovementLogEntry};

pub use organizer::{content_hash, execute, execute_folder_unit, CollisionPolicy, OperationMode, OrganizePlan, OrganizerError};

pub use prototypes::{PrototypeError, PrototypeStore, SharedPrototypeId};

pub use router::{HeuristicProvider, LlmRouter, RouteOutcome, RouterError, RouterMode};

pub use taxonomy::{TaxonomyError, TaxonomyNode, TaxonomyTree};

pub use watch::{QueueEntry, WatchConfig, WatchError, WatchManager, WatchState};
