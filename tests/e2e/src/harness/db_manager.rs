//! Test Workspace
//!
//! Provides an isolated, fully-wired instance of every engine component used
//! by an end-to-end scenario:
//! - A temp-directory-backed filesystem for scanning, moving, and watching
//! - An in-memory store plus the in-process graph/taxonomy/prototype state
//! - Seeding helpers that simulate an already-trained taxonomy
//! - Automatic cleanup when the workspace is dropped

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sortai_core::{
    CachingEmbeddingService, CategoryId, Config, EmbeddingService, FeedbackManager, InMemoryEmbeddingCache,
    KnowledgeGraph, LlmRouter, LocalEmbeddingService, MovementLog, PrototypeStore, Storage, TaxonomyTree,
};
use tempfile::TempDir;

/// A fully-wired engine instance rooted at a temporary directory.
///
/// Every field is public so a scenario test can drive the pipeline step by
/// step instead of going through a single opaque entry point. The workspace
/// is deleted from disk when it is dropped.
pub struct TestWorkspace {
    pub storage: Storage,
    pub graph: KnowledgeGraph,
    pub taxonomy: TaxonomyTree,
    pub prototypes: PrototypeStore,
    pub movement: MovementLog,
    pub feedback: FeedbackManager,
    pub router: LlmRouter,
    pub embeddings: CachingEmbeddingService<LocalEmbeddingService>,
    root: TempDir,
}

impl TestWorkspace {
    /// Create a new workspace backed by a fresh temp directory and an
    /// in-memory store. Panics on setup failure, matching this crate's
    /// test-only expectation that construction never fails.
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp workspace directory");
        let storage = Storage::open_in_memory().expect("failed to open in-memory storage");
        let mut graph = KnowledgeGraph::new();
        let taxonomy = TaxonomyTree::new(&mut graph);
        let cache: Arc<dyn sortai_core::EmbeddingCache> = Arc::new(InMemoryEmbeddingCache::new(1024));
        let embeddings = CachingEmbeddingService::new(LocalEmbeddingService::default(), cache);
        let default_config = Config::default();
        let router = LlmRouter::new(default_config.llm_preference, default_config.escalation_threshold);

        Self {
            storage,
            graph,
            taxonomy,
            prototypes: PrototypeStore::new(),
            movement: MovementLog::default(),
            feedback: FeedbackManager::new(),
            router,
            embeddings,
            root,
        }
    }

    /// The workspace's root directory on disk.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    // ========================================================================
    // FILESYSTEM SEEDING
    // ========================================================================

    /// Write `contents` to `relative` under the workspace root, creating any
    /// missing parent directories, and return the absolute path.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        std::fs::write(&path, contents).expect("failed to write fixture file");
        path
    }

    // ========================================================================
    // TAXONOMY / PROTOTYPE SEEDING
    // ========================================================================

    /// Create (or reuse) a category at `path` and give it a prototype anchored
    /// on the embedding of `anchor_text`, simulating a category that has
    /// already absorbed real confirmations. Returns the leaf category id.
    pub fn seed_category(&mut self, path: &[&str], anchor_text: &str) -> CategoryId {
        let segments: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let ids = self
            .taxonomy
            .get_or_create_path(&mut self.graph, &segments)
            .expect("failed to create taxonomy path");
        let leaf = *ids.last().expect("path must have at least one segment");
        let anchor = self.embeddings.embed_text(anchor_text);
        self.prototypes
            .update(leaf, &anchor, Utc::now())
            .expect("failed to seed prototype");
        leaf
    }

    /// The display name of a category's leaf segment.
    pub fn leaf_name(&self, category: CategoryId) -> String {
        self.taxonomy
            .node(category)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    /// Teach the knowledge graph that `keyword` is evidence for `category`,
    /// at human-confirmation strength. Used to simulate a taxonomy that has
    /// already learned from prior corrections.
    pub fn seed_keyword_confirmation(&mut self, keyword: &str, category: CategoryId, weight: f32) {
        let keyword_entity = self.graph.keyword_entity(keyword);
        self.graph
            .record_human_confirmation(keyword_entity, category, weight)
            .expect("failed to seed keyword confirmation");
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workspace_has_an_empty_root_on_disk() {
        let workspace = TestWorkspace::new();
        assert!(workspace.path().exists());
        assert!(workspace.path().read_dir().unwrap().next().is_none());
    }

    #[test]
    fn write_file_creates_parent_directories() {
        let workspace = TestWorkspace::new();
        let path = workspace.write_file("Inbox/Photos/beach.jpg", b"fake-jpeg-bytes");
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"fake-jpeg-bytes");
    }

    #[test]
    fn seed_category_registers_a_queryable_prototype() {
        let mut workspace = TestWorkspace::new();
        let category = workspace.seed_category(&["Work", "Finance"], "invoice receipt payment");
        assert_eq!(workspace.leaf_name(category), "Finance");
        assert!(workspace.prototypes.centroid(category).is_some());
    }

    #[test]
    fn seeded_categories_sharing_a_path_prefix_reuse_ids() {
        let mut workspace = TestWorkspace::new();
        let finance = workspace.seed_category(&["Work", "Finance"], "invoice");
        let hr = workspace.seed_category(&["Work", "HR"], "handbook");
        assert_ne!(finance, hr);
        assert_eq!(workspace.taxonomy.depth(finance), workspace.taxonomy.depth(hr));
    }
}
