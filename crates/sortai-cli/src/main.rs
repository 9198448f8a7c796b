//! Command-line front end for the SortAI engine: scan, organize, undo/redo,
//! review the feedback queue, watch a folder continuously, and export/import
//! the learned state as a portable archive.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use directories::ProjectDirs;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use sortai_core::{
    clustering, execute, process_job, route_assignment, run_phase1, scan, similarity, CollisionPolicy,
    Command as MoveCommand, Config, EmbeddingCache, EmbeddingService, EventBus, FeedbackManager, Gatekeeper,
    KnowledgeGraph, LlmRouter, LocalEmbeddingService, MoveKind, MovementLog, OperationMode, OrganizePlan, Phase1Input,
    Phase1Outcome, Phase2Job, Phase2Queue, Priority, PrototypeStore, RoutingDecision, ScanConfig, SortAiEvent, Storage,
    TaxonomyTree,
};

#[derive(Parser)]
#[command(name = "sortai", version, about = "Local-first file organization engine", long_about = None)]
struct Cli {
    /// Path to the sortai database; defaults to the platform data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory and print what would be scanned, without touching the database.
    Scan {
        root: PathBuf,
    },
    /// Scan a directory and categorize every file, moving auto-accepted files into place.
    Organize {
        root: PathBuf,
        /// Print the plan without moving any files.
        #[arg(long)]
        dry_run: bool,
        /// How committed moves are performed.
        #[arg(long, value_enum, default_value = "move")]
        mode: ModeArg,
    },
    /// Show taxonomy size, pending feedback, and router health.
    Status,
    /// Undo the most recent file operation.
    Undo,
    /// Redo the most recently undone file operation.
    Redo,
    /// Inspect or resolve the feedback queue.
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
    },
    /// Watch a directory and categorize new files as they become quiet.
    Watch {
        root: PathBuf,
        /// Seconds of inactivity before a new file is considered ready.
        #[arg(long, default_value_t = 5)]
        quiet_period_secs: i64,
    },
    /// Write a portable archive of the learned graph and prototypes.
    Export {
        path: PathBuf,
        #[arg(long)]
        gzip: bool,
    },
    /// Load a portable archive, merging its entities into the current database.
    Import {
        path: PathBuf,
    },
    /// Prune empty, non-user-edited taxonomy branches and old movement-log rows.
    Gc {
        #[arg(long)]
        yes: bool,
    },
    /// Copy the database into `dir`, rotating out old snapshots.
    Backup {
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Move,
    Copy,
    Symlink,
}

impl From<ModeArg> for OperationMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Move => OperationMode::Move,
            ModeArg::Copy => OperationMode::Copy,
            ModeArg::Symlink => OperationMode::Symlink,
        }
    }
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// List items pending human review.
    List,
    /// Accept the suggested category as-is.
    Accept { id: String },
    /// Correct an item to a different category path (e.g. "Work/Finance").
    Correct { id: String, path: String },
    /// Skip an item; it becomes eligible for retry after a cool-off period.
    Skip { id: String },
}

fn get_default_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SORTAI_DATA_DIR") {
        return Ok(PathBuf::from(path).join("sortai.db"));
    }
    let dirs = ProjectDirs::from("com", "sortai", "sortai").context("could not determine platform data directory")?;
    Ok(dirs.data_dir().join("sortai.db"))
}

fn resolve_db_path(cli_db: Option<PathBuf>) -> Result<PathBuf> {
    match cli_db {
        Some(path) => Ok(path),
        None => get_default_db_path(),
    }
}

struct StorageBackedCache {
    storage: Arc<Storage>,
}

impl EmbeddingCache for StorageBackedCache {
    fn get(&self, text_hash: &str, model_id: &str) -> Option<Vec<f32>> {
        self.storage.cache_get(text_hash, model_id).ok().flatten()
    }

    fn put(&self, text_hash: &str, model_id: &str, vector: &[f32]) {
        let _ = self.storage.cache_put(text_hash, model_id, vector);
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    if let Err(err) = run() {
        error!("{err:#}");
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan { root } => run_scan(&root),
        Commands::Organize { root, dry_run, mode } => run_organize(&root, dry_run, mode.into(), resolve_db_path(cli.db)?),
        Commands::Status => run_status(resolve_db_path(cli.db)?),
        Commands::Undo => run_undo(resolve_db_path(cli.db)?),
        Commands::Redo => run_redo(resolve_db_path(cli.db)?),
        Commands::Feedback { action } => run_feedback(action, resolve_db_path(cli.db)?),
        Commands::Watch { root, quiet_period_secs } => run_watch(&root, quiet_period_secs, resolve_db_path(cli.db)?),
        Commands::Export { path, gzip } => run_export(&path, gzip, resolve_db_path(cli.db)?),
        Commands::Import { path } => run_import(&path, resolve_db_path(cli.db)?),
        Commands::Gc { yes } => run_gc(yes, resolve_db_path(cli.db)?),
        Commands::Backup { dir } => run_backup(&dir, resolve_db_path(cli.db)?),
    }
}

fn run_scan(root: &Path) -> Result<()> {
    let result = scan(root, &ScanConfig::default()).with_context(|| format!("scanning {}", root.display()))?;
    println!("{}", format!("{} files across {} folder units", result.files.len(), result.folders.len()).cyan().bold());
    for folder in &result.folders {
        println!(
            "  {} {} files, {} bytes, dominant type {}",
            folder.path.display().to_string().dimmed(),
            folder.files.len(),
            folder.aggregate_size,
            folder.dominant_type.as_str()
        );
    }
    Ok(())
}

/// Loaded, in-memory copy of everything `organize`/`status`/`feedback` need.
/// Loaded once from `storage` at process start, since this is a short-lived CLI
/// invocation rather than the always-on daemon the watch loop models.
struct Engine {
    storage: Arc<Storage>,
    config: Config,
    graph: KnowledgeGraph,
    taxonomy: TaxonomyTree,
    prototypes: PrototypeStore,
    movement: MovementLog,
    feedback: FeedbackManager,
    router: LlmRouter,
    gatekeeper: Gatekeeper,
    events: EventBus,
}

impl Engine {
    fn load(db_path: &Path) -> Result<Self> {
        let storage = Arc::new(Storage::open(db_path).with_context(|| format!("opening database {}", db_path.display()))?);
        let config = Config::load(db_path.parent().unwrap_or_else(|| Path::new(".")))
            .unwrap_or_default();

        // The graph's keyword/category entities are re-derived as the pipeline
        // encounters them again this run; the persisted rows back `status`/`export`
        // directly without needing a full rehydration here.
        let mut graph = KnowledgeGraph::new();

        let mut taxonomy = TaxonomyTree::new(&mut graph);
        for (id, name, parent, user_edited, _created_at) in storage.load_categories()? {
            if let Some(parent) = parent {
                if taxonomy.node(id).is_none() {
                    let _ = taxonomy.create_child(parent, id, &name);
                }
                if user_edited {
                    let _ = taxonomy.mark_user_edited(id);
                }
            }
        }

        let mut prototypes = PrototypeStore::new();
        for (category, centroid, sample_count, last_update) in storage.load_prototypes()? {
            prototypes.ensure_category(category);
            let mut remaining = sample_count;
            while remaining > 0.5 {
                let _ = prototypes.update(category, &centroid, last_update);
                remaining -= 1.0;
            }
        }

        let mut movement = MovementLog::default();
        for entry in storage.load_movement_log()? {
            movement.record(entry.command.clone(), entry.reason.clone(), entry.performed_at);
            if entry.undone {
                let _ = movement.undo(entry.undone_at.unwrap_or(entry.performed_at));
            }
        }

        let mut feedback = FeedbackManager::new();
        for item in storage.load_feedback_items()? {
            let id = feedback.enqueue(
                item.file_id,
                item.suggested_category,
                item.confidence,
                item.rationale.clone(),
                item.keywords.clone(),
                item.created_at,
            );
            let _ = id;
        }

        let events = EventBus::new();
        let router = LlmRouter::new(config.llm_preference, config.escalation_threshold).with_events(events.clone());
        let gatekeeper = Gatekeeper::new().with_events(events.clone());

        Ok(Self {
            storage,
            config,
            graph,
            taxonomy,
            prototypes,
            movement,
            feedback,
            router,
            gatekeeper,
            events,
        })
    }

    fn persist_movement(&self, entry_ids: &[sortai_core::MovementId]) -> Result<()> {
        for entry in self.movement.entries() {
            if entry_ids.contains(&entry.id) {
                self.storage.append_movement(entry)?;
            }
        }
        Ok(())
    }

    /// Persist every taxonomy node on `category_ids`, so categories minted on the
    /// fly (cluster names, coarse-type fallbacks) survive a restart the same way a
    /// user's explicit correction does. `upsert_category` is a real upsert, so
    /// re-persisting an already-known ancestor on the path is harmless.
    fn persist_categories(&self, category_ids: &[sortai_core::CategoryId]) -> Result<()> {
        for id in category_ids {
            if let Some(node) = self.taxonomy.node(*id) {
                self.storage.upsert_category(node)?;
            }
        }
        Ok(())
    }
}

/// A file that has made it through Phase 1 (directly, or via the clusterer) and is
/// ready for the confidence-based routing decision.
struct ReadyFile {
    file: sortai_core::FileRecord,
    extracted: sortai_core::keywords::ExtractedKeywords,
    embedding: Vec<f32>,
    assignment: sortai_core::FileAssignment,
}

/// Resolve every file Phase 1 couldn't place on its own into a category by
/// grouping them with the keyword clusterer (C3), then, for clusters big enough to
/// be worth it, refining the grouping with the embedding-based clusterer (C4)
/// rather than leaving every member under the same bare coarse-type bucket.
/// Returns the resolved [`ReadyFile`]s plus every category id it minted, so the
/// caller can persist them.
fn cluster_unplaced(
    buffer: Vec<(sortai_core::FileRecord, sortai_core::keywords::ExtractedKeywords, Vec<f32>)>,
    taxonomy: &mut TaxonomyTree,
    graph: &mut KnowledgeGraph,
    bands: &sortai_core::ConfidenceBands,
) -> Result<(Vec<ReadyFile>, Vec<sortai_core::CategoryId>)> {
    let mut embeddings_by_file = std::collections::HashMap::new();
    let mut files_by_id = std::collections::HashMap::new();
    let mut records = Vec::with_capacity(buffer.len());
    for (file, extracted, embedding) in buffer {
        records.push(similarity::ClusterRecord::from_extracted(file.id, file.file_name(), &extracted));
        embeddings_by_file.insert(file.id, embedding);
        files_by_id.insert(file.id, (file, extracted));
    }

    let mut ready = Vec::new();
    let mut minted = Vec::new();
    for cluster in similarity::cluster(records, &similarity::ClusterConfig::default()) {
        let category_path = vec![cluster.coarse_type.as_str().to_string(), cluster.name.clone()];
        let base_ids = taxonomy.get_or_create_path(graph, &category_path)?;
        minted.extend(base_ids.iter().copied());
        let base_category = *base_ids.last().unwrap();

        let vectors: Vec<Vec<f32>> = cluster
            .members
            .iter()
            .map(|m| embeddings_by_file.get(&m.file_id).cloned().unwrap_or_default())
            .collect();
        let groups = refine_with_embeddings(&vectors);

        for (member, group) in cluster.members.iter().zip(groups.iter()) {
            let (category_id, rationale) = match group {
                Some(group) => {
                    let mut sub_path = category_path.clone();
                    sub_path.push(format!("Group {}", group + 1));
                    let sub_ids = taxonomy.get_or_create_path(graph, &sub_path)?;
                    minted.extend(sub_ids.iter().copied());
                    (
                        *sub_ids.last().unwrap(),
                        format!("clustered into \"{}\", embedding subgroup {}", cluster.name, group + 1),
                    )
                }
                None => (base_category, format!("clustered into \"{}\" by shared keywords", cluster.name)),
            };

            let (file, extracted) = files_by_id.remove(&member.file_id).expect("every clustered member came from the buffer");
            let embedding = embeddings_by_file.remove(&member.file_id).unwrap_or_default();
            let assignment = sortai_core::FileAssignment {
                file_id: member.file_id,
                category_id,
                confidence: bands.review,
                rationale,
                source: sortai_core::AssignmentSource::Phase1,
                decided_at: Utc::now(),
            };
            ready.push(ReadyFile { file, extracted, embedding, assignment });
        }
    }
    Ok((ready, minted))
}

/// Split a cluster's embeddings into subgroups once it's large enough for the
/// split to be meaningful (spec §4.4). Small clusters come back as `None` for
/// every member, meaning "stay in the parent cluster, no subgroup needed".
fn refine_with_embeddings(vectors: &[Vec<f32>]) -> Vec<Option<usize>> {
    let hierarchical = clustering::HierarchicalConfig::default();
    if vectors.len() < hierarchical.min_leaf_size * 2 {
        return vec![None; vectors.len()];
    }

    if vectors.len() >= hierarchical.branching_factor * hierarchical.min_leaf_size * 2 {
        let tree = clustering::hierarchical_cluster(vectors, &hierarchical);
        if tree.children.len() < 2 {
            return vec![None; vectors.len()];
        }
        let mut groups = vec![None; vectors.len()];
        for (group, child) in tree.children.iter().enumerate() {
            for &index in &child.member_indices {
                groups[index] = Some(group);
            }
        }
        return groups;
    }

    let k_max = (vectors.len() / hierarchical.min_leaf_size).max(2);
    let k = clustering::elbow_k(vectors, 2, k_max, &clustering::KMeansConfig::default());
    let result = clustering::spherical_kmeans(vectors, &clustering::KMeansConfig { k, ..Default::default() });
    result.assignments.into_iter().map(Some).collect()
}

fn run_organize(root: &Path, dry_run: bool, mode: OperationMode, db_path: PathBuf) -> Result<()> {
    let mut engine = Engine::load(&db_path)?;
    let cache: Arc<dyn EmbeddingCache> = Arc::new(StorageBackedCache { storage: engine.storage.clone() });
    let embedder = sortai_core::CachingEmbeddingService::new(LocalEmbeddingService::default(), cache);
    let bands = sortai_core::ConfidenceBands::default();

    let scanned = scan(root, &ScanConfig::default())?;
    let phase1_started = Utc::now();
    engine.events.publish(SortAiEvent::Phase1Started {
        file_count: scanned.files.len(),
        timestamp: phase1_started,
    });
    let mut accepted = 0usize;
    let mut queued = 0usize;
    let mut escalated = 0usize;
    let mut minted_categories = Vec::new();

    let mut ready = Vec::with_capacity(scanned.files.len());
    let mut needs_clustering = Vec::new();

    for file in &scanned.files {
        let extracted = sortai_core::keywords::extract(&file.file_name());
        let embedding = embedder.embed_filename(&extracted.tokens);
        let parent_folder_name = file.path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str());

        let input = Phase1Input {
            file_id: file.id,
            extracted: &extracted,
            embedding: &embedding,
            parent_folder_name,
        };
        let leaf_names = |id: sortai_core::CategoryId| {
            engine
                .taxonomy
                .node(id)
                .map(|n| n.name.clone())
                .unwrap_or_default()
        };

        match run_phase1(&input, &engine.prototypes, &engine.graph, leaf_names, &bands) {
            Phase1Outcome::Assigned(assignment) => {
                ready.push(ReadyFile { file: file.clone(), extracted, embedding, assignment });
            }
            Phase1Outcome::NeedsClustering(_) => {
                needs_clustering.push((file.clone(), extracted, embedding));
            }
        }
    }

    let directly_assigned = ready.len();
    let clustered_count = needs_clustering.len();
    if !needs_clustering.is_empty() {
        let (clustered, minted) = cluster_unplaced(needs_clustering, &mut engine.taxonomy, &mut engine.graph, &bands)?;
        minted_categories.extend(minted);
        ready.extend(clustered);
    }
    engine.events.publish(SortAiEvent::Phase1Completed {
        assigned: directly_assigned,
        clustered: clustered_count,
        duration_ms: (Utc::now() - phase1_started).num_milliseconds().max(0) as u64,
        timestamp: Utc::now(),
    });

    for ReadyFile { file, extracted, embedding, assignment } in ready {
        match route_assignment(&assignment, &bands) {
            RoutingDecision::AutoAccept => {
                minted_categories.push(assignment.category_id);
                let category_path = engine.taxonomy.path(assignment.category_id);
                let mut destination_dir = root.to_path_buf();
                for segment in &category_path {
                    destination_dir.push(segment);
                }
                let plan = OrganizePlan {
                    file_id: file.id,
                    source: file.path.clone(),
                    destination_dir,
                    mode,
                    collision_policy: CollisionPolicy::ParenthesizedCounter,
                    prefer_symlink: engine.config.soft_move,
                };
                if dry_run {
                    println!("{} {} -> {}", "would move".green(), file.path.display(), plan.destination_dir.display());
                } else {
                    let before = engine.movement.len();
                    let destination = execute(&plan, &mut engine.movement, "phase1 auto-accept")?;
                    let new_entries: Vec<_> = engine.movement.entries()[before..].iter().map(|e| e.id).collect();
                    engine.persist_movement(&new_entries)?;
                    println!("{} {} -> {}", "moved".green(), file.path.display(), destination.display());
                }
                engine.prototypes.update(assignment.category_id, &embedding, Utc::now())?;
                accepted += 1;
            }
            RoutingDecision::QueueForReview => {
                let id = engine.feedback.enqueue(
                    file.id,
                    assignment.category_id,
                    assignment.confidence,
                    assignment.rationale.clone(),
                    extracted.keywords.iter().cloned().collect(),
                    Utc::now(),
                );
                println!("{} {} ({id})", "queued for review".yellow(), file.path.display());
                queued += 1;
            }
            RoutingDecision::Escalate => {
                let mut phase2_queue = Phase2Queue::new(1);
                phase2_queue
                    .enqueue(Phase2Job {
                        file_id: file.id,
                        path: file.path.clone(),
                        filename: file.file_name(),
                        keywords: extracted.keywords.iter().cloned().collect(),
                        coarse_type: extracted.coarse_type,
                        candidate_paths: vec![],
                        priority: Priority::Normal,
                        enqueued_at: Utc::now(),
                        attempt: 0,
                        current_category: assignment.category_id,
                    })
                    .context("phase2 queue rejected the escalation it was just sized for")?;
                engine.events.publish(SortAiEvent::Phase2Queued {
                    file_id: file.id.to_string(),
                    priority: "normal".to_string(),
                    timestamp: Utc::now(),
                });
                let job = phase2_queue.pop().expect("the job just enqueued is still there");
                let outcome = process_job(
                    &job,
                    None,
                    &mut engine.router,
                    &mut engine.taxonomy,
                    &mut engine.graph,
                    &mut engine.gatekeeper,
                    Utc::now(),
                );
                let approved = engine.gatekeeper.auto_approve_eligible(&engine.taxonomy, Utc::now());
                let resolved_path = engine.taxonomy.path(outcome.resolved_category);
                minted_categories.extend(engine.taxonomy.get_or_create_path(&mut engine.graph, &resolved_path)?);
                engine.events.publish(SortAiEvent::Phase2Proposed {
                    file_id: file.id.to_string(),
                    category_path: resolved_path.join("/"),
                    confidence: outcome.confidence,
                    timestamp: Utc::now(),
                });

                let id = engine.feedback.enqueue(
                    file.id,
                    outcome.resolved_category,
                    outcome.confidence,
                    outcome.rationale.clone(),
                    extracted.keywords.iter().cloned().collect(),
                    Utc::now(),
                );
                match outcome.suggestion_id {
                    Some(suggestion_id) if approved.contains(&suggestion_id) => {
                        println!(
                            "{} {} via {}, reassignment approved ({id})",
                            "escalated".red(),
                            file.path.display(),
                            outcome.provider_id
                        );
                    }
                    Some(suggestion_id) => {
                        println!(
                            "{} {} via {}, reassignment pending review ({suggestion_id})",
                            "escalated".red(),
                            file.path.display(),
                            outcome.provider_id
                        );
                    }
                    None => {
                        println!("{} {} via {} ({id})", "escalated".red(), file.path.display(), outcome.provider_id);
                    }
                }
                escalated += 1;
            }
        }
    }

    engine.persist_categories(&minted_categories)?;
    for item in engine.feedback.list_pending(Utc::now()) {
        engine.storage.upsert_feedback_item(item)?;
    }
    for entity in engine.graph.entities() {
        engine.storage.upsert_entity(entity)?;
    }

    engine.events.publish(SortAiEvent::StatusSnapshot {
        phase: "organize".to_string(),
        pending_review: queued,
        pending_escalation: escalated,
        watch_queue_depth: 0,
        router_mode: engine.router.mode(),
        timestamp: Utc::now(),
    });

    println!(
        "{}",
        format!("{accepted} auto-accepted, {queued} queued for review, {escalated} escalated").cyan().bold()
    );
    Ok(())
}

fn run_status(db_path: PathBuf) -> Result<()> {
    let engine = Engine::load(&db_path)?;
    let categories = engine.storage.load_categories()?;
    let feedback_items = engine.storage.load_feedback_items()?;
    let movement_log = engine.storage.load_movement_log()?;
    let pending = feedback_items
        .iter()
        .filter(|i| i.status == sortai_core::FeedbackStatus::Pending)
        .count();

    println!("{}", "SortAI status".cyan().bold());
    println!("  schema version: {}", engine.storage.schema_version()?);
    println!("  taxonomy nodes: {}", categories.len());
    println!("  pending review: {}", pending);
    println!("  movement log entries: {}", movement_log.len());

    println!("  router mode: {:?}", engine.router.mode());
    for (provider_id, result) in engine.router.health_check_all() {
        match result {
            Ok(()) => println!("    {} {}", provider_id.dimmed(), "healthy".green()),
            Err(err) => println!("    {} {}", provider_id.dimmed(), format!("unhealthy: {err}").red()),
        }
    }
    Ok(())
}

fn run_undo(db_path: PathBuf) -> Result<()> {
    let mut engine = Engine::load(&db_path)?;
    let now = Utc::now();
    let inverse = engine.movement.undo(now)?;
    apply_inverse(&inverse)?;
    for entry in engine.movement.entries() {
        engine.storage.append_movement(entry)?;
    }
    println!("{} {} -> {}", "undone:".yellow().bold(), inverse.source.display(), inverse.destination.display());
    Ok(())
}

fn run_redo(db_path: PathBuf) -> Result<()> {
    let mut engine = Engine::load(&db_path)?;
    let now = Utc::now();
    let forward = engine.movement.redo(now)?;
    apply_forward(&forward)?;
    for entry in engine.movement.entries() {
        engine.storage.append_movement(entry)?;
    }
    println!("{} {} -> {}", "redone:".green().bold(), forward.source.display(), forward.destination.display());
    Ok(())
}

/// Perform the filesystem side of a redo: replay `command` exactly as the
/// organizer would have the first time (spec §4.7 "redo replays the forward
/// command").
fn apply_forward(command: &MoveCommand) -> Result<()> {
    if let Some(parent) = command.destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match command.kind {
        MoveKind::Move => {
            std::fs::rename(&command.source, &command.destination)?;
        }
        MoveKind::Copy => {
            std::fs::copy(&command.source, &command.destination)?;
        }
        MoveKind::Symlink => {
            let _ = std::fs::remove_file(&command.destination);
            #[cfg(unix)]
            std::os::unix::fs::symlink(&command.source, &command.destination)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(&command.source, &command.destination)?;
        }
        MoveKind::Unlink => unreachable!("a command recorded in the log is never Unlink"),
    }
    Ok(())
}

/// Perform the filesystem side of an undo. `command` is already `Command::inverse()`'s
/// output, so its `kind` tells us exactly what to do: a `Move` swaps the paths back;
/// a `Copy`/`Symlink` becomes an `Unlink`, which removes the destination it created
/// only after confirming it still matches the original (spec §4.7 "kind-specific
/// undo"). If it no longer matches -- the user edited the copy, or retargeted the
/// link -- undo refuses rather than destroying data that diverged after the move.
fn apply_inverse(command: &MoveCommand) -> Result<()> {
    match command.kind {
        MoveKind::Move => {
            if let Some(parent) = command.destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&command.source, &command.destination)?;
        }
        MoveKind::Unlink => {
            if !unlink_target_matches_original(&command.source, &command.destination)? {
                bail!(
                    "refusing to undo: {} no longer matches {}",
                    command.source.display(),
                    command.destination.display()
                );
            }
            std::fs::remove_file(&command.source)?;
        }
        MoveKind::Copy | MoveKind::Symlink => unreachable!("Command::inverse() never returns these kinds"),
    }
    Ok(())
}

/// `copy_or_link` is the destination a `Copy`/`Symlink` command created; `original`
/// is the source it was taken from. A symlink must still point at `original`; a
/// copy must still hash-match it.
fn unlink_target_matches_original(copy_or_link: &Path, original: &Path) -> Result<bool> {
    let metadata = std::fs::symlink_metadata(copy_or_link)?;
    if metadata.file_type().is_symlink() {
        return Ok(std::fs::read_link(copy_or_link)? == original);
    }
    Ok(sortai_core::content_hash(copy_or_link)? == sortai_core::content_hash(original)?)
}

fn run_feedback(action: FeedbackAction, db_path: PathBuf) -> Result<()> {
    let mut engine = Engine::load(&db_path)?;
    match action {
        FeedbackAction::List => {
            let pending = engine.feedback.list_pending(Utc::now());
            if pending.is_empty() {
                println!("{}", "nothing pending review".dimmed());
            }
            for item in pending {
                println!(
                    "  {} {} (confidence {:.2}) {}",
                    item.id.to_string().dimmed(),
                    truncate(&item.rationale, 60),
                    item.confidence,
                    item.keywords.join(", ").dimmed()
                );
            }
        }
        FeedbackAction::Accept { id } => {
            let id = uuid::Uuid::parse_str(&id).context("invalid feedback item id")?;
            let embedding = vec![0.0; sortai_core::EMBEDDING_DIMENSIONS];
            engine.feedback.accept(id, &embedding, &mut engine.prototypes, &mut engine.graph, Utc::now())?;
            if let Some(item) = engine.feedback.item(id) {
                engine.storage.upsert_feedback_item(item)?;
            }
            println!("{} {id}", "accepted".green().bold());
        }
        FeedbackAction::Correct { id, path } => {
            let id = uuid::Uuid::parse_str(&id).context("invalid feedback item id")?;
            let segments: Vec<String> = path.split('/').map(|s| s.to_string()).collect();
            if segments.is_empty() {
                bail!("category path must not be empty");
            }
            let category_ids = engine.taxonomy.get_or_create_path(&mut engine.graph, &segments)?;
            for (segment, id) in segments.iter().zip(category_ids.iter()) {
                engine.storage.upsert_category(&sortai_core::TaxonomyNode {
                    id: *id,
                    name: segment.clone(),
                    parent: None,
                    children: vec![],
                    user_edited: true,
                    created_at: Utc::now(),
                })?;
            }
            let new_category = *category_ids.last().unwrap();
            let embedding = vec![0.0; sortai_core::EMBEDDING_DIMENSIONS];
            engine.feedback.correct(id, new_category, &embedding, &mut engine.prototypes, &mut engine.graph, Utc::now())?;
            if let Some(item) = engine.feedback.item(id) {
                engine.storage.upsert_feedback_item(item)?;
            }
            println!("{} {id} -> {path}", "corrected".green().bold());
        }
        FeedbackAction::Skip { id } => {
            let id = uuid::Uuid::parse_str(&id).context("invalid feedback item id")?;
            engine.feedback.skip(id, Utc::now())?;
            if let Some(item) = engine.feedback.item(id) {
                engine.storage.upsert_feedback_item(item)?;
            }
            println!("{} {id}", "skipped".yellow().bold());
        }
    }
    Ok(())
}

fn run_watch(root: &Path, quiet_period_secs: i64, db_path: PathBuf) -> Result<()> {
    use notify::{Event, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;
    use std::time::Duration as StdDuration;

    let engine = Engine::load(&db_path)?;
    let mut manager = sortai_core::WatchManager::new(sortai_core::WatchConfig {
        quiet_period: chrono::Duration::seconds(quiet_period_secs),
        ..Default::default()
    })
    .with_events(engine.events.clone());
    manager.start()?;

    let (tx, rx) = channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(tx).context("constructing filesystem watcher")?;
    watcher.watch(root, RecursiveMode::Recursive).with_context(|| format!("watching {}", root.display()))?;

    println!("{} {}", "watching".cyan().bold(), root.display());
    loop {
        match rx.recv_timeout(StdDuration::from_secs(1)) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if let Ok(metadata) = std::fs::metadata(&path) {
                        if metadata.is_file() {
                            manager.on_event(&path, metadata.len(), Utc::now());
                        }
                    }
                }
            }
            Ok(Err(err)) => error!("watch error: {err}"),
            Err(_timeout) => {}
        }
        for ready in manager.drain_ready(Utc::now()) {
            println!("{} {}", "ready:".green(), ready.path.display());
        }
        engine.events.publish(SortAiEvent::StatusSnapshot {
            phase: "watch".to_string(),
            pending_review: 0,
            pending_escalation: 0,
            watch_queue_depth: manager.queue_len(),
            router_mode: engine.router.mode(),
            timestamp: Utc::now(),
        });
    }
}

fn run_export(path: &Path, gzip: bool, db_path: PathBuf) -> Result<()> {
    let storage = Storage::open(&db_path)?;
    let entities = storage.load_entities()?;
    let prototypes = storage
        .load_prototypes()?
        .into_iter()
        .map(|(category_id, centroid, sample_count, last_update)| {
            sortai_core::PatternRecord::from_centroid(category_id, &centroid, sample_count, last_update)
        })
        .collect();
    let archive = sortai_core::Archive::new(entities, vec![], prototypes, Utc::now());
    let bytes = archive.to_bytes(gzip)?;
    std::fs::write(path, bytes).with_context(|| format!("writing archive to {}", path.display()))?;
    println!(
        "{} {} entities, {} patterns -> {}",
        "exported".green().bold(),
        archive.statistics.entity_count,
        archive.statistics.pattern_count,
        path.display()
    );
    Ok(())
}

fn run_import(path: &Path, db_path: PathBuf) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading archive {}", path.display()))?;
    let archive = sortai_core::Archive::from_bytes(&bytes)?;
    let storage = Storage::open(&db_path)?;
    for entity in &archive.entities {
        storage.upsert_entity(entity)?;
    }
    for pattern in &archive.patterns {
        let centroid = pattern.decode_centroid()?;
        storage.upsert_prototype(pattern.category_id, &centroid, pattern.sample_count, pattern.last_update, sortai_core::prototypes::DEFAULT_ALPHA)?;
    }
    println!(
        "{} {} entities, {} patterns from {}",
        "imported".green().bold(),
        archive.entities.len(),
        archive.patterns.len(),
        path.display()
    );
    Ok(())
}

fn run_gc(yes: bool, db_path: PathBuf) -> Result<()> {
    if !yes {
        print!("this will prune empty, non-user-edited taxonomy branches and old movement-log rows. continue? [y/N] ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("{}", "aborted".dimmed());
            return Ok(());
        }
    }
    let mut engine = Engine::load(&db_path)?;
    let pruned_categories = engine.taxonomy.prune_empty();
    let cutoff = Utc::now() - chrono::Duration::days(engine.config.movement_log_retention_days as i64);
    let pruned_movements = engine.storage.prune_movement_log(cutoff)?;
    info!(pruned_categories, pruned_movements, "gc complete");
    println!(
        "{} {pruned_categories} empty categories, {pruned_movements} movement-log rows",
        "pruned".green().bold()
    );
    Ok(())
}

fn run_backup(dir: &Path, db_path: PathBuf) -> Result<()> {
    let storage = Storage::open(&db_path)?;
    let config = Config::load(db_path.parent().unwrap_or_else(|| Path::new("."))).unwrap_or_default();
    match storage.backup(dir, config.max_backups, Utc::now())? {
        Some(path) => println!("{} {}", "backed up to".green().bold(), path.display()),
        None => println!("{}", "nothing to back up: in-memory store".dimmed()),
    }
    Ok(())
}
