//! Persistence layer (spec §6 "Persisted state layout")
//!
//! One embedded relational store for everything except the embedding cache's hot
//! path: entities, relationships, learned patterns (prototypes), the feedback
//! queue, the movement log, and the taxonomy. Reader and writer use separate
//! connections to the same file (teacher's `Storage` pattern), so read-heavy
//! status queries never block a writer holding the connection mutex.

mod migrations;

pub use migrations::schema_version;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::feedback::{FeedbackItem, FeedbackStatus};
use crate::graph::{Entity, EntityType, Relationship, RelationshipType};
use crate::model::CategoryId;
use crate::movement::{Command, MoveKind, MovementLogEntry};
use crate::taxonomy::TaxonomyNode;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock poisoned")]
    LockPoisoned,
    #[error("malformed stored value: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Malformed(e.to_string()))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StorageError::Malformed(e.to_string()))
}

/// Embedded relational store, opened once per process. All methods take `&self`:
/// interior mutability via per-connection mutexes keeps `Storage` `Send + Sync`
/// so callers can share it behind an `Arc` instead of `Arc<Mutex<Storage>>`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    /// `None` for an in-memory store, which has nothing on disk to back up.
    db_path: Option<PathBuf>,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if absent) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer_conn = Connection::open(db_path)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(db_path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            db_path: Some(db_path.to_path_buf()),
        })
    }

    /// Open an in-memory database, used by tests and `--dry-run` invocations.
    pub fn open_in_memory() -> Result<Self> {
        let writer_conn = Connection::open_in_memory()?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;
        let reader_conn = Connection::open(writer_conn.path().unwrap_or(":memory:"))?;
        let _ = Self::configure_connection(&reader_conn);
        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            db_path: None,
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::schema_version(&*self.reader()?)
    }

    // -- categories / taxonomy ------------------------------------------------

    pub fn upsert_category(&self, node: &TaxonomyNode) -> Result<()> {
        self.writer()?.execute(
            "INSERT INTO categories (id, name, parent, user_edited, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, parent = excluded.parent, user_edited = excluded.user_edited",
            params![
                node.id.to_string(),
                node.name,
                node.parent.map(|p| p.to_string()),
                node.user_edited as i64,
                format_time(node.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn load_categories(&self) -> Result<Vec<(CategoryId, String, Option<CategoryId>, bool, DateTime<Utc>)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id, name, parent, user_edited, created_at FROM categories")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let parent: Option<String> = row.get(2)?;
            let user_edited: i64 = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok((id, name, parent, user_edited, created_at))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, name, parent, user_edited, created_at) = row?;
            out.push((
                parse_uuid(&id)?,
                name,
                parent.map(|p| parse_uuid(&p)).transpose()?,
                user_edited != 0,
                parse_time(&created_at)?,
            ));
        }
        Ok(out)
    }

    // -- knowledge graph --------------------------------------------------------

    pub fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        self.writer()?.execute(
            "INSERT INTO entities (id, entity_type, name, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO NOTHING",
            params![
                entity.id.to_string(),
                entity_type_str(entity.entity_type),
                entity.name,
                format_time(entity.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_relationship(&self, rel: &Relationship) -> Result<()> {
        let metadata = rel.metadata.as_ref().map(|m| m.to_string());
        self.writer()?.execute(
            "INSERT INTO relationships (id, source_id, target_id, relationship_type, weight, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET weight = excluded.weight, metadata = excluded.metadata",
            params![
                rel.id.to_string(),
                rel.source_id.to_string(),
                rel.target_id.to_string(),
                relationship_type_str(rel.relationship_type),
                rel.weight,
                metadata,
                format_time(rel.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn load_entities(&self) -> Result<Vec<Entity>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id, entity_type, name, created_at FROM entities")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let entity_type: String = row.get(1)?;
            let name: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok((id, entity_type, name, created_at))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, entity_type, name, created_at) = row?;
            out.push(Entity {
                id: parse_uuid(&id)?,
                entity_type: parse_entity_type(&entity_type)?,
                name,
                created_at: parse_time(&created_at)?,
            });
        }
        Ok(out)
    }

    // -- prototypes (learned_patterns) ------------------------------------------

    pub fn upsert_prototype(&self, category: CategoryId, centroid: &[f32], sample_count: f64, last_update: DateTime<Utc>, alpha: f32) -> Result<()> {
        let blob: Vec<u8> = centroid.iter().flat_map(|f| f.to_le_bytes()).collect();
        self.writer()?.execute(
            "INSERT INTO learned_patterns (id, category_id, centroid, sample_count, last_update, alpha)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET centroid = excluded.centroid, sample_count = excluded.sample_count,
                last_update = excluded.last_update",
            params![category.to_string(), category.to_string(), blob, sample_count, format_time(last_update), alpha],
        )?;
        Ok(())
    }

    pub fn load_prototypes(&self) -> Result<Vec<(CategoryId, Vec<f32>, f64, DateTime<Utc>)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT category_id, centroid, sample_count, last_update FROM learned_patterns")?;
        let rows = stmt.query_map([], |row| {
            let category_id: String = row.get(0)?;
            let centroid: Vec<u8> = row.get(1)?;
            let sample_count: f64 = row.get(2)?;
            let last_update: String = row.get(3)?;
            Ok((category_id, centroid, sample_count, last_update))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (category_id, centroid, sample_count, last_update) = row?;
            let vector = centroid
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            out.push((parse_uuid(&category_id)?, vector, sample_count, parse_time(&last_update)?));
        }
        Ok(out)
    }

    // -- feedback queue -----------------------------------------------------------

    pub fn upsert_feedback_item(&self, item: &FeedbackItem) -> Result<()> {
        self.writer()?.execute(
            "INSERT INTO feedback_queue
                (id, file_id, suggested_category, confidence, rationale, keywords, status, human_category, reviewed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, human_category = excluded.human_category,
                reviewed_at = excluded.reviewed_at",
            params![
                item.id.to_string(),
                item.file_id.to_string(),
                item.suggested_category.to_string(),
                item.confidence,
                item.rationale,
                serde_json::to_string(&item.keywords).unwrap_or_default(),
                feedback_status_str(item.status),
                item.human_category.map(|c| c.to_string()),
                item.reviewed_at.map(format_time),
                format_time(item.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn load_feedback_items(&self) -> Result<Vec<FeedbackItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, file_id, suggested_category, confidence, rationale, keywords, status, human_category, reviewed_at, created_at
             FROM feedback_queue",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, file_id, suggested_category, confidence, rationale, keywords, status, human_category, reviewed_at, created_at) = row?;
            out.push(FeedbackItem {
                id: parse_uuid(&id)?,
                file_id: parse_uuid(&file_id)?,
                suggested_category: parse_uuid(&suggested_category)?,
                confidence,
                rationale,
                keywords: serde_json::from_str(&keywords).unwrap_or_default(),
                status: parse_feedback_status(&status)?,
                human_category: human_category.map(|c| parse_uuid(&c)).transpose()?,
                reviewed_at: reviewed_at.map(|r| parse_time(&r)).transpose()?,
                created_at: parse_time(&created_at)?,
            });
        }
        Ok(out)
    }

    // -- movement log ---------------------------------------------------------

    pub fn append_movement(&self, entry: &MovementLogEntry) -> Result<()> {
        self.writer()?.execute(
            "INSERT INTO movement_log (id, file_id, kind, source_path, destination_path, reason, performed_at, undone, undone_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET undone = excluded.undone, undone_at = excluded.undone_at",
            params![
                entry.id.to_string(),
                entry.command.file_id.to_string(),
                move_kind_str(entry.command.kind),
                entry.command.source.to_string_lossy(),
                entry.command.destination.to_string_lossy(),
                entry.reason,
                format_time(entry.performed_at),
                entry.undone as i64,
                entry.undone_at.map(format_time),
            ],
        )?;
        Ok(())
    }

    pub fn load_movement_log(&self) -> Result<Vec<MovementLogEntry>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, file_id, kind, source_path, destination_path, reason, performed_at, undone, undone_at FROM movement_log",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, file_id, kind, source, destination, reason, performed_at, undone, undone_at) = row?;
            out.push(MovementLogEntry {
                id: parse_uuid(&id)?,
                command: Command {
                    file_id: parse_uuid(&file_id)?,
                    kind: parse_move_kind(&kind)?,
                    source: PathBuf::from(source),
                    destination: PathBuf::from(destination),
                },
                reason,
                performed_at: parse_time(&performed_at)?,
                undone: undone != 0,
                undone_at: undone_at.map(|s| parse_time(&s)).transpose()?,
            });
        }
        Ok(out)
    }

    /// Delete undone movement-log rows performed before `cutoff`. A row that is
    /// still `undone = false` is kept regardless of age: retention only evicts
    /// history nobody can still roll back (spec.md §6 "Retention").
    pub fn prune_movement_log(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self.writer()?.execute(
            "DELETE FROM movement_log WHERE undone = 1 AND performed_at < ?1",
            params![format_time(cutoff)],
        )?;
        Ok(deleted)
    }

    /// Copy the on-disk database into `backup_dir`, rotating out the oldest
    /// numbered backup once more than `max_backups` accumulate (teacher's
    /// GC/backup CLI pattern, generalized from a single snapshot to a bounded
    /// rotation). No-op target for an in-memory store.
    pub fn backup(&self, backup_dir: &Path, max_backups: u32, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        let Some(db_path) = &self.db_path else { return Ok(None) };
        std::fs::create_dir_all(backup_dir)?;
        let stamp = now.format("%Y%m%d%H%M%S");
        let file_name = format!("sortai-{stamp}.db");
        let destination = backup_dir.join(&file_name);

        {
            let _writer = self.writer()?; // hold the write lock for a consistent snapshot
            std::fs::copy(db_path, &destination)?;
        }

        let mut existing: Vec<PathBuf> = std::fs::read_dir(backup_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("sortai-") && n.ends_with(".db")))
            .collect();
        existing.sort();
        while existing.len() > max_backups as usize {
            let oldest = existing.remove(0);
            let _ = std::fs::remove_file(oldest);
        }

        Ok(Some(destination))
    }

    // -- embedding cache --------------------------------------------------------

    pub fn cache_get(&self, text_hash: &str, model_id: &str) -> Result<Option<Vec<f32>>> {
        let reader = self.reader()?;
        let blob: Option<Vec<u8>> = reader
            .query_row(
                "SELECT vector FROM embedding_cache WHERE text_hash = ?1 AND model_id = ?2",
                params![text_hash, model_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| b.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()))
    }

    pub fn cache_put(&self, text_hash: &str, model_id: &str, vector: &[f32]) -> Result<()> {
        let blob: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        self.writer()?.execute(
            "INSERT INTO embedding_cache (text_hash, model_id, vector) VALUES (?1, ?2, ?3)
             ON CONFLICT(text_hash, model_id) DO UPDATE SET vector = excluded.vector",
            params![text_hash, model_id, blob],
        )?;
        Ok(())
    }
}

fn entity_type_str(t: EntityType) -> &'static str {
    match t {
        EntityType::File => "file",
        EntityType::Category => "category",
        EntityType::Keyword => "keyword",
        EntityType::Pattern => "pattern",
    }
}

fn parse_entity_type(s: &str) -> Result<EntityType> {
    match s {
        "file" => Ok(EntityType::File),
        "category" => Ok(EntityType::Category),
        "keyword" => Ok(EntityType::Keyword),
        "pattern" => Ok(EntityType::Pattern),
        other => Err(StorageError::Malformed(format!("unknown entity_type {other:?}"))),
    }
}

fn relationship_type_str(t: RelationshipType) -> &'static str {
    match t {
        RelationshipType::Mentions => "mentions",
        RelationshipType::CategorizedAs => "categorized_as",
        RelationshipType::SuggestsCategory => "suggests_category",
        RelationshipType::HumanConfirmed => "human_confirmed",
        RelationshipType::HumanRejected => "human_rejected",
        RelationshipType::SimilarTo => "similar_to",
    }
}

fn feedback_status_str(s: FeedbackStatus) -> &'static str {
    match s {
        FeedbackStatus::Pending => "pending",
        FeedbackStatus::AutoAccepted => "auto_accepted",
        FeedbackStatus::HumanAccepted => "human_accepted",
        FeedbackStatus::HumanCorrected => "human_corrected",
        FeedbackStatus::Skipped => "skipped",
    }
}

fn parse_feedback_status(s: &str) -> Result<FeedbackStatus> {
    match s {
        "pending" => Ok(FeedbackStatus::Pending),
        "auto_accepted" => Ok(FeedbackStatus::AutoAccepted),
        "human_accepted" => Ok(FeedbackStatus::HumanAccepted),
        "human_corrected" => Ok(FeedbackStatus::HumanCorrected),
        "skipped" => Ok(FeedbackStatus::Skipped),
        other => Err(StorageError::Malformed(format!("unknown feedback status {other:?}"))),
    }
}

fn move_kind_str(k: MoveKind) -> &'static str {
    match k {
        MoveKind::Move => "move",
        MoveKind::Copy => "copy",
        MoveKind::Symlink => "symlink",
        MoveKind::Unlink => "unlink",
    }
}

fn parse_move_kind(s: &str) -> Result<MoveKind> {
    match s {
        "move" => Ok(MoveKind::Move),
        "copy" => Ok(MoveKind::Copy),
        "symlink" => Ok(MoveKind::Symlink),
        "unlink" => Ok(MoveKind::Unlink),
        other => Err(StorageError::Malformed(format!("unknown move kind {other:?}"))),
    }
}

/// Suppress the `TimeZone` import-only-for-trait-method warning; `parse_time`
/// above uses the inherent `DateTime::parse_from_rfc3339`, but callers elsewhere
/// in this module construct `DateTime<Utc>` via `Utc.timestamp_opt`-style helpers
/// that need the trait in scope.
#[allow(unused_imports)]
use TimeZone as _;
