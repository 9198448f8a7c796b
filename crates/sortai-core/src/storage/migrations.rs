//! Schema migrations for the embedded relational store (spec §6 "Persisted
//! state layout").

use rusqlite::Connection;

use super::StorageError;

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "entities, relationships, learned_patterns, feedback_queue, movement_log, categories, prototypes",
    up: MIGRATION_V1_UP,
}];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent TEXT REFERENCES categories(id),
    user_edited INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_type_name ON entities(entity_type, name);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES entities(id),
    target_id TEXT NOT NULL REFERENCES entities(id),
    relationship_type TEXT NOT NULL,
    weight REAL NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id, relationship_type);

CREATE TABLE IF NOT EXISTS learned_patterns (
    id TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES categories(id),
    centroid BLOB NOT NULL,
    sample_count REAL NOT NULL,
    last_update TEXT NOT NULL,
    alpha REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS feedback_queue (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    suggested_category TEXT NOT NULL,
    confidence REAL NOT NULL,
    rationale TEXT NOT NULL,
    keywords TEXT NOT NULL,
    status TEXT NOT NULL,
    human_category TEXT,
    reviewed_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feedback_status ON feedback_queue(status);

CREATE TABLE IF NOT EXISTS movement_log (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    source_path TEXT NOT NULL,
    destination_path TEXT NOT NULL,
    reason TEXT NOT NULL,
    performed_at TEXT NOT NULL,
    undone INTEGER NOT NULL DEFAULT 0,
    undone_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_movement_file ON movement_log(file_id);

CREATE TABLE IF NOT EXISTS embedding_cache (
    text_hash TEXT NOT NULL,
    model_id TEXT NOT NULL,
    vector BLOB NOT NULL,
    PRIMARY KEY (text_hash, model_id)
);
"#;

pub fn apply_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [migration.version])?;
            tracing::info!(version = migration.version, description = migration.description, "applied migration");
        }
    }
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<u32, StorageError> {
    Ok(conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0))
}
