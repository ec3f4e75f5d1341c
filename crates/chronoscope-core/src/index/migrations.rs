//! Index Migrations
//!
//! Schema migration definitions for the persisted term index.

/// Schema version this build reads and writes
pub const INDEX_SCHEMA_VERSION: u32 = 2;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Term postings, documents, indexed commits",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Build history for index status",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Core index tables
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per indexed commit; seq preserves indexing order
CREATE TABLE IF NOT EXISTS indexed_commits (
    commit_id TEXT PRIMARY KEY,
    seq INTEGER NOT NULL
);

-- Content documents: one file version at one commit
CREATE TABLE IF NOT EXISTS documents (
    commit_id TEXT NOT NULL,
    path TEXT NOT NULL,
    length INTEGER NOT NULL,
    PRIMARY KEY (commit_id, path)
);

-- path is NULL for commit message terms
CREATE TABLE IF NOT EXISTS postings (
    term TEXT NOT NULL,
    commit_id TEXT NOT NULL,
    path TEXT,
    position INTEGER NOT NULL,
    frequency INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_postings_term ON postings(term);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Record of completed builds
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS build_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    completed_at TEXT NOT NULL,
    full_rebuild INTEGER NOT NULL,
    commits_indexed INTEGER NOT NULL,
    terms_added INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying index migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
