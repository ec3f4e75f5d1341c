//! SQLite persistence for the term index

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use super::migrations::{self, INDEX_SCHEMA_VERSION};
use super::snapshot::{CommitDelta, IndexSnapshot, Posting};
use super::{BuildRecord, BuildReport, IndexError};

const META_LAST_INDEXED: &str = "last_indexed_commit";
const META_GENERATION: &str = "generation";
const META_POSTING_COUNT: &str = "posting_count";

/// Owner of the index database connection; the single writer
pub(crate) struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )
    }

    fn initialize(conn: Connection, fresh: bool) -> Result<Self, IndexError> {
        Self::configure_connection(&conn)?;
        migrations::apply_migrations(&conn)?;
        if fresh {
            conn.execute(
                "INSERT OR IGNORE INTO index_meta (key, value) VALUES (?1, '0')",
                params![META_POSTING_COUNT],
            )?;
        }
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::initialize(Connection::open_in_memory()?, true)
    }

    /// Open the index at `path`.
    ///
    /// An unreadable, foreign, inconsistent or newer-schema file is discarded
    /// and replaced by an empty index; the reason is returned alongside.
    pub fn open(path: &Path) -> Result<(Self, Option<String>), IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        match Self::open_checked(path, existed) {
            Ok(store) => Ok((store, None)),
            Err(reason) => {
                tracing::warn!(
                    "Index at {} is unusable ({}); discarding",
                    path.display(),
                    reason
                );
                discard(path)?;
                let store = Self::initialize(Connection::open(path)?, true)?;
                Ok((store, Some(reason)))
            }
        }
    }

    fn open_checked(path: &Path, existed: bool) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        Self::configure_connection(&conn).map_err(|e| e.to_string())?;

        let version = migrations::get_current_version(&conn).map_err(|e| e.to_string())?;
        if existed && version == 0 {
            return Err("schema metadata missing".to_string());
        }
        if version > INDEX_SCHEMA_VERSION {
            return Err(format!(
                "schema version {version} is newer than supported {INDEX_SCHEMA_VERSION}"
            ));
        }

        let store = Self::initialize(conn, version == 0).map_err(|e| e.to_string())?;
        store.verify()?;
        Ok(store)
    }

    /// Integrity check plus the recorded posting count against the table
    fn verify(&self) -> Result<(), String> {
        let check: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;
        if check != "ok" {
            return Err(format!("integrity check failed: {check}"));
        }

        let expected = self
            .meta(META_POSTING_COUNT)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "posting count missing".to_string())?
            .parse::<u64>()
            .map_err(|e| format!("posting count unreadable: {e}"))?;
        let actual: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM postings", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;
        let actual = u64::try_from(actual).map_err(|e| format!("posting count unreadable: {e}"))?;
        if expected != actual {
            return Err(format!(
                "posting count mismatch: recorded {expected}, found {actual}"
            ));
        }
        Ok(())
    }

    fn meta(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    fn set_meta(tx: &Transaction<'_>, key: &str, value: &str) -> rusqlite::Result<()> {
        tx.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Read the whole index into a snapshot
    pub fn load(&self) -> Result<IndexSnapshot, IndexError> {
        let mut snapshot = IndexSnapshot::default();

        snapshot.set_last_indexed_commit(self.meta(META_LAST_INDEXED)?);
        let generation = self
            .meta(META_GENERATION)?
            .and_then(|g| g.parse().ok())
            .unwrap_or(0);
        snapshot.set_generation(generation);

        let mut stmt = self
            .conn
            .prepare("SELECT commit_id FROM indexed_commits ORDER BY seq")?;
        let commits = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for commit in commits {
            snapshot.insert_commit(&commit?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT commit_id, path, length FROM documents")?;
        let docs = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?;
        for doc in docs {
            let (commit_id, path, length) = doc?;
            snapshot.insert_document(&commit_id, &path, length);
        }

        let mut stmt = self.conn.prepare(
            "SELECT term, commit_id, path, position, frequency FROM postings ORDER BY rowid",
        )?;
        let postings = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Posting {
                    commit_id: row.get(1)?,
                    path: row.get(2)?,
                    position: row.get(3)?,
                    frequency: row.get(4)?,
                },
            ))
        })?;
        for posting in postings {
            let (term, posting) = posting?;
            snapshot.insert_posting(&term, posting);
        }

        Ok(snapshot)
    }

    /// Write deltas and the new head pointer in one transaction
    pub fn persist(
        &mut self,
        full_rebuild: bool,
        deltas: &[CommitDelta],
        snapshot: &IndexSnapshot,
        report: &BuildReport,
    ) -> Result<(), IndexError> {
        let tx = self.conn.transaction()?;

        if full_rebuild {
            tx.execute_batch(
                "DELETE FROM postings;
                 DELETE FROM documents;
                 DELETE FROM indexed_commits;",
            )?;
        }

        {
            let mut seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) FROM indexed_commits",
                [],
                |row| row.get(0),
            )?;
            let mut insert_commit = tx.prepare_cached(
                "INSERT OR REPLACE INTO indexed_commits (commit_id, seq) VALUES (?1, ?2)",
            )?;
            let mut insert_document = tx.prepare_cached(
                "INSERT OR REPLACE INTO documents (commit_id, path, length) VALUES (?1, ?2, ?3)",
            )?;
            let mut insert_posting = tx.prepare_cached(
                "INSERT INTO postings (term, commit_id, path, position, frequency)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for delta in deltas {
                seq += 1;
                insert_commit.execute(params![delta.commit_id, seq])?;
                for (term, stats) in &delta.message_terms {
                    insert_posting.execute(params![
                        term,
                        delta.commit_id,
                        Option::<String>::None,
                        stats.first_position,
                        stats.frequency
                    ])?;
                }
                for doc in &delta.documents {
                    insert_document.execute(params![delta.commit_id, doc.path, doc.length])?;
                    for (term, stats) in &doc.terms {
                        insert_posting.execute(params![
                            term,
                            delta.commit_id,
                            doc.path,
                            stats.first_position,
                            stats.frequency
                        ])?;
                    }
                }
            }
        }

        match snapshot.last_indexed_commit() {
            Some(last) => Self::set_meta(&tx, META_LAST_INDEXED, last)?,
            None => {
                tx.execute(
                    "DELETE FROM index_meta WHERE key = ?1",
                    params![META_LAST_INDEXED],
                )?;
            }
        }
        Self::set_meta(&tx, META_GENERATION, &snapshot.generation().to_string())?;
        Self::set_meta(
            &tx,
            META_POSTING_COUNT,
            &snapshot.posting_count().to_string(),
        )?;
        tx.execute(
            "INSERT INTO build_history
                (completed_at, full_rebuild, commits_indexed, terms_added, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().to_rfc3339(),
                report.full_rebuild,
                report.commits_indexed as i64,
                report.terms_added as i64,
                report.duration_ms as i64
            ],
        )?;

        tx.commit()?;

        // Fold the WAL back so the main file stands alone
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn last_build(&self) -> Result<Option<BuildRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT completed_at, full_rebuild, commits_indexed, terms_added, duration_ms
                 FROM build_history ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(completed_at, full_rebuild, commits, terms, duration_ms)| BuildRecord {
                completed_at: DateTime::parse_from_rfc3339(&completed_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
                full_rebuild,
                commits_indexed: commits.max(0) as usize,
                terms_added: terms.max(0) as usize,
                duration_ms: duration_ms.max(0) as u64,
            },
        ))
    }
}

/// Remove an index file with its WAL and shared-memory companions
pub(crate) fn discard(path: &Path) -> std::io::Result<()> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        targets.push(name.into());
    }
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
