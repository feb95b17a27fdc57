//! r2d2 pools over the job database.
//!
//! Every pool is migrated before it is handed out, so callers never see a
//! connection to a schema older than [`crate::migrations`] describes.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rf_core::{Error, Result};

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Submissions only touch the registry once per job, so a handful of
/// connections is plenty.
const MAX_CONNECTIONS: u32 = 4;

/// Milliseconds a writer waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Open (creating if needed) the job database at `db_path`.
///
/// Missing parent directories are created. Connections use WAL so lookups
/// are not blocked while a finished job is being recorded.
pub fn init_pool(db_path: &Path) -> Result<DbPool> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!("Opening job database at {}", db_path.display());

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))
    });
    migrated(manager)
}

/// A private in-memory database shared by all connections of one pool.
///
/// Each call gets its own shared-cache name, so pools never see each
/// other's jobs.
pub fn init_memory_pool() -> Result<DbPool> {
    static NEXT_DB: AtomicU64 = AtomicU64::new(0);
    let name = format!(
        "file:reelforge_jobs_{}?mode=memory&cache=shared",
        NEXT_DB.fetch_add(1, Ordering::Relaxed)
    );

    let manager = SqliteConnectionManager::file(name)
        .with_init(|conn| conn.execute_batch(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};")));
    migrated(manager)
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("no database connection available: {e}")))
}

/// Build the pool and bring its schema up to date.
fn migrated(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(MAX_CONNECTIONS)
        .build(manager)
        .map_err(|e| Error::database(format!("cannot open job database: {e}")))?;
    migrations::run_migrations(&*get_conn(&pool)?)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_tables(pool: &DbPool) -> i64 {
        get_conn(pool)
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='transcode_jobs'",
                [],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn memory_pool_is_migrated() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), MAX_CONNECTIONS);
        assert_eq!(job_tables(&pool), 1);
    }

    #[test]
    fn memory_pools_are_isolated() {
        let a = init_memory_pool().unwrap();
        let b = init_memory_pool().unwrap();
        get_conn(&a)
            .unwrap()
            .execute(
                "INSERT INTO transcode_jobs (id, original_filename, status, artifacts, failed_variants, created_at)
                 VALUES ('only-in-a', 'a.mov', 'complete', '[]', '[]', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let in_b: i64 = get_conn(&b)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM transcode_jobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(in_b, 0);
    }

    #[test]
    fn file_pool_creates_parent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");

        {
            let pool = init_pool(&path).unwrap();
            get_conn(&pool)
                .unwrap()
                .execute(
                    "INSERT INTO transcode_jobs (id, original_filename, status, artifacts, failed_variants, created_at)
                     VALUES ('j1', 'a.mov', 'complete', '[]', '[]', '2024-01-01T00:00:00Z')",
                    [],
                )
                .unwrap();
        }

        let pool = init_pool(&path).unwrap();
        let journal: String = get_conn(&pool)
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");

        let n: i64 = get_conn(&pool)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM transcode_jobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
