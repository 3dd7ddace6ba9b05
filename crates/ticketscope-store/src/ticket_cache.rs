//! Durable per-ticket cache of translation and cleaning outputs.
//!
//! Entries are created on the first translation or cleaning of a ticket,
//! updated in place afterwards, and only removed by an explicit
//! [`TicketCache::invalidate`] or [`TicketCache::clear`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

use crate::migrate::ensure_columns;
use crate::schema::{TICKET_CACHE_COLUMNS, TICKET_CACHE_SQL};
use crate::sqlite::{create_connection, db_err, now_millis};
use crate::types::CacheEntry;
use ticketscope_core::Result;

pub struct TicketCache {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    /// One async lock per ticket id; held across a remote call so two tasks
    /// never compute and write the same entry concurrently.
    key_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

/// Guard returned by [`TicketCache::lock_ticket`]. Dropping the last
/// guard of a ticket removes its lock entry.
pub struct TicketLock<'a> {
    cache: &'a TicketCache,
    ticket_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TicketLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map is left.
        self.cache
            .key_locks
            .remove_if(&self.ticket_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl TicketCache {
    /// Open or create the cache. The file will be `cache_dir/ticket_cache.db`.
    pub fn open(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let db_path = cache_dir.as_ref().join("ticket_cache.db");
        let conn = create_connection(&db_path)?;
        conn.execute_batch(TICKET_CACHE_SQL).map_err(db_err)?;
        ensure_columns(&conn, "ticket_cache", TICKET_CACHE_COLUMNS)?;

        let cache = Self {
            conn: Mutex::new(conn),
            db_path,
            key_locks: DashMap::new(),
        };
        info!(
            "TicketCache opened: {} entries, path={}",
            cache.count()?,
            cache.db_path.display()
        );
        Ok(cache)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Acquire the per-ticket lock. Hold the guard for the whole
    /// read-compute-write sequence of one ticket.
    pub async fn lock_ticket(&self, ticket_id: &str) -> TicketLock<'_> {
        let lock = self
            .key_locks
            .entry(ticket_id.to_string())
            .or_default()
            .clone();
        TicketLock {
            cache: self,
            ticket_id: ticket_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn get(&self, ticket_id: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT ticket_id, translated_body, preprocessed_body, cleaning_attempted, \
                 translation_fallback, cleaning_fallback, updated_at \
                 FROM ticket_cache WHERE ticket_id = ?1",
            )
            .map_err(db_err)?;
        let entry = stmt
            .query_row(params![ticket_id], |row| {
                Ok(CacheEntry {
                    ticket_id: row.get(0)?,
                    translated_body: row.get(1)?,
                    preprocessed_body: row.get(2)?,
                    cleaning_attempted: row.get::<_, i64>(3)? != 0,
                    translation_fallback: row.get::<_, i64>(4)? != 0,
                    cleaning_fallback: row.get::<_, i64>(5)? != 0,
                    updated_at: row.get(6)?,
                })
            })
            .optional()
            .map_err(db_err)?;
        Ok(entry)
    }

    /// Store a translation. `fallback` marks the original body standing in
    /// for a failed translation.
    pub fn put_translation(&self, ticket_id: &str, translated: &str, fallback: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO ticket_cache (ticket_id, translated_body, translation_fallback, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(ticket_id) DO UPDATE SET \
             translated_body = excluded.translated_body, \
             translation_fallback = excluded.translation_fallback, \
             updated_at = excluded.updated_at",
        )
        .map_err(db_err)?
        .execute(params![ticket_id, translated, fallback as i64, now_millis()])
        .map_err(db_err)?;
        Ok(())
    }

    /// Store a cleaned body and mark cleaning as attempted.
    pub fn put_preprocessed(&self, ticket_id: &str, cleaned: &str, fallback: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO ticket_cache (ticket_id, preprocessed_body, cleaning_attempted, cleaning_fallback, updated_at) \
             VALUES (?1, ?2, 1, ?3, ?4) \
             ON CONFLICT(ticket_id) DO UPDATE SET \
             preprocessed_body = excluded.preprocessed_body, \
             cleaning_attempted = 1, \
             cleaning_fallback = excluded.cleaning_fallback, \
             updated_at = excluded.updated_at",
        )
        .map_err(db_err)?
        .execute(params![ticket_id, cleaned, fallback as i64, now_millis()])
        .map_err(db_err)?;
        Ok(())
    }

    /// Delete entries for the given tickets, forcing them to be reprocessed.
    pub fn invalidate(&self, ticket_ids: &[String]) -> Result<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("DELETE FROM ticket_cache WHERE ticket_id = ?1")
            .map_err(db_err)?;
        let mut removed = 0;
        for id in ticket_ids {
            removed += stmt.execute(params![id]).map_err(db_err)?;
        }
        info!("Invalidated {} ticket cache entries", removed);
        Ok(removed)
    }

    /// Delete every entry.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM ticket_cache", [])
            .map_err(db_err)?;
        info!("Cleared ticket cache ({} entries)", removed);
        Ok(removed)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM ticket_cache", [], |row| row.get(0))
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_cache() -> (TicketCache, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TicketCache::open(dir.path()).unwrap();
        (cache, dir)
    }

    #[test]
    fn test_translation_then_cleaning_share_one_row() {
        let (cache, _dir) = test_cache();
        assert!(cache.get("T-1").unwrap().is_none());

        cache.put_translation("T-1", "hello", false).unwrap();
        let entry = cache.get("T-1").unwrap().unwrap();
        assert_eq!(entry.translated_body.as_deref(), Some("hello"));
        assert!(entry.preprocessed_body.is_none());
        assert!(!entry.cleaning_attempted);

        cache.put_preprocessed("T-1", "hello clean", true).unwrap();
        let entry = cache.get("T-1").unwrap().unwrap();
        assert_eq!(entry.translated_body.as_deref(), Some("hello"));
        assert_eq!(entry.preprocessed_body.as_deref(), Some("hello clean"));
        assert!(entry.cleaning_attempted);
        assert!(entry.cleaning_fallback);
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_recompute_updates_in_place() {
        let (cache, _dir) = test_cache();
        cache.put_translation("T-1", "original", true).unwrap();
        cache.put_translation("T-1", "translated", false).unwrap();

        let entry = cache.get("T-1").unwrap().unwrap();
        assert_eq!(entry.translated_body.as_deref(), Some("translated"));
        assert!(!entry.translation_fallback);
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (cache, _dir) = test_cache();
        for id in ["A", "B", "C"] {
            cache.put_translation(id, "x", false).unwrap();
        }
        let removed = cache.invalidate(&["A".into(), "missing".into()]).unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("A").unwrap().is_none());
        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_legacy_cache_gains_marker_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticket_cache.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE ticket_cache (
                     ticket_id TEXT PRIMARY KEY,
                     translated_body TEXT,
                     preprocessed_body TEXT,
                     updated_at INTEGER NOT NULL
                 );
                 INSERT INTO ticket_cache VALUES ('OLD', 'kept', 'kept clean', 1);",
            )
            .unwrap();
        }

        let cache = TicketCache::open(dir.path()).unwrap();
        let entry = cache.get("OLD").unwrap().unwrap();
        assert_eq!(entry.preprocessed_body.as_deref(), Some("kept clean"));
        assert!(!entry.cleaning_attempted);
        assert!(!entry.translation_fallback);
    }

    #[tokio::test]
    async fn test_ticket_lock_is_per_key() {
        let (cache, _dir) = test_cache();
        let a = cache.lock_ticket("A").await;
        // A different key must not block.
        let b = cache.lock_ticket("B").await;
        assert_eq!(cache.key_locks.len(), 2);
        drop(a);
        drop(b);
        assert!(cache.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_contended_lock_entry_survives_first_release() {
        let cache = Arc::new(test_cache());
        let first = cache.0.lock_ticket("A").await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let _second = cache.0.lock_ticket("A").await;
                cache.0.key_locks.len()
            })
        };
        // Let the waiter clone the lock and park on it.
        while Arc::strong_count(&cache.0.key_locks.get("A").unwrap()) < 3 {
            tokio::task::yield_now().await;
        }
        drop(first);

        assert_eq!(waiter.await.unwrap(), 1);
        assert!(cache.0.key_locks.is_empty());
    }
}
