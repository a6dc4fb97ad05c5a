use chrono::{DateTime, Utc};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::db::{DbConnection, DbPool};
use crate::error::ServiceResult;

/// Cheap staleness signal for pollers. Every committed mutation bumps the
/// version; readers never take a lock.
///
/// The counter starts at the process start time in milliseconds, so a
/// restarted server never hands out a version a poller already holds.
#[derive(Debug)]
pub struct ContentVersion {
    version: AtomicU64,
    changed_at_ms: AtomicI64,
}

impl ContentVersion {
    pub fn new() -> Self {
        let now_ms = Utc::now().timestamp_millis();
        Self {
            version: AtomicU64::new(u64::try_from(now_ms).unwrap_or(0).max(1)),
            changed_at_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn current(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        let millis = self.changed_at_ms.load(Ordering::Acquire);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    pub fn bump(&self) -> u64 {
        self.changed_at_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::AcqRel);
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for ContentVersion {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistence boundary for media, devices and schedule rules. Each public
/// service operation runs as exactly one transaction through [`RuleStore::read`]
/// or [`RuleStore::write`].
#[derive(Clone)]
pub struct RuleStore {
    pool: DbPool,
    version: Arc<ContentVersion>,
}

impl RuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            version: Arc::new(ContentVersion::new()),
        }
    }

    pub fn version(&self) -> &ContentVersion {
        &self.version
    }

    fn conn(&self) -> ServiceResult<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Runs `f` in a deferred transaction without touching the content version.
    /// Used for reads and for device check-ins, which are not content changes.
    pub fn read<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> ServiceResult<T>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.transaction(f)
    }

    /// Runs `f` in an immediate (write-locked) transaction and bumps the
    /// content version once it commits.
    pub fn write<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> ServiceResult<T>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let result = conn.immediate_transaction(f)?;
        let version = self.version.bump();
        tracing::debug!("Content version bumped to {}", version);
        Ok(result)
    }

    /// Like [`RuleStore::write`] but leaves the content version alone.
    pub fn write_untracked<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> ServiceResult<T>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.immediate_transaction(f)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::RuleStore;
    use crate::db;
    use tempfile::TempDir;

    /// Store backed by a throwaway SQLite file with all migrations applied.
    /// Keep the returned directory alive for the duration of the test.
    pub fn temp_store() -> (RuleStore, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("signage-test.db");
        let pool = db::create_pool(path.to_str().expect("utf-8 path")).expect("pool");
        db::run_migrations(&mut pool.get().expect("connection")).expect("migrations");
        (RuleStore::new(pool), dir)
    }
}
