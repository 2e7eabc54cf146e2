use super::inspect::{ColumnMap, inspect_columns, table_fingerprint};
use crate::client::GenericClient;
use crate::error::ResourceResult;
use crate::ident::Ident;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// How a [`SchemaCache::load`] call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLoad {
    /// Caching disabled; read straight from the catalog.
    Uncached,
    /// Entry younger than the TTL.
    CacheHit,
    /// Entry expired but the table fingerprint was unchanged.
    Revalidated,
    /// Loaded from the catalog (missing entry or fingerprint changed).
    Refreshed,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    columns: Arc<ColumnMap>,
    fingerprint: String,
    checked_at: Instant,
}

#[derive(Debug)]
enum Probe {
    Fresh(Arc<ColumnMap>),
    Stale { fingerprint: String },
    Miss,
}

/// Per-table memo of [`ColumnMap`]s with a bounded TTL.
///
/// A zero TTL turns the cache off: every load reads the catalog. Expired
/// entries are revalidated against the table fingerprint before being
/// reloaded, and [`SchemaCache::invalidate`] drops an entry outright when a
/// statement reports schema drift.
#[derive(Debug)]
pub struct SchemaCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::disabled()
    }
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve the column map for `table`.
    pub async fn load<C: GenericClient>(
        &self,
        conn: &C,
        table: &Ident,
    ) -> ResourceResult<(Arc<ColumnMap>, SchemaLoad)> {
        if !self.is_enabled() {
            let columns = inspect_columns(conn, table).await?;
            return Ok((Arc::new(columns), SchemaLoad::Uncached));
        }

        let key = table.to_sql();
        match self.probe(&key, Instant::now()) {
            Probe::Fresh(columns) => return Ok((columns, SchemaLoad::CacheHit)),
            Probe::Stale { fingerprint } => {
                let current = table_fingerprint(conn, table).await?;
                if current == fingerprint {
                    if let Some(columns) = self.renew(&key, Instant::now()) {
                        return Ok((columns, SchemaLoad::Revalidated));
                    }
                }
            }
            Probe::Miss => {}
        }

        let fingerprint = table_fingerprint(conn, table).await?;
        let columns = Arc::new(inspect_columns(conn, table).await?);
        // An empty map may be a table that is about to be created; don't pin it.
        if !columns.is_empty() {
            self.store(key, columns.clone(), fingerprint, Instant::now());
        }
        Ok((columns, SchemaLoad::Refreshed))
    }

    /// Forget the cached columns of `table`.
    pub fn invalidate(&self, table: &Ident) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&table.to_sql());
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn probe(&self, key: &str, now: Instant) -> Probe {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.checked_at) < self.ttl => {
                Probe::Fresh(entry.columns.clone())
            }
            Some(entry) => Probe::Stale {
                fingerprint: entry.fingerprint.clone(),
            },
            None => Probe::Miss,
        }
    }

    fn renew(&self, key: &str, now: Instant) -> Option<Arc<ColumnMap>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get_mut(key)?;
        entry.checked_at = now;
        Some(entry.columns.clone())
    }

    fn store(&self, key: String, columns: Arc<ColumnMap>, fingerprint: String, now: Instant) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                columns,
                fingerprint,
                checked_at: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn columns() -> Arc<ColumnMap> {
        Arc::new([("id", ColumnType::named("uuid"))].into_iter().collect())
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let cache = SchemaCache::disabled();
        assert!(!cache.is_enabled());
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_is_fresh_within_ttl() {
        let cache = SchemaCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.store("items".into(), columns(), "fp1".into(), t0);

        match cache.probe("items", t0 + Duration::from_secs(59)) {
            Probe::Fresh(cols) => assert!(cols.contains("id")),
            other => panic!("expected fresh entry, got {other:?}"),
        }
    }

    #[test]
    fn entry_goes_stale_after_ttl() {
        let cache = SchemaCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.store("items".into(), columns(), "fp1".into(), t0);

        match cache.probe("items", t0 + Duration::from_secs(60)) {
            Probe::Stale { fingerprint } => assert_eq!(fingerprint, "fp1"),
            other => panic!("expected stale entry, got {other:?}"),
        }
    }

    #[test]
    fn renew_resets_the_clock() {
        let cache = SchemaCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.store("items".into(), columns(), "fp1".into(), t0);

        let t1 = t0 + Duration::from_secs(90);
        assert!(cache.renew("items", t1).is_some());
        assert!(matches!(
            cache.probe("items", t1 + Duration::from_secs(30)),
            Probe::Fresh(_)
        ));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = SchemaCache::new(Duration::from_secs(60));
        cache.store("items".into(), columns(), "fp1".into(), Instant::now());
        assert_eq!(cache.len(), 1);

        cache.invalidate(&Ident::parse("items").unwrap());
        assert!(matches!(cache.probe("items", Instant::now()), Probe::Miss));
    }
}
