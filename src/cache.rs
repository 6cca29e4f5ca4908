/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Scope-partitioned, typed snapshot cache over a [`KeyValueStore`].
//!
//! # Envelope layout (JSON)
//!
//! ```text
//! {
//!   "kind":     "periods",              // CacheKind::KIND
//!   "version":  1,                      // CacheKind::VERSION
//!   "storedAt": "2024-01-20T08:00:00Z",
//!   "value":    [ … ]                   // the typed payload
//! }
//! ```
//!
//! The header is checked before the payload is decoded, so a format change
//! shows up as [`CacheError::VersionMismatch`] rather than a half-parsed value.
//!
//! # Invariants
//!
//! - Keys are injective over their parts: `["a","b"]`, `["ab"]` and `["a","b",""]` differ.
//! - Every screen key starts with the parts of a [`ScopeId`], so scopes never share entries.
//! - [`ScopedCache::get_cached_data`] never fails: any problem is a miss.
//! - Predictions are never cached; only the raw records they are derived from.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::date::DateRange;
use crate::model::{MoodEntry, PeriodRecord, ReminderStatus, SymptomEntry, UserSettings};
use crate::scope::ScopeId;
use crate::store::{KeyValueStore, StoreError};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// A composite cache key. Build with [`build_cache_key`] or [`scoped_key`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The encoded key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic, order-sensitive composite key.
///
/// Parts are encoded as a JSON string array, which quotes and escapes each part,
/// so no two different part sequences produce the same key.
pub fn build_cache_key<I, S>(parts: I) -> CacheKey
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let encoded = serde_json::Value::Array(
        parts
            .into_iter()
            .map(|p| serde_json::Value::String(p.as_ref().to_owned()))
            .collect(),
    );
    CacheKey(encoded.to_string())
}

/// Key for a data kind under a scope, optionally narrowed to a date range.
pub fn scoped_key(scope: &ScopeId, kind: &str, range: Option<&DateRange>) -> CacheKey {
    let mut parts = scope.key_parts();
    parts.push(kind.to_owned());
    if let Some(range) = range {
        parts.extend(range.key_parts());
    }
    build_cache_key(parts)
}

// ─── Typed kinds ─────────────────────────────────────────────────────────────

/// A value that may be cached. `VERSION` must be bumped on any breaking change
/// to the serialised shape.
pub trait CacheKind: Serialize + DeserializeOwned {
    /// Stable name stored in the envelope.
    const KIND: &'static str;
    /// Schema version stored in the envelope.
    const VERSION: u16;
}

impl CacheKind for Vec<PeriodRecord> {
    const KIND: &'static str = "periods";
    const VERSION: u16 = 1;
}

impl CacheKind for UserSettings {
    const KIND: &'static str = "settings";
    const VERSION: u16 = 1;
}

impl CacheKind for Vec<SymptomEntry> {
    const KIND: &'static str = "symptoms";
    const VERSION: u16 = 1;
}

impl CacheKind for Vec<MoodEntry> {
    const KIND: &'static str = "moods";
    const VERSION: u16 = 1;
}

impl CacheKind for ReminderStatus {
    const KIND: &'static str = "reminder";
    const VERSION: u16 = 1;
}

/// A decoded cache hit.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry<T> {
    /// Key the entry was read from.
    pub key: CacheKey,
    /// Decoded payload.
    pub value: T,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a, T> {
    kind: &'static str,
    version: u16,
    stored_at: DateTime<Utc>,
    value: &'a T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRaw {
    kind: String,
    version: u16,
    stored_at: DateTime<Utc>,
    value: serde_json::Value,
}

/// Why a cache entry could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The stored text is not a valid envelope or payload.
    #[error("malformed cache entry: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The value could not be serialised.
    #[error("cannot encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),
    /// The entry holds a different data kind.
    #[error("cache kind mismatch: expected `{expected}`, found `{found}`")]
    KindMismatch {
        /// Kind requested.
        expected: &'static str,
        /// Kind stored.
        found: String,
    },
    /// The entry was written by an incompatible schema version.
    #[error("cache version mismatch for `{kind}`: expected v{expected}, found v{found}")]
    VersionMismatch {
        /// Kind requested.
        kind: &'static str,
        /// Version this build understands.
        expected: u16,
        /// Version stored.
        found: u16,
    },
}

// ─── ScopedCache ─────────────────────────────────────────────────────────────

/// Read-through / write-through snapshot cache. Advisory only: its absence
/// or staleness never blocks a backend fetch.
#[derive(Clone)]
pub struct ScopedCache {
    store: Arc<dyn KeyValueStore>,
}

impl ScopedCache {
    /// Cache over a shared store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Best-effort read. Store errors, bad JSON, and kind or version mismatch are all misses.
    pub async fn get_cached_data<T: CacheKind>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        match self.try_get_cached_data(key).await {
            Ok(hit) => {
                debug!(key = %key, kind = T::KIND, hit = hit.is_some(), "cache read");
                hit
            }
            Err(err) => {
                warn!(key = %key, kind = T::KIND, error = %err, "cache entry unreadable, treating as miss");
                None
            }
        }
    }

    /// Read with the failure reason preserved.
    pub async fn try_get_cached_data<T: CacheKind>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry<T>>, CacheError> {
        let Some(raw) = self.store.get(key.as_str()).await? else {
            return Ok(None);
        };
        decode_entry(key, &raw).map(Some)
    }

    /// Unconditionally overwrite `key` with `value`.
    pub async fn set_cached_data<T: CacheKind>(
        &self,
        key: &CacheKey,
        value: &T,
    ) -> Result<(), CacheError> {
        let encoded = encode_entry(value, Utc::now())?;
        self.store.set(key.as_str(), encoded).await?;
        debug!(key = %key, kind = T::KIND, "cache write");
        Ok(())
    }

    /// Drop an entry.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.store.remove(key.as_str()).await?;
        Ok(())
    }
}

impl fmt::Debug for ScopedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCache").finish_non_exhaustive()
    }
}

fn encode_entry<T: CacheKind>(value: &T, stored_at: DateTime<Utc>) -> Result<String, CacheError> {
    serde_json::to_string(&EnvelopeRef {
        kind: T::KIND,
        version: T::VERSION,
        stored_at,
        value,
    })
    .map_err(CacheError::Encode)
}

fn decode_entry<T: CacheKind>(key: &CacheKey, raw: &str) -> Result<CacheEntry<T>, CacheError> {
    let envelope: EnvelopeRaw = serde_json::from_str(raw).map_err(CacheError::Malformed)?;
    if envelope.kind != T::KIND {
        return Err(CacheError::KindMismatch {
            expected: T::KIND,
            found: envelope.kind,
        });
    }
    if envelope.version != T::VERSION {
        return Err(CacheError::VersionMismatch {
            kind: T::KIND,
            expected: T::VERSION,
            found: envelope.version,
        });
    }
    let value = serde_json::from_value(envelope.value).map_err(CacheError::Malformed)?;
    Ok(CacheEntry {
        key: key.clone(),
        value,
        stored_at: envelope.stored_at,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cache() -> (Arc<MemoryStore>, ScopedCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ScopedCache::new(store.clone());
        (store, cache)
    }

    // ── Keys ──────────────────────────────────────────────────────────────

    #[test]
    fn test_build_cache_key_is_injective_on_examples() {
        let ab = build_cache_key(["a", "b"]);
        assert_ne!(ab, build_cache_key(["ab"]));
        assert_ne!(ab, build_cache_key(["a", "b", ""]));
        assert_ne!(ab, build_cache_key(["b", "a"]));
        assert_ne!(build_cache_key(["a,b"]), ab);
        assert_ne!(build_cache_key([r#"a",""#, "b"]), build_cache_key(["a", "", "b"]));
    }

    #[test]
    fn test_build_cache_key_deterministic() {
        assert_eq!(build_cache_key(["x", "y"]), build_cache_key(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(build_cache_key(["x", "y"]).as_str(), r#"["x","y"]"#);
    }

    #[test]
    fn test_scoped_key_includes_scope_and_range() {
        let own = ScopeId::own("me@example.com");
        let other = ScopeId::delegated("me@example.com", "user-42");
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 31));

        assert_ne!(scoped_key(&own, "periods", None), scoped_key(&other, "periods", None));
        assert_ne!(
            scoped_key(&own, "symptoms", Some(&range)),
            scoped_key(&own, "symptoms", None)
        );
        assert!(scoped_key(&other, "periods", None).as_str().contains("user-42"));
    }

    // ── Read / write ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_set_then_get_typed() {
        let (_, cache) = cache();
        let key = build_cache_key(["t", "periods"]);
        let periods = vec![PeriodRecord::new("p1", d(2024, 1, 1))];

        cache.set_cached_data(&key, &periods).await.unwrap();
        let hit = cache.get_cached_data::<Vec<PeriodRecord>>(&key).await.unwrap();
        assert_eq!(hit.value, periods);
        assert_eq!(hit.key, key);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let (_, cache) = cache();
        let key = build_cache_key(["t", "settings"]);
        cache.set_cached_data(&key, &UserSettings::with_lengths(28, 5)).await.unwrap();
        cache.set_cached_data(&key, &UserSettings::with_lengths(30, 4)).await.unwrap();
        let hit = cache.get_cached_data::<UserSettings>(&key).await.unwrap();
        assert_eq!(hit.value.average_cycle_length, Some(30));
    }

    #[tokio::test]
    async fn test_absent_key_is_miss() {
        let (_, cache) = cache();
        let key = build_cache_key(["nothing"]);
        assert!(cache.get_cached_data::<UserSettings>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_miss_not_error() {
        let (store, cache) = cache();
        let key = build_cache_key(["bad"]);
        store.insert_raw(key.as_str(), "{not json");
        assert!(cache.get_cached_data::<UserSettings>(&key).await.is_none());
        assert!(matches!(
            cache.try_get_cached_data::<UserSettings>(&key).await,
            Err(CacheError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unversioned_legacy_json_is_miss() {
        let (store, cache) = cache();
        let key = build_cache_key(["legacy"]);
        store.insert_raw(key.as_str(), r#"[{"id":"p1","startDate":"2024-01-01"}]"#);
        assert!(cache.get_cached_data::<Vec<PeriodRecord>>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_detectable() {
        let (store, cache) = cache();
        let key = build_cache_key(["v"]);
        store.insert_raw(
            key.as_str(),
            r#"{"kind":"settings","version":99,"storedAt":"2024-01-20T08:00:00Z","value":{}}"#,
        );
        let err = cache.try_get_cached_data::<UserSettings>(&key).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::VersionMismatch { kind: "settings", expected: 1, found: 99 }
        ));
        assert!(cache.get_cached_data::<UserSettings>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_miss() {
        let (_, cache) = cache();
        let key = build_cache_key(["k"]);
        cache.set_cached_data(&key, &ReminderStatus::default()).await.unwrap();
        let err = cache.try_get_cached_data::<UserSettings>(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::KindMismatch { expected: "settings", .. }));
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let (store, cache) = cache();
        let key = build_cache_key(["gone"]);
        cache.set_cached_data(&key, &UserSettings::default()).await.unwrap();
        cache.invalidate(&key).await.unwrap();
        assert!(store.is_empty());
    }
}
