/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Explicit per-session context.
//!
//! One [`SessionContext`] owns the view scope, the cache and the cycle
//! constants for a signed-in session. Nothing is global: two contexts over two
//! stores (or two tests) never see each other's state.

use std::sync::Arc;

use crate::cache::{scoped_key, CacheEntry, CacheError, CacheKey, CacheKind, ScopedCache};
use crate::config::CycleConfig;
use crate::date::DateRange;
use crate::scope::{ScopeError, ScopeId, ViewScopeManager};
use crate::store::KeyValueStore;

/// View scope + cache + config for one session.
#[derive(Debug)]
pub struct SessionContext {
    scope: ViewScopeManager,
    cache: ScopedCache,
    config: CycleConfig,
}

impl SessionContext {
    /// Context over `store` with the standard [`CycleConfig`].
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, CycleConfig::default())
    }

    /// Context over `store` with explicit constants.
    pub fn with_config(store: Arc<dyn KeyValueStore>, config: CycleConfig) -> Self {
        Self {
            scope: ViewScopeManager::new(store.clone()),
            cache: ScopedCache::new(store),
            config,
        }
    }

    /// The view scope manager.
    pub fn scope(&self) -> &ViewScopeManager {
        &self.scope
    }

    /// The raw cache. Prefer the scoped helpers below.
    pub fn cache(&self) -> &ScopedCache {
        &self.cache
    }

    /// Cycle constants.
    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Key for `kind` under the *current* scope. Fails while the scope is unresolved.
    pub fn cache_key(&self, kind: &str, range: Option<&DateRange>) -> Result<CacheKey, ScopeError> {
        let scope = self.scope.current_scope()?;
        Ok(scoped_key(&scope, kind, range))
    }

    /// Snapshot of `T` under the current scope; a miss while unresolved.
    pub async fn cached<T: CacheKind>(&self, range: Option<&DateRange>) -> Option<CacheEntry<T>> {
        let key = self.cache_key(T::KIND, range).ok()?;
        self.cache.get_cached_data(&key).await
    }

    /// Snapshot of `T` under an explicit scope.
    pub async fn cached_for<T: CacheKind>(
        &self,
        scope: &ScopeId,
        range: Option<&DateRange>,
    ) -> Option<CacheEntry<T>> {
        self.cache
            .get_cached_data(&scoped_key(scope, T::KIND, range))
            .await
    }

    /// Drop the snapshot of `T` for `scope`.
    pub async fn invalidate_for<T: CacheKind>(
        &self,
        scope: &ScopeId,
        range: Option<&DateRange>,
    ) -> Result<(), CacheError> {
        self.cache.invalidate(&scoped_key(scope, T::KIND, range)).await
    }

    /// Overwrite the snapshot of `T` for the scope the data was fetched under.
    pub async fn write_snapshot<T: CacheKind>(
        &self,
        scope: &ScopeId,
        range: Option<&DateRange>,
        value: &T,
    ) -> Result<(), CacheError> {
        self.cache
            .set_cached_data(&scoped_key(scope, T::KIND, range), value)
            .await
    }
}
