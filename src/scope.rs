/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Whose cycle the signed-in viewer is looking at.
//!
//! ```text
//!              set_view_mode(SELF)
//!            ┌──────────────────────► Own { viewer }
//! Unresolved ┤
//!            └──────────────────────► Other { viewer, viewed_user_id }
//!              set_view_mode(OTHER, id)
//! ```
//!
//! The record is persisted per *viewer* email, so several accounts on one
//! device each keep their own last view. Reads of the in-memory record are
//! synchronous; they may be stale until [`ViewScopeManager::load_stored_view_mode_record`]
//! completes.
//!
//! # Invariants
//!
//! - `Other` always carries a non-empty `viewed_user_id`; anything else is rejected.
//! - `Own` never carries a viewed user.
//! - No [`ScopeId`] exists for an unresolved or incomplete record, so nothing can be
//!   fetched or cached under an undefined scope.
//! - The latest call wins. Every mutation takes a generation number; a call that
//!   resumes after a newer one started never overwrites the in-memory record.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{build_cache_key, CacheError, CacheKey, CacheKind, ScopedCache};
use crate::store::KeyValueStore;

// ─── ViewMode ────────────────────────────────────────────────────────────────

/// `SELF` or `OTHER` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewMode {
    /// The viewer tracks their own cycle.
    #[serde(rename = "SELF")]
    Own,
    /// The viewer has delegated access to another person's cycle.
    #[serde(rename = "OTHER")]
    Other,
}

/// Persisted view selection for one viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModeRecord {
    /// Selected mode.
    pub mode: ViewMode,
    /// The signed-in viewer. Also the storage key.
    pub viewer_email: String,
    /// Backend id of the viewed account; required for `Other`.
    #[serde(default)]
    pub viewed_user_id: Option<String>,
    /// Display email of the viewed account.
    #[serde(default)]
    pub viewed_user_email: Option<String>,
    /// `true` once the record has reached the store.
    #[serde(default)]
    pub persisted: bool,
}

impl ViewModeRecord {
    /// The scope this record selects.
    pub fn scope(&self) -> Result<ScopeId, ScopeError> {
        match self.mode {
            ViewMode::Own => Ok(ScopeId::own(&self.viewer_email)),
            ViewMode::Other => match self.viewed_user_id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => Ok(ScopeId::delegated(&self.viewer_email, id)),
                _ => Err(ScopeError::MissingViewedUser {
                    viewer_email: self.viewer_email.clone(),
                }),
            },
        }
    }

    /// `true` if the record can produce a scope.
    pub fn is_complete(&self) -> bool {
        self.scope().is_ok()
    }
}

impl CacheKind for ViewModeRecord {
    const KIND: &'static str = "view-mode";
    const VERSION: u16 = 1;
}

/// Arguments to [`ViewScopeManager::set_view_mode`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewModeOptions {
    /// The signed-in viewer.
    pub viewer_email: String,
    /// Viewed account id, required for `Other`.
    pub viewed_user_id: Option<String>,
    /// Viewed account email.
    pub viewed_user_email: Option<String>,
}

impl ViewModeOptions {
    /// Options for `viewer_email` viewing their own data.
    pub fn new(viewer_email: impl Into<String>) -> Self {
        Self {
            viewer_email: viewer_email.into(),
            ..Self::default()
        }
    }

    /// Builder: target another account.
    pub fn viewing(mut self, user_id: impl Into<String>, user_email: Option<String>) -> Self {
        self.viewed_user_id = Some(user_id.into());
        self.viewed_user_email = user_email;
        self
    }
}

// ─── ScopeId ─────────────────────────────────────────────────────────────────

/// Identity of the active view scope. Part of every scoped cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeId {
    /// Viewer's own data.
    Own {
        /// Normalised viewer email.
        viewer_email: String,
    },
    /// Another account viewed by the viewer.
    Delegated {
        /// Normalised viewer email.
        viewer_email: String,
        /// Viewed account id.
        viewed_user_id: String,
    },
}

impl ScopeId {
    /// Scope for the viewer's own data.
    pub fn own(viewer_email: &str) -> Self {
        ScopeId::Own {
            viewer_email: normalize_email(viewer_email),
        }
    }

    /// Scope for another account.
    pub fn delegated(viewer_email: &str, viewed_user_id: &str) -> Self {
        ScopeId::Delegated {
            viewer_email: normalize_email(viewer_email),
            viewed_user_id: viewed_user_id.trim().to_owned(),
        }
    }

    /// The viewed account id for a delegated scope.
    pub fn viewed_user_id(&self) -> Option<&str> {
        match self {
            ScopeId::Own { .. } => None,
            ScopeId::Delegated { viewed_user_id, .. } => Some(viewed_user_id),
        }
    }

    /// Key prefix parts, e.g. `["self", "a@b.c"]`.
    pub fn key_parts(&self) -> Vec<String> {
        match self {
            ScopeId::Own { viewer_email } => vec!["self".to_owned(), viewer_email.clone()],
            ScopeId::Delegated {
                viewer_email,
                viewed_user_id,
            } => vec![
                "other".to_owned(),
                viewer_email.clone(),
                viewed_user_id.clone(),
            ],
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Own { viewer_email } => write!(f, "self:{viewer_email}"),
            ScopeId::Delegated {
                viewer_email,
                viewed_user_id,
            } => write!(f, "other:{viewer_email}:{viewed_user_id}"),
        }
    }
}

/// Why no scope is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// No view mode has been set or loaded.
    #[error("view scope is unresolved")]
    Unresolved,
    /// `OTHER` was requested without a viewed user id.
    #[error("OTHER view mode for `{viewer_email}` has no viewed user id")]
    MissingViewedUser {
        /// Viewer that made the request.
        viewer_email: String,
    },
    /// The viewer email was empty.
    #[error("viewer email must not be empty")]
    MissingViewerEmail,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ─── ViewScopeManager ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ViewState {
    record: Option<ViewModeRecord>,
    generation: u64,
}

impl ViewState {
    /// Replace the record and start a new generation.
    fn replace(&mut self, record: Option<ViewModeRecord>) -> u64 {
        self.record = record;
        self.generation += 1;
        self.generation
    }
}

/// Tracks and persists the active view mode.
pub struct ViewScopeManager {
    cache: ScopedCache,
    current: Mutex<ViewState>,
}

impl ViewScopeManager {
    /// Manager over a shared store, starting unresolved.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            cache: ScopedCache::new(store),
            current: Mutex::new(ViewState::default()),
        }
    }

    /// Store key for a viewer's record.
    pub fn record_key(viewer_email: &str) -> CacheKey {
        build_cache_key(["view-mode", normalize_email(viewer_email).as_str()])
    }

    /// The in-memory record, `None` while unresolved. Never suspends.
    pub fn get_current_view_mode_record(&self) -> Option<ViewModeRecord> {
        self.lock().record.clone()
    }

    /// The active scope, or why there is none.
    pub fn current_scope(&self) -> Result<ScopeId, ScopeError> {
        self.lock()
            .record
            .as_ref()
            .ok_or(ScopeError::Unresolved)
            .and_then(ViewModeRecord::scope)
    }

    /// Switch mode. `Other` without a viewed user id is rejected and leaves state untouched.
    ///
    /// The in-memory record is updated before the store write; a failed write is
    /// logged and reported through `persisted = false`. If a newer switch starts
    /// while the write is pending, the newer record stays current and is written
    /// again so the store ends on it too.
    pub async fn set_view_mode(
        &self,
        mode: ViewMode,
        options: ViewModeOptions,
    ) -> Result<ViewModeRecord, ScopeError> {
        let viewer_email = normalize_email(&options.viewer_email);
        if viewer_email.is_empty() {
            warn!("set_view_mode called without a viewer email");
            return Err(ScopeError::MissingViewerEmail);
        }

        let mut record = match mode {
            ViewMode::Own => ViewModeRecord {
                mode,
                viewer_email,
                viewed_user_id: None,
                viewed_user_email: None,
                persisted: false,
            },
            ViewMode::Other => ViewModeRecord {
                mode,
                viewer_email,
                viewed_user_id: options
                    .viewed_user_id
                    .map(|id| id.trim().to_owned())
                    .filter(|id| !id.is_empty()),
                viewed_user_email: options.viewed_user_email,
                persisted: false,
            },
        };

        let scope = match record.scope() {
            Ok(scope) => scope,
            Err(err) => {
                warn!(viewer = %record.viewer_email, "rejecting OTHER view mode without viewed user id");
                return Err(err);
            }
        };

        let generation = self.lock().replace(Some(record.clone()));

        let key = Self::record_key(&record.viewer_email);
        let mut stored = record.clone();
        stored.persisted = true;
        match self.cache.set_cached_data(&key, &stored).await {
            Ok(()) => record = stored,
            Err(err) => warn!(scope = %scope, error = %err, "view mode not persisted"),
        }

        let superseded = {
            let mut state = self.lock();
            if state.generation == generation {
                state.record = Some(record.clone());
                None
            } else {
                state.record.clone()
            }
        };
        if let Some(latest) = superseded {
            debug!(scope = %scope, "view mode superseded while persisting");
            self.repersist(&key, latest).await;
        }

        info!(scope = %scope, persisted = record.persisted, "view mode set");
        Ok(record)
    }

    /// Read the stored record for `viewer_email` and make it current.
    ///
    /// A missing or invalid record leaves the manager unresolved.
    pub async fn load_stored_view_mode_record(&self, viewer_email: &str) -> Option<ViewModeRecord> {
        let started = self.lock().generation;
        let record = self.peek_stored_view_mode_record(viewer_email).await;
        let mut state = self.lock();
        if state.generation != started {
            debug!("view mode changed while loading, keeping the newer record");
            return record;
        }
        state.replace(record.clone());
        drop(state);
        debug!(viewer = %normalize_email(viewer_email), found = record.is_some(), "view mode loaded");
        record
    }

    /// Read the stored record without touching in-memory state.
    pub async fn peek_stored_view_mode_record(&self, viewer_email: &str) -> Option<ViewModeRecord> {
        let key = Self::record_key(viewer_email);
        let record = self.cache.get_cached_data::<ViewModeRecord>(&key).await?.value;
        if let Err(err) = record.scope() {
            warn!(error = %err, "discarding incomplete stored view mode");
            return None;
        }
        Some(record)
    }

    /// Forget the viewer's stored record and reset to unresolved. Used on sign-out.
    pub async fn clear_view_mode(&self, viewer_email: &str) -> Result<(), CacheError> {
        self.lock().replace(None);
        self.cache.invalidate(&Self::record_key(viewer_email)).await
    }

    /// Write the newer record over a superseded one, if it belongs to the same viewer.
    async fn repersist(&self, key: &CacheKey, mut latest: ViewModeRecord) {
        if Self::record_key(&latest.viewer_email) != *key {
            return;
        }
        latest.persisted = true;
        if let Err(err) = self.cache.set_cached_data(key, &latest).await {
            warn!(error = %err, "newer view mode not persisted");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ViewScopeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewScopeManager")
            .field("current", &self.lock().record)
            .finish()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
