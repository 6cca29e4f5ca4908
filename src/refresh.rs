/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Cache-first screen loading.
//!
//! # Read path
//!
//! ```text
//! current scope ──(unresolved? refuse)──► try_begin(screen, scope) ──(busy? drop)──┐
//!   ┌──────────────────────────────────────────────────────────────────────────────┘
//!   ├─► cached snapshot ──► LoadEvent::Cached
//!   └─► token + backend ──► ok  ──► overwrite cache ──(ticket current?)──► LoadEvent::Fresh
//!                       └─► err ──► LoadEvent::Failed { last known view }
//! ```
//!
//! # Invariants
//!
//! - At most one refresh per (screen, scope) is in flight; extra requests are dropped.
//! - A response older than the newest request started for its screen never
//!   replaces in-memory state. Its cache write still happens, keyed by its own scope.
//!   A failure of such a request is reported as stale, never as `Failed`.
//! - Predictions are derived from records on every load, cached or fresh.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::backend::{BackendError, CycleBackend, TokenProvider};
use crate::cache::{CacheEntry, CacheKind};
use crate::config::CycleConfig;
use crate::date::DateRange;
use crate::model::{
    CyclePredictions, MoodEntry, NewPeriod, PeriodRecord, ReminderStatus, SymptomEntry,
    UserSettings,
};
use crate::phase::{
    get_day_info, get_period_day_info, get_phase_details_for_date, DayInfo, PeriodDayInfo,
    PhaseDetail,
};
use crate::prediction::calculate_predictions_with;
use crate::scope::{ScopeError, ScopeId};
use crate::session::SessionContext;

/// Screen name for the cycle overview.
pub const OVERVIEW_SCREEN: &str = "overview";
/// Screen name for the symptom log.
pub const SYMPTOMS_SCREEN: &str = "symptoms";
/// Screen name for the mood log.
pub const MOODS_SCREEN: &str = "moods";
/// Screen name for the reminder card.
pub const REMINDER_SCREEN: &str = "reminder";

// ─── Events and outcomes ─────────────────────────────────────────────────────

/// What a screen should render next.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadEvent<V> {
    /// Snapshot from the cache, shown while the fetch runs.
    Cached(V),
    /// Authoritative data from the backend.
    Fresh(V),
    /// The fetch failed; keep showing `fallback` with an inline message.
    Failed {
        /// Human-readable reason.
        message: String,
        /// Last known value for this scope, if any.
        fallback: Option<V>,
    },
}

/// How a load ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// Fresh data was applied.
    Refreshed,
    /// Another refresh for the same screen and scope was running; this one was dropped.
    AlreadyInFlight,
    /// The response (or failure) arrived after a newer request and was not applied.
    Stale,
    /// The backend call failed; a `Failed` event was emitted.
    Failed(BackendError),
}

/// Errors that stop a load or a write before it starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// No usable scope.
    #[error(transparent)]
    Scope(#[from] ScopeError),
    /// A write call (create period, generate reminder) failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

// ─── RefreshGuard ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct GuardState {
    in_flight: HashSet<(&'static str, ScopeId)>,
    latest: HashMap<&'static str, u64>,
}

/// In-flight flags and request sequence numbers for a set of screens.
#[derive(Debug, Default)]
pub struct RefreshGuard {
    state: Mutex<GuardState>,
}

impl RefreshGuard {
    /// An idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh, or `None` if one is already running for this screen and scope.
    pub fn try_begin(&self, screen: &'static str, scope: &ScopeId) -> Option<RefreshTicket<'_>> {
        let mut state = self.lock();
        if !state.in_flight.insert((screen, scope.clone())) {
            return None;
        }
        let seq = state.latest.entry(screen).or_insert(0);
        *seq += 1;
        Some(RefreshTicket {
            guard: self,
            screen,
            scope: scope.clone(),
            seq: *seq,
        })
    }

    /// `true` while a refresh for this screen and scope is running.
    pub fn is_in_flight(&self, screen: &'static str, scope: &ScopeId) -> bool {
        self.lock().in_flight.contains(&(screen, scope.clone()))
    }

    fn is_latest(&self, screen: &'static str, seq: u64) -> bool {
        self.lock().latest.get(screen).copied() == Some(seq)
    }

    fn finish(&self, screen: &'static str, scope: &ScopeId) {
        self.lock().in_flight.remove(&(screen, scope.clone()));
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of an in-flight refresh. Clears the flag on drop.
#[derive(Debug)]
pub struct RefreshTicket<'a> {
    guard: &'a RefreshGuard,
    screen: &'static str,
    scope: ScopeId,
    seq: u64,
}

impl RefreshTicket<'_> {
    /// Sequence number within the screen.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Scope the refresh was started under.
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// `false` once a newer refresh has started for the same screen.
    pub fn is_current(&self) -> bool {
        self.guard.is_latest(self.screen, self.seq)
    }
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        self.guard.finish(self.screen, &self.scope);
    }
}

// ─── CycleView ───────────────────────────────────────────────────────────────

/// Everything the overview screen renders, derived from periods and settings.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleView {
    /// Scope the records belong to.
    pub scope: ScopeId,
    /// Logged periods as received.
    pub periods: Vec<PeriodRecord>,
    /// Settings as received.
    pub settings: UserSettings,
    /// Derived predictions.
    pub predictions: CyclePredictions,
    /// Day the view was derived for.
    pub today: NaiveDate,
    /// Phase of `today`.
    pub phase: PhaseDetail,
    /// Calendar flags for `today`.
    pub day_info: DayInfo,
    /// Position inside a logged period, if `today` is in one.
    pub period_day: Option<PeriodDayInfo>,
    /// When the records were cached; `None` for fresh data.
    pub stored_at: Option<DateTime<Utc>>,
}

impl CycleView {
    /// Derive the view for `today`.
    pub fn derive(
        scope: ScopeId,
        periods: Vec<PeriodRecord>,
        settings: UserSettings,
        today: NaiveDate,
        config: &CycleConfig,
    ) -> Self {
        let predictions = calculate_predictions_with(&periods, &settings, today, config);
        let phase = get_phase_details_for_date(today, &periods, &predictions, &settings);
        let day_info = get_day_info(today, &periods, &predictions);
        let period_day = get_period_day_info(today, &periods, predictions.period_length);
        Self {
            scope,
            periods,
            settings,
            predictions,
            today,
            phase,
            day_info,
            period_day,
            stored_at: None,
        }
    }
}

// ─── ScreenLoader ────────────────────────────────────────────────────────────

/// Loads screen data for one session through the cache-first read path.
pub struct ScreenLoader<B, T> {
    session: Arc<SessionContext>,
    backend: Arc<B>,
    tokens: Arc<T>,
    guard: RefreshGuard,
    overview: Mutex<Option<CycleView>>,
}

impl<B: CycleBackend, T: TokenProvider> ScreenLoader<B, T> {
    /// Loader for `session` over the given collaborators.
    pub fn new(session: Arc<SessionContext>, backend: Arc<B>, tokens: Arc<T>) -> Self {
        Self {
            session,
            backend,
            tokens,
            guard: RefreshGuard::new(),
            overview: Mutex::new(None),
        }
    }

    /// The session this loader reads for.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// The refresh guard, for inspecting in-flight state.
    pub fn guard(&self) -> &RefreshGuard {
        &self.guard
    }

    /// Last applied overview, if any.
    pub fn current_overview(&self) -> Option<CycleView> {
        self.lock_overview().clone()
    }

    /// Load the cycle overview for `today`.
    pub async fn load_overview(
        &self,
        today: NaiveDate,
        mut sink: impl FnMut(LoadEvent<CycleView>),
    ) -> Result<LoadStatus, LoadError> {
        let scope = self.session.scope().current_scope()?;
        let Some(ticket) = self.guard.try_begin(OVERVIEW_SCREEN, &scope) else {
            debug!(scope = %scope, "overview refresh already in flight, dropping");
            return Ok(LoadStatus::AlreadyInFlight);
        };
        let config = self.session.config().clone();

        let cached = self.cached_overview(&scope, today, &config).await;
        if let Some(view) = &cached {
            sink(LoadEvent::Cached(view.clone()));
        }

        let fetched = self.fetch_overview(&scope).await;
        let (periods, settings) = match fetched {
            Ok(records) => records,
            Err(err) => {
                warn!(scope = %scope, error = %err, "overview refresh failed");
                if !ticket.is_current() {
                    info!(scope = %scope, seq = ticket.seq(), "dropping failure of a superseded overview refresh");
                    return Ok(LoadStatus::Stale);
                }
                let fallback = self
                    .current_overview()
                    .filter(|v| v.scope == scope)
                    .or(cached);
                sink(LoadEvent::Failed {
                    message: err.to_string(),
                    fallback,
                });
                return Ok(LoadStatus::Failed(err));
            }
        };

        if let Err(err) = self.session.write_snapshot(&scope, None, &periods).await {
            warn!(scope = %scope, error = %err, "periods snapshot not cached");
        }
        if let Err(err) = self.session.write_snapshot(&scope, None, &settings).await {
            warn!(scope = %scope, error = %err, "settings snapshot not cached");
        }

        if !ticket.is_current() {
            info!(scope = %scope, seq = ticket.seq(), "discarding stale overview response");
            return Ok(LoadStatus::Stale);
        }

        let view = CycleView::derive(scope, periods, settings, today, &config);
        *self.lock_overview() = Some(view.clone());
        sink(LoadEvent::Fresh(view));
        Ok(LoadStatus::Refreshed)
    }

    /// Log a new period, then fold it into the cached history and the overview.
    ///
    /// Without a cached history the snapshot is left empty, so the next overview
    /// load shows nothing cached instead of a one-record history.
    pub async fn log_period(
        &self,
        period: NewPeriod,
        today: NaiveDate,
    ) -> Result<PeriodRecord, LoadError> {
        let scope = self.session.scope().current_scope()?;
        let token = self.tokens.bearer_token().await?;
        let created = self.backend.create_period(&token, &scope, &period).await?;
        info!(scope = %scope, id = %created.id, "period created");

        // Only a known full history may be extended; otherwise leave the cache cold.
        match self.session.cached_for::<Vec<PeriodRecord>>(&scope, None).await {
            Some(entry) => {
                let mut periods = entry.value;
                periods.retain(|p| p.id != created.id);
                periods.push(created.clone());
                if let Err(err) = self.session.write_snapshot(&scope, None, &periods).await {
                    warn!(scope = %scope, error = %err, "periods snapshot not cached");
                }
            }
            None => {
                debug!(scope = %scope, "no periods snapshot to extend");
                if let Err(err) = self.session.invalidate_for::<Vec<PeriodRecord>>(&scope, None).await {
                    warn!(scope = %scope, error = %err, "periods snapshot not cleared");
                }
            }
        }

        let mut overview = self.lock_overview();
        if let Some(view) = overview.as_mut().filter(|v| v.scope == scope) {
            let mut updated = view.periods.clone();
            updated.retain(|p| p.id != created.id);
            updated.push(created.clone());
            *view = CycleView::derive(
                scope,
                updated,
                view.settings.clone(),
                today,
                self.session.config(),
            );
        }
        Ok(created)
    }

    /// Load symptoms for `range`.
    pub async fn load_symptoms(
        &self,
        range: DateRange,
        sink: impl FnMut(LoadEvent<Vec<SymptomEntry>>),
    ) -> Result<LoadStatus, LoadError> {
        self.read_through(SYMPTOMS_SCREEN, Some(range), sink, |token, scope| async move {
            self.backend.fetch_symptoms(&token, &scope, &range).await
        })
        .await
    }

    /// Load moods for `range`.
    pub async fn load_moods(
        &self,
        range: DateRange,
        sink: impl FnMut(LoadEvent<Vec<MoodEntry>>),
    ) -> Result<LoadStatus, LoadError> {
        self.read_through(MOODS_SCREEN, Some(range), sink, |token, scope| async move {
            self.backend.fetch_moods(&token, &scope, &range).await
        })
        .await
    }

    /// Load the reminder status.
    pub async fn load_reminder(
        &self,
        sink: impl FnMut(LoadEvent<ReminderStatus>),
    ) -> Result<LoadStatus, LoadError> {
        self.read_through(REMINDER_SCREEN, None, sink, |token, scope| async move {
            self.backend.fetch_reminder_status(&token, &scope).await
        })
        .await
    }

    /// Ask the backend for a new reminder and cache the result.
    pub async fn generate_reminder(&self) -> Result<ReminderStatus, LoadError> {
        let scope = self.session.scope().current_scope()?;
        let token = self.tokens.bearer_token().await?;
        let status = self.backend.generate_reminder(&token, &scope).await?;
        if let Err(err) = self.session.write_snapshot(&scope, None, &status).await {
            warn!(scope = %scope, error = %err, "reminder snapshot not cached");
        }
        Ok(status)
    }

    async fn read_through<V, F, Fut>(
        &self,
        screen: &'static str,
        range: Option<DateRange>,
        mut sink: impl FnMut(LoadEvent<V>),
        fetch: F,
    ) -> Result<LoadStatus, LoadError>
    where
        V: CacheKind + Clone,
        F: FnOnce(String, ScopeId) -> Fut,
        Fut: Future<Output = Result<V, BackendError>>,
    {
        let scope = self.session.scope().current_scope()?;
        let Some(ticket) = self.guard.try_begin(screen, &scope) else {
            debug!(screen, scope = %scope, "refresh already in flight, dropping");
            return Ok(LoadStatus::AlreadyInFlight);
        };

        let cached = self
            .session
            .cached_for::<V>(&scope, range.as_ref())
            .await
            .map(|e| e.value);
        if let Some(value) = &cached {
            sink(LoadEvent::Cached(value.clone()));
        }

        let result = match self.tokens.bearer_token().await {
            Ok(token) => fetch(token, scope.clone()).await,
            Err(err) => Err(err),
        };
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                warn!(screen, scope = %scope, error = %err, "refresh failed");
                if !ticket.is_current() {
                    info!(screen, scope = %scope, seq = ticket.seq(), "dropping failure of a superseded refresh");
                    return Ok(LoadStatus::Stale);
                }
                sink(LoadEvent::Failed {
                    message: err.to_string(),
                    fallback: cached,
                });
                return Ok(LoadStatus::Failed(err));
            }
        };

        if let Err(err) = self.session.write_snapshot(&scope, range.as_ref(), &value).await {
            warn!(screen, scope = %scope, error = %err, "snapshot not cached");
        }
        if !ticket.is_current() {
            info!(screen, scope = %scope, seq = ticket.seq(), "discarding stale response");
            return Ok(LoadStatus::Stale);
        }
        sink(LoadEvent::Fresh(value));
        Ok(LoadStatus::Refreshed)
    }

    async fn cached_overview(
        &self,
        scope: &ScopeId,
        today: NaiveDate,
        config: &CycleConfig,
    ) -> Option<CycleView> {
        let periods: CacheEntry<Vec<PeriodRecord>> = self.session.cached_for(scope, None).await?;
        let settings = self
            .session
            .cached_for::<UserSettings>(scope, None)
            .await
            .map(|e| e.value)
            .unwrap_or_default();
        let mut view = CycleView::derive(scope.clone(), periods.value, settings, today, config);
        view.stored_at = Some(periods.stored_at);
        Some(view)
    }

    async fn fetch_overview(
        &self,
        scope: &ScopeId,
    ) -> Result<(Vec<PeriodRecord>, UserSettings), BackendError> {
        let token = self.tokens.bearer_token().await?;
        let periods = self.backend.fetch_periods(&token, scope).await?;
        let token = self.tokens.bearer_token().await?;
        let settings = self.backend.fetch_settings(&token, scope).await?;
        Ok((periods, settings))
    }

    fn lock_overview(&self) -> MutexGuard<'_, Option<CycleView>> {
        self.overview.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
