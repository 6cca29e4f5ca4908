//! # cycle-core
//!
//! Cycle prediction, phase classification and view-scoped caching for period
//! tracking apps.
//!
//! ---
//!
//! ## Two halves, one rule
//!
//! **The engine is pure.** Given logged periods, the user's settings and a date,
//! it projects the next period, ovulation and the fertile window, and classifies
//! any day into one of four phases. No I/O, no clock, no state: the same inputs
//! always give the same answer. Sparse history never fails; it falls back to a
//! 28-day cycle and a 5-day period.
//!
//! **The session layer is scoped.** A viewer either looks at their own cycle
//! (`SELF`) or at someone who granted them access (`OTHER`). Every cached
//! snapshot is keyed by that scope, so switching from one to the other can never
//! surface the previous person's data.
//! > "No scope, no fetch."
//!
//! ---
//!
//! ## The pipeline
//!
//! ```text
//! ViewScopeManager → ScopeId → ScopedCache (snapshot) → backend fetch
//!                                                            ↓
//!                    ScopedCache (overwrite) ← CycleView ← PredictionEngine
//!                                                 ↑
//!                                          PhaseClassifier
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`prediction`] | [`CyclePredictions`] | Effective lengths and forward projection of the next period |
//! | [`phase`] | [`CyclePhase`], [`PhaseDetail`], [`PhaseMatch`] | Four-phase classifier with explicit precedence |
//! | [`scope`] | [`ViewScopeManager`], [`ViewModeRecord`], [`ScopeId`] | SELF / OTHER view mode, persisted per viewer |
//! | [`cache`] | [`ScopedCache`], [`CacheKey`], [`CacheKind`] | Typed, versioned snapshot cache with injective keys |
//! | [`session`] | [`SessionContext`] | Explicit per-session context (no globals) |
//! | [`refresh`] | [`ScreenLoader`], [`RefreshGuard`] | Cache-first loading with in-flight and staleness guards |
//! | [`backend`] | [`CycleBackend`], [`TokenProvider`] | Remote collaborator seams |
//! | [`store`] | [`KeyValueStore`], [`MemoryStore`] | Device-local storage seam |
//! | [`model`] | [`PeriodRecord`], [`UserSettings`] | Backend records |
//! | [`date`] | [`DateRange`] | Local-midnight day arithmetic and wire date parsing |
//! | [`config`] | [`CycleConfig`] | Tunable cycle constants |
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.
//!
//! ## License
//!
//! Business Source License 1.1. Free for evaluation and non-production use.
//! Commercial production use requires a license from Flout Labs (cbyrne@floutlabs.com).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod cache;
pub mod config;
pub mod date;
pub mod model;
pub mod phase;
pub mod prediction;
pub mod refresh;
pub mod scope;
pub mod session;
pub mod store;

pub use backend::{BackendError, CycleBackend, TokenProvider};
pub use cache::{build_cache_key, CacheEntry, CacheError, CacheKey, CacheKind, ScopedCache};
pub use config::{ConfigError, CycleConfig};
pub use date::DateRange;
pub use model::{
    CyclePredictions, FlowLevel, MoodEntry, NewPeriod, PeriodRecord, ReminderStatus, SymptomEntry,
    UserSettings,
};
pub use phase::{
    get_day_info, get_period_day_info, get_phase_details_for_date, CyclePhase, DayInfo,
    PeriodDayInfo, PhaseDetail, PhaseMatch,
};
pub use prediction::calculate_predictions;
pub use refresh::{CycleView, LoadError, LoadEvent, LoadStatus, RefreshGuard, ScreenLoader};
pub use scope::{ScopeError, ScopeId, ViewMode, ViewModeOptions, ViewModeRecord, ViewScopeManager};
pub use session::SessionContext;
pub use store::{KeyValueStore, MemoryStore, StoreError};
