/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Remote collaborators: the REST backend and the session token provider.
//!
//! Only the seams live here. The host app implements them over its HTTP client
//! and identity SDK; the engine itself never calls them.

use async_trait::async_trait;

use crate::date::DateRange;
use crate::model::{
    MoodEntry, NewPeriod, PeriodRecord, ReminderStatus, SymptomEntry, UserSettings,
};
use crate::scope::ScopeId;

/// Failure of a backend or token call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No valid session, or the token was refused.
    #[error("not authorized")]
    Unauthorized,
    /// The server answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },
    /// The request did not complete.
    #[error("network error: {0}")]
    Transport(String),
    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Supplies a bearer token before each backend call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid bearer token.
    async fn bearer_token(&self) -> Result<String, BackendError>;
}

/// CRUD surface of the cycle backend. Every call is made on behalf of `scope`:
/// for a delegated scope the implementation targets `scope.viewed_user_id()`.
#[async_trait]
pub trait CycleBackend: Send + Sync {
    /// All logged periods.
    async fn fetch_periods(&self, token: &str, scope: &ScopeId)
        -> Result<Vec<PeriodRecord>, BackendError>;

    /// User settings.
    async fn fetch_settings(&self, token: &str, scope: &ScopeId)
        -> Result<UserSettings, BackendError>;

    /// Symptoms logged within `range`.
    async fn fetch_symptoms(
        &self,
        token: &str,
        scope: &ScopeId,
        range: &DateRange,
    ) -> Result<Vec<SymptomEntry>, BackendError>;

    /// Moods logged within `range`.
    async fn fetch_moods(
        &self,
        token: &str,
        scope: &ScopeId,
        range: &DateRange,
    ) -> Result<Vec<MoodEntry>, BackendError>;

    /// Current reminder state.
    async fn fetch_reminder_status(&self, token: &str, scope: &ScopeId)
        -> Result<ReminderStatus, BackendError>;

    /// Ask the backend to generate a new reminder.
    async fn generate_reminder(&self, token: &str, scope: &ScopeId)
        -> Result<ReminderStatus, BackendError>;

    /// Log a new period.
    async fn create_period(
        &self,
        token: &str,
        scope: &ScopeId,
        period: &NewPeriod,
    ) -> Result<PeriodRecord, BackendError>;
}
