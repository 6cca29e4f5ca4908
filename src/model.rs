/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Records exchanged with the backend and the derived prediction value.
//!
//! Field names follow the backend's camelCase JSON. Dates go through
//! [`crate::date::serde_date`], so both `YYYY-MM-DD` and full timestamps are
//! accepted on input.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH};
use crate::date::{days_between, serde_date, DateRange};

/// Logged flow intensity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowLevel {
    /// Spotting only.
    Spotting,
    /// Light flow.
    Light,
    /// Medium flow.
    Medium,
    /// Heavy flow.
    Heavy,
}

/// A logged menstrual period. `end_date` is absent while the period is ongoing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRecord {
    /// Backend identifier.
    pub id: String,
    /// First day of bleeding.
    #[serde(with = "serde_date")]
    pub start_date: NaiveDate,
    /// Last day of bleeding, if the period has been closed.
    #[serde(default, with = "serde_date::option")]
    pub end_date: Option<NaiveDate>,
    /// Flow intensity, if logged.
    #[serde(default)]
    pub flow_level: Option<FlowLevel>,
}

impl PeriodRecord {
    /// An open-ended period starting on `start_date`.
    pub fn new(id: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            start_date,
            end_date: None,
            flow_level: None,
        }
    }

    /// Builder: close the period on `end_date`.
    pub fn with_end(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Builder: set the flow level.
    pub fn with_flow(mut self, flow: FlowLevel) -> Self {
        self.flow_level = Some(flow);
        self
    }

    /// `end − start` in days for a closed period.
    pub fn logged_length(&self) -> Option<i64> {
        self.end_date.map(|end| days_between(self.start_date, end))
    }
}

/// Per-user cycle settings. Every length is optional; absent, zero or
/// implausibly large values fall back to history, then to
/// [`crate::config::CycleConfig`] defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// User-entered average cycle length in days.
    #[serde(default)]
    pub average_cycle_length: Option<u32>,
    /// User-entered average period length in days.
    #[serde(default)]
    pub average_period_length: Option<u32>,
    /// Whether reminders are switched on.
    #[serde(default)]
    pub reminder_enabled: bool,
    /// Year of birth.
    #[serde(default)]
    pub birth_year: Option<i32>,
    /// Last period date given during onboarding.
    #[serde(default, with = "serde_date::option")]
    pub last_period_date: Option<NaiveDate>,
}

impl UserSettings {
    /// Settings carrying explicit averages.
    pub fn with_lengths(cycle: u32, period: u32) -> Self {
        Self {
            average_cycle_length: Some(cycle),
            average_period_length: Some(period),
            ..Self::default()
        }
    }
}

/// Forward-looking dates derived from history. Recomputed on every read, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePredictions {
    /// First day of the next expected period, strictly after "today".
    #[serde(with = "serde_date::option")]
    pub next_period_date: Option<NaiveDate>,
    /// Expected ovulation day.
    #[serde(with = "serde_date::option")]
    pub ovulation_date: Option<NaiveDate>,
    /// First day of the fertile window.
    #[serde(with = "serde_date::option")]
    pub fertile_window_start: Option<NaiveDate>,
    /// Last day of the fertile window (inclusive).
    #[serde(with = "serde_date::option")]
    pub fertile_window_end: Option<NaiveDate>,
    /// Effective cycle length in days.
    pub cycle_length: u32,
    /// Effective period length in days.
    pub period_length: u32,
}

impl CyclePredictions {
    /// Predictions with no projected dates and the given lengths.
    pub fn empty(cycle_length: u32, period_length: u32) -> Self {
        Self {
            next_period_date: None,
            ovulation_date: None,
            fertile_window_start: None,
            fertile_window_end: None,
            cycle_length,
            period_length,
        }
    }

    /// The predicted fertile window as an inclusive range.
    pub fn fertile_window(&self) -> Option<DateRange> {
        Some(DateRange::new(self.fertile_window_start?, self.fertile_window_end?))
    }

    /// `true` if `date` lies in `[ovulation_date, next_period_date)`.
    pub fn in_luteal_window(&self, date: NaiveDate) -> bool {
        match (self.ovulation_date, self.next_period_date) {
            (Some(ovulation), Some(next)) => ovulation <= date && date < next,
            _ => false,
        }
    }
}

impl Default for CyclePredictions {
    fn default() -> Self {
        Self::empty(DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH)
    }
}

/// Body of a "create period" request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeriod {
    /// First day of bleeding.
    #[serde(with = "serde_date")]
    pub start_date: NaiveDate,
    /// Last day, if already known.
    #[serde(default, with = "serde_date::option")]
    pub end_date: Option<NaiveDate>,
    /// Flow intensity, if logged.
    #[serde(default)]
    pub flow_level: Option<FlowLevel>,
}

/// A logged symptom on a given day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomEntry {
    /// Backend identifier.
    pub id: String,
    /// Day the symptom was logged for.
    #[serde(with = "serde_date")]
    pub date: NaiveDate,
    /// Symptom name, e.g. `"cramps"`.
    pub symptom: String,
    /// Optional severity on the backend's 1–5 scale.
    #[serde(default)]
    pub severity: Option<u8>,
}

/// A logged mood on a given day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    /// Backend identifier.
    pub id: String,
    /// Day the mood was logged for.
    #[serde(with = "serde_date")]
    pub date: NaiveDate,
    /// Mood label, e.g. `"calm"`.
    pub mood: String,
    /// Free-text note.
    #[serde(default)]
    pub note: Option<String>,
}

/// Reminder state as reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderStatus {
    /// Whether a reminder is scheduled.
    pub enabled: bool,
    /// Day the next reminder fires.
    #[serde(default, with = "serde_date::option")]
    pub next_reminder_date: Option<NaiveDate>,
    /// Generated reminder text.
    #[serde(default)]
    pub message: Option<String>,
}
