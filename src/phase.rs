/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Cycle phase classification for an arbitrary date.
//!
//! - [`CyclePhase`]: the four phases of a cycle.
//! - [`PhaseMatch`]: one candidate range containing the date, tagged with where it came from.
//! - [`get_phase_details_for_date`]: resolves all candidates by precedence into a [`PhaseDetail`].
//! - [`get_day_info`] / [`get_period_day_info`]: calendar flags and day-of-period counters.
//!
//! # Invariants
//!
//! - Precedence is fixed: period > fertile > luteal > follicular. Within "period",
//!   a logged range beats the predicted next period.
//! - `is_predicted` is true whenever the winning range was projected rather than logged.
//! - Pure: identical inputs always yield the identical classification.

use chrono::NaiveDate;
use serde::Serialize;

use crate::date::{add_days, days_between, DateRange};
use crate::model::{CyclePredictions, PeriodRecord, UserSettings};
use crate::prediction::{settings_period_length, sorted_by_start};

// ─── CyclePhase ──────────────────────────────────────────────────────────────

/// Phase of the menstrual cycle.
///
/// ```text
///  day 1                 ovulation − 5 … ovulation + 1        next period
///    │ Menstrual │ Follicular │     Ovulation      │  Luteal  │
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CyclePhase {
    /// Bleeding days, logged or predicted.
    Menstrual,
    /// Between the end of a period and the fertile window.
    Follicular,
    /// The fertile window around predicted ovulation.
    Ovulation,
    /// From ovulation until the next period.
    Luteal,
}

/// Classification of a single date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDetail {
    /// Phase the date falls in.
    pub phase: CyclePhase,
    /// First day of the matched range.
    pub phase_start: NaiveDate,
    /// `true` if the match relied on a projected range.
    pub is_predicted: bool,
}

impl PhaseDetail {
    /// 1-based day within the phase for `date`.
    pub fn day_in_phase(&self, date: NaiveDate) -> i64 {
        days_between(self.phase_start, date) + 1
    }
}

// ─── PhaseMatch ──────────────────────────────────────────────────────────────

/// A range that contains the date under classification.
///
/// Several can hold at once (a logged period inside the predicted fertile
/// window, the overlap of fertile and luteal on ovulation day). [`PhaseMatch::resolve`]
/// picks the winner by [`PhaseMatch::precedence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseMatch {
    /// Inside a logged period.
    ActualPeriod {
        /// Logged start.
        start: NaiveDate,
    },
    /// Inside the predicted next period.
    PredictedPeriod {
        /// Predicted start.
        start: NaiveDate,
    },
    /// Inside the predicted fertile window.
    PredictedFertile {
        /// Window start.
        start: NaiveDate,
    },
    /// Inside `[ovulation, next period)`.
    PredictedLuteal {
        /// Ovulation date.
        start: NaiveDate,
    },
    /// None of the above.
    Follicular {
        /// Day after the preceding period.
        start: NaiveDate,
        /// `true` when `start` is derived from a logged period.
        anchored: bool,
    },
}

impl PhaseMatch {
    /// Lower wins.
    pub fn precedence(&self) -> u8 {
        match self {
            PhaseMatch::ActualPeriod { .. } => 0,
            PhaseMatch::PredictedPeriod { .. } => 1,
            PhaseMatch::PredictedFertile { .. } => 2,
            PhaseMatch::PredictedLuteal { .. } => 3,
            PhaseMatch::Follicular { .. } => 4,
        }
    }

    /// Highest-precedence candidate, or `None` for an empty set.
    pub fn resolve(candidates: impl IntoIterator<Item = PhaseMatch>) -> Option<PhaseMatch> {
        candidates.into_iter().min_by_key(PhaseMatch::precedence)
    }

    /// The phase this match classifies as.
    pub fn phase(&self) -> CyclePhase {
        match self {
            PhaseMatch::ActualPeriod { .. } | PhaseMatch::PredictedPeriod { .. } => {
                CyclePhase::Menstrual
            }
            PhaseMatch::PredictedFertile { .. } => CyclePhase::Ovulation,
            PhaseMatch::PredictedLuteal { .. } => CyclePhase::Luteal,
            PhaseMatch::Follicular { .. } => CyclePhase::Follicular,
        }
    }

    /// Start of the matched range.
    pub fn start(&self) -> NaiveDate {
        match *self {
            PhaseMatch::ActualPeriod { start }
            | PhaseMatch::PredictedPeriod { start }
            | PhaseMatch::PredictedFertile { start }
            | PhaseMatch::PredictedLuteal { start }
            | PhaseMatch::Follicular { start, .. } => start,
        }
    }

    /// Whether the range was projected rather than logged.
    pub fn is_predicted(&self) -> bool {
        match self {
            PhaseMatch::ActualPeriod { .. } => false,
            PhaseMatch::Follicular { anchored, .. } => !anchored,
            _ => true,
        }
    }

    /// Collapse into the public [`PhaseDetail`].
    pub fn into_detail(self) -> PhaseDetail {
        PhaseDetail {
            phase: self.phase(),
            phase_start: self.start(),
            is_predicted: self.is_predicted(),
        }
    }
}

// ─── Day flags ───────────────────────────────────────────────────────────────

/// Calendar flags for one date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayInfo {
    /// Inside a logged period.
    pub is_period: bool,
    /// Inside the predicted fertile window.
    pub is_fertile: bool,
    /// Inside the predicted luteal / PMS window.
    pub is_pms: bool,
}

/// Position of a date inside a logged period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDayInfo {
    /// 1 on the start date.
    pub day_number: u32,
    /// The period length the lookup was made with.
    pub period_length: u32,
}

/// Membership flags for `date` against logged periods and the predicted windows.
pub fn get_day_info(
    date: NaiveDate,
    periods: &[PeriodRecord],
    predictions: &CyclePredictions,
) -> DayInfo {
    DayInfo {
        is_period: get_period_day_info(date, periods, predictions.period_length).is_some(),
        is_fertile: predictions
            .fertile_window()
            .is_some_and(|w| w.contains(date)),
        is_pms: predictions.in_luteal_window(date),
    }
}

/// Locate the most recent logged period containing `date`.
///
/// A closed period contains `[start, end]`. An open-ended one, or one whose end
/// precedes its start, is assumed to last `period_length` days from its start.
pub fn get_period_day_info(
    date: NaiveDate,
    periods: &[PeriodRecord],
    period_length: u32,
) -> Option<PeriodDayInfo> {
    let period = containing_period(date, periods, period_length)?;
    let day = days_between(period.start_date, date) + 1;
    Some(PeriodDayInfo {
        day_number: u32::try_from(day).ok()?,
        period_length,
    })
}

// ─── Phase classification ────────────────────────────────────────────────────

/// Every range that contains `date`. The follicular fallback is always present.
pub fn candidate_matches(
    date: NaiveDate,
    periods: &[PeriodRecord],
    predictions: &CyclePredictions,
    period_length: u32,
) -> Vec<PhaseMatch> {
    let mut out = Vec::with_capacity(4);

    if let Some(p) = containing_period(date, periods, period_length) {
        out.push(PhaseMatch::ActualPeriod { start: p.start_date });
    }
    if let Some(next) = predictions.next_period_date {
        if predicted_period_range(next, period_length).contains(date) {
            out.push(PhaseMatch::PredictedPeriod { start: next });
        }
    }
    if let Some(window) = predictions.fertile_window().filter(|w| w.contains(date)) {
        out.push(PhaseMatch::PredictedFertile { start: window.start });
    }
    if let Some(ovulation) = predictions.ovulation_date.filter(|_| predictions.in_luteal_window(date)) {
        out.push(PhaseMatch::PredictedLuteal { start: ovulation });
    }
    out.push(follicular_match(date, periods, predictions, period_length));
    out
}

/// Classify `date` into a phase.
///
/// Period length comes from `settings` when set, otherwise from `predictions`.
pub fn get_phase_details_for_date(
    date: NaiveDate,
    periods: &[PeriodRecord],
    predictions: &CyclePredictions,
    settings: &UserSettings,
) -> PhaseDetail {
    let period_length = settings_period_length(settings).unwrap_or(predictions.period_length);

    PhaseMatch::resolve(candidate_matches(date, periods, predictions, period_length))
        .unwrap_or(PhaseMatch::Follicular { start: date, anchored: false })
        .into_detail()
}

/// An end before the start is treated as missing.
fn logged_range(period: &PeriodRecord, period_length: u32) -> DateRange {
    let end = period
        .end_date
        .filter(|&end| end >= period.start_date)
        .unwrap_or_else(|| add_days(period.start_date, i64::from(period_length.max(1)) - 1));
    DateRange { start: period.start_date, end }
}

fn predicted_period_range(next: NaiveDate, period_length: u32) -> DateRange {
    DateRange {
        start: next,
        end: add_days(next, i64::from(period_length.max(1)) - 1),
    }
}

fn containing_period<'a>(
    date: NaiveDate,
    periods: &'a [PeriodRecord],
    period_length: u32,
) -> Option<&'a PeriodRecord> {
    sorted_by_start(periods)
        .into_iter()
        .rev()
        .find(|p| p.start_date <= date && logged_range(p, period_length).contains(date))
}

/// Follicular phase opens the day after the latest period (logged or predicted)
/// that ended before `date`.
fn follicular_match(
    date: NaiveDate,
    periods: &[PeriodRecord],
    predictions: &CyclePredictions,
    period_length: u32,
) -> PhaseMatch {
    let logged = sorted_by_start(periods)
        .into_iter()
        .map(|p| add_days(logged_range(p, period_length).end, 1))
        .filter(|&after| after <= date)
        .max();
    let predicted = predictions
        .next_period_date
        .map(|next| add_days(predicted_period_range(next, period_length).end, 1))
        .filter(|&after| after <= date);

    match (logged, predicted) {
        (Some(l), Some(p)) if p > l => PhaseMatch::Follicular { start: p, anchored: false },
        (Some(l), _) => PhaseMatch::Follicular { start: l, anchored: true },
        (None, Some(p)) => PhaseMatch::Follicular { start: p, anchored: false },
        (None, None) => PhaseMatch::Follicular { start: date, anchored: false },
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::calculate_predictions;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn scenario() -> (Vec<PeriodRecord>, CyclePredictions, UserSettings) {
        let periods = vec![PeriodRecord::new("p1", d(2024, 1, 1))];
        let settings = UserSettings::with_lengths(28, 5);
        let predictions = calculate_predictions(&periods, &settings, d(2024, 1, 20));
        (periods, predictions, settings)
    }

    fn classify(date: NaiveDate) -> PhaseDetail {
        let (periods, predictions, settings) = scenario();
        get_phase_details_for_date(date, &periods, &predictions, &settings)
    }

    // ── Precedence in isolation ───────────────────────────────────────────

    #[test]
    fn test_resolve_precedence_order() {
        let s = d(2024, 1, 1);
        let all = [
            PhaseMatch::Follicular { start: s, anchored: true },
            PhaseMatch::PredictedLuteal { start: s },
            PhaseMatch::PredictedFertile { start: s },
            PhaseMatch::PredictedPeriod { start: s },
            PhaseMatch::ActualPeriod { start: s },
        ];
        assert_eq!(PhaseMatch::resolve(all), Some(PhaseMatch::ActualPeriod { start: s }));
        assert_eq!(
            PhaseMatch::resolve(all[..3].iter().copied()),
            Some(PhaseMatch::PredictedFertile { start: s })
        );
        assert_eq!(
            PhaseMatch::resolve(all[..2].iter().copied()),
            Some(PhaseMatch::PredictedLuteal { start: s })
        );
        assert_eq!(PhaseMatch::resolve(Vec::new()), None);
    }

    #[test]
    fn test_match_predicted_flags() {
        let s = d(2024, 1, 1);
        assert!(!PhaseMatch::ActualPeriod { start: s }.is_predicted());
        assert!(PhaseMatch::PredictedPeriod { start: s }.is_predicted());
        assert!(PhaseMatch::PredictedFertile { start: s }.is_predicted());
        assert!(PhaseMatch::PredictedLuteal { start: s }.is_predicted());
        assert!(!PhaseMatch::Follicular { start: s, anchored: true }.is_predicted());
        assert!(PhaseMatch::Follicular { start: s, anchored: false }.is_predicted());
    }

    // ── Classification across one cycle ───────────────────────────────────

    #[test]
    fn test_menstrual_actual() {
        let detail = classify(d(2024, 1, 3));
        assert_eq!(detail.phase, CyclePhase::Menstrual);
        assert_eq!(detail.phase_start, d(2024, 1, 1));
        assert!(!detail.is_predicted);
        assert_eq!(detail.day_in_phase(d(2024, 1, 3)), 3);
    }

    #[test]
    fn test_follicular_after_open_period() {
        let detail = classify(d(2024, 1, 7));
        assert_eq!(detail.phase, CyclePhase::Follicular);
        assert_eq!(detail.phase_start, d(2024, 1, 6));
        assert!(!detail.is_predicted);
    }

    #[test]
    fn test_fertile_window_is_ovulation_phase() {
        let detail = classify(d(2024, 1, 10));
        assert_eq!(detail.phase, CyclePhase::Ovulation);
        assert_eq!(detail.phase_start, d(2024, 1, 10));
        assert!(detail.is_predicted);
    }

    #[test]
    fn test_fertile_beats_luteal_on_overlap() {
        // 01-15 and 01-16 sit in both the fertile window and [ovulation, next)
        assert_eq!(classify(d(2024, 1, 15)).phase, CyclePhase::Ovulation);
        assert_eq!(classify(d(2024, 1, 16)).phase, CyclePhase::Ovulation);
    }

    #[test]
    fn test_luteal_after_fertile_window() {
        let detail = classify(d(2024, 1, 17));
        assert_eq!(detail.phase, CyclePhase::Luteal);
        assert_eq!(detail.phase_start, d(2024, 1, 15));
        assert!(detail.is_predicted);
        assert_eq!(detail.day_in_phase(d(2024, 1, 17)), 3);
    }

    #[test]
    fn test_predicted_next_period() {
        let detail = classify(d(2024, 1, 29));
        assert_eq!(detail.phase, CyclePhase::Menstrual);
        assert_eq!(detail.phase_start, d(2024, 1, 29));
        assert!(detail.is_predicted);
    }

    #[test]
    fn test_follicular_after_predicted_period() {
        let detail = classify(d(2024, 2, 5));
        assert_eq!(detail.phase, CyclePhase::Follicular);
        assert_eq!(detail.phase_start, d(2024, 2, 3));
        assert!(detail.is_predicted);
    }

    #[test]
    fn test_logged_period_beats_fertile_window() {
        let (mut periods, predictions, settings) = scenario();
        periods.push(PeriodRecord::new("early", d(2024, 1, 12)));
        let detail = get_phase_details_for_date(d(2024, 1, 13), &periods, &predictions, &settings);
        assert_eq!(detail.phase, CyclePhase::Menstrual);
        assert_eq!(detail.phase_start, d(2024, 1, 12));
        assert!(!detail.is_predicted);
    }

    #[test]
    fn test_no_history_is_unanchored_follicular() {
        let detail = get_phase_details_for_date(
            d(2024, 1, 13),
            &[],
            &CyclePredictions::default(),
            &UserSettings::default(),
        );
        assert_eq!(detail, PhaseDetail {
            phase: CyclePhase::Follicular,
            phase_start: d(2024, 1, 13),
            is_predicted: true,
        });
    }

    #[test]
    fn test_classification_is_pure() {
        let (periods, predictions, settings) = scenario();
        let date = d(2024, 1, 17);
        let first = get_phase_details_for_date(date, &periods, &predictions, &settings);
        for _ in 0..10 {
            assert_eq!(get_phase_details_for_date(date, &periods, &predictions, &settings), first);
        }
    }

    // ── Period day info ───────────────────────────────────────────────────

    #[test]
    fn test_period_day_one_on_start() {
        let periods = vec![PeriodRecord::new("p", d(2024, 1, 1))];
        let info = get_period_day_info(d(2024, 1, 1), &periods, 5).unwrap();
        assert_eq!(info, PeriodDayInfo { day_number: 1, period_length: 5 });
    }

    #[test]
    fn test_open_period_expires_after_length() {
        let periods = vec![PeriodRecord::new("p", d(2024, 1, 1))];
        assert_eq!(get_period_day_info(d(2024, 1, 5), &periods, 5).map(|i| i.day_number), Some(5));
        assert_eq!(get_period_day_info(d(2024, 1, 6), &periods, 5), None);
        assert_eq!(get_period_day_info(d(2024, 1, 9), &periods, 5), None);
        assert_eq!(get_period_day_info(d(2023, 12, 31), &periods, 5), None);
    }

    #[test]
    fn test_closed_period_uses_explicit_end() {
        let periods = vec![PeriodRecord::new("p", d(2024, 1, 1)).with_end(d(2024, 1, 8))];
        assert_eq!(get_period_day_info(d(2024, 1, 8), &periods, 5).map(|i| i.day_number), Some(8));
        assert_eq!(get_period_day_info(d(2024, 1, 9), &periods, 5), None);
    }

    #[test]
    fn test_overlapping_periods_pick_most_recent() {
        let periods = vec![
            PeriodRecord::new("late", d(2024, 1, 4)),
            PeriodRecord::new("early", d(2024, 1, 1)).with_end(d(2024, 1, 10)),
        ];
        assert_eq!(get_period_day_info(d(2024, 1, 5), &periods, 5).map(|i| i.day_number), Some(2));
        // past the open period's length, the earlier closed one still contains the date
        assert_eq!(get_period_day_info(d(2024, 1, 10), &periods, 5).map(|i| i.day_number), Some(10));
    }

    #[test]
    fn test_inverted_period_is_treated_as_open() {
        let periods = vec![PeriodRecord::new("p", d(2024, 1, 10)).with_end(d(2024, 1, 3))];
        assert_eq!(get_period_day_info(d(2024, 1, 12), &periods, 5).map(|i| i.day_number), Some(3));
        assert_eq!(get_period_day_info(d(2024, 1, 5), &periods, 5), None);

        let detail = get_phase_details_for_date(
            d(2024, 1, 16),
            &periods,
            &CyclePredictions::default(),
            &UserSettings::default(),
        );
        assert_eq!(detail.phase, CyclePhase::Follicular);
        assert_eq!(detail.phase_start, d(2024, 1, 15));
        assert!(!detail.is_predicted);
    }

    // ── Day info ──────────────────────────────────────────────────────────

    #[test]
    fn test_day_info_flags() {
        let (periods, predictions, _) = scenario();
        assert_eq!(
            get_day_info(d(2024, 1, 2), &periods, &predictions),
            DayInfo { is_period: true, is_fertile: false, is_pms: false }
        );
        assert_eq!(
            get_day_info(d(2024, 1, 15), &periods, &predictions),
            DayInfo { is_period: false, is_fertile: true, is_pms: true }
        );
        assert_eq!(
            get_day_info(d(2024, 1, 20), &periods, &predictions),
            DayInfo { is_period: false, is_fertile: false, is_pms: true }
        );
        assert_eq!(get_day_info(d(2024, 1, 7), &periods, &predictions), DayInfo::default());
    }
}
