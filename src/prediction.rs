/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Cycle prediction: effective lengths and forward projection of the next period.
//!
//! # Pipeline
//!
//! ```text
//! periods ──sort──► gaps between starts ──► cycle length ─┐
//!         └──────► closed (end − start) ──► period length ├─► CyclePredictions
//! settings ─────────────────────────────── overrides ─────┘
//! most recent start + k × cycle  (first value strictly after today)
//!   └─► ovulation = next − luteal ─► fertile = [ovulation − 5, ovulation + 1]
//! ```
//!
//! # Invariants
//!
//! - Pure: no I/O, no clock reads except in [`calculate_predictions_now`].
//! - Deterministic for identical `(periods, settings, today)`.
//! - Input order is irrelevant; overlapping or duplicate starts are tolerated.
//! - Sparse input never fails: lengths fall back to 28 / 5, dates to `None`.

use chrono::NaiveDate;

use crate::config::{CycleConfig, MAX_CYCLE_LENGTH, MAX_PERIOD_LENGTH};
use crate::date::{add_days, days_between, local_today};
use crate::model::{CyclePredictions, PeriodRecord, UserSettings};

/// Compute predictions with the standard [`CycleConfig`].
pub fn calculate_predictions(
    periods: &[PeriodRecord],
    settings: &UserSettings,
    today: NaiveDate,
) -> CyclePredictions {
    calculate_predictions_with(periods, settings, today, &CycleConfig::default())
}

/// Compute predictions against the local clock.
pub fn calculate_predictions_now(
    periods: &[PeriodRecord],
    settings: &UserSettings,
) -> CyclePredictions {
    calculate_predictions(periods, settings, local_today())
}

/// Compute predictions with explicit constants.
pub fn calculate_predictions_with(
    periods: &[PeriodRecord],
    settings: &UserSettings,
    today: NaiveDate,
    config: &CycleConfig,
) -> CyclePredictions {
    let sorted = sorted_by_start(periods);
    let cycle_length = effective_cycle_length(&sorted, settings, config);
    let period_length = effective_period_length(&sorted, settings, config);

    let Some(last) = sorted.last() else {
        return CyclePredictions::empty(cycle_length, period_length);
    };

    let next = project_forward(last.start_date, cycle_length, today);
    let ovulation = add_days(next, -i64::from(config.luteal_length));

    CyclePredictions {
        next_period_date: Some(next),
        ovulation_date: Some(ovulation),
        fertile_window_start: Some(add_days(
            ovulation,
            -i64::from(config.fertile_days_before_ovulation),
        )),
        fertile_window_end: Some(add_days(
            ovulation,
            i64::from(config.fertile_days_after_ovulation),
        )),
        cycle_length,
        period_length,
    }
}

/// The user's cycle length when set and within `1..=MAX_CYCLE_LENGTH`.
pub fn settings_cycle_length(settings: &UserSettings) -> Option<u32> {
    settings
        .average_cycle_length
        .filter(|l| (1..=MAX_CYCLE_LENGTH).contains(l))
}

/// The user's period length when set and within `1..=MAX_PERIOD_LENGTH`.
pub fn settings_period_length(settings: &UserSettings) -> Option<u32> {
    settings
        .average_period_length
        .filter(|l| (1..=MAX_PERIOD_LENGTH).contains(l))
}

/// Periods ordered by start date, ties broken by id for determinism.
pub fn sorted_by_start(periods: &[PeriodRecord]) -> Vec<&PeriodRecord> {
    let mut sorted: Vec<&PeriodRecord> = periods.iter().collect();
    sorted.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)));
    sorted
}

/// Settings value, else mean gap between consecutive starts, else the default.
///
/// Zero-day gaps (duplicate starts) are ignored.
pub fn effective_cycle_length(
    sorted: &[&PeriodRecord],
    settings: &UserSettings,
    config: &CycleConfig,
) -> u32 {
    if let Some(len) = settings_cycle_length(settings) {
        return len;
    }
    let gaps = sorted
        .windows(2)
        .map(|w| days_between(w[0].start_date, w[1].start_date))
        .filter(|&gap| gap > 0);
    rounded_mean(gaps).unwrap_or(config.default_cycle_length)
}

/// Settings value, else mean `end − start` of closed periods, else the default.
pub fn effective_period_length(
    sorted: &[&PeriodRecord],
    settings: &UserSettings,
    config: &CycleConfig,
) -> u32 {
    if let Some(len) = settings_period_length(settings) {
        return len;
    }
    let lengths = sorted
        .iter()
        .filter_map(|p| p.logged_length())
        .filter(|&len| len > 0);
    rounded_mean(lengths).unwrap_or(config.default_period_length)
}

/// First date `start + k × cycle_length` (k ≥ 1) strictly after `today`.
///
/// Computed arithmetically so data that is many cycles stale costs O(1).
pub fn project_forward(start: NaiveDate, cycle_length: u32, today: NaiveDate) -> NaiveDate {
    let cycle = i64::from(cycle_length.max(1));
    let elapsed = days_between(start, today);
    let steps = if elapsed < cycle { 1 } else { elapsed / cycle + 1 };
    add_days(start, steps * cycle)
}

fn rounded_mean(values: impl Iterator<Item = i64>) -> Option<u32> {
    let (sum, count) = values.fold((0i64, 0i64), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        return None;
    }
    let mean = (sum as f64 / count as f64).round();
    if mean >= 1.0 {
        u32::try_from(mean as i64).ok()
    } else {
        None
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // ── Effective lengths ─────────────────────────────────────────────────

    #[test]
    fn test_cycle_length_from_gaps() {
        let periods = vec![
            PeriodRecord::new("c", d(2024, 3, 2)),
            PeriodRecord::new("a", d(2024, 1, 1)),
            PeriodRecord::new("b", d(2024, 1, 31)),
        ];
        let sorted = sorted_by_start(&periods);
        // gaps 30 and 31 -> 30.5 -> 31
        let len = effective_cycle_length(&sorted, &UserSettings::default(), &CycleConfig::default());
        assert_eq!(len, 31);
    }

    #[test]
    fn test_cycle_length_settings_override_history() {
        let periods = vec![
            PeriodRecord::new("a", d(2024, 1, 1)),
            PeriodRecord::new("b", d(2024, 1, 31)),
        ];
        let sorted = sorted_by_start(&periods);
        let settings = UserSettings { average_cycle_length: Some(26), ..UserSettings::default() };
        assert_eq!(effective_cycle_length(&sorted, &settings, &CycleConfig::default()), 26);
    }

    #[test]
    fn test_zero_setting_treated_as_absent() {
        let settings = UserSettings::with_lengths(0, 0);
        let p = calculate_predictions(&[], &settings, d(2024, 1, 1));
        assert_eq!(p.cycle_length, 28);
        assert_eq!(p.period_length, 5);
    }

    #[test]
    fn test_implausible_settings_fall_back() {
        let periods = vec![
            PeriodRecord::new("a", d(2024, 1, 1)).with_end(d(2024, 1, 5)),
            PeriodRecord::new("b", d(2024, 1, 31)),
        ];
        let settings = UserSettings::with_lengths(200_000_000, 200_000_000);
        let p = calculate_predictions(&periods, &settings, d(2024, 2, 10));
        // history wins: gap 30, closed period 4
        assert_eq!(p.cycle_length, 30);
        assert_eq!(p.period_length, 4);
        assert_eq!(p.next_period_date, Some(d(2024, 3, 1)));

        let empty = calculate_predictions(&[], &UserSettings::with_lengths(121, 32), d(2024, 2, 10));
        assert_eq!((empty.cycle_length, empty.period_length), (28, 5));
        let edge = calculate_predictions(&[], &UserSettings::with_lengths(120, 31), d(2024, 2, 10));
        assert_eq!((edge.cycle_length, edge.period_length), (120, 31));
    }

    #[test]
    fn test_huge_logged_history_does_not_panic() {
        let periods = vec![
            PeriodRecord::new("a", d(2024, 1, 1)).with_end(NaiveDate::MAX),
            PeriodRecord::new("b", NaiveDate::MAX),
        ];
        let p = calculate_predictions(&periods, &UserSettings::default(), d(2024, 2, 10));
        assert_eq!(p.next_period_date, Some(NaiveDate::MAX));
    }

    #[test]
    fn test_duplicate_starts_ignored_in_gaps() {
        let periods = vec![
            PeriodRecord::new("a", d(2024, 1, 1)),
            PeriodRecord::new("a2", d(2024, 1, 1)),
            PeriodRecord::new("b", d(2024, 1, 27)),
        ];
        let sorted = sorted_by_start(&periods);
        let len = effective_cycle_length(&sorted, &UserSettings::default(), &CycleConfig::default());
        assert_eq!(len, 26);
    }

    #[test]
    fn test_period_length_from_closed_periods() {
        let periods = vec![
            PeriodRecord::new("a", d(2024, 1, 1)).with_end(d(2024, 1, 5)),
            PeriodRecord::new("b", d(2024, 1, 29)).with_end(d(2024, 2, 3)),
            PeriodRecord::new("c", d(2024, 2, 26)),
        ];
        let sorted = sorted_by_start(&periods);
        // 4 and 5 -> 4.5 -> 5 (round half away from zero)
        let len = effective_period_length(&sorted, &UserSettings::default(), &CycleConfig::default());
        assert_eq!(len, 5);
    }

    // ── Projection ────────────────────────────────────────────────────────

    #[test]
    fn test_project_forward_strictly_after_today() {
        let start = d(2024, 1, 1);
        assert_eq!(project_forward(start, 28, d(2024, 1, 20)), d(2024, 1, 29));
        // today == start + 28: must move one more cycle
        assert_eq!(project_forward(start, 28, d(2024, 1, 29)), d(2024, 2, 26));
        // many cycles stale
        assert_eq!(project_forward(start, 28, d(2024, 12, 31)), d(2025, 1, 27));
    }

    #[test]
    fn test_project_forward_future_start() {
        // a start logged ahead of today still projects one cycle out
        assert_eq!(project_forward(d(2024, 2, 1), 28, d(2024, 1, 20)), d(2024, 2, 29));
    }

    #[test]
    fn test_concrete_scenario() {
        let periods = vec![PeriodRecord::new("p1", d(2024, 1, 1))];
        let settings = UserSettings::with_lengths(28, 5);
        let p = calculate_predictions(&periods, &settings, d(2024, 1, 20));
        assert_eq!(p.next_period_date, Some(d(2024, 1, 29)));
        assert_eq!(p.ovulation_date, Some(d(2024, 1, 15)));
        assert_eq!(p.fertile_window_start, Some(d(2024, 1, 10)));
        assert_eq!(p.fertile_window_end, Some(d(2024, 1, 16)));
        assert_eq!(p.cycle_length, 28);
        assert_eq!(p.period_length, 5);
    }

    #[test]
    fn test_empty_input_defaults() {
        let p = calculate_predictions(&[], &UserSettings::default(), d(2024, 1, 20));
        assert_eq!(p, CyclePredictions::empty(28, 5));
    }

    #[test]
    fn test_custom_config_offsets() {
        let config = CycleConfig {
            luteal_length: 12,
            fertile_days_before_ovulation: 3,
            fertile_days_after_ovulation: 0,
            ..CycleConfig::default()
        };
        let periods = vec![PeriodRecord::new("p1", d(2024, 1, 1))];
        let p = calculate_predictions_with(&periods, &UserSettings::default(), d(2024, 1, 20), &config);
        assert_eq!(p.ovulation_date, Some(d(2024, 1, 17)));
        assert_eq!(p.fertile_window_start, Some(d(2024, 1, 14)));
        assert_eq!(p.fertile_window_end, Some(d(2024, 1, 17)));
    }
}
