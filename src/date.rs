/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Calendar arithmetic on local dates.
//!
//! Every date in the crate is a [`NaiveDate`] interpreted in the device's local
//! time zone. Instants are normalised to local midnight before any subtraction,
//! so phase boundaries never drift by a day because of the hour of the call.
//!
//! # Rounding
//!
//! - [`days_until`] rounds **up**: 00:01 on the day before the target is "1 day until".
//! - [`days_since`] rounds **down**: 23:59 on the start day is "0 days since".
//!
//! The two are applied consistently by the classifier and the engine.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Seconds in a civil day, used for ceil/floor day counting.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Today's date in the local time zone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// The current local wall-clock time.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Normalise any instant to the local calendar date it falls on.
pub fn normalize<Tz: TimeZone>(instant: &DateTime<Tz>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// Whole days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Shift a date by a signed number of days, saturating at the calendar bounds.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    let step = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(step).unwrap_or(NaiveDate::MAX)
    } else {
        date.checked_sub_days(step).unwrap_or(NaiveDate::MIN)
    }
}

/// Days from `now` until local midnight of `target`, rounded up.
pub fn days_until(now: NaiveDateTime, target: NaiveDate) -> i64 {
    let secs = (target.and_time(NaiveTime::MIN) - now).num_seconds();
    -(-secs).div_euclid(SECONDS_PER_DAY)
}

/// Days elapsed from local midnight of `start` to `now`, rounded down.
pub fn days_since(start: NaiveDate, now: NaiveDateTime) -> i64 {
    (now - start.and_time(NaiveTime::MIN))
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}

/// Parse a wire date: either `YYYY-MM-DD` or an RFC 3339 timestamp.
///
/// Timestamps are normalised to the local date they fall on.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| normalize(&dt))
}

// ─── DateRange ───────────────────────────────────────────────────────────────

/// An inclusive range of calendar dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    /// First day of the range.
    #[serde(with = "serde_date")]
    pub start: NaiveDate,
    /// Last day of the range (inclusive).
    #[serde(with = "serde_date")]
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, swapping the bounds if they arrive reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// `true` if `date` lies within `[start, end]`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days covered, counting both ends.
    pub fn len_days(&self) -> i64 {
        days_between(self.start, self.end) + 1
    }

    /// Range bounds rendered as `YYYY-MM-DD` strings, for cache keys.
    pub fn key_parts(&self) -> [String; 2] {
        [
            self.start.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
        ]
    }
}

// ─── serde helpers ───────────────────────────────────────────────────────────

/// Serde adapter: dates are written as `YYYY-MM-DD` and read via [`parse_date`].
pub mod serde_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialise as `YYYY-MM-DD`.
    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&date.format("%Y-%m-%d"))
    }

    /// Accept a plain date or an RFC 3339 timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).ok_or_else(|| de::Error::custom(format!("invalid date `{raw}`")))
    }

    /// The same adapter for optional fields. `null` and a missing field both read as `None`.
    pub mod option {
        use chrono::NaiveDate;
        use serde::{de, Deserialize, Deserializer, Serializer};

        /// Serialise `Some` as `YYYY-MM-DD`, `None` as `null`.
        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => s.collect_str(&d.format("%Y-%m-%d")),
                None => s.serialize_none(),
            }
        }

        /// Accept `null`, a plain date, or an RFC 3339 timestamp.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => super::super::parse_date(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid date `{raw}`"))),
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
