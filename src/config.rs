/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Tunable cycle constants.
//!
//! [`CycleConfig`] carries the fall-back lengths used when neither the user's
//! settings nor their history provide a value, plus the fixed offsets that place
//! ovulation and the fertile window relative to the next period.
//!
//! Hosts that want different constants deserialise a config from JSON; the raw
//! form is validated at the parse boundary, so holding a `CycleConfig` is proof
//! that its values are usable.

use serde::{Deserialize, Serialize};

/// Default cycle length in days when nothing better is known.
pub const DEFAULT_CYCLE_LENGTH: u32 = 28;

/// Default period length in days when nothing better is known.
pub const DEFAULT_PERIOD_LENGTH: u32 = 5;

/// Assumed fixed luteal phase length in days.
pub const LUTEAL_PHASE_LENGTH: u32 = 14;

/// Longest cycle a settings value may claim. Larger values are ignored.
pub const MAX_CYCLE_LENGTH: u32 = 120;

/// Longest period a settings value may claim. Larger values are ignored.
pub const MAX_PERIOD_LENGTH: u32 = 31;

/// Errors raised while validating a [`CycleConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A length that must be at least one day was zero.
    #[error("{field} must be at least 1 day")]
    ZeroLength {
        /// Name of the offending field.
        field: &'static str,
    },
    /// The luteal phase must fit inside the default cycle.
    #[error("luteal_length ({luteal}) must be shorter than default_cycle_length ({cycle})")]
    LutealTooLong {
        /// Configured luteal length.
        luteal: u32,
        /// Configured default cycle length.
        cycle: u32,
    },
    /// The JSON could not be parsed.
    #[error("invalid cycle config: {0}")]
    Parse(String),
}

#[derive(Deserialize)]
#[serde(default)]
struct RawCycleConfig {
    default_cycle_length: u32,
    default_period_length: u32,
    luteal_length: u32,
    fertile_days_before_ovulation: u32,
    fertile_days_after_ovulation: u32,
}

impl Default for RawCycleConfig {
    fn default() -> Self {
        let c = CycleConfig::default();
        Self {
            default_cycle_length: c.default_cycle_length,
            default_period_length: c.default_period_length,
            luteal_length: c.luteal_length,
            fertile_days_before_ovulation: c.fertile_days_before_ovulation,
            fertile_days_after_ovulation: c.fertile_days_after_ovulation,
        }
    }
}

/// Constants used by the prediction engine and the phase classifier.
///
/// Default values:
/// - cycle 28 days, period 5 days;
/// - luteal phase 14 days (ovulation = next period − 14);
/// - fertile window from 5 days before to 1 day after ovulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCycleConfig")]
pub struct CycleConfig {
    /// Cycle length used when settings and history are both silent.
    pub default_cycle_length: u32,
    /// Period length used when settings and history are both silent.
    pub default_period_length: u32,
    /// Days between ovulation and the next period.
    pub luteal_length: u32,
    /// Fertile window opens this many days before ovulation.
    pub fertile_days_before_ovulation: u32,
    /// Fertile window closes this many days after ovulation.
    pub fertile_days_after_ovulation: u32,
}

impl CycleConfig {
    /// Construct the standard config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a config from JSON. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the invariants every config must hold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_cycle_length == 0 {
            return Err(ConfigError::ZeroLength { field: "default_cycle_length" });
        }
        if self.default_period_length == 0 {
            return Err(ConfigError::ZeroLength { field: "default_period_length" });
        }
        if self.luteal_length == 0 {
            return Err(ConfigError::ZeroLength { field: "luteal_length" });
        }
        if self.luteal_length >= self.default_cycle_length {
            return Err(ConfigError::LutealTooLong {
                luteal: self.luteal_length,
                cycle: self.default_cycle_length,
            });
        }
        Ok(())
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            default_cycle_length: DEFAULT_CYCLE_LENGTH,
            default_period_length: DEFAULT_PERIOD_LENGTH,
            luteal_length: LUTEAL_PHASE_LENGTH,
            fertile_days_before_ovulation: 5,
            fertile_days_after_ovulation: 1,
        }
    }
}

impl TryFrom<RawCycleConfig> for CycleConfig {
    type Error = ConfigError;

    fn try_from(raw: RawCycleConfig) -> Result<Self, Self::Error> {
        let config = Self {
            default_cycle_length: raw.default_cycle_length,
            default_period_length: raw.default_period_length,
            luteal_length: raw.luteal_length,
            fertile_days_before_ovulation: raw.fertile_days_before_ovulation,
            fertile_days_after_ovulation: raw.fertile_days_after_ovulation,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let c = CycleConfig::default();
        assert_eq!(c.default_cycle_length, 28);
        assert_eq!(c.default_period_length, 5);
        assert_eq!(c.luteal_length, 14);
        assert_eq!(c.fertile_days_before_ovulation, 5);
        assert_eq!(c.fertile_days_after_ovulation, 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_takes_defaults() {
        let c = CycleConfig::from_json(r#"{"default_cycle_length": 30}"#).unwrap();
        assert_eq!(c.default_cycle_length, 30);
        assert_eq!(c.default_period_length, 5);
        assert_eq!(c.luteal_length, 14);
    }

    #[test]
    fn test_from_json_rejects_zero_length() {
        let err = CycleConfig::from_json(r#"{"default_period_length": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(msg) if msg.contains("default_period_length")));
    }

    #[test]
    fn test_validate_luteal_must_fit() {
        let c = CycleConfig { luteal_length: 28, ..CycleConfig::default() };
        assert_eq!(
            c.validate(),
            Err(ConfigError::LutealTooLong { luteal: 28, cycle: 28 })
        );
    }
}
