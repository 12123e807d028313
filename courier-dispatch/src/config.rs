//! Session configuration

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{error::SessionError, throttle::ThrottleSettings};

const fn default_min_delay() -> u64 {
    30
}

const fn default_max_delay() -> u64 {
    90
}

const fn default_tick_millis() -> u64 {
    1000
}

const fn default_rate_limit_backoff() -> u64 {
    0
}

/// Inclusive range, in seconds, the inter-send delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    #[serde(default = "default_min_delay")]
    pub min_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_secs: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_secs: default_min_delay(),
            max_secs: default_max_delay(),
        }
    }
}

impl DelayRange {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidDelayRange`] if `min_secs > max_secs`.
    pub fn new(min_secs: u64, max_secs: u64) -> Result<Self, SessionError> {
        if min_secs > max_secs {
            return Err(SessionError::InvalidDelayRange {
                min: min_secs,
                max: max_secs,
            });
        }
        Ok(Self { min_secs, max_secs })
    }

    /// Same delay every time
    #[must_use]
    pub const fn fixed(secs: u64) -> Self {
        Self {
            min_secs: secs,
            max_secs: secs,
        }
    }

    /// # Errors
    ///
    /// Returns [`SessionError::InvalidDelayRange`] if `min_secs > max_secs`.
    pub fn validate(&self) -> Result<(), SessionError> {
        Self::new(self.min_secs, self.max_secs).map(|_| ())
    }

    /// Draw a delay uniformly from the range
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.min_secs >= self.max_secs {
            self.min_secs
        } else {
            rng.random_range(self.min_secs..=self.max_secs)
        }
    }
}

/// Configuration of a dispatch session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Provider-side template identifier or alias
    pub template_id: String,

    #[serde(default)]
    pub delay: DelayRange,

    /// Countdown granularity while delaying; cancel and pause are polled on
    /// every tick
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    #[serde(default)]
    pub throttle: ThrottleSettings,

    /// Extra wait added to the next delay after a `rate_limited` outcome
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: u64,
}

impl DispatchConfig {
    #[must_use]
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            delay: DelayRange::default(),
            tick_millis: default_tick_millis(),
            throttle: ThrottleSettings::default(),
            rate_limit_backoff_secs: default_rate_limit_backoff(),
        }
    }

    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(if self.tick_millis == 0 {
            default_tick_millis()
        } else {
            self.tick_millis
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn config_from_ron_with_defaults() {
        let config: DispatchConfig = ron::from_str(
            r#"(
                template_id: "spring-invite",
                delay: (min_secs: 5, max_secs: 10),
                throttle: (max_emails_per_day: 200, cooldown_days: 30),
            )"#,
        )
        .unwrap();

        assert_eq!(config.template_id, "spring-invite");
        assert_eq!(config.delay, DelayRange::new(5, 10).unwrap());
        assert_eq!(config.tick(), Duration::from_secs(1));
        assert_eq!(config.throttle.max_emails_per_day, 200);
        assert_eq!(config.rate_limit_backoff_secs, 0);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(
            DelayRange::new(10, 5),
            Err(SessionError::InvalidDelayRange { min: 10, max: 5 })
        );
        assert!(DelayRange { min_secs: 3, max_secs: 1 }.validate().is_err());
    }

    #[test]
    fn picks_within_range() {
        let range = DelayRange::new(2, 4).unwrap();
        let mut rng = rand::rng();
        for _ in 0..100 {
            let delay = range.pick(&mut rng);
            assert!((2..=4).contains(&delay));
        }
        assert_eq!(DelayRange::fixed(1).pick(&mut rng), 1);
    }

    #[test]
    fn zero_tick_uses_default() {
        let mut config = DispatchConfig::new("t");
        config.tick_millis = 0;
        assert_eq!(config.tick(), Duration::from_secs(1));
    }
}
