//! Cache configuration and validation

use serde::{Deserialize, Serialize};
use tessera_clock::DurationSecs;
use thiserror::Error;

/// Validated timing configuration for a [`TokenCache`](crate::TokenCache)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    must_refresh_threshold: DurationSecs,
    should_refresh_threshold: DurationSecs,
    min_throttle_time: DurationSecs,
    max_throttle_time: DurationSecs,
}

impl Default for CacheConfig {
    /// Default cache configuration
    ///
    /// Reads block 60 seconds before expiry and a background reload starts
    /// 120 seconds before expiry. Failed reloads are retried after 1 second,
    /// backing off up to 10 minutes.
    fn default() -> Self {
        Self {
            must_refresh_threshold: DurationSecs(60),
            should_refresh_threshold: DurationSecs(120),
            min_throttle_time: DurationSecs(1),
            max_throttle_time: DurationSecs(600),
        }
    }
}

impl CacheConfig {
    /// Starts building a configuration; anything left unset keeps its default
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Seconds before expiry at which reads block on a reload
    #[inline]
    pub fn must_refresh_threshold(&self) -> DurationSecs {
        self.must_refresh_threshold
    }

    /// Seconds before expiry at which a background reload starts
    #[inline]
    pub fn should_refresh_threshold(&self) -> DurationSecs {
        self.should_refresh_threshold
    }

    /// Initial retry delay after a failed reload
    #[inline]
    pub fn min_throttle_time(&self) -> DurationSecs {
        self.min_throttle_time
    }

    /// Upper bound on the retry delay
    #[inline]
    pub fn max_throttle_time(&self) -> DurationSecs {
        self.max_throttle_time
    }
}

/// Builder for [`CacheConfig`]
///
/// Thresholds and throttle times come in pairs. Setting one half of a pair
/// without the other is rejected by [`build()`](Self::build).
#[derive(Clone, Debug, Default)]
pub struct CacheConfigBuilder {
    must_refresh_threshold: Option<DurationSecs>,
    should_refresh_threshold: Option<DurationSecs>,
    min_throttle_time: Option<DurationSecs>,
    max_throttle_time: Option<DurationSecs>,
}

impl CacheConfigBuilder {
    /// Sets the must-refresh threshold
    pub fn must_refresh_threshold(mut self, threshold: impl Into<Option<DurationSecs>>) -> Self {
        self.must_refresh_threshold = threshold.into();
        self
    }

    /// Sets the should-refresh threshold
    pub fn should_refresh_threshold(mut self, threshold: impl Into<Option<DurationSecs>>) -> Self {
        self.should_refresh_threshold = threshold.into();
        self
    }

    /// Sets the minimum throttle time
    pub fn min_throttle_time(mut self, time: impl Into<Option<DurationSecs>>) -> Self {
        self.min_throttle_time = time.into();
        self
    }

    /// Sets the maximum throttle time
    pub fn max_throttle_time(mut self, time: impl Into<Option<DurationSecs>>) -> Self {
        self.max_throttle_time = time.into();
        self
    }

    /// Sets both refresh thresholds
    pub fn refresh_thresholds(self, must: DurationSecs, should: DurationSecs) -> Self {
        self.must_refresh_threshold(must)
            .should_refresh_threshold(should)
    }

    /// Sets both throttle bounds
    pub fn throttle_times(self, min: DurationSecs, max: DurationSecs) -> Self {
        self.min_throttle_time(min).max_throttle_time(max)
    }

    /// Validates the configuration
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        let mut config = CacheConfig::default();

        match (self.must_refresh_threshold, self.should_refresh_threshold) {
            (None, None) => {}
            (None, Some(_)) => return Err(ConfigError::MissingMustRefreshThreshold),
            (Some(_), None) => return Err(ConfigError::MissingShouldRefreshThreshold),
            (Some(must), Some(should)) if must >= should => {
                return Err(ConfigError::RefreshThresholdsOutOfOrder { must, should })
            }
            (Some(must), Some(should)) => {
                config.must_refresh_threshold = must;
                config.should_refresh_threshold = should;
            }
        }

        match (self.min_throttle_time, self.max_throttle_time) {
            (None, None) => {}
            (None, Some(_)) => return Err(ConfigError::MissingMinThrottleTime),
            (Some(_), None) => return Err(ConfigError::MissingMaxThrottleTime),
            (Some(min), Some(max)) if min >= max => {
                return Err(ConfigError::ThrottleTimesOutOfOrder { min, max })
            }
            (Some(min), Some(max)) => {
                config.min_throttle_time = min;
                config.max_throttle_time = max;
            }
        }

        Ok(config)
    }
}

/// An invalid cache configuration
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A should-refresh threshold was given without a must-refresh threshold
    #[error("must-refresh threshold is required when a should-refresh threshold is set")]
    MissingMustRefreshThreshold,
    /// A must-refresh threshold was given without a should-refresh threshold
    #[error("should-refresh threshold is required when a must-refresh threshold is set")]
    MissingShouldRefreshThreshold,
    /// The blocking threshold is not lower than the non-blocking threshold
    #[error("must-refresh threshold ({must}) must be lower than should-refresh threshold ({should})")]
    RefreshThresholdsOutOfOrder {
        /// The must-refresh threshold
        must: DurationSecs,
        /// The should-refresh threshold
        should: DurationSecs,
    },
    /// A maximum throttle time was given without a minimum
    #[error("minimum throttle time is required when a maximum throttle time is set")]
    MissingMinThrottleTime,
    /// A minimum throttle time was given without a maximum
    #[error("maximum throttle time is required when a minimum throttle time is set")]
    MissingMaxThrottleTime,
    /// The minimum throttle time is not lower than the maximum
    #[error("minimum throttle time ({min}) must be lower than maximum throttle time ({max})")]
    ThrottleTimesOutOfOrder {
        /// The minimum throttle time
        min: DurationSecs,
        /// The maximum throttle time
        max: DurationSecs,
    },
}

/// Unvalidated cache overrides, as read from a settings file
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds before expiry at which reads block on a reload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_refresh_threshold: Option<DurationSecs>,
    /// Seconds before expiry at which a background reload starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_refresh_threshold: Option<DurationSecs>,
    /// Initial retry delay after a failed reload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_throttle_time: Option<DurationSecs>,
    /// Upper bound on the retry delay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_throttle_time: Option<DurationSecs>,
}

impl CacheSettings {
    /// Fills any unset value from `defaults`
    pub fn or(self, defaults: &CacheSettings) -> CacheSettings {
        CacheSettings {
            must_refresh_threshold: self
                .must_refresh_threshold
                .or(defaults.must_refresh_threshold),
            should_refresh_threshold: self
                .should_refresh_threshold
                .or(defaults.should_refresh_threshold),
            min_throttle_time: self.min_throttle_time.or(defaults.min_throttle_time),
            max_throttle_time: self.max_throttle_time.or(defaults.max_throttle_time),
        }
    }

    /// Converts into a builder carrying the same overrides
    pub fn to_builder(&self) -> CacheConfigBuilder {
        CacheConfig::builder()
            .must_refresh_threshold(self.must_refresh_threshold)
            .should_refresh_threshold(self.should_refresh_threshold)
            .min_throttle_time(self.min_throttle_time)
            .max_throttle_time(self.max_throttle_time)
    }
}

impl TryFrom<CacheSettings> for CacheConfig {
    type Error = ConfigError;

    fn try_from(settings: CacheSettings) -> Result<Self, Self::Error> {
        settings.to_builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_builder_yields_defaults() {
        let config = CacheConfig::builder().build().unwrap();

        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.must_refresh_threshold(), DurationSecs(60));
        assert_eq!(config.should_refresh_threshold(), DurationSecs(120));
        assert_eq!(config.min_throttle_time(), DurationSecs(1));
        assert_eq!(config.max_throttle_time(), DurationSecs(600));
    }

    #[test]
    fn ordered_pairs_are_accepted() {
        let config = CacheConfig::builder()
            .refresh_thresholds(DurationSecs(10), DurationSecs(30))
            .throttle_times(DurationSecs(2), DurationSecs(300))
            .build()
            .unwrap();

        assert_eq!(config.must_refresh_threshold(), DurationSecs(10));
        assert_eq!(config.should_refresh_threshold(), DurationSecs(30));
        assert_eq!(config.min_throttle_time(), DurationSecs(2));
        assert_eq!(config.max_throttle_time(), DurationSecs(300));
    }

    #[test]
    fn half_a_threshold_pair_is_rejected() {
        let missing_should = CacheConfig::builder()
            .must_refresh_threshold(DurationSecs(10))
            .build();
        let missing_must = CacheConfig::builder()
            .should_refresh_threshold(DurationSecs(30))
            .build();

        assert_eq!(missing_should, Err(ConfigError::MissingShouldRefreshThreshold));
        assert_eq!(missing_must, Err(ConfigError::MissingMustRefreshThreshold));
    }

    #[test]
    fn thresholds_must_be_strictly_ordered() {
        let equal = CacheConfig::builder()
            .refresh_thresholds(DurationSecs(30), DurationSecs(30))
            .build();

        assert_eq!(
            equal,
            Err(ConfigError::RefreshThresholdsOutOfOrder {
                must: DurationSecs(30),
                should: DurationSecs(30),
            })
        );
    }

    #[test]
    fn half_a_throttle_pair_is_rejected() {
        let missing_max = CacheConfig::builder()
            .min_throttle_time(DurationSecs(1))
            .build();
        let missing_min = CacheConfig::builder()
            .max_throttle_time(DurationSecs(60))
            .build();

        assert_eq!(missing_max, Err(ConfigError::MissingMaxThrottleTime));
        assert_eq!(missing_min, Err(ConfigError::MissingMinThrottleTime));
    }

    #[test]
    fn throttle_times_must_be_strictly_ordered() {
        let reversed = CacheConfig::builder()
            .throttle_times(DurationSecs(600), DurationSecs(1))
            .build();

        assert_eq!(
            reversed,
            Err(ConfigError::ThrottleTimesOutOfOrder {
                min: DurationSecs(600),
                max: DurationSecs(1),
            })
        );
    }

    #[test]
    fn client_settings_take_precedence_over_defaults() {
        let defaults = CacheSettings {
            must_refresh_threshold: Some(DurationSecs(60)),
            should_refresh_threshold: Some(DurationSecs(120)),
            min_throttle_time: Some(DurationSecs(1)),
            max_throttle_time: Some(DurationSecs(600)),
        };
        let client = CacheSettings {
            must_refresh_threshold: Some(DurationSecs(15)),
            should_refresh_threshold: Some(DurationSecs(30)),
            ..CacheSettings::default()
        };

        let config = CacheConfig::try_from(client.or(&defaults)).unwrap();

        assert_eq!(config.must_refresh_threshold(), DurationSecs(15));
        assert_eq!(config.should_refresh_threshold(), DurationSecs(30));
        assert_eq!(config.min_throttle_time(), DurationSecs(1));
        assert_eq!(config.max_throttle_time(), DurationSecs(600));
    }
}
