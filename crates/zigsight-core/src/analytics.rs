//! Per-device reliability analytics.
//!
//! The engine is stateless apart from its [`AnalyticsConfig`]. Every
//! computation takes the evaluation instant explicitly so the same history
//! always produces the same result.
//!
//! # Example
//!
//! ```
//! use time::OffsetDateTime;
//! use zigsight_core::analytics::DeviceAnalytics;
//!
//! let analytics = DeviceAnalytics::default();
//! let now = OffsetDateTime::now_utc();
//!
//! // An empty history has no reconnects and no battery trend.
//! assert_eq!(analytics.reconnect_rate(&[], now), 0.0);
//! assert_eq!(analytics.battery_trend(&[], now), None);
//! ```

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use zigsight_types::{AnalyticsResult, DeviceRecord, HistoryEntry, MetricsSnapshot};

use crate::error::{Error, Result};

/// Gap between consecutive messages counted as a reconnect, in seconds.
pub const RECONNECT_GAP_SECS: f64 = 300.0;

/// Age after which a device is considered unreachable, in seconds.
pub const STALE_AFTER_SECS: f64 = 3600.0;

/// Longest accepted analytics window, in hours (one year).
pub const MAX_WINDOW_HOURS: f64 = 8760.0;

/// Sub-score used when a metric is missing.
const NEUTRAL_SCORE: f64 = 50.0;

/// Reconnect rate at which the reconnect sub-score reaches zero.
const MAX_RECONNECT_RATE: f64 = 10.0;

/// Relative weights of the health score components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthWeights {
    pub link_quality: f64,
    pub battery: f64,
    pub reconnect_rate: f64,
    pub connectivity: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            link_quality: 0.3,
            battery: 0.2,
            reconnect_rate: 0.3,
            connectivity: 0.2,
        }
    }
}

impl HealthWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.link_quality + self.battery + self.reconnect_rate + self.connectivity
    }
}

/// Thresholds and weights for the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Sliding window for reconnect rate, in hours.
    pub reconnect_rate_window_hours: f64,
    /// Sliding window for battery trend, in hours.
    pub battery_trend_window_hours: f64,
    /// Drain rate in percent per hour above which a warning is raised.
    pub battery_drain_threshold: f64,
    /// Readings below this battery level are excluded from the trend.
    pub min_battery_for_trend: f64,
    /// Reconnects per hour at which a connectivity warning is raised.
    pub reconnect_rate_threshold: f64,
    /// Health score weights.
    pub weights: HealthWeights,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            reconnect_rate_window_hours: 24.0,
            battery_trend_window_hours: 24.0,
            battery_drain_threshold: 10.0,
            min_battery_for_trend: 20.0,
            reconnect_rate_threshold: 5.0,
            weights: HealthWeights::default(),
        }
    }
}

impl AnalyticsConfig {
    /// Check that windows are positive and at most [`MAX_WINDOW_HOURS`],
    /// thresholds non-negative and the weights non-negative and summing to 1.
    pub fn validate(&self) -> Result<()> {
        for (name, hours) in [
            ("reconnect_rate_window_hours", self.reconnect_rate_window_hours),
            ("battery_trend_window_hours", self.battery_trend_window_hours),
        ] {
            if !(hours > 0.0 && hours <= MAX_WINDOW_HOURS) {
                return Err(Error::invalid_config(format!(
                    "{} must be in (0, {}], got {}",
                    name, MAX_WINDOW_HOURS, hours
                )));
            }
        }
        for (name, value) in [
            ("battery_drain_threshold", self.battery_drain_threshold),
            ("min_battery_for_trend", self.min_battery_for_trend),
            ("reconnect_rate_threshold", self.reconnect_rate_threshold),
        ] {
            if !(value >= 0.0) {
                return Err(Error::invalid_config(format!(
                    "{} must not be negative",
                    name
                )));
            }
        }

        let w = &self.weights;
        if [w.link_quality, w.battery, w.reconnect_rate, w.connectivity]
            .iter()
            .any(|weight| !(*weight >= 0.0))
        {
            return Err(Error::invalid_config("health weights must not be negative"));
        }
        if (w.total() - 1.0).abs() > 0.001 {
            return Err(Error::invalid_config(format!(
                "health weights must sum to 1.0, got {:.3}",
                w.total()
            )));
        }
        Ok(())
    }
}

/// Analytics engine for Zigbee devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceAnalytics {
    config: AnalyticsConfig,
}

impl DeviceAnalytics {
    /// Create an engine with the given configuration.
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    /// Create an engine after validating the configuration.
    pub fn try_new(config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// The active configuration.
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Reconnect events per hour over the last `window_hours`.
    ///
    /// In-window entries are walked chronologically and every gap longer
    /// than [`RECONNECT_GAP_SECS`] counts as one event.
    pub fn compute_reconnect_rate(
        &self,
        history: &[HistoryEntry],
        window_hours: f64,
        now: OffsetDateTime,
    ) -> f64 {
        if !(window_hours > 0.0) || history.len() < 2 {
            return 0.0;
        }

        let start = window_start(now, window_hours);
        let mut timestamps: Vec<OffsetDateTime> = history
            .iter()
            .map(|entry| entry.timestamp)
            .filter(|ts| start.is_none_or(|start| *ts >= start))
            .collect();
        timestamps.sort_unstable();

        let events = timestamps
            .windows(2)
            .filter(|pair| (pair[1] - pair[0]).as_seconds_f64() > RECONNECT_GAP_SECS)
            .count();

        events as f64 / window_hours
    }

    /// Reconnect rate over the configured window.
    pub fn reconnect_rate(&self, history: &[HistoryEntry], now: OffsetDateTime) -> f64 {
        self.compute_reconnect_rate(history, self.config.reconnect_rate_window_hours, now)
    }

    /// Battery change in percent per hour over the last `window_hours`.
    ///
    /// Fits an ordinary least squares line through in-window readings at or
    /// above the trend floor. Returns `None` with fewer than two readings or
    /// when all readings share one timestamp.
    pub fn compute_battery_trend(
        &self,
        history: &[HistoryEntry],
        window_hours: f64,
        now: OffsetDateTime,
    ) -> Option<f64> {
        let start = window_start(now, window_hours.max(0.0));
        let mut readings: Vec<(OffsetDateTime, f64)> = history
            .iter()
            .filter(|entry| start.is_none_or(|start| entry.timestamp >= start))
            .filter_map(|entry| entry.metrics.battery.map(|b| (entry.timestamp, b)))
            .filter(|(_, battery)| *battery >= self.config.min_battery_for_trend)
            .collect();

        if readings.len() < 2 {
            return None;
        }
        readings.sort_by_key(|(ts, _)| *ts);

        let first = readings[0].0;
        let n = readings.len() as f64;
        let (mut sum_t, mut sum_b, mut sum_tb, mut sum_t2) = (0.0, 0.0, 0.0, 0.0);
        for (ts, battery) in &readings {
            let t = (*ts - first).as_seconds_f64() / 3600.0;
            sum_t += t;
            sum_b += battery;
            sum_tb += t * battery;
            sum_t2 += t * t;
        }

        let denominator = n * sum_t2 - sum_t * sum_t;
        if sum_t2 == 0.0 || denominator == 0.0 {
            return None;
        }

        let slope = (n * sum_tb - sum_t * sum_b) / denominator;
        slope.is_finite().then(|| round_to(slope, 2))
    }

    /// Battery trend over the configured window.
    pub fn battery_trend(&self, history: &[HistoryEntry], now: OffsetDateTime) -> Option<f64> {
        self.compute_battery_trend(history, self.config.battery_trend_window_hours, now)
    }

    /// Composite 0-100 health score.
    pub fn compute_health_score(
        &self,
        device: &DeviceRecord,
        history: &[HistoryEntry],
        now: OffsetDateTime,
    ) -> f64 {
        let metrics = &device.metrics;
        let weights = &self.config.weights;

        let link_quality = metrics
            .link_quality
            .map(|lq| (lq / 255.0 * 100.0).clamp(0.0, 100.0))
            .unwrap_or(NEUTRAL_SCORE);

        let battery = metrics
            .battery
            .map(|b| b.clamp(0.0, 100.0))
            .unwrap_or(NEUTRAL_SCORE);

        let rate = self.reconnect_rate(history, now);
        let reconnect = if rate <= 0.0 {
            100.0
        } else if rate >= MAX_RECONNECT_RATE {
            0.0
        } else {
            100.0 - rate * 10.0
        };

        let connectivity = match seconds_since_seen(metrics, now) {
            Some(age) if age < RECONNECT_GAP_SECS => 100.0,
            Some(age) if age > STALE_AFTER_SECS => 0.0,
            Some(age) => {
                100.0 - (age - RECONNECT_GAP_SECS) / (STALE_AFTER_SECS - RECONNECT_GAP_SECS) * 100.0
            }
            None => 0.0,
        };

        let total = link_quality * weights.link_quality
            + battery * weights.battery
            + reconnect * weights.reconnect_rate
            + connectivity * weights.connectivity;

        round_to(total.clamp(0.0, 100.0), 1)
    }

    /// Whether the battery trend is strictly below `-threshold`.
    pub fn check_battery_drain_warning(
        &self,
        history: &[HistoryEntry],
        threshold: f64,
        now: OffsetDateTime,
    ) -> bool {
        self.battery_trend(history, now)
            .is_some_and(|trend| trend < -threshold)
    }

    /// Whether the device reconnects at least `threshold` times per hour or
    /// has not been seen for over an hour.
    pub fn check_connectivity_warning(
        &self,
        device: &DeviceRecord,
        history: &[HistoryEntry],
        threshold: f64,
        now: OffsetDateTime,
    ) -> bool {
        if self.reconnect_rate(history, now) >= threshold {
            return true;
        }
        seconds_since_seen(&device.metrics, now).is_some_and(|age| age > STALE_AFTER_SECS)
    }

    /// Compute every metric using the configured thresholds.
    pub fn analyze(
        &self,
        device: &DeviceRecord,
        history: &[HistoryEntry],
        now: OffsetDateTime,
    ) -> AnalyticsResult {
        AnalyticsResult {
            reconnect_rate: self.reconnect_rate(history, now),
            battery_trend: self.battery_trend(history, now),
            health_score: self.compute_health_score(device, history, now),
            battery_drain_warning: self.check_battery_drain_warning(
                history,
                self.config.battery_drain_threshold,
                now,
            ),
            connectivity_warning: self.check_connectivity_warning(
                device,
                history,
                self.config.reconnect_rate_threshold,
                now,
            ),
        }
    }
}

/// Start of the window of `window_hours` ending at `now`.
///
/// Returns `None` when the window reaches past the representable time range
/// (or is not a number), in which case it covers the whole history.
pub fn window_start(now: OffsetDateTime, window_hours: f64) -> Option<OffsetDateTime> {
    Duration::checked_seconds_f64(window_hours * 3600.0).and_then(|span| now.checked_sub(span))
}

fn seconds_since_seen(metrics: &MetricsSnapshot, now: OffsetDateTime) -> Option<f64> {
    metrics.last_seen.map(|seen| (now - seen).as_seconds_f64())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    fn history_strategy() -> impl Strategy<Value = Vec<HistoryEntry>> {
        prop::collection::vec(
            (0i64..200_000, prop::option::of(-50.0f64..150.0)),
            0..60,
        )
        .prop_map(|points| {
            points
                .into_iter()
                .map(|(secs_ago, battery)| {
                    HistoryEntry::new(
                        NOW - Duration::seconds(secs_ago),
                        MetricsSnapshot {
                            battery,
                            ..Default::default()
                        },
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn reconnect_rate_is_non_negative(history in history_strategy(), window in -5.0f64..1e12) {
            let rate = DeviceAnalytics::default().compute_reconnect_rate(&history, window, NOW);
            prop_assert!(rate >= 0.0);
        }

        #[test]
        fn dense_history_has_no_reconnects(count in 2usize..50, step in 1i64..=300) {
            let history: Vec<_> = (0..count as i64)
                .map(|i| HistoryEntry::new(NOW - Duration::seconds(i * step), MetricsSnapshot::default()))
                .collect();
            prop_assert_eq!(DeviceAnalytics::default().reconnect_rate(&history, NOW), 0.0);
        }

        #[test]
        fn health_score_is_bounded(
            history in history_strategy(),
            lq in prop::option::of(-500.0f64..500.0),
            battery in prop::option::of(-500.0f64..500.0),
            seen in prop::option::of(-10_000i64..100_000),
        ) {
            let mut record = DeviceRecord::new("d", NOW);
            record.metrics.link_quality = lq;
            record.metrics.battery = battery;
            record.metrics.last_seen = seen.map(|s| NOW - Duration::seconds(s));

            let score = DeviceAnalytics::default().compute_health_score(&record, &history, NOW);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn battery_trend_is_finite(history in history_strategy()) {
            if let Some(trend) = DeviceAnalytics::default().battery_trend(&history, NOW) {
                prop_assert!(trend.is_finite());
            }
        }
    }
}
