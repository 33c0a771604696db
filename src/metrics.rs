//! Cache Metrics Module
//!
//! Tracks hit/miss counters across both cache levels and derives rates and
//! a health verdict from them.

use serde::Serialize;

/// Lookups needed before the health rule is applied
pub const MIN_HEALTH_SAMPLE: u64 = 100;

/// Overall hit rate required to be healthy
pub const HEALTHY_HIT_RATE: f64 = 0.70;

/// Share of hits that must come from L1 to be healthy
pub const HEALTHY_L1_SHARE: f64 = 0.80;

// == Metrics Snapshot ==
/// Point-in-time copy of the counters with derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub last_cleanup_at: Option<u64>,
    pub started_at: u64,
    /// hits / (hits + misses), 0.0 with no lookups
    pub hit_rate: f64,
    /// l1_hits / hits, 0.0 with no hits
    pub l1_hit_rate: f64,
    pub uptime_ms: u64,
}

// == Metrics ==
#[derive(Debug, Clone)]
pub struct Metrics {
    l1_hits: u64,
    l2_hits: u64,
    misses: u64,
    last_cleanup_at: Option<u64>,
    started_at: u64,
}

impl Metrics {
    pub fn new(started_at: u64) -> Self {
        Self {
            l1_hits: 0,
            l2_hits: 0,
            misses: 0,
            last_cleanup_at: None,
            started_at,
        }
    }

    // == Recorders ==
    pub fn record_l1_hit(&mut self) {
        self.l1_hits += 1;
    }

    pub fn record_l2_hit(&mut self) {
        self.l2_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn update_last_cleanup(&mut self, now: u64) {
        self.last_cleanup_at = Some(now);
    }

    // == Derived Values ==
    pub fn hits(&self) -> u64 {
        self.l1_hits + self.l2_hits
    }

    pub fn lookups(&self) -> u64 {
        self.hits() + self.misses
    }

    /// Calculates the overall hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits(), self.lookups())
    }

    /// Fraction of hits served from L1.
    pub fn l1_hit_rate(&self) -> f64 {
        ratio(self.l1_hits, self.hits())
    }

    /// Healthy when there is too little data to judge, otherwise both the
    /// hit-rate and L1-share thresholds must hold.
    pub fn is_healthy(&self) -> bool {
        if self.lookups() < MIN_HEALTH_SAMPLE {
            return true;
        }
        self.hit_rate() >= HEALTHY_HIT_RATE && self.l1_hit_rate() >= HEALTHY_L1_SHARE
    }

    pub fn snapshot(&self, now: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits(),
            misses: self.misses,
            l1_hits: self.l1_hits,
            l2_hits: self.l2_hits,
            last_cleanup_at: self.last_cleanup_at,
            started_at: self.started_at,
            hit_rate: self.hit_rate(),
            l1_hit_rate: self.l1_hit_rate(),
            uptime_ms: now.saturating_sub(self.started_at),
        }
    }

    // == Reset ==
    /// Zeroes every counter. `started_at` is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.started_at);
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
