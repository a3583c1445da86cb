//! Per-session metrics
//!
//! Latency percentiles come from a ring of the most recent 100 samples;
//! the exponential moving average (weight 0.2) gives a cheap trend value
//! the cost guard and health endpoints read without sorting the ring.

use std::collections::HashMap;

use redi_core::{RejectionReason, ResponseSource};
use redi_config::constants::metrics::{EMA_WEIGHT, LATENCY_RING};

/// Latency accounting for one component
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// EMA with weight 0.2 for the newest sample
    pub ema_ms: f64,
    ring: Vec<f64>,
    ring_pos: usize,
}

impl LatencyStats {
    pub fn record(&mut self, ms: f64) {
        if self.count == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
            self.ema_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
            self.ema_ms = self.ema_ms * (1.0 - EMA_WEIGHT) + ms * EMA_WEIGHT;
        }
        self.count += 1;
        self.sum_ms += ms;

        if self.ring.len() < LATENCY_RING {
            self.ring.push(ms);
        } else {
            self.ring[self.ring_pos] = ms;
            self.ring_pos = (self.ring_pos + 1) % LATENCY_RING;
        }
    }

    pub fn p50(&self) -> f64 {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> f64 {
        self.percentile(0.95)
    }

    fn percentile(&self, q: f64) -> f64 {
        if self.ring.is_empty() {
            return 0.0;
        }
        let mut sorted = self.ring.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let index = ((sorted.len() as f64 - 1.0) * q).round() as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

/// Success accounting for one component
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl ComponentStats {
    pub fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    /// Success rate in `[0, 1]`; 1 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// All metrics for one session
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    latencies: HashMap<&'static str, LatencyStats>,
    components: HashMap<&'static str, ComponentStats>,
    /// Responses by producing layer
    pub responses_rule: u64,
    pub responses_triage: u64,
    pub responses_reasoning: u64,
    pub silent_decisions: u64,
    rejections: HashMap<RejectionReason, u64>,
    pub approvals: u64,
    pub thinking_acks: u64,
    response_words_sum: u64,
    response_count: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&mut self, component: &'static str, ms: f64) {
        self.latencies.entry(component).or_default().record(ms);
    }

    pub fn latency(&self, component: &str) -> Option<&LatencyStats> {
        self.latencies.get(component)
    }

    pub fn record_outcome(&mut self, component: &'static str, success: bool) {
        self.components.entry(component).or_default().record(success);
    }

    pub fn component(&self, component: &str) -> Option<&ComponentStats> {
        self.components.get(component)
    }

    pub fn components(&self) -> impl Iterator<Item = (&'static str, &ComponentStats)> {
        self.components.iter().map(|(k, v)| (*k, v))
    }

    pub fn latencies(&self) -> impl Iterator<Item = (&'static str, &LatencyStats)> {
        self.latencies.iter().map(|(k, v)| (*k, v))
    }

    pub fn record_response(&mut self, source: ResponseSource, word_count: usize) {
        match source {
            ResponseSource::Rule => self.responses_rule += 1,
            ResponseSource::Triage => self.responses_triage += 1,
            ResponseSource::Reasoning => self.responses_reasoning += 1,
        }
        self.approvals += 1;
        self.response_words_sum += word_count as u64;
        self.response_count += 1;
    }

    pub fn record_silent(&mut self) {
        self.silent_decisions += 1;
    }

    pub fn record_rejection(&mut self, reason: RejectionReason) {
        *self.rejections.entry(reason).or_default() += 1;
    }

    pub fn rejections(&self, reason: RejectionReason) -> u64 {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections.values().sum()
    }

    pub fn record_thinking_ack(&mut self) {
        self.thinking_acks += 1;
    }

    pub fn avg_response_words(&self) -> f64 {
        if self.response_count == 0 {
            0.0
        } else {
            self.response_words_sum as f64 / self.response_count as f64
        }
    }
}
