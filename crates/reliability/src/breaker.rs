//! Per-dependency circuit breaker
//!
//! # State machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  recovery   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  M successes            │  any failure         │
//!     └─────────────────────────┴──────────────────────┘
//! ```
//!
//! Closed executes normally; Open rejects immediately until the recovery
//! timer elapses; HalfOpen lets probe requests through and closes again
//! only after `half_open_successes` consecutive successes.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use redi_config::constants::reliability as defaults;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// Time in Open before probes are allowed (ms)
    pub recovery_ms: u64,
    /// Consecutive HalfOpen successes required to close
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            recovery_ms: defaults::BREAKER_RECOVERY_MS,
            half_open_successes: defaults::BREAKER_HALF_OPEN_SUCCESSES,
        }
    }
}

/// External dependencies guarded by breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Tts,
    Llm,
    Transcription,
    CloudVision,
}

impl Dependency {
    pub fn as_str(self) -> &'static str {
        match self {
            Dependency::Tts => "tts",
            Dependency::Llm => "llm",
            Dependency::Transcription => "transcription",
            Dependency::CloudVision => "cloud_vision",
        }
    }

    /// Per-dependency preset: speech providers trip fast and recover slowly,
    /// the LLM and cloud vision tolerate more noise.
    pub fn preset(self) -> CircuitBreakerConfig {
        match self {
            Dependency::Tts => CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_ms: 60_000,
                half_open_successes: defaults::BREAKER_HALF_OPEN_SUCCESSES,
            },
            Dependency::Llm => CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_ms: 30_000,
                half_open_successes: defaults::BREAKER_HALF_OPEN_SUCCESSES,
            },
            Dependency::Transcription => CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_ms: 30_000,
                half_open_successes: defaults::BREAKER_HALF_OPEN_SUCCESSES,
            },
            Dependency::CloudVision => CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_ms: 30_000,
                half_open_successes: defaults::BREAKER_HALF_OPEN_SUCCESSES,
            },
        }
    }
}

/// One circuit breaker. Time is supplied by the caller in epoch
/// milliseconds so state transitions are deterministic under test.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at_ms: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at_ms: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a request may be attempted now. An Open breaker whose
    /// recovery timer has elapsed transitions to HalfOpen and allows the
    /// probe.
    pub fn should_attempt(&mut self, now_ms: u64) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at_ms
                    .map_or(true, |t| now_ms.saturating_sub(t) >= self.config.recovery_ms);
                if elapsed {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.half_open_successes {
                    self.state = CircuitState::Closed;
                    self.consecutive_failures = 0;
                    self.half_open_successes = 0;
                }
            }
            _ => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
            }
        }
    }

    pub fn record_failure(&mut self, now_ms: u64) {
        match self.state {
            CircuitState::HalfOpen => {
                self.trip(now_ms);
            }
            _ => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.trip(now_ms);
                }
            }
        }
    }

    fn trip(&mut self, now_ms: u64) {
        self.state = CircuitState::Open;
        self.opened_at_ms = Some(now_ms);
        self.half_open_successes = 0;
        tracing::warn!(failures = self.consecutive_failures, "circuit opened");
    }
}

/// Process-wide breaker registry, shared across sessions.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<Mutex<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-seeded with the per-dependency presets
    pub fn with_presets() -> Self {
        let registry = Self::new();
        for dep in [
            Dependency::Tts,
            Dependency::Llm,
            Dependency::Transcription,
            Dependency::CloudVision,
        ] {
            registry.breakers.insert(
                dep.as_str().to_string(),
                Arc::new(Mutex::new(CircuitBreaker::new(dep.preset()))),
            );
        }
        registry
    }

    /// Get or create the breaker for `name` (defaults if unseeded)
    pub fn get(&self, name: &str) -> Arc<Mutex<CircuitBreaker>> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreaker::new(CircuitBreakerConfig::default())))
            })
            .clone()
    }

    pub fn state(&self, name: &str) -> CircuitState {
        self.breakers
            .get(name)
            .map_or(CircuitState::Closed, |b| b.lock().state())
    }
}
