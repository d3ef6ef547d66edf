use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub cooldown: Duration,
    /// Consecutive probe successes that close the circuit from half-open
    pub half_open_success_threshold: u32,
    /// Trial calls admitted while half-open
    pub half_open_probe_budget: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            half_open_success_threshold: 2,
            half_open_probe_budget: 2,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.failure_threshold == 0 {
            return Err(PipelineError::Config(
                "breaker failure_threshold must be >= 1".to_string(),
            ));
        }
        if self.half_open_success_threshold == 0 {
            return Err(PipelineError::Config(
                "breaker half_open_success_threshold must be >= 1".to_string(),
            ));
        }
        if self.half_open_probe_budget < self.half_open_success_threshold {
            return Err(PipelineError::Config(
                "breaker half_open_probe_budget must cover the success threshold".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, all calls allowed
    Closed,
    /// Dependency judged unhealthy, calls rejected without being made
    Open,
    /// Cooldown elapsed, a bounded number of trial calls allowed
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    open_until: Option<Instant>,
    half_open_successes: u32,
    half_open_probes: u32,
}

/// Per-dependency failure-state machine.
///
/// One instance exists per external dependency (STT, LLM), shared by every
/// concurrent request. All transitions happen under a single mutex, so exactly
/// one caller owns any given transition, including the cooldown-elapsed
/// Open -> HalfOpen flip, which is decided by whichever `allow()` caller takes
/// the lock first.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                open_until: None,
                half_open_successes: 0,
                half_open_probes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a call may be made right now. Owns the Open -> HalfOpen
    /// transition once the cooldown has elapsed, and hands out half-open
    /// probe slots.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .open_until
                    .map(|until| Instant::now() >= until)
                    .unwrap_or(true);
                if !cooled_down {
                    return false;
                }
                inner.state = BreakerState::HalfOpen;
                inner.half_open_successes = 0;
                inner.half_open_probes = 1;
                info!(breaker = %self.name, "circuit breaker state transition: open -> half_open");
                true
            }
            BreakerState::HalfOpen => {
                if inner.half_open_probes < self.config.half_open_probe_budget {
                    inner.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call against the dependency.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.consecutive_failures = 0;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.half_open_successes = 0;
                    inner.half_open_probes = 0;
                    inner.open_until = None;
                    info!(breaker = %self.name, "circuit breaker state transition: half_open -> closed");
                }
            }
            // A success can land here when its call started before the
            // circuit opened; it carries no information about recovery.
            BreakerState::Open => {}
        }
    }

    /// Record a failed call against the dependency.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner, "closed");
                }
            }
            BreakerState::HalfOpen => {
                self.trip(&mut inner, "half_open");
            }
            BreakerState::Open => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner, from: &str) {
        inner.state = BreakerState::Open;
        inner.open_until = Some(Instant::now() + self.config.cooldown);
        inner.half_open_successes = 0;
        inner.half_open_probes = 0;
        warn!(
            breaker = %self.name,
            consecutive_failures = inner.consecutive_failures,
            "circuit breaker state transition: {} -> open",
            from
        );
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Time since the last recorded failure, if any.
    pub fn time_since_last_failure(&self) -> Option<Duration> {
        self.inner.lock().last_failure_at.map(|at| at.elapsed())
    }

    /// Reset to closed state with fresh counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.open_until = None;
        inner.half_open_successes = 0;
        inner.half_open_probes = 0;
    }
}
