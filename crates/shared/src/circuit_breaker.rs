//! Three-state circuit breaker (spec 4.6), named instances held in a
//! process-wide registry for metrics exposure. Same manual-mutex idiom as
//! the HTTP rate limiter: a `Mutex`-guarded map keyed by name, `Instant`
//! windows, and a `#[cfg(test)]` suite driven by injected timestamps
//! rather than `Instant::now()` so assertions are deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_in_flight: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDecision {
    Admit,
    RejectOpen { retry_after: Duration },
}

pub struct Breaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl Breaker {
    fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Decide whether to admit a call, transitioning OPEN -> HALF_OPEN
    /// once `reset_timeout` has elapsed.
    pub fn before_call(&self) -> CallDecision {
        self.before_call_at(Instant::now())
    }

    fn before_call_at(&self, now: Instant) -> CallDecision {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => CallDecision::Admit,
            BreakerState::Open => {
                let opened_at = inner.opened_at.expect("open state always has opened_at");
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.config.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    CallDecision::Admit
                } else {
                    CallDecision::RejectOpen {
                        retry_after: self.config.reset_timeout - elapsed,
                    }
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max {
                    inner.half_open_in_flight += 1;
                    CallDecision::Admit
                } else {
                    CallDecision::RejectOpen {
                        retry_after: Duration::from_secs(1),
                    }
                }
            }
        }
    }

    pub fn on_success(&self) {
        self.on_success_at(Instant::now());
    }

    fn on_success_at(&self, _now: Instant) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn on_failure(&self) {
        self.on_failure_at(Instant::now());
    }

    fn on_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.consecutive_failures = self.config.failure_threshold;
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                }
            }
            BreakerState::Open => {}
        }
    }
}

/// Process-wide registry of named breakers, lazily created on first use.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<Breaker>>>,
}

impl BreakerRegistry {
    fn new() -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn named(&self, name: &str, config: BreakerConfig) -> Arc<Breaker> {
        let mut breakers = self.breakers.lock().expect("registry mutex poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Breaker::new(name, config)))
            .clone()
    }

    pub fn snapshot(&self) -> Vec<(String, BreakerState)> {
        self.breakers
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .map(|breaker| (breaker.name.clone(), breaker.state()))
            .collect()
    }
}

static REGISTRY: OnceLock<BreakerRegistry> = OnceLock::new();

pub fn registry() -> &'static BreakerRegistry {
    REGISTRY.get_or_init(BreakerRegistry::new)
}

/// 4xx responses other than 408/425/429 are deliberate client errors, not
/// cluster faults, so the cluster adapter's breaker must not count them.
pub fn is_cluster_failure(status: Option<u16>) -> bool {
    match status {
        Some(code) if (400..500).contains(&code) => matches!(code, 408 | 425 | 429),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_max: 1,
        }
    }

    #[test]
    fn opens_after_reaching_the_failure_threshold() {
        let breaker = Breaker::new("test", config());
        for _ in 0..2 {
            assert_eq!(breaker.before_call(), CallDecision::Admit);
            breaker.on_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.on_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn rejects_while_open_and_half_opens_after_timeout() {
        let breaker = Breaker::new("test", config());
        let start = Instant::now();
        for _ in 0..3 {
            breaker.on_failure_at(start);
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let decision = breaker.before_call_at(start + Duration::from_secs(1));
        assert!(matches!(decision, CallDecision::RejectOpen { .. }));

        let decision = breaker.before_call_at(start + Duration::from_secs(31));
        assert_eq!(decision, CallDecision::Admit);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_the_circuit() {
        let breaker = Breaker::new("test", config());
        let start = Instant::now();
        for _ in 0..3 {
            breaker.on_failure_at(start);
        }
        breaker.before_call_at(start + Duration::from_secs(31));
        breaker.on_success_at(start + Duration::from_secs(31));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_the_circuit() {
        let breaker = Breaker::new("test", config());
        let start = Instant::now();
        for _ in 0..3 {
            breaker.on_failure_at(start);
        }
        breaker.before_call_at(start + Duration::from_secs(31));
        breaker.on_failure_at(start + Duration::from_secs(31));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn client_errors_other_than_408_425_429_are_not_cluster_failures() {
        assert!(!is_cluster_failure(Some(404)));
        assert!(!is_cluster_failure(Some(400)));
        assert!(is_cluster_failure(Some(429)));
        assert!(is_cluster_failure(Some(408)));
        assert!(is_cluster_failure(Some(500)));
        assert!(is_cluster_failure(None));
    }

    #[test]
    fn registry_returns_the_same_instance_for_a_name() {
        let registry = BreakerRegistry::new();
        let a = registry.named("cluster", config());
        let b = registry.named("cluster", config());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
