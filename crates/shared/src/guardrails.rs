//! Per-tenant guardrails (spec 4.13): store cap, creation cooldown, login
//! rate limit + lockout, registration rate limit. Same hand-rolled
//! `Mutex<HashMap<...>>` + windowed `VecDeque<Instant>` idiom as the
//! HTTP rate limiter, generalized from a fixed per-endpoint policy table
//! to these specific named guards.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::AppError;

const MAX_TRACKED_ENTRIES: usize = 10_000;

struct WindowedCounter {
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl WindowedCounter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let cutoff = now.checked_sub(self.window).unwrap_or(now);
        let mut entries = self.entries.lock().expect("guardrail mutex poisoned");
        gc_if_oversized(&mut entries, now, self.window);

        let bucket = entries.entry(key.to_string()).or_default();
        prune(bucket, cutoff);

        if bucket.len() >= self.max_requests {
            let retry_after = bucket
                .front()
                .map(|first| self.window.saturating_sub(now.saturating_duration_since(*first)).as_secs().max(1))
                .unwrap_or(self.window.as_secs());
            return Err(retry_after);
        }

        bucket.push_back(now);
        Ok(())
    }

    fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }
}

fn prune(bucket: &mut VecDeque<Instant>, cutoff: Instant) {
    while let Some(front) = bucket.front() {
        if *front <= cutoff {
            bucket.pop_front();
        } else {
            break;
        }
    }
}

fn gc_if_oversized(entries: &mut HashMap<String, VecDeque<Instant>>, now: Instant, window: Duration) {
    if entries.len() <= MAX_TRACKED_ENTRIES {
        return;
    }
    let cutoff = now.checked_sub(window).unwrap_or(now);
    entries.retain(|_, bucket| {
        prune(bucket, cutoff);
        !bucket.is_empty()
    });
}

struct LockoutState {
    consecutive_failures: u32,
    locked_until: Option<Instant>,
}

pub struct LoginGuard {
    attempts: WindowedCounter,
    lockouts: Mutex<HashMap<String, LockoutState>>,
    max_attempts: u32,
    lockout_duration: Duration,
}

impl LoginGuard {
    pub fn new(attempts_per_window: usize, window: Duration, max_consecutive_failures: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: WindowedCounter::new(attempts_per_window, window),
            lockouts: Mutex::new(HashMap::new()),
            max_attempts: max_consecutive_failures,
            lockout_duration,
        }
    }

    pub fn check(&self, ip: &str, email: &str) -> Result<(), AppError> {
        self.check_at(ip, email, Instant::now())
    }

    fn check_at(&self, ip: &str, email: &str, now: Instant) -> Result<(), AppError> {
        {
            let lockouts = self.lockouts.lock().expect("lockout mutex poisoned");
            if let Some(state) = lockouts.get(email) {
                if let Some(locked_until) = state.locked_until {
                    if locked_until > now {
                        let retry_after = locked_until.saturating_duration_since(now).as_secs().max(1);
                        return Err(AppError::account_locked(retry_after));
                    }
                }
            }
        }

        let key = format!("{ip}|{email}");
        self.attempts.check_at(&key, now).map_err(AppError::login_rate_limited)
    }

    pub fn record_failure(&self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    fn record_failure_at(&self, email: &str, now: Instant) {
        let mut lockouts = self.lockouts.lock().expect("lockout mutex poisoned");
        if lockouts.len() > MAX_TRACKED_ENTRIES {
            lockouts.retain(|_, state| state.locked_until.is_none_or(|until| until > now));
        }
        let state = lockouts.entry(email.to_string()).or_insert(LockoutState {
            consecutive_failures: 0,
            locked_until: None,
        });
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.max_attempts {
            state.locked_until = Some(now + self.lockout_duration);
        }
    }

    pub fn record_success(&self, email: &str) {
        let mut lockouts = self.lockouts.lock().expect("lockout mutex poisoned");
        lockouts.remove(email);
    }
}

pub struct CreationCooldown {
    last_creation: Mutex<HashMap<uuid::Uuid, Instant>>,
    cooldown: Duration,
}

impl CreationCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_creation: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn check(&self, owner_id: uuid::Uuid) -> Result<(), AppError> {
        self.check_at(owner_id, Instant::now())
    }

    fn check_at(&self, owner_id: uuid::Uuid, now: Instant) -> Result<(), AppError> {
        let mut last_creation = self.last_creation.lock().expect("cooldown mutex poisoned");
        if last_creation.len() > MAX_TRACKED_ENTRIES {
            let cutoff = now.checked_sub(self.cooldown).unwrap_or(now);
            last_creation.retain(|_, at| *at > cutoff);
        }

        if let Some(last) = last_creation.get(&owner_id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.cooldown {
                return Err(AppError::creation_cooldown((self.cooldown - elapsed).as_secs().max(1)));
            }
        }

        last_creation.insert(owner_id, now);
        Ok(())
    }
}

pub struct RegistrationGuard {
    attempts: WindowedCounter,
}

impl RegistrationGuard {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            attempts: WindowedCounter::new(max_per_window, window),
        }
    }

    pub fn check(&self, ip: &str) -> Result<(), AppError> {
        self.attempts.check(ip).map_err(AppError::registration_rate_limited)
    }
}

pub struct RequestRateLimiter {
    counter: WindowedCounter,
}

impl RequestRateLimiter {
    pub fn new(max_requests_per_minute: usize) -> Self {
        Self {
            counter: WindowedCounter::new(max_requests_per_minute, Duration::from_secs(60)),
        }
    }

    pub fn check(&self, ip: &str) -> Result<(), AppError> {
        self.counter.check(ip).map_err(AppError::rate_limit_exceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_guard_allows_attempts_under_the_window_limit() {
        let guard = LoginGuard::new(10, Duration::from_secs(900), 5, Duration::from_secs(900));
        for _ in 0..5 {
            assert!(guard.check("1.2.3.4", "a@example.com").is_ok());
        }
    }

    #[test]
    fn five_consecutive_failures_lock_the_account() {
        let guard = LoginGuard::new(100, Duration::from_secs(900), 5, Duration::from_secs(900));
        for _ in 0..5 {
            guard.record_failure("a@example.com");
        }
        let result = guard.check("1.2.3.4", "a@example.com");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, "ACCOUNT_LOCKED");
    }

    #[test]
    fn a_successful_login_clears_the_lockout() {
        let guard = LoginGuard::new(100, Duration::from_secs(900), 5, Duration::from_secs(900));
        for _ in 0..5 {
            guard.record_failure("a@example.com");
        }
        guard.record_success("a@example.com");
        assert!(guard.check("1.2.3.4", "a@example.com").is_ok());
    }

    #[test]
    fn creation_cooldown_blocks_a_second_creation_inside_the_window() {
        let cooldown = CreationCooldown::new(Duration::from_secs(300));
        let owner = uuid::Uuid::new_v4();
        assert!(cooldown.check(owner).is_ok());
        let result = cooldown.check(owner);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, "CREATION_COOLDOWN");
    }

    #[test]
    fn registration_guard_rejects_beyond_its_quota() {
        let guard = RegistrationGuard::new(2, Duration::from_secs(3600));
        assert!(guard.check("9.9.9.9").is_ok());
        assert!(guard.check("9.9.9.9").is_ok());
        let result = guard.check("9.9.9.9");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, "REGISTRATION_RATE_LIMITED");
    }
}
