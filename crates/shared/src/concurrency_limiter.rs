//! Bounded permit pool with a FIFO wait queue (spec 4.7). Same manual-mutex
//! idiom as the circuit breaker: a condvar-free design built on
//! `tokio::sync::oneshot` channels for queued waiters, so `acquire()` can
//! be awaited cooperatively instead of spin-polling a mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::errors::AppError;
use crate::metrics::Registry;

struct Waiter {
    id: u64,
    enqueued_at: Instant,
    notify: oneshot::Sender<()>,
}

struct LimiterInner {
    active: usize,
    queue: VecDeque<Waiter>,
    draining: bool,
}

pub struct LimiterStats {
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub total_acquired: u64,
    pub total_rejected: u64,
    pub total_timed_out: u64,
}

pub struct ConcurrencyLimiter {
    name: String,
    max_concurrent: usize,
    max_queue_size: usize,
    acquire_timeout: Duration,
    inner: Mutex<LimiterInner>,
    next_waiter_id: AtomicU64,
    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
    total_timed_out: AtomicU64,
    metrics: Arc<Registry>,
}

/// Released exactly once even if `Permit` is dropped without an explicit
/// call, guarded by an `AtomicBool` single-use flag.
pub struct Permit {
    limiter: Arc<ConcurrencyLimiter>,
    released: AtomicBool,
}

impl Permit {
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.limiter.release_slot();
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release();
    }
}

impl ConcurrencyLimiter {
    pub fn new(name: impl Into<String>, max_concurrent: usize, max_queue_size: usize, acquire_timeout: Duration, metrics: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            max_concurrent,
            max_queue_size,
            acquire_timeout,
            inner: Mutex::new(LimiterInner {
                active: 0,
                queue: VecDeque::new(),
                draining: false,
            }),
            next_waiter_id: AtomicU64::new(0),
            total_acquired: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            total_timed_out: AtomicU64::new(0),
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn acquire(self: &Arc<Self>) -> Result<Permit, AppError> {
        let (waiter_id, receiver, enqueued_at) = {
            let mut inner = self.inner.lock().expect("limiter mutex poisoned");
            if inner.draining {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(AppError::provisioning_queue_full());
            }
            if inner.active < self.max_concurrent {
                inner.active += 1;
                self.total_acquired.fetch_add(1, Ordering::Relaxed);
                return Ok(Permit {
                    limiter: Arc::clone(self),
                    released: AtomicBool::new(false),
                });
            }
            if inner.queue.len() >= self.max_queue_size {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(AppError::provisioning_queue_full());
            }
            let waiter_id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = oneshot::channel();
            let enqueued_at = Instant::now();
            inner.queue.push_back(Waiter { id: waiter_id, enqueued_at, notify: sender });
            (waiter_id, receiver, enqueued_at)
        };

        match timeout(self.acquire_timeout, receiver).await {
            Ok(Ok(())) => {
                self.total_acquired.fetch_add(1, Ordering::Relaxed);
                self.metrics.observe_histogram(
                    "provisioning_queue_wait_ms",
                    "time a provisioning request spent queued before acquiring a concurrency slot",
                    vec![("limiter", self.name.clone())],
                    enqueued_at.elapsed().as_millis() as f64,
                );
                Ok(Permit {
                    limiter: Arc::clone(self),
                    released: AtomicBool::new(false),
                })
            }
            Ok(Err(_)) => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                Err(AppError::provisioning_queue_full())
            }
            Err(_) => {
                // Remove this waiter so a later `release_slot` can't hand it
                // a permit nobody will ever use. If it's already gone, a
                // concurrent `release_slot` popped it and passed the slot
                // through right as we timed out — give that slot back
                // instead of leaking it.
                let mut inner = self.inner.lock().expect("limiter mutex poisoned");
                if let Some(pos) = inner.queue.iter().position(|waiter| waiter.id == waiter_id) {
                    inner.queue.remove(pos);
                    drop(inner);
                } else {
                    drop(inner);
                    self.release_slot();
                }
                self.total_timed_out.fetch_add(1, Ordering::Relaxed);
                Err(AppError::provisioning_queue_timeout())
            }
        }
    }

    fn release_slot(&self) {
        let mut inner = self.inner.lock().expect("limiter mutex poisoned");
        if let Some(waiter) = inner.queue.pop_front() {
            // Active count stays the same: the slot passes directly to
            // the woken waiter instead of being freed and re-claimed.
            let _ = waiter.notify.send(());
        } else {
            inner.active = inner.active.saturating_sub(1);
        }
    }

    /// Fails all queued waiters immediately, for graceful shutdown.
    pub fn drain(&self) {
        let mut inner = self.inner.lock().expect("limiter mutex poisoned");
        inner.draining = true;
        while let Some(waiter) = inner.queue.pop_front() {
            drop(waiter.notify);
        }
    }

    pub fn stats(&self) -> LimiterStats {
        let inner = self.inner.lock().expect("limiter mutex poisoned");
        LimiterStats {
            active: inner.active,
            queued: inner.queue.len(),
            max_concurrent: self.max_concurrent,
            max_queue_size: self.max_queue_size,
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_timed_out: self.total_timed_out.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metrics() -> Arc<Registry> {
        Arc::new(Registry::new())
    }

    #[tokio::test]
    async fn admits_up_to_max_concurrent_without_queuing() {
        let limiter = ConcurrencyLimiter::new("test", 2, 1, Duration::from_millis(100), test_metrics());
        let p1 = limiter.acquire().await.unwrap();
        let p2 = limiter.acquire().await.unwrap();
        assert_eq!(limiter.stats().active, 2);
        drop(p1);
        drop(p2);
        assert_eq!(limiter.stats().active, 0);
    }

    #[tokio::test]
    async fn rejects_when_queue_is_full() {
        let limiter = ConcurrencyLimiter::new("test", 1, 0, Duration::from_millis(100), test_metrics());
        let _permit = limiter.acquire().await.unwrap();
        let result = limiter.acquire().await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, "PROVISIONING_QUEUE_FULL");
    }

    #[tokio::test]
    async fn queued_waiter_is_admitted_on_release() {
        let limiter = ConcurrencyLimiter::new("test", 1, 1, Duration::from_secs(5), test_metrics());
        let permit = limiter.acquire().await.unwrap();

        let limiter_clone = Arc::clone(&limiter);
        let waiter = tokio::spawn(async move { limiter_clone.acquire().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(permit);

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
        assert_eq!(limiter.stats().active, 1);
    }

    #[tokio::test]
    async fn deadline_expiry_times_out_a_queued_waiter() {
        let limiter = ConcurrencyLimiter::new("test", 1, 1, Duration::from_millis(20), test_metrics());
        let _permit = limiter.acquire().await.unwrap();
        let result = limiter.acquire().await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, "PROVISIONING_QUEUE_TIMEOUT");
    }

    #[tokio::test]
    async fn timed_out_waiter_does_not_leak_its_slot() {
        let limiter = ConcurrencyLimiter::new("test", 1, 1, Duration::from_millis(20), test_metrics());
        let permit = limiter.acquire().await.unwrap();

        let timed_out = limiter.acquire().await;
        assert_eq!(timed_out.unwrap_err().code, "PROVISIONING_QUEUE_TIMEOUT");

        drop(permit);
        assert_eq!(limiter.stats().active, 0);

        let next = limiter.acquire().await;
        assert!(next.is_ok());
        assert_eq!(limiter.stats().active, 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let limiter = ConcurrencyLimiter::new("test", 1, 1, Duration::from_millis(100), test_metrics());
        let permit = limiter.acquire().await.unwrap();
        permit.release();
        permit.release();
        assert_eq!(limiter.stats().active, 0);
    }

    #[tokio::test]
    async fn drain_fails_queued_waiters_immediately() {
        let limiter = ConcurrencyLimiter::new("test", 1, 1, Duration::from_secs(5), test_metrics());
        let _permit = limiter.acquire().await.unwrap();
        let limiter_clone = Arc::clone(&limiter);
        let waiter = tokio::spawn(async move { limiter_clone.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.drain();
        assert!(waiter.await.unwrap().is_err());
    }
}
