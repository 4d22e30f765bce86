//! Process-wide token bucket gating outbound page fetches.
//!
//! Callers that find the bucket empty wait for the next refill instead of
//! being rejected. The bucket state is the only mutable state shared between
//! concurrent scrapes; every mutation happens under its mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Cancelled;

/// Result of a non-blocking acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    /// No token now; one will be available after this long.
    Wait(Duration),
}

#[derive(Debug)]
struct RateBudget {
    tokens: u32,
    /// Start of the current refill interval.
    last_refill: Instant,
}

impl RateBudget {
    fn refill(&mut self, capacity: u32, interval: Duration, now: Instant) {
        // A full bucket does not bank refill time.
        if self.tokens >= capacity {
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = u32::try_from(elapsed.as_nanos() / interval.as_nanos()).unwrap_or(u32::MAX);
        if earned == 0 {
            return;
        }

        self.tokens = self.tokens.saturating_add(earned).min(capacity);
        self.last_refill = if self.tokens >= capacity {
            now
        } else {
            interval
                .checked_mul(earned)
                .map_or(now, |advance| self.last_refill + advance)
        };
    }
}

/// Cloneable handle to a shared token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    budget: Arc<Mutex<RateBudget>>,
}

impl TokenBucket {
    /// Creates a full bucket holding `capacity` tokens that regains one token
    /// per `refill_interval`.
    ///
    /// A zero capacity is raised to one and a zero interval to one
    /// millisecond, so the bucket always makes progress.
    #[must_use]
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_interval: refill_interval.max(Duration::from_millis(1)),
            budget: Arc::new(Mutex::new(RateBudget {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Tokens available right now.
    pub async fn available(&self) -> u32 {
        let mut budget = self.budget.lock().await;
        budget.refill(self.capacity, self.refill_interval, Instant::now());
        budget.tokens
    }

    /// Takes a token if one is available, otherwise reports how long until
    /// the next one.
    pub async fn try_acquire(&self) -> Acquire {
        let now = Instant::now();
        let mut budget = self.budget.lock().await;
        budget.refill(self.capacity, self.refill_interval, now);

        if budget.tokens > 0 {
            budget.tokens -= 1;
            return Acquire::Granted;
        }

        Acquire::Wait((budget.last_refill + self.refill_interval).saturating_duration_since(now))
    }

    /// Waits until a token is granted.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] as soon as `cancel` fires; no token is consumed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let wait = match self.try_acquire().await {
                Acquire::Granted => return Ok(()),
                Acquire::Wait(wait) => wait,
            };

            tracing::debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate budget exhausted, waiting for refill"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_full() {
        let bucket = TokenBucket::new(3, Duration::from_secs(60));
        assert_eq!(bucket.available().await, 3);
        for _ in 0..3 {
            assert_eq!(bucket.try_acquire().await, Acquire::Granted);
        }
        assert!(matches!(bucket.try_acquire().await, Acquire::Wait(_)));
    }

    #[tokio::test]
    async fn wait_never_exceeds_refill_interval() {
        let bucket = TokenBucket::new(1, Duration::from_secs(60));
        assert_eq!(bucket.try_acquire().await, Acquire::Granted);
        match bucket.try_acquire().await {
            Acquire::Wait(wait) => {
                assert!(wait > Duration::ZERO);
                assert!(wait <= Duration::from_secs(60));
            }
            Acquire::Granted => panic!("bucket should be empty"),
        }
    }

    #[tokio::test]
    async fn acquisition_beyond_capacity_waits_one_refill_interval() {
        let interval = Duration::from_millis(100);
        let bucket = TokenBucket::new(2, interval);
        let cancel = CancellationToken::new();

        let first = Instant::now();
        bucket.acquire(&cancel).await.unwrap();
        bucket.acquire(&cancel).await.unwrap();
        bucket.acquire(&cancel).await.unwrap();

        assert!(
            first.elapsed() >= interval,
            "third token granted after {:?}, expected at least {interval:?}",
            first.elapsed()
        );
    }

    #[tokio::test]
    async fn idle_time_does_not_overfill() {
        let bucket = TokenBucket::new(2, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(bucket.available().await, 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let bucket = TokenBucket::new(1, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        bucket.acquire(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert_eq!(bucket.acquire(&cancel).await, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn clones_share_one_budget() {
        let bucket = TokenBucket::new(1, Duration::from_secs(60));
        let other = bucket.clone();
        assert_eq!(bucket.try_acquire().await, Acquire::Granted);
        assert!(matches!(other.try_acquire().await, Acquire::Wait(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_are_all_served() {
        let interval = Duration::from_millis(20);
        let bucket = TokenBucket::new(1, interval);
        let started = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bucket = bucket.clone();
                tokio::spawn(async move { bucket.acquire(&CancellationToken::new()).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }

        // One token up front, three more refills.
        assert!(started.elapsed() >= interval * 3);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let bucket = TokenBucket::new(0, Duration::ZERO);
        assert_eq!(bucket.capacity(), 1);
        assert_eq!(bucket.refill_interval(), Duration::from_millis(1));
    }
}
