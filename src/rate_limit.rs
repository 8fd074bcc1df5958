// Global pacing limiter for the rank API.
//
// The external API budget is shared by every caller in the process (audit
// sweep, eligibility refresh, interactive rank checks), so there is exactly
// one limiter, cloned into each client. `acquire` waits for a free slot
// instead of failing; callers simply suspend until they may send.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sliding-window pacing limiter: at most `max_requests` sends per `window`.
#[derive(Debug, Clone)]
pub struct PacingLimiter {
    inner: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl PacingLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Limiter for a per-second request budget.
    pub fn per_second(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    /// Wait until a request slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.inner.lock().unwrap();
                let now = Instant::now();
                while let Some(front) = sent.front() {
                    if now.duration_since(*front) >= self.window {
                        sent.pop_front();
                    } else {
                        break;
                    }
                }
                if sent.len() < self.max_requests {
                    sent.push_back(now);
                    return;
                }
                // Oldest send ages out first; sleep until then.
                let oldest = *sent.front().expect("window is full");
                self.window - now.duration_since(oldest)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of sends currently inside the window (diagnostics/tests).
    pub fn in_flight(&self) -> usize {
        let mut sent = self.inner.lock().unwrap();
        let now = Instant::now();
        while let Some(front) = sent.front() {
            if now.duration_since(*front) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }
        sent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_within_budget_is_immediate() {
        let limiter = PacingLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.in_flight(), 5);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_window() {
        let limiter = PacingLimiter::new(2, Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // Third acquire must wait for the first slot to age out.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_shared_budget_across_clones() {
        let limiter = PacingLimiter::new(3, Duration::from_secs(60));
        let clone = limiter.clone();
        limiter.acquire().await;
        clone.acquire().await;
        assert_eq!(limiter.in_flight(), 2);
        assert_eq!(clone.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_window_expiry_frees_slots() {
        let limiter = PacingLimiter::new(1, Duration::from_millis(20));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(limiter.in_flight(), 0);
    }
}
