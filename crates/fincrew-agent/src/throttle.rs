//! Sliding-window call throttle
//!
//! Callers over the limit wait for the window to free a slot; they are
//! never rejected.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct CallThrottle {
    limit: u32,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl CallThrottle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, calls: Mutex::new(VecDeque::new()) }
    }

    /// `limit` calls per minute; 0 disables throttling.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Wait until a call slot is free, then claim it.
    pub async fn acquire(&self) {
        if self.limit == 0 {
            return;
        }
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
                    calls.pop_front();
                }
                if calls.len() < self.limit as usize {
                    calls.push_back(now);
                    return;
                }
                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "call rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls recorded inside the current window.
    pub async fn in_window(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls.iter().filter(|t| now.duration_since(**t) < self.window).count()
    }
}
