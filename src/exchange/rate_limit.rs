//! Per-venue request pacing.
//!
//! Token/interval model: at most N requests per fixed window. A call that
//! would exceed the budget sleeps until the window rolls over instead of
//! failing, building backpressure into the calling cadence.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Acquire one request slot, sleeping if the window budget is spent
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= self.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }
                if (stamps.len() as u32) < self.max_requests {
                    stamps.push_back(now);
                    None
                } else {
                    // Oldest in-window request decides how long to wait
                    stamps
                        .front()
                        .map(|front| self.window.saturating_sub(now.duration_since(*front)))
                }
            };

            match wait {
                None => return,
                Some(wait) => {
                    trace!("rate limit budget spent, sleeping {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
