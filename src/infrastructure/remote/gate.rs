//! Per-request budget and timeout
//!
//! Adapters may need several HTTP requests for one capability call (a
//! gallery page plus one view per submission, or an edit form plus its
//! post). Each of those requests passes through the service's
//! [`RequestGate`] on its own: it waits for room in the request budget and
//! then gets the full per-request timeout.

use super::RemoteError;
use crate::infrastructure::config::DispatchConfig;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Window {
    start: Instant,
    count: u32,
}

/// Fixed-window request budget that delays instead of rejecting
pub struct RateLimiter {
    limit: u32,
    period: Duration,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, period: Duration) -> Self {
        RateLimiter {
            limit: limit.max(1),
            period,
            window: Mutex::new(Window {
                start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Wait until a request fits in the budget, then claim it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                if now.duration_since(window.start) >= self.period {
                    window.start = now;
                    window.count = 0;
                }

                if window.count < self.limit {
                    window.count += 1;
                    return;
                }

                (window.start + self.period).saturating_duration_since(now)
            };

            log::debug!("Request budget exhausted, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Budget, timeout and cancellation shared by every request to one service
pub struct RequestGate {
    limiter: RateLimiter,
    timeout: Duration,
    cancel: CancellationToken,
}

impl RequestGate {
    pub fn new(config: &DispatchConfig, cancel: CancellationToken) -> Self {
        RequestGate {
            limiter: RateLimiter::new(config.requests_per_period, config.period()),
            timeout: config.call_timeout(),
            cancel,
        }
    }

    /// Run one request once the budget allows it.
    ///
    /// Cancellation is only observed while waiting; a request that has been
    /// admitted runs to completion or timeout.
    pub async fn run<T, F>(&self, request: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RemoteError::cancelled()),
            _ = self.limiter.acquire() => {}
        }

        self.timed(request).await
    }

    /// Run a request that completes a write already sent, such as reading
    /// back confirmed state. It still pays the budget but ignores
    /// cancellation.
    pub async fn finish<T, F>(&self, request: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        self.limiter.acquire().await;
        self.timed(request).await
    }

    async fn timed<T, F>(&self, request: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::transient(format!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
