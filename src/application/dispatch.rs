//! Bounded dispatch of remote calls
//!
//! Every remote call for a service goes through one [`ServiceDispatcher`],
//! which caps the calls in flight. Inside a call, each HTTP request the
//! adapter makes passes the service's [`RequestGate`] for the request budget
//! and its own timeout. Exceeding the budget delays the caller; it never
//! fails it.

use crate::domain::Service;
use crate::infrastructure::config::DispatchConfig;
use crate::infrastructure::remote::{RemoteError, RequestGate, ServiceAdapter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Bounded retry with capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Whether another attempt may follow `attempts` failed ones
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay after the `attempt`-th failure (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}

/// Per-service worker pool and request gate around an adapter
pub struct ServiceDispatcher {
    adapter: Arc<dyn ServiceAdapter>,
    permits: Semaphore,
    gate: Arc<RequestGate>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ServiceDispatcher {
    pub fn new(
        adapter: Arc<dyn ServiceAdapter>,
        config: &DispatchConfig,
        cancel: CancellationToken,
    ) -> Self {
        ServiceDispatcher {
            adapter,
            permits: Semaphore::new(config.concurrency.max(1)),
            gate: Arc::new(RequestGate::new(config, cancel.clone())),
            retry: RetryPolicy::from_config(config),
            cancel,
        }
    }

    pub fn service(&self) -> Service {
        self.adapter.service()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run one remote call.
    ///
    /// Returns `None` if cancellation fires before the call's first request
    /// is sent. A request already sent runs to completion or timeout.
    pub async fn call<T, F, Fut>(&self, op: F) -> Option<Result<T, RemoteError>>
    where
        F: FnOnce(Arc<dyn ServiceAdapter>, Arc<RequestGate>) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            permit = self.permits.acquire() => permit.ok()?,
        };

        match op(self.adapter.clone(), self.gate.clone()).await {
            Err(err) if err.is_cancelled() => None,
            result => Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Submission, TagSet};
    use crate::infrastructure::remote::{Cursor, Page};
    use async_trait::async_trait;
    use tokio::time::Instant;

    struct SlowAdapter {
        delay: Duration,
    }

    #[async_trait]
    impl ServiceAdapter for SlowAdapter {
        fn service(&self) -> Service {
            Service::Weasyl
        }

        async fn enumerate(
            &self,
            gate: &RequestGate,
            _cursor: Option<Cursor>,
        ) -> Result<Page, RemoteError> {
            gate.run(async {
                tokio::time::sleep(self.delay).await;
                Ok(Page::default())
            })
            .await
        }

        async fn fetch(&self, _gate: &RequestGate, id: i64) -> Result<Submission, RemoteError> {
            Err(RemoteError::permanent(format!("no submission {}", id)))
        }

        async fn set_tags(
            &self,
            gate: &RequestGate,
            _id: i64,
            tags: &TagSet,
        ) -> Result<TagSet, RemoteError> {
            gate.run(async {
                tokio::time::sleep(self.delay).await;
                Ok(tags.clone())
            })
            .await
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            concurrency: 2,
            requests_per_period: 2,
            period_ms: 1000,
            call_timeout_secs: 5,
            max_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 1000,
        }
    }

    fn dispatcher(delay: Duration, cancel: &CancellationToken) -> ServiceDispatcher {
        ServiceDispatcher::new(Arc::new(SlowAdapter { delay }), &config(), cancel.clone())
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::from_config(&config());
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(1000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_allows_retry_is_bounded() {
        let policy = RetryPolicy::from_config(&config());
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out_as_transient() {
        let cancel = CancellationToken::new();
        let dispatcher = dispatcher(Duration::from_secs(60), &cancel);

        let result = dispatcher
            .call(|adapter, gate| async move { adapter.enumerate(&gate, None).await })
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_call_after_cancel_is_not_sent() {
        let cancel = CancellationToken::new();
        let dispatcher = dispatcher(Duration::ZERO, &cancel);
        cancel.cancel();

        let result = dispatcher
            .call(|adapter, gate| async move { adapter.enumerate(&gate, None).await })
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_call_passes_result_through() {
        let cancel = CancellationToken::new();
        let dispatcher = dispatcher(Duration::ZERO, &cancel);
        let tags: TagSet = ["a".to_string()].into_iter().collect();

        let confirmed = dispatcher
            .call(|adapter, gate| {
                let tags = tags.clone();
                async move { adapter.set_tags(&gate, 1, &tags).await }
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed, tags);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_the_budget() {
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(dispatcher(Duration::from_millis(10), &cancel));
        let start = Instant::now();

        let mut handles = Vec::new();
        for id in 0..4 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                let tags = TagSet::new();
                dispatcher
                    .call(|adapter, gate| async move { adapter.set_tags(&gate, id, &tags).await })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_ok());
        }

        // Two requests per second: the last pair waits for the second window
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
