#![allow(dead_code, deprecated)]

use assert_cmd::Command;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use retagger::domain::{Service, Submission, TagSet};
use retagger::infrastructure::remote::{Cursor, Page, RequestGate};
use retagger::infrastructure::{Config, RemoteError, ServiceAdapter, SubmissionStore};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn retagger_cmd() -> Command {
    let mut cmd = Command::cargo_bin("retagger").unwrap();
    cmd.env_remove("RETAGGER_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

pub fn tags(list: &[&str]) -> TagSet {
    list.iter().map(|t| t.to_string()).collect()
}

pub fn submission(service: Service, id: i64, list: &[&str]) -> Submission {
    Submission {
        service,
        id,
        title: format!("Submission {}", id),
        posted_at: Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap(),
        tags: tags(list),
    }
}

/// Write submissions into the store file at `path`
pub fn seed_store(path: &Path, submissions: &[Submission]) {
    let store = SubmissionStore::open(path).unwrap();
    for submission in submissions {
        store.upsert(submission).unwrap();
    }
}

/// Write a `retagger.toml` in `dir` pointing at `submissions.db` beside it
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("retagger.toml");
    fs::write(
        &path,
        format!("database = \"submissions.db\"\n{}", extra),
    )
    .unwrap();
    path
}

/// Config with fast retries and no effective rate limit
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.dispatch.requests_per_period = 10_000;
    config.dispatch.backoff_base_ms = 1;
    config.dispatch.backoff_max_ms = 5;
    config
}

/// Scriptable in-memory service.
///
/// Pages and set_tags responses are fixed up front; every call is recorded.
/// Each simulated HTTP request passes the dispatcher's request gate and takes
/// `latency`, so budgets and timeouts apply as they do to the real adapters.
pub struct StubAdapter {
    service: Service,
    pages: Vec<Vec<Submission>>,
    page_errors: Mutex<HashMap<usize, VecDeque<RemoteError>>>,
    set_tags_errors: Mutex<HashMap<i64, VecDeque<RemoteError>>>,
    confirmed_extra: Option<String>,
    cancel_on_set_tags: Option<CancellationToken>,
    latency: Duration,
    requests_per_page: usize,
    enumerate_calls: Mutex<usize>,
    set_tags_calls: Mutex<Vec<(i64, TagSet)>>,
    in_flight: Mutex<usize>,
    max_in_flight: Mutex<usize>,
    request_times: Mutex<Vec<Instant>>,
}

impl StubAdapter {
    pub fn new(service: Service) -> Self {
        StubAdapter {
            service,
            pages: vec![Vec::new()],
            page_errors: Mutex::new(HashMap::new()),
            set_tags_errors: Mutex::new(HashMap::new()),
            confirmed_extra: None,
            cancel_on_set_tags: None,
            latency: Duration::ZERO,
            requests_per_page: 1,
            enumerate_calls: Mutex::new(0),
            set_tags_calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(0),
            max_in_flight: Mutex::new(0),
            request_times: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages(mut self, pages: Vec<Vec<Submission>>) -> Self {
        self.pages = pages;
        self
    }

    /// Fail enumeration of page `index` with `errors`, in order, before serving it
    pub fn fail_page(self, index: usize, errors: Vec<RemoteError>) -> Self {
        self.page_errors
            .lock()
            .unwrap()
            .insert(index, errors.into());
        self
    }

    /// Fail set_tags for `id` with `errors`, in order, before accepting it
    pub fn fail_set_tags(self, id: i64, errors: Vec<RemoteError>) -> Self {
        self.set_tags_errors
            .lock()
            .unwrap()
            .insert(id, errors.into());
        self
    }

    /// Confirm writes with an extra tag, as a service normalizing tags would
    pub fn confirm_with_extra(mut self, tag: &str) -> Self {
        self.confirmed_extra = Some(tag.to_string());
        self
    }

    /// Cancel `token` while the first set_tags call is in flight
    pub fn cancel_on_set_tags(mut self, token: CancellationToken) -> Self {
        self.cancel_on_set_tags = Some(token);
        self
    }

    /// Make every simulated request take `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serve each page with `count` requests: the listing plus per-item views
    pub fn with_requests_per_page(mut self, count: usize) -> Self {
        self.requests_per_page = count.max(1);
        self
    }

    pub fn enumerate_calls(&self) -> usize {
        *self.enumerate_calls.lock().unwrap()
    }

    pub fn set_tags_calls(&self) -> Vec<(i64, TagSet)> {
        self.set_tags_calls.lock().unwrap().clone()
    }

    /// Most set_tags calls ever running at once
    pub fn max_in_flight(&self) -> usize {
        *self.max_in_flight.lock().unwrap()
    }

    /// When each simulated request was admitted, in order
    pub fn request_times(&self) -> Vec<Instant> {
        self.request_times.lock().unwrap().clone()
    }

    async fn request<T, F>(&self, gate: &RequestGate, respond: F) -> Result<T, RemoteError>
    where
        F: FnOnce() -> Result<T, RemoteError>,
    {
        gate.run(async {
            self.request_times.lock().unwrap().push(Instant::now());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            respond()
        })
        .await
    }

    fn enter(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        *in_flight += 1;
        let mut max = self.max_in_flight.lock().unwrap();
        *max = (*max).max(*in_flight);
    }

    fn leave(&self) {
        *self.in_flight.lock().unwrap() -= 1;
    }
}

#[async_trait]
impl ServiceAdapter for StubAdapter {
    fn service(&self) -> Service {
        self.service
    }

    async fn enumerate(
        &self,
        gate: &RequestGate,
        cursor: Option<Cursor>,
    ) -> Result<Page, RemoteError> {
        *self.enumerate_calls.lock().unwrap() += 1;

        let index = match cursor {
            Some(cursor) => cursor
                .0
                .parse::<usize>()
                .map_err(|_| RemoteError::permanent("bad cursor"))?,
            None => 0,
        };

        let error = self
            .page_errors
            .lock()
            .unwrap()
            .get_mut(&index)
            .and_then(|errors| errors.pop_front());

        self.request(gate, || match error {
            Some(error) => Err(error),
            None => Ok(()),
        })
        .await?;
        for _ in 1..self.requests_per_page {
            self.request(gate, || Ok(())).await?;
        }

        let submissions = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| Cursor((index + 1).to_string()));
        Ok(Page { submissions, next })
    }

    async fn fetch(&self, gate: &RequestGate, id: i64) -> Result<Submission, RemoteError> {
        self.request(gate, || {
            self.pages
                .iter()
                .flatten()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| RemoteError::permanent(format!("submission {} not found", id)))
        })
        .await
    }

    async fn set_tags(
        &self,
        gate: &RequestGate,
        id: i64,
        tags: &TagSet,
    ) -> Result<TagSet, RemoteError> {
        self.set_tags_calls.lock().unwrap().push((id, tags.clone()));

        self.enter();
        let result = self
            .request(gate, || {
                if let Some(token) = &self.cancel_on_set_tags {
                    token.cancel();
                }

                let error = self
                    .set_tags_errors
                    .lock()
                    .unwrap()
                    .get_mut(&id)
                    .and_then(|errors| errors.pop_front());
                if let Some(error) = error {
                    return Err(error);
                }

                let mut confirmed = tags.clone();
                if let Some(extra) = &self.confirmed_extra {
                    confirmed.insert(extra.clone());
                }
                Ok(confirmed)
            })
            .await;
        self.leave();

        result
    }
}
