//! Load submissions use case
//!
//! Mirrors every configured service into the store. Pages of one service are
//! fetched strictly in cursor order; different services sync in parallel.
//! Upserts are idempotent, so an interrupted run is repaired by running again.

use crate::application::dispatch::ServiceDispatcher;
use crate::domain::{Service, TagPolicy};
use crate::error::{RetaggerError, Result};
use crate::infrastructure::config::DispatchConfig;
use crate::infrastructure::remote::{AdapterRegistry, Cursor, Page, RemoteError, ServiceAdapter};
use crate::infrastructure::{Config, SubmissionStore};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Enumeration reached the end; records not seen were pruned
    Completed { pruned: usize },
    /// A remote error stopped enumeration; stored records are untouched
    Aborted { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSyncReport {
    pub service: Service,
    pub pages: usize,
    pub submissions: usize,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub services: Vec<ServiceSyncReport>,
}

impl SyncReport {
    /// Services whose sync did not complete because of a remote error
    pub fn failed_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|report| matches!(report.status, SyncStatus::Aborted { .. }))
            .map(|report| report.service.to_string())
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.services
            .iter()
            .any(|report| report.status == SyncStatus::Cancelled)
    }
}

enum PageFetch {
    Page(Page),
    Failed(RemoteError),
    Cancelled,
}

/// Drives adapter enumeration into the store
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<SubmissionStore>,
    dispatch: DispatchConfig,
    policy: TagPolicy,
}

impl SyncEngine {
    pub fn new(store: Arc<SubmissionStore>, config: &Config) -> Self {
        SyncEngine {
            store,
            dispatch: config.dispatch.clone(),
            policy: config.tag_policy(),
        }
    }

    /// Sync every registered service concurrently.
    ///
    /// A remote failure only aborts its own service. A store failure is
    /// fatal and returned after the other services stop.
    pub async fn sync_all(
        &self,
        registry: &AdapterRegistry,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        if registry.is_empty() {
            return Err(RetaggerError::NoServices);
        }

        let cancel = cancel.child_token();
        let mut handles = Vec::new();
        for adapter in registry.iter() {
            let engine = self.clone();
            let adapter = adapter.clone();
            let cancel = cancel.clone();
            let service = adapter.service();
            let handle = tokio::spawn(async move {
                let result = engine.sync_service(adapter, &cancel).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            });
            handles.push((service, handle));
        }

        let mut report = SyncReport::default();
        let mut first_error = None;
        for (service, handle) in handles {
            match handle.await {
                Ok(Ok(service_report)) => report.services.push(service_report),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => report.services.push(ServiceSyncReport {
                    service,
                    pages: 0,
                    submissions: 0,
                    status: SyncStatus::Aborted {
                        reason: format!("sync task failed: {}", e),
                    },
                }),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Enumerate one service from the start, upserting every submission
    pub async fn sync_service(
        &self,
        adapter: Arc<dyn ServiceAdapter>,
        cancel: &CancellationToken,
    ) -> Result<ServiceSyncReport> {
        let service = adapter.service();
        let dispatcher = ServiceDispatcher::new(adapter, &self.dispatch, cancel.clone());
        let mut report = ServiceSyncReport {
            service,
            pages: 0,
            submissions: 0,
            status: SyncStatus::Cancelled,
        };

        let mut seen = HashSet::new();
        let mut cursor: Option<Cursor> = None;

        loop {
            let page = match self.fetch_page(&dispatcher, cursor.take(), cancel).await {
                PageFetch::Page(page) => page,
                PageFetch::Failed(e) => {
                    log::warn!("{}: sync aborted after {} page(s): {}", service, report.pages, e);
                    report.status = SyncStatus::Aborted { reason: e.message };
                    return Ok(report);
                }
                PageFetch::Cancelled => {
                    log::warn!("{}: sync cancelled after {} page(s)", service, report.pages);
                    return Ok(report);
                }
            };

            for submission in page.submissions {
                let submission = submission.normalized(self.policy);
                self.store.upsert(&submission)?;
                seen.insert(submission.id);
                report.submissions += 1;
            }
            report.pages += 1;
            log::info!(
                "{}: loaded page {} ({} submissions so far)",
                service,
                report.pages,
                report.submissions
            );

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let pruned = self.store.prune_service(service, &seen)?;
        if pruned > 0 {
            log::info!("{}: removed {} submission(s) no longer listed", service, pruned);
        }
        log::info!("{}: discovered {} submissions", service, report.submissions);

        report.status = SyncStatus::Completed { pruned };
        Ok(report)
    }

    /// Fetch one page, retrying transient failures with backoff
    async fn fetch_page(
        &self,
        dispatcher: &ServiceDispatcher,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> PageFetch {
        let retry = dispatcher.retry_policy();
        let mut attempt = 1;

        loop {
            let page_cursor = cursor.clone();
            let result = dispatcher
                .call(|adapter, gate| async move { adapter.enumerate(&gate, page_cursor).await })
                .await;

            match result {
                None => return PageFetch::Cancelled,
                Some(Ok(page)) => return PageFetch::Page(page),
                Some(Err(e)) if e.is_transient() && retry.allows_retry(attempt) => {
                    let delay = retry.backoff(attempt);
                    log::warn!(
                        "{}: page load failed (attempt {}), retrying in {:?}: {}",
                        dispatcher.service(),
                        attempt,
                        delay,
                        e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return PageFetch::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Some(Err(e)) => return PageFetch::Failed(e),
            }
        }
    }
}
