//! Apply tags use case
//!
//! Selects submissions, plans a diff for each and pushes the resulting tag
//! sets to their services. Every selected submission moves through a
//! [`SubmissionState`]; one submission failing never stops the others.

use crate::application::dispatch::{RetryPolicy, ServiceDispatcher};
use crate::application::query_tags::select;
use crate::domain::{plan, Diff, Service, Submission, TagEdit, TagExpression, TagPolicy, TagSet};
use crate::error::Result;
use crate::infrastructure::config::DispatchConfig;
use crate::infrastructure::remote::{AdapterRegistry, RemoteError};
use crate::infrastructure::{Config, SubmissionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Options for apply-tags
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub search: String,
    pub tags: String,
    pub dry_run: bool,
}

/// Progress of one submission through an apply run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    /// Has a non-empty diff, not yet sent
    Pending,
    /// Diff was empty; never sent
    NoOp,
    /// Attempt `attempt` was sent; `last_error` is set while a retry is due
    Dispatched {
        attempt: u32,
        last_error: Option<String>,
    },
    /// The service accepted the write and reported these tags
    Confirmed { tags: TagSet },
    Failed { reason: String, attempts: u32 },
    /// The run was cancelled before this submission finished
    Cancelled,
}

impl SubmissionState {
    /// Initial state for a planned diff
    pub fn planned(diff: &Diff) -> Self {
        if diff.is_empty() {
            SubmissionState::NoOp
        } else {
            SubmissionState::Pending
        }
    }

    /// Start the first attempt, or the next one after a retryable failure
    pub fn dispatch(self) -> Self {
        match self {
            SubmissionState::Pending => SubmissionState::Dispatched {
                attempt: 1,
                last_error: None,
            },
            SubmissionState::Dispatched {
                attempt,
                last_error: Some(_),
            } => SubmissionState::Dispatched {
                attempt: attempt + 1,
                last_error: None,
            },
            other => other,
        }
    }

    /// Fold the outcome of the in-flight attempt into the state
    pub fn on_result(
        self,
        result: std::result::Result<TagSet, RemoteError>,
        retry: &RetryPolicy,
    ) -> Self {
        let attempt = match self {
            SubmissionState::Dispatched {
                attempt,
                last_error: None,
            } => attempt,
            other => return other,
        };

        match result {
            Ok(tags) => SubmissionState::Confirmed { tags },
            Err(e) if e.is_transient() && retry.allows_retry(attempt) => {
                SubmissionState::Dispatched {
                    attempt,
                    last_error: Some(e.message),
                }
            }
            Err(e) if e.is_transient() => SubmissionState::Failed {
                reason: format!("{} (gave up after {} attempts)", e, attempt),
                attempts: attempt,
            },
            Err(e) => SubmissionState::Failed {
                reason: e.message,
                attempts: attempt,
            },
        }
    }

    /// Fail a pending submission without sending anything
    pub fn reject(self, reason: impl Into<String>) -> Self {
        match self {
            SubmissionState::Pending => SubmissionState::Failed {
                reason: reason.into(),
                attempts: 0,
            },
            other => other,
        }
    }

    pub fn cancel(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            SubmissionState::Cancelled
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::NoOp
                | SubmissionState::Confirmed { .. }
                | SubmissionState::Failed { .. }
                | SubmissionState::Cancelled
        )
    }

    /// Whether a failed attempt is waiting for its retry
    pub fn retry_due(&self) -> bool {
        matches!(
            self,
            SubmissionState::Dispatched {
                last_error: Some(_),
                ..
            }
        )
    }
}

/// Final state of one selected submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub submission: Submission,
    pub diff: Diff,
    pub state: SubmissionState,
}

/// Per-submission outcomes of an apply run, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub outcomes: Vec<ApplyOutcome>,
}

impl ApplyReport {
    fn count(&self, predicate: impl Fn(&SubmissionState) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.state)).count()
    }

    pub fn confirmed(&self) -> usize {
        self.count(|state| matches!(state, SubmissionState::Confirmed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|state| matches!(state, SubmissionState::Failed { .. }))
    }

    pub fn noop(&self) -> usize {
        self.count(|state| *state == SubmissionState::NoOp)
    }

    pub fn cancelled(&self) -> usize {
        self.count(|state| *state == SubmissionState::Cancelled)
    }

    /// Submissions a dry run would update
    pub fn planned(&self) -> usize {
        self.count(|state| *state == SubmissionState::Pending)
    }

    /// Outcomes with a non-empty diff
    pub fn changed(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state != SubmissionState::NoOp)
    }
}

/// Engine for applying tag edits to matched submissions
pub struct ApplyEngine {
    store: Arc<SubmissionStore>,
    registry: AdapterRegistry,
    dispatch: DispatchConfig,
    policy: TagPolicy,
}

impl ApplyEngine {
    pub fn new(store: Arc<SubmissionStore>, registry: AdapterRegistry, config: &Config) -> Self {
        ApplyEngine {
            store,
            registry,
            dispatch: config.dispatch.clone(),
            policy: config.tag_policy(),
        }
    }

    /// Plan and (unless dry run) apply the edit.
    ///
    /// Parse errors are returned before the store is read. A store error
    /// stops new dispatches and is returned once in-flight calls finish.
    pub async fn run(
        &self,
        options: &ApplyOptions,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let expression = TagExpression::parse(&options.search, self.policy)?;
        let edit = TagEdit::parse(&options.tags, self.policy)?;

        let matched = select(&self.store, &expression)?;
        log::info!("{} submission(s) match '{}'", matched.len(), expression);

        let mut outcomes: Vec<ApplyOutcome> = matched
            .into_iter()
            .map(|submission| {
                let diff = plan(&submission, &edit);
                let state = SubmissionState::planned(&diff);
                ApplyOutcome {
                    submission,
                    diff,
                    state,
                }
            })
            .collect();

        if !options.dry_run {
            self.dispatch_pending(&mut outcomes, cancel).await?;
        }

        Ok(ApplyReport {
            dry_run: options.dry_run,
            outcomes,
        })
    }

    async fn dispatch_pending(
        &self,
        outcomes: &mut [ApplyOutcome],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let cancel = cancel.child_token();
        let mut dispatchers: HashMap<Service, Arc<ServiceDispatcher>> = HashMap::new();
        let mut handles = Vec::new();

        for (index, outcome) in outcomes.iter_mut().enumerate() {
            if outcome.state != SubmissionState::Pending {
                continue;
            }

            let service = outcome.submission.service;
            let Some(adapter) = self.registry.get(service) else {
                log::warn!("{}: service not configured", outcome.submission.key());
                outcome.state = outcome.state.clone().reject("service not configured");
                continue;
            };
            let dispatcher = dispatchers
                .entry(service)
                .or_insert_with(|| {
                    Arc::new(ServiceDispatcher::new(adapter, &self.dispatch, cancel.clone()))
                })
                .clone();

            let store = self.store.clone();
            let policy = self.policy;
            let submission = outcome.submission.clone();
            let target = outcome.diff.apply_to(&submission.tags);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let result = drive(&dispatcher, &store, policy, &submission, target, &cancel).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            });
            handles.push((index, handle));
        }

        let mut first_error = None;
        for (index, handle) in handles {
            let outcome = &mut outcomes[index];
            match handle.await {
                Ok(Ok(state)) => outcome.state = state,
                Ok(Err(e)) => {
                    outcome.state = SubmissionState::Failed {
                        reason: e.to_string(),
                        attempts: 0,
                    };
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    outcome.state = SubmissionState::Failed {
                        reason: format!("apply task failed: {}", e),
                        attempts: 0,
                    };
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Drive one submission from Pending to a terminal state
async fn drive(
    dispatcher: &ServiceDispatcher,
    store: &SubmissionStore,
    policy: TagPolicy,
    submission: &Submission,
    target: TagSet,
    cancel: &CancellationToken,
) -> Result<SubmissionState> {
    let key = submission.key();
    let retry = dispatcher.retry_policy();
    let mut state = SubmissionState::Pending;

    loop {
        if cancel.is_cancelled() {
            return Ok(state.cancel());
        }

        state = state.dispatch();
        let tags = target.clone();
        let id = submission.id;
        let result = match dispatcher
            .call(|adapter, gate| async move { adapter.set_tags(&gate, id, &tags).await })
            .await
        {
            Some(result) => result,
            None => return Ok(state.cancel()),
        };

        state = state.on_result(result.map(|tags| policy.normalize_set(&tags)), &retry);

        match &state {
            SubmissionState::Confirmed { tags } => {
                store.upsert(&submission.with_tags(tags.clone()))?;
                log::info!("{}: tags updated", key);
                return Ok(state);
            }
            SubmissionState::Failed { reason, .. } => {
                log::warn!("{}: update failed: {}", key, reason);
                return Ok(state);
            }
            SubmissionState::Dispatched {
                attempt,
                last_error: Some(error),
            } => {
                let delay = retry.backoff(*attempt);
                log::warn!(
                    "{}: attempt {} failed, retrying in {:?}: {}",
                    key,
                    attempt,
                    delay,
                    error
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(state.cancel()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            _ => return Ok(state),
        }
    }
}
