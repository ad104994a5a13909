use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use super::domain::{ActionKind, Candidate, CandidateMap, ExecutionOrdering};
use super::portal::PortalDriver;
use super::session::SessionLease;
use super::verification::VerificationApi;

/// Result of one remote action attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure { reason: String },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            ActionOutcome::Success => None,
            ActionOutcome::Failure { reason } => Some(reason),
        }
    }
}

/// Drives the remote action for every eligible candidate, isolating failures
/// per item so one bad record never aborts the batch.
///
/// No internal retries: idempotency comes from re-matching on the next run,
/// not from trusting caller state.
pub struct BatchExecutor {
    portal: Arc<dyn PortalDriver>,
    verification: Arc<dyn VerificationApi>,
    fanout_limit: usize,
}

impl BatchExecutor {
    pub fn new(
        portal: Arc<dyn PortalDriver>,
        verification: Arc<dyn VerificationApi>,
        fanout_limit: usize,
    ) -> Self {
        Self {
            portal,
            verification,
            fanout_limit: fanout_limit.max(1),
        }
    }

    pub async fn execute(
        &self,
        action: ActionKind,
        session: &SessionLease,
        candidates: Vec<Candidate>,
    ) -> CandidateMap<ActionOutcome> {
        match action.ordering() {
            ExecutionOrdering::MustSerialize => {
                self.execute_serial(action, session, candidates).await
            }
            ExecutionOrdering::ParallelSafe => self.execute_parallel(candidates).await,
        }
    }

    /// Portal submissions share hidden view-state with the listing pages, so
    /// they run one at a time against the session, in ascending sort-key order
    /// to keep replays after partial failure reproducible.
    async fn execute_serial(
        &self,
        action: ActionKind,
        session: &SessionLease,
        mut candidates: Vec<Candidate>,
    ) -> CandidateMap<ActionOutcome> {
        candidates.sort_by_cached_key(Candidate::sort_key);

        let mut outcomes = CandidateMap::new();
        for candidate in &candidates {
            let outcome = match self.portal.submit(session.handle(), action, candidate).await {
                Ok(()) => ActionOutcome::Success,
                Err(err) => {
                    debug!(
                        candidate = candidate.id.0.as_str(),
                        action = action.label(),
                        %err,
                        "portal submission failed"
                    );
                    ActionOutcome::Failure {
                        reason: err.to_string(),
                    }
                }
            };
            outcomes.insert(candidate.id.clone(), outcome);
        }
        outcomes
    }

    /// Placement requests hit the stateless API, so they fan out under a
    /// bounded permit count and are re-keyed to their candidate on the way in.
    async fn execute_parallel(&self, candidates: Vec<Candidate>) -> CandidateMap<ActionOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.fanout_limit));
        let submissions = candidates.iter().map(|candidate| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("request semaphore closed");
                let outcome = match self.verification.submit_request(candidate).await {
                    Ok(()) => ActionOutcome::Success,
                    Err(err) => {
                        debug!(candidate = candidate.id.0.as_str(), %err, "placement request failed");
                        ActionOutcome::Failure {
                            reason: err.to_string(),
                        }
                    }
                };
                (candidate.id.clone(), outcome)
            }
        });

        join_all(submissions).await.into_iter().collect()
    }
}
