use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{
    ActionKind, Candidate, CandidateFilter, CandidateId, CandidateMap, CandidateStatusView,
    CandidateUpdate, InstitutionId,
};
use super::executor::{ActionOutcome, BatchExecutor};
use super::fetcher::{CohortFetcher, CohortSnapshot, FetchError};
use super::matcher::{CohortMatcher, MatchResult};
use super::portal::{PortalCredentials, PortalDriver, PortalError};
use super::report::{self, BatchReport};
use super::repository::{CandidateRepository, RepositoryError};
use super::session::{SessionBroker, SessionLease};
use super::verification::VerificationApi;

/// Tunables for the reconciliation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub lookup_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            lookup_concurrency: 8,
        }
    }
}

/// One batch invocation: which institution, with which portal account, over
/// which cohort slice.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub institution: InstitutionId,
    pub credentials: PortalCredentials,
    pub grade: String,
    pub scope: Option<Vec<String>>,
}

/// Batch-fatal errors. Everything per-candidate is folded into the report
/// instead of surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("portal authentication failed: {0}")]
    Authentication(String),
    #[error(transparent)]
    Fetch(FetchError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The generic reconciliation engine: fetch, match, execute, aggregate,
/// persist. Instantiated once and parameterized per action, rather than
/// copied per workflow.
pub struct AdmissionService<R> {
    repository: Arc<R>,
    portal: Arc<dyn PortalDriver>,
    verification: Arc<dyn VerificationApi>,
    broker: SessionBroker,
    settings: PipelineSettings,
}

impl<R> AdmissionService<R>
where
    R: CandidateRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        portal: Arc<dyn PortalDriver>,
        verification: Arc<dyn VerificationApi>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            repository,
            portal,
            verification,
            broker: SessionBroker::new(),
            settings,
        }
    }

    /// Run one batch for one institution.
    ///
    /// The portal session is leased after candidates load and released on
    /// every exit path, including batch-fatal ones.
    pub async fn run_batch(
        &self,
        action: ActionKind,
        request: BatchRequest,
    ) -> Result<BatchReport, BatchError> {
        let filter = CandidateFilter {
            grade: Some(request.grade.clone()),
            scope: request.scope.clone(),
        };
        let candidates = self.repository.find(&request.institution, &filter)?;
        if candidates.is_empty() {
            info!(
                action = action.label(),
                institution = request.institution.0.as_str(),
                "no registry candidates match the requested cohort"
            );
            return Ok(BatchReport::empty(action));
        }

        // Invalid credentials and an unreachable portal are the same to the
        // batch: no session, no work.
        let lease = self
            .broker
            .lease(self.portal.clone(), &request.institution, &request.credentials)
            .await
            .map_err(|err| match err {
                PortalError::Authentication(message) => BatchError::Authentication(message),
                other => BatchError::Authentication(other.to_string()),
            })?;

        let staged = self
            .run_leased(action, &request, &candidates, &lease)
            .await;
        lease.close().await;
        let (matches, outcomes) = staged?;

        self.persist(action, &candidates, &matches, &outcomes);
        let batch_report = report::aggregate(action, &candidates, &matches, &outcomes);
        info!(
            action = action.label(),
            institution = request.institution.0.as_str(),
            summary = batch_report.summary().as_str(),
            "batch resolved"
        );
        Ok(batch_report)
    }

    /// Everything that needs the live session: fetch, classify, execute.
    async fn run_leased(
        &self,
        action: ActionKind,
        request: &BatchRequest,
        candidates: &[Candidate],
        lease: &SessionLease,
    ) -> Result<(CandidateMap<MatchResult>, CandidateMap<ActionOutcome>), BatchError> {
        let fetcher = CohortFetcher::new(
            self.portal.clone(),
            self.verification.clone(),
            self.settings.lookup_concurrency,
        );
        let snapshot = match fetcher
            .fetch(lease, &request.grade, candidates, action.identity_key())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(FetchError::EmptyCohort) => {
                // Legitimately empty external state is not a failure: every
                // candidate classifies against a blank snapshot.
                info!(
                    grade = request.grade.as_str(),
                    "external cohort is empty"
                );
                CohortSnapshot::default()
            }
            Err(err) => return Err(BatchError::Fetch(err)),
        };

        let matcher = CohortMatcher::new(action, request.institution.clone());
        let matches = matcher.classify_cohort(candidates, &snapshot);
        let actionable: Vec<Candidate> = candidates
            .iter()
            .filter(|candidate| {
                matches
                    .get(&candidate.id)
                    .is_some_and(MatchResult::is_actionable)
            })
            .cloned()
            .collect();

        let executor = BatchExecutor::new(
            self.portal.clone(),
            self.verification.clone(),
            self.settings.lookup_concurrency,
        );
        let outcomes = executor.execute(action, lease, actionable).await;
        Ok((matches, outcomes))
    }

    /// One write per candidate, independently committed. A failed write is
    /// logged and left for the next run's errored set, never escalated.
    fn persist(
        &self,
        action: ActionKind,
        candidates: &[Candidate],
        matches: &CandidateMap<MatchResult>,
        outcomes: &CandidateMap<ActionOutcome>,
    ) {
        for candidate in candidates {
            let update = match matches.get(&candidate.id) {
                Some(MatchResult::Satisfied) => CandidateUpdate::advanced(action.desired_stage()),
                Some(MatchResult::Blocked { reason }) => CandidateUpdate::errored(reason.clone()),
                Some(MatchResult::Actionable) => match outcomes.get(&candidate.id) {
                    Some(ActionOutcome::Success) => {
                        CandidateUpdate::advanced(action.desired_stage())
                    }
                    Some(ActionOutcome::Failure { reason }) => {
                        CandidateUpdate::errored(reason.clone())
                    }
                    None => CandidateUpdate::errored("no action outcome recorded"),
                },
                None => continue,
            };

            if let Err(err) = self.repository.update_one(&candidate.id, update) {
                warn!(
                    candidate = candidate.id.0.as_str(),
                    %err,
                    "candidate status write failed"
                );
            }
        }
    }

    /// Fetch a candidate's current status for API responses.
    pub fn candidate_status(
        &self,
        id: &CandidateId,
    ) -> Result<Option<CandidateStatusView>, RepositoryError> {
        Ok(self
            .repository
            .fetch(id)?
            .map(|candidate| candidate.status_view()))
    }
}
