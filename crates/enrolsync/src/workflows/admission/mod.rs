//! Learner admission reconciliation: fetch the external truth for a cohort,
//! classify every candidate against it, act on exactly the ones that need
//! action, and write every outcome back to the registry.
//!
//! The pipeline is one generic engine parameterized by the action kind; the
//! request, admit, and capture workflows are instantiations of it, not copies.

pub mod domain;
pub mod executor;
pub mod fetcher;
pub mod matcher;
pub mod portal;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod verification;

#[cfg(test)]
mod tests;

pub use domain::{
    normalize_identity, ActionKind, Candidate, CandidateError, CandidateFilter, CandidateId,
    CandidateStatusView, CandidateUpdate, ErrorUpdate, ExecutionOrdering, ExternalRecord, Gender,
    IdentityKey, IdentitySet, InstitutionId, LifecycleStage, RecordSource,
};
pub use executor::{ActionOutcome, BatchExecutor};
pub use fetcher::{CohortFetcher, CohortSnapshot, FetchError};
pub use matcher::{CohortMatcher, ExternalIndex, MatchResult};
pub use portal::{HttpPortalDriver, PortalCredentials, PortalDriver, PortalError, SessionHandle};
pub use report::{BatchReport, CandidateRef, ErroredCandidate};
pub use repository::{CandidateRepository, RepositoryError};
pub use router::{admission_router, BatchRequestBody};
pub use service::{AdmissionService, BatchError, BatchRequest, PipelineSettings};
pub use session::{SessionBroker, SessionGuard, SessionLease};
pub use verification::{HttpVerificationApi, VerificationApi, VerificationError};
