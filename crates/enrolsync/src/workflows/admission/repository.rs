use super::domain::{Candidate, CandidateFilter, CandidateId, CandidateUpdate, InstitutionId};

/// Storage abstraction over the learner/institution document store.
///
/// Bulk callers collect per-item outcomes instead of relying on transactions:
/// every write is independently committed, so a crash mid-batch loses at most
/// the unwritten tail.
pub trait CandidateRepository: Send + Sync {
    fn find(
        &self,
        institution: &InstitutionId,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, RepositoryError>;
    fn fetch(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError>;
    fn insert(&self, candidate: Candidate) -> Result<Candidate, RepositoryError>;
    fn update_one(&self, id: &CandidateId, update: CandidateUpdate)
        -> Result<(), RepositoryError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("candidate already exists")]
    Conflict,
    #[error("candidate not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
