use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use enrolsync::workflows::admission::{
    Candidate, CandidateFilter, CandidateId, CandidateRepository, CandidateUpdate, InstitutionId,
    RepositoryError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory stand-in for the learner store, used by the default wiring and
/// the CLI demo.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCandidateRepository {
    records: Arc<Mutex<BTreeMap<CandidateId, Candidate>>>,
}

impl CandidateRepository for InMemoryCandidateRepository {
    fn find(
        &self,
        institution: &InstitutionId,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        let records = self.records.lock().expect("repository mutex poisoned");
        Ok(records
            .values()
            .filter(|candidate| candidate.institution == *institution)
            .filter(|candidate| filter.accepts(candidate))
            .cloned()
            .collect())
    }

    fn fetch(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError> {
        let records = self.records.lock().expect("repository mutex poisoned");
        Ok(records.get(id).cloned())
    }

    fn insert(&self, candidate: Candidate) -> Result<Candidate, RepositoryError> {
        let mut records = self.records.lock().expect("repository mutex poisoned");
        if records.contains_key(&candidate.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(candidate.id.clone(), candidate.clone());
        Ok(candidate)
    }

    fn update_one(&self, id: &CandidateId, update: CandidateUpdate) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().expect("repository mutex poisoned");
        let candidate = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        update.apply(candidate);
        Ok(())
    }
}
