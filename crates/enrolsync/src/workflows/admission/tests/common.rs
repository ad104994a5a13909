use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::workflows::admission::domain::{
    normalize_identity, ActionKind, Candidate, CandidateFilter, CandidateId, CandidateUpdate,
    ExternalRecord, Gender, IdentitySet, InstitutionId, LifecycleStage, RecordSource,
};
use crate::workflows::admission::portal::{
    PortalCredentials, PortalDriver, PortalError, SessionHandle,
};
use crate::workflows::admission::repository::{CandidateRepository, RepositoryError};
use crate::workflows::admission::service::{
    AdmissionService, BatchRequest, PipelineSettings,
};
use crate::workflows::admission::verification::{VerificationApi, VerificationError};

pub(super) const OUR_INSTITUTION: &str = "10234001";
pub(super) const OTHER_INSTITUTION: &str = "20107005";

pub(super) fn institution() -> InstitutionId {
    InstitutionId(OUR_INSTITUTION.to_string())
}

pub(super) fn credentials() -> PortalCredentials {
    PortalCredentials {
        username: "registrar".to_string(),
        password: "hunter2".to_string(),
    }
}

pub(super) fn batch_request() -> BatchRequest {
    BatchRequest {
        institution: institution(),
        credentials: credentials(),
        grade: "form1".to_string(),
        scope: None,
    }
}

pub(super) fn candidate(
    id: &str,
    name: &str,
    index_no: Option<&str>,
    birth_certificate_no: Option<&str>,
    marks: Option<u16>,
    gender: Option<Gender>,
) -> Candidate {
    Candidate {
        id: CandidateId(id.to_string()),
        institution: institution(),
        grade: "form1".to_string(),
        name: name.to_string(),
        gender,
        marks,
        identity: IdentitySet {
            admission_no: None,
            index_no: index_no.map(str::to_string),
            birth_certificate_no: birth_certificate_no.map(str::to_string),
            external_uid: None,
        },
        stage: LifecycleStage::Registered,
        last_error: None,
    }
}

pub(super) fn external_record(
    source: RecordSource,
    name: &str,
    index_no: Option<&str>,
    birth_certificate_no: Option<&str>,
    marks: Option<u16>,
    institution_code: Option<&str>,
    stage: Option<LifecycleStage>,
) -> ExternalRecord {
    ExternalRecord {
        source,
        name: name.to_string(),
        gender: None,
        marks,
        identity: IdentitySet {
            admission_no: None,
            index_no: index_no.map(str::to_string),
            birth_certificate_no: birth_certificate_no.map(str::to_string),
            external_uid: None,
        },
        institution_code: institution_code.map(str::to_string),
        stage,
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<BTreeMap<CandidateId, Candidate>>,
    pub(super) fail_updates: AtomicBool,
}

impl MemoryRepository {
    pub(super) fn seeded(candidates: Vec<Candidate>) -> Arc<Self> {
        let repository = Arc::new(Self::default());
        for candidate in candidates {
            repository.insert(candidate).expect("seed candidate");
        }
        repository
    }

    pub(super) fn stored(&self, id: &str) -> Candidate {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(&CandidateId(id.to_string()))
            .cloned()
            .expect("candidate present")
    }
}

impl CandidateRepository for MemoryRepository {
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

    fn update_one(
        &self,
        id: &CandidateId,
        update: CandidateUpdate,
    ) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::Relaxed) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        let mut records = self.records.lock().expect("repository mutex poisoned");
        let candidate = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        update.apply(candidate);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct FakePortal {
    listing: Mutex<Vec<ExternalRecord>>,
    pub(super) fail_login: AtomicBool,
    pub(super) fail_listing: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    pub(super) logins: AtomicUsize,
    pub(super) closes: AtomicUsize,
    submissions: Mutex<Vec<(ActionKind, CandidateId)>>,
}

impl FakePortal {
    pub(super) fn set_listing(&self, records: Vec<ExternalRecord>) {
        *self.listing.lock().expect("listing mutex poisoned") = records;
    }

    pub(super) fn reject_submissions_for(&self, candidate_id: &str) {
        self.rejected
            .lock()
            .expect("rejection mutex poisoned")
            .insert(candidate_id.to_string());
    }

    pub(super) fn submissions(&self) -> Vec<(ActionKind, CandidateId)> {
        self.submissions
            .lock()
            .expect("submission mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl PortalDriver for FakePortal {
    async fn login(&self, _credentials: &PortalCredentials) -> Result<SessionHandle, PortalError> {
        if self.fail_login.load(Ordering::Relaxed) {
            return Err(PortalError::Authentication(
                "portal rejected the supplied credentials".to_string(),
            ));
        }
        let serial = self.logins.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(SessionHandle::new(format!("fake-session-{serial}")))
    }

    async fn list_cohort(
        &self,
        _handle: &SessionHandle,
        _grade: &str,
    ) -> Result<Vec<ExternalRecord>, PortalError> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(PortalError::Connection("portal timed out".to_string()));
        }
        Ok(self.listing.lock().expect("listing mutex poisoned").clone())
    }

    async fn submit(
        &self,
        _handle: &SessionHandle,
        action: ActionKind,
        candidate: &Candidate,
    ) -> Result<(), PortalError> {
        self.submissions
            .lock()
            .expect("submission mutex poisoned")
            .push((action, candidate.id.clone()));
        let rejected = self.rejected.lock().expect("rejection mutex poisoned");
        if rejected.contains(&candidate.id.0) {
            return Err(PortalError::Rejected(
                "duplicate admission entry".to_string(),
            ));
        }
        Ok(())
    }

    async fn close(&self, _handle: &SessionHandle) -> Result<(), PortalError> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct FakeVerification {
    records: Mutex<HashMap<String, ExternalRecord>>,
    pub(super) fail_lookups: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    requests: Mutex<Vec<CandidateId>>,
}

impl FakeVerification {
    pub(super) fn set_record(&self, key: &str, record: ExternalRecord) {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .insert(normalize_identity(key), record);
    }

    pub(super) fn reject_requests_for(&self, candidate_id: &str) {
        self.rejected
            .lock()
            .expect("rejection mutex poisoned")
            .insert(candidate_id.to_string());
    }

    pub(super) fn requests(&self) -> Vec<CandidateId> {
        self.requests.lock().expect("request mutex poisoned").clone()
    }
}

#[async_trait]
impl VerificationApi for FakeVerification {
    async fn lookup(
        &self,
        identity_key: &str,
    ) -> Result<Option<ExternalRecord>, VerificationError> {
        if self.fail_lookups.load(Ordering::Relaxed) {
            return Err(VerificationError::Connection(
                "verification api timed out".to_string(),
            ));
        }
        let records = self.records.lock().expect("record mutex poisoned");
        Ok(records.get(&normalize_identity(identity_key)).cloned())
    }

    async fn submit_request(&self, candidate: &Candidate) -> Result<(), VerificationError> {
        self.requests
            .lock()
            .expect("request mutex poisoned")
            .push(candidate.id.clone());
        let rejected = self.rejected.lock().expect("rejection mutex poisoned");
        if rejected.contains(&candidate.id.0) {
            return Err(VerificationError::Rejected(
                "placement request refused".to_string(),
            ));
        }
        Ok(())
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<AdmissionService<MemoryRepository>>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) portal: Arc<FakePortal>,
    pub(super) verification: Arc<FakeVerification>,
}

pub(super) fn build_harness(candidates: Vec<Candidate>) -> Harness {
    let repository = MemoryRepository::seeded(candidates);
    let portal = Arc::new(FakePortal::default());
    let verification = Arc::new(FakeVerification::default());
    let service = Arc::new(AdmissionService::new(
        repository.clone(),
        portal.clone() as Arc<dyn PortalDriver>,
        verification.clone() as Arc<dyn VerificationApi>,
        PipelineSettings::default(),
    ));
    Harness {
        service,
        repository,
        portal,
        verification,
    }
}
