use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registry candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// National institution code shared by the registry and both external surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstitutionId(pub String);

/// Gender as recorded during placement; used only as a match-verification signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" | "BOY" => Some(Gender::Male),
            "F" | "FEMALE" | "GIRL" => Some(Gender::Female),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// Durable identity fields a candidate can be looked up by on the external surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySet {
    pub admission_no: Option<String>,
    pub index_no: Option<String>,
    pub birth_certificate_no: Option<String>,
    pub external_uid: Option<String>,
}

/// How far along the admission lifecycle a candidate has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Registered,
    Requested,
    Admitted,
    Captured,
}

impl LifecycleStage {
    pub const fn label(self) -> &'static str {
        match self {
            LifecycleStage::Registered => "registered",
            LifecycleStage::Requested => "requested",
            LifecycleStage::Admitted => "admitted",
            LifecycleStage::Captured => "captured",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "registered" => Some(LifecycleStage::Registered),
            "requested" | "selected" | "reported" => Some(LifecycleStage::Requested),
            "admitted" => Some(LifecycleStage::Admitted),
            "captured" => Some(LifecycleStage::Captured),
            _ => None,
        }
    }
}

/// Last failure recorded against a candidate, kept until the next successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateError {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CandidateError {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A local registry record awaiting reconciliation against the external authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub institution: InstitutionId,
    pub grade: String,
    pub name: String,
    pub gender: Option<Gender>,
    pub marks: Option<u16>,
    pub identity: IdentitySet,
    pub stage: LifecycleStage,
    pub last_error: Option<CandidateError>,
}

impl Candidate {
    /// Stable ordering key for serial portal submissions: birth certificate
    /// number, falling back to index number, then the registry id.
    pub fn sort_key(&self) -> String {
        self.identity
            .birth_certificate_no
            .clone()
            .or_else(|| self.identity.index_no.clone())
            .unwrap_or_else(|| self.id.0.clone())
    }

    pub fn status_view(&self) -> CandidateStatusView {
        CandidateStatusView {
            candidate_id: self.id.clone(),
            name: self.name.clone(),
            stage: self.stage.label(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Sanitized representation of a candidate's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateStatusView {
    pub candidate_id: CandidateId,
    pub name: String,
    pub stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<CandidateError>,
}

/// Which external surface produced a snapshot record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Portal,
    VerificationApi,
}

/// Read-only snapshot item from the portal listing or the verification API.
///
/// Fetched fresh per batch and discarded afterwards; only candidate fields are
/// ever updated from it, the record itself is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub source: RecordSource,
    pub name: String,
    pub gender: Option<Gender>,
    pub marks: Option<u16>,
    pub identity: IdentitySet,
    pub institution_code: Option<String>,
    pub stage: Option<LifecycleStage>,
}

/// The remote action a batch drives for its eligible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Request,
    Admit,
    Capture,
}

impl ActionKind {
    pub const fn label(self) -> &'static str {
        match self {
            ActionKind::Request => "request",
            ActionKind::Admit => "admit",
            ActionKind::Capture => "capture",
        }
    }

    /// Identity field the external surface for this action is keyed by.
    pub const fn identity_key(self) -> IdentityKey {
        match self {
            ActionKind::Request | ActionKind::Admit => IdentityKey::IndexNumber,
            ActionKind::Capture => IdentityKey::BirthCertificate,
        }
    }

    /// Lifecycle stage an external record must reflect for the action to be moot.
    pub const fn desired_stage(self) -> LifecycleStage {
        match self {
            ActionKind::Request => LifecycleStage::Requested,
            ActionKind::Admit => LifecycleStage::Admitted,
            ActionKind::Capture => LifecycleStage::Captured,
        }
    }

    /// Placement requests go to the stateless API and tolerate fan-out; admit
    /// and capture are stateful portal submissions and must serialize.
    pub const fn ordering(self) -> ExecutionOrdering {
        match self {
            ActionKind::Request => ExecutionOrdering::ParallelSafe,
            ActionKind::Admit | ActionKind::Capture => ExecutionOrdering::MustSerialize,
        }
    }
}

/// Declared execution-ordering policy for a remote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOrdering {
    ParallelSafe,
    MustSerialize,
}

/// Identity field selector used to index external records per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKey {
    AdmissionNumber,
    IndexNumber,
    BirthCertificate,
}

impl IdentityKey {
    pub const fn label(self) -> &'static str {
        match self {
            IdentityKey::AdmissionNumber => "admission number",
            IdentityKey::IndexNumber => "index number",
            IdentityKey::BirthCertificate => "birth certificate number",
        }
    }

    /// Raw value of this key on an identity set, if recorded.
    pub fn of(self, identity: &IdentitySet) -> Option<&str> {
        match self {
            IdentityKey::AdmissionNumber => identity.admission_no.as_deref(),
            IdentityKey::IndexNumber => identity.index_no.as_deref(),
            IdentityKey::BirthCertificate => identity.birth_certificate_no.as_deref(),
        }
    }
}

/// Canonical form for identity comparisons: trimmed, inner whitespace dropped,
/// uppercased.
pub fn normalize_identity(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Query predicate handed to the store when loading a cohort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CandidateFilter {
    pub grade: Option<String>,
    pub scope: Option<Vec<String>>,
}

impl CandidateFilter {
    pub fn accepts(&self, candidate: &Candidate) -> bool {
        if let Some(grade) = &self.grade {
            if !candidate.grade.eq_ignore_ascii_case(grade) {
                return false;
            }
        }

        match &self.scope {
            None => true,
            Some(keys) => {
                let wanted: Vec<String> =
                    keys.iter().map(|key| normalize_identity(key)).collect();
                [
                    candidate.identity.admission_no.as_deref(),
                    candidate.identity.index_no.as_deref(),
                    candidate.identity.birth_certificate_no.as_deref(),
                    candidate.identity.external_uid.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| wanted.contains(&normalize_identity(field)))
            }
        }
    }
}

/// Error-field instruction carried by a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ErrorUpdate {
    #[default]
    Keep,
    Clear,
    Set(CandidateError),
}

/// Partial update written back per candidate after a batch resolves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateUpdate {
    pub stage: Option<LifecycleStage>,
    pub last_error: ErrorUpdate,
}

impl CandidateUpdate {
    pub fn advanced(stage: LifecycleStage) -> Self {
        Self {
            stage: Some(stage),
            last_error: ErrorUpdate::Clear,
        }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            last_error: ErrorUpdate::Set(CandidateError::now(message)),
        }
    }

    /// Fold this update into a candidate record, registry-side.
    pub fn apply(&self, candidate: &mut Candidate) {
        if let Some(stage) = self.stage {
            if stage > candidate.stage {
                candidate.stage = stage;
            }
        }
        match &self.last_error {
            ErrorUpdate::Keep => {}
            ErrorUpdate::Clear => candidate.last_error = None,
            ErrorUpdate::Set(error) => candidate.last_error = Some(error.clone()),
        }
    }
}

/// Deterministic map alias used wherever per-candidate results are collected.
pub type CandidateMap<T> = BTreeMap<CandidateId, T>;
