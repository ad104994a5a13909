use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::domain::{
    Candidate, ExternalRecord, Gender, IdentitySet, LifecycleStage, RecordSource,
};

/// Errors raised by the verification API surface.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("verification api unreachable: {0}")]
    Connection(String),
    #[error("verification api returned an unexpected payload: {0}")]
    Malformed(String),
    #[error("verification api rejected the request: {0}")]
    Rejected(String),
}

/// Stateless lookup-and-request seam in front of the verification API.
///
/// Holds no server-side cursor state, so calls are safe to issue concurrently
/// and are independently retryable by the caller.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    /// Look a learner up by identity key. Absence is not an error.
    async fn lookup(&self, identity_key: &str)
        -> Result<Option<ExternalRecord>, VerificationError>;

    /// Submit a placement request for a candidate.
    async fn submit_request(&self, candidate: &Candidate) -> Result<(), VerificationError>;
}

/// Verification client backed by the live HTTP API.
pub struct HttpVerificationApi {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: Client,
}

impl HttpVerificationApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            timeout,
            client: Client::new(),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl VerificationApi for HttpVerificationApi {
    async fn lookup(
        &self,
        identity_key: &str,
    ) -> Result<Option<ExternalRecord>, VerificationError> {
        let request = self
            .client
            .get(format!("{}/api/v1/learners/{identity_key}", self.base_url));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| VerificationError::Connection(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let payload: LearnerPayload = response
                    .json()
                    .await
                    .map_err(|err| VerificationError::Malformed(err.to_string()))?;
                Ok(Some(payload.into_record()))
            }
            status => Err(VerificationError::Rejected(format!(
                "lookup returned status {status}"
            ))),
        }
    }

    async fn submit_request(&self, candidate: &Candidate) -> Result<(), VerificationError> {
        let payload = PlacementRequestPayload {
            name: candidate.name.clone(),
            index_no: candidate.identity.index_no.clone(),
            birth_certificate_no: candidate.identity.birth_certificate_no.clone(),
            gender: candidate.gender.map(|gender| gender.label().to_string()),
            marks: candidate.marks,
            institution_code: candidate.institution.0.clone(),
            grade: candidate.grade.clone(),
        };

        let request = self
            .client
            .post(format!("{}/api/v1/placements", self.base_url))
            .json(&payload);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| VerificationError::Connection(err.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| String::new());
        let detail = body.trim();
        if detail.is_empty() {
            Err(VerificationError::Rejected(format!("status {status}")))
        } else {
            let mut snippet = detail.to_string();
            snippet.truncate(200);
            Err(VerificationError::Rejected(format!(
                "status {status}: {snippet}"
            )))
        }
    }
}

/// Wire shape of one learner on the verification API.
#[derive(Debug, Deserialize)]
struct LearnerPayload {
    name: String,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    marks: Option<u16>,
    #[serde(default)]
    index_no: Option<String>,
    #[serde(default)]
    birth_certificate_no: Option<String>,
    #[serde(default)]
    admission_no: Option<String>,
    #[serde(default)]
    upi: Option<String>,
    #[serde(default)]
    institution_code: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl LearnerPayload {
    fn into_record(self) -> ExternalRecord {
        ExternalRecord {
            source: RecordSource::VerificationApi,
            name: self.name,
            gender: self.gender.as_deref().and_then(Gender::parse),
            marks: self.marks,
            identity: IdentitySet {
                admission_no: self.admission_no,
                index_no: self.index_no,
                birth_certificate_no: self.birth_certificate_no,
                external_uid: self.upi,
            },
            institution_code: self.institution_code,
            stage: self.status.as_deref().and_then(LifecycleStage::from_label),
        }
    }
}

#[derive(Debug, Serialize)]
struct PlacementRequestPayload {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    birth_certificate_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marks: Option<u16>,
    institution_code: String,
    grade: String,
}
