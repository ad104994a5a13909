use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};

use super::domain::{
    ActionKind, Candidate, ExternalRecord, Gender, IdentitySet, LifecycleStage, RecordSource,
};

/// Credential pair for one institution's portal account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct PortalCredentials {
    pub username: String,
    pub password: String,
}

/// Opaque reference to one authenticated portal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    token: String,
}

impl SessionHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Errors raised by the portal surface.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("portal authentication failed: {0}")]
    Authentication(String),
    #[error("portal unreachable: {0}")]
    Connection(String),
    #[error("unexpected portal response: {0}")]
    Malformed(String),
    #[error("portal rejected the submission: {0}")]
    Rejected(String),
}

/// Session-and-form automation seam in front of the stateful web portal.
///
/// One handle maps to one server-side session; listing pages and form
/// submissions share hidden view-state, so a handle must never be used by two
/// operations concurrently.
#[async_trait]
pub trait PortalDriver: Send + Sync {
    async fn login(&self, credentials: &PortalCredentials) -> Result<SessionHandle, PortalError>;
    async fn list_cohort(
        &self,
        handle: &SessionHandle,
        grade: &str,
    ) -> Result<Vec<ExternalRecord>, PortalError>;
    async fn submit(
        &self,
        handle: &SessionHandle,
        action: ActionKind,
        candidate: &Candidate,
    ) -> Result<(), PortalError>;
    async fn close(&self, handle: &SessionHandle) -> Result<(), PortalError>;
}

/// Portal driver backed by the live web interface.
///
/// Each login builds a dedicated cookie-holding client so sessions for
/// different institutions never share browser state.
pub struct HttpPortalDriver {
    base_url: String,
    timeout: Duration,
    sessions: Mutex<HashMap<String, Client>>,
    sequence: AtomicU64,
}

impl HttpPortalDriver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            sessions: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    fn session_client(&self, handle: &SessionHandle) -> Result<Client, PortalError> {
        let sessions = self.sessions.lock().expect("session table mutex poisoned");
        sessions.get(handle.token()).cloned().ok_or_else(|| {
            PortalError::Authentication("session handle is no longer active".to_string())
        })
    }

    fn action_path(action: ActionKind) -> &'static str {
        match action {
            ActionKind::Request => "admission/request",
            ActionKind::Admit => "admission/admit",
            ActionKind::Capture => "biodata/capture",
        }
    }
}

#[async_trait]
impl PortalDriver for HttpPortalDriver {
    async fn login(&self, credentials: &PortalCredentials) -> Result<SessionHandle, PortalError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()
            .map_err(|err| PortalError::Connection(err.to_string()))?;

        let response = client
            .post(format!("{}/auth/login", self.base_url))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|err| PortalError::Connection(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(PortalError::Authentication(
                    "portal rejected the supplied credentials".to_string(),
                ));
            }
            status => {
                return Err(PortalError::Authentication(format!(
                    "login failed with status {status}"
                )));
            }
        }

        let token = format!("portal-session-{}", self.sequence.fetch_add(1, Ordering::Relaxed));
        self.sessions
            .lock()
            .expect("session table mutex poisoned")
            .insert(token.clone(), client);

        Ok(SessionHandle::new(token))
    }

    async fn list_cohort(
        &self,
        handle: &SessionHandle,
        grade: &str,
    ) -> Result<Vec<ExternalRecord>, PortalError> {
        let client = self.session_client(handle)?;
        let response = client
            .get(format!("{}/learners", self.base_url))
            .query(&[("grade", grade)])
            .send()
            .await
            .map_err(|err| PortalError::Connection(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PortalError::Malformed(format!(
                "listing request returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| PortalError::Connection(err.to_string()))?;
        parse_listing(&body)
    }

    async fn submit(
        &self,
        handle: &SessionHandle,
        action: ActionKind,
        candidate: &Candidate,
    ) -> Result<(), PortalError> {
        let client = self.session_client(handle)?;

        let mut fields: Vec<(&str, String)> = vec![
            ("name", candidate.name.clone()),
            ("grade", candidate.grade.clone()),
            ("institution", candidate.institution.0.clone()),
        ];
        if let Some(index_no) = &candidate.identity.index_no {
            fields.push(("index_no", index_no.clone()));
        }
        if let Some(birth_certificate_no) = &candidate.identity.birth_certificate_no {
            fields.push(("birth_certificate_no", birth_certificate_no.clone()));
        }
        if let Some(admission_no) = &candidate.identity.admission_no {
            fields.push(("admission_no", admission_no.clone()));
        }
        if let Some(gender) = candidate.gender {
            fields.push(("gender", gender.label().to_string()));
        }
        if let Some(marks) = candidate.marks {
            fields.push(("marks", marks.to_string()));
        }

        let response = client
            .post(format!(
                "{}/{}",
                self.base_url,
                Self::action_path(action)
            ))
            .form(&fields)
            .send()
            .await
            .map_err(|err| PortalError::Connection(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortalError::Authentication(
                "portal session expired mid-batch".to_string(),
            )),
            status => {
                let body = response.text().await.unwrap_or_else(|_| String::new());
                let detail = body.trim();
                if detail.is_empty() {
                    Err(PortalError::Rejected(format!("status {status}")))
                } else {
                    let mut snippet = detail.to_string();
                    snippet.truncate(200);
                    Err(PortalError::Rejected(format!("status {status}: {snippet}")))
                }
            }
        }
    }

    async fn close(&self, handle: &SessionHandle) -> Result<(), PortalError> {
        let client = {
            let mut sessions = self.sessions.lock().expect("session table mutex poisoned");
            sessions.remove(handle.token())
        };

        // Releasing an already-released handle is a no-op.
        let Some(client) = client else {
            return Ok(());
        };

        let _ = client
            .get(format!("{}/auth/logout", self.base_url))
            .send()
            .await;
        Ok(())
    }
}

/// Extract learner rows from the portal listing page.
///
/// Kept synchronous so the parsed document never lives across an await point.
fn parse_listing(body: &str) -> Result<Vec<ExternalRecord>, PortalError> {
    let table_selector = selector("table.learner-listing")?;
    let row_selector = selector("table.learner-listing tbody tr")?;
    let cell_selector = selector("td")?;

    let document = Html::parse_document(body);
    if document.select(&table_selector).next().is_none() {
        return Err(PortalError::Malformed(
            "listing page is missing the learner table".to_string(),
        ));
    }

    let mut records = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();
        if cells.len() < 6 {
            continue;
        }

        records.push(ExternalRecord {
            source: RecordSource::Portal,
            name: cells[0].clone(),
            identity: IdentitySet {
                index_no: non_empty(&cells[1]),
                birth_certificate_no: non_empty(&cells[2]),
                admission_no: None,
                external_uid: None,
            },
            gender: Gender::parse(&cells[3]),
            marks: cells[4].parse::<u16>().ok(),
            institution_code: non_empty(&cells[5]),
            stage: cells.get(6).and_then(|cell| LifecycleStage::from_label(cell)),
        });
    }

    Ok(records)
}

fn selector(css: &str) -> Result<Selector, PortalError> {
    Selector::parse(css).map_err(|err| PortalError::Malformed(format!("selector {css}: {err}")))
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
