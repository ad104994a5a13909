use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ActionKind, CandidateId, InstitutionId};
use super::portal::PortalCredentials;
use super::report::BatchReport;
use super::repository::CandidateRepository;
use super::service::{AdmissionService, BatchError, BatchRequest};

/// Request body shared by the three batch endpoints.
#[derive(Debug, Deserialize)]
pub struct BatchRequestBody {
    pub institution: String,
    pub username: String,
    pub password: String,
    pub grade: String,
    #[serde(default)]
    pub scope: Option<Vec<String>>,
}

impl BatchRequestBody {
    fn into_request(self) -> BatchRequest {
        BatchRequest {
            institution: InstitutionId(self.institution),
            credentials: PortalCredentials {
                username: self.username,
                password: self.password,
            },
            grade: self.grade,
            scope: self.scope,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchReportResponse {
    #[serde(flatten)]
    report: BatchReport,
    summary: String,
}

/// Router builder exposing the batch actions and candidate status lookups.
pub fn admission_router<R>(service: Arc<AdmissionService<R>>) -> Router
where
    R: CandidateRepository + 'static,
{
    Router::new()
        .route("/api/v1/admission/request", post(request_handler::<R>))
        .route("/api/v1/admission/admit", post(admit_handler::<R>))
        .route("/api/v1/admission/capture", post(capture_handler::<R>))
        .route(
            "/api/v1/admission/candidates/:candidate_id",
            get(candidate_handler::<R>),
        )
        .with_state(service)
}

async fn request_handler<R>(
    State(service): State<Arc<AdmissionService<R>>>,
    Json(body): Json<BatchRequestBody>,
) -> Response
where
    R: CandidateRepository + 'static,
{
    run_batch(service, ActionKind::Request, body).await
}

async fn admit_handler<R>(
    State(service): State<Arc<AdmissionService<R>>>,
    Json(body): Json<BatchRequestBody>,
) -> Response
where
    R: CandidateRepository + 'static,
{
    run_batch(service, ActionKind::Admit, body).await
}

async fn capture_handler<R>(
    State(service): State<Arc<AdmissionService<R>>>,
    Json(body): Json<BatchRequestBody>,
) -> Response
where
    R: CandidateRepository + 'static,
{
    run_batch(service, ActionKind::Capture, body).await
}

async fn run_batch<R>(
    service: Arc<AdmissionService<R>>,
    action: ActionKind,
    body: BatchRequestBody,
) -> Response
where
    R: CandidateRepository + 'static,
{
    match service.run_batch(action, body.into_request()).await {
        Ok(report) => {
            let response = BatchReportResponse {
                summary: report.summary(),
                report,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err @ (BatchError::Authentication(_) | BatchError::Fetch(_))) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

async fn candidate_handler<R>(
    State(service): State<Arc<AdmissionService<R>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    R: CandidateRepository + 'static,
{
    let id = CandidateId(candidate_id);
    match service.candidate_status(&id) {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => {
            let payload = json!({
                "candidate_id": id.0,
                "error": "candidate not found",
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
