use crate::infra::{AppState, InMemoryCandidateRepository};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

use enrolsync::error::AppError;
use enrolsync::workflows::admission::{admission_router, AdmissionService, InstitutionId};
use enrolsync::workflows::roster::{
    import_entries, RosterImportReport, RosterImporter, RosterProblem,
};

#[derive(Debug, Deserialize)]
pub(crate) struct RosterImportRequest {
    pub(crate) institution: String,
    pub(crate) grade: String,
    pub(crate) csv: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RosterImportResponse {
    #[serde(flatten)]
    pub(crate) outcome: RosterImportReport,
    pub(crate) problems: Vec<RosterProblem>,
    pub(crate) summary: String,
}

pub(crate) fn with_admission_routes(
    service: Arc<AdmissionService<InMemoryCandidateRepository>>,
    repository: Arc<InMemoryCandidateRepository>,
) -> Router {
    admission_router(service)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .merge(
            Router::new()
                .route("/api/v1/roster/import", post(roster_import_endpoint))
                .with_state(repository),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn roster_import_endpoint(
    State(repository): State<Arc<InMemoryCandidateRepository>>,
    Json(payload): Json<RosterImportRequest>,
) -> Result<Json<RosterImportResponse>, AppError> {
    let RosterImportRequest {
        institution,
        grade,
        csv,
    } = payload;

    let preview = RosterImporter::from_reader(Cursor::new(csv.into_bytes()))?;
    let outcome = import_entries(
        repository.as_ref(),
        &InstitutionId(institution),
        &grade,
        preview.entries,
    );

    Ok(Json(RosterImportResponse {
        summary: outcome.summary(),
        outcome,
        problems: preview.problems,
    }))
}
