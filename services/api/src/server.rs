use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryCandidateRepository};
use crate::routes::with_admission_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use enrolsync::config::AppConfig;
use enrolsync::error::AppError;
use enrolsync::telemetry;
use enrolsync::workflows::admission::{
    AdmissionService, HttpPortalDriver, HttpVerificationApi, PipelineSettings, PortalDriver,
    VerificationApi,
};
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let timeout = Duration::from_secs(config.portal.timeout_secs);
    let portal: Arc<dyn PortalDriver> =
        Arc::new(HttpPortalDriver::new(config.portal.base_url.clone(), timeout));
    let verification: Arc<dyn VerificationApi> = Arc::new(HttpVerificationApi::new(
        config.portal.verification_base_url.clone(),
        config.portal.verification_token.clone(),
        timeout,
    ));
    let repository = Arc::new(InMemoryCandidateRepository::default());
    let settings = PipelineSettings {
        lookup_concurrency: config.portal.lookup_concurrency,
    };
    let admission_service = Arc::new(AdmissionService::new(
        repository.clone(),
        portal,
        verification,
        settings,
    ));

    let app = with_admission_routes(admission_service, repository)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "learner registry reconciler ready");

    axum::serve(listener, app).await?;
    Ok(())
}
