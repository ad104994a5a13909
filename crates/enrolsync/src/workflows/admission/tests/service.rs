use std::sync::atomic::Ordering;

use super::common::*;
use crate::workflows::admission::domain::{ActionKind, Gender, LifecycleStage, RecordSource};
use crate::workflows::admission::fetcher::FetchError;
use crate::workflows::admission::service::BatchError;

fn mixed_cohort() -> Vec<crate::workflows::admission::domain::Candidate> {
    vec![
        candidate("cand-1", "Wanjiku Mary", Some("101"), Some("BC-1001"), Some(372), Some(Gender::Female)),
        candidate("cand-2", "Odhiambo Brian", Some("102"), Some("BC-1002"), Some(289), Some(Gender::Male)),
        candidate("cand-3", "Cherono Faith", Some("103"), Some("BC-1003"), Some(310), Some(Gender::Female)),
        candidate("cand-4", "Kiptoo Elias", Some("104"), Some("BC-1004"), Some(355), Some(Gender::Male)),
    ]
}

#[tokio::test]
async fn mixed_batch_accounts_for_every_candidate() {
    let harness = build_harness(mixed_cohort());
    harness.portal.set_listing(vec![external_record(
        RecordSource::Portal,
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(OUR_INSTITUTION),
        Some(LifecycleStage::Admitted),
    )]);
    harness.verification.set_record(
        "103",
        external_record(
            RecordSource::VerificationApi,
            "Cherono Faith",
            Some("103"),
            None,
            Some(310),
            Some(OTHER_INSTITUTION),
            Some(LifecycleStage::Admitted),
        ),
    );
    harness.portal.reject_submissions_for("cand-4");

    let report = harness
        .service
        .run_batch(ActionKind::Admit, batch_request())
        .await
        .expect("batch resolves");

    assert_eq!(report.total(), 4);
    assert_eq!(report.already_satisfied.len(), 1);
    assert_eq!(report.already_satisfied[0].candidate_id.0, "cand-1");
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].candidate_id.0, "cand-2");

    assert_eq!(report.errored.len(), 2);
    assert_eq!(report.errored[0].candidate.candidate_id.0, "cand-3");
    assert!(report.errored[0]
        .reason
        .contains(&format!("selected at institution {OTHER_INSTITUTION}")));
    assert_eq!(report.errored[1].candidate.candidate_id.0, "cand-4");
    assert!(report.errored[1].reason.contains("duplicate admission entry"));

    assert!(report.summary().contains("1 succeeded"));
    assert!(report.summary().contains("2 errored"));

    // Only the actionable candidates reached the portal, in sort-key order.
    let submitted: Vec<String> = harness
        .portal
        .submissions()
        .into_iter()
        .map(|(_, id)| id.0)
        .collect();
    assert_eq!(submitted, vec!["cand-2", "cand-4"]);

    assert_eq!(harness.portal.logins.load(Ordering::Relaxed), 1);
    assert_eq!(harness.portal.closes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn outcomes_are_persisted_per_candidate() {
    let harness = build_harness(mixed_cohort());
    harness.verification.set_record(
        "103",
        external_record(
            RecordSource::VerificationApi,
            "Cherono Faith",
            Some("103"),
            None,
            Some(310),
            Some(OTHER_INSTITUTION),
            Some(LifecycleStage::Admitted),
        ),
    );
    harness.portal.reject_submissions_for("cand-4");

    harness
        .service
        .run_batch(ActionKind::Admit, batch_request())
        .await
        .expect("batch resolves");

    let admitted = harness.repository.stored("cand-2");
    assert_eq!(admitted.stage, LifecycleStage::Admitted);
    assert!(admitted.last_error.is_none());

    let blocked = harness.repository.stored("cand-3");
    assert_eq!(blocked.stage, LifecycleStage::Registered);
    let error = blocked.last_error.expect("blocked reason persisted");
    assert!(error.message.contains("selected at institution"));

    let failed = harness.repository.stored("cand-4");
    assert_eq!(failed.stage, LifecycleStage::Registered);
    let error = failed.last_error.expect("failure persisted");
    assert!(error.message.contains("duplicate admission entry"));
}

#[tokio::test]
async fn rerun_against_unchanged_state_is_idempotent() {
    let harness = build_harness(vec![candidate(
        "cand-1",
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(Gender::Female),
    )]);
    harness.portal.set_listing(vec![external_record(
        RecordSource::Portal,
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(OUR_INSTITUTION),
        Some(LifecycleStage::Admitted),
    )]);

    for _ in 0..2 {
        let report = harness
            .service
            .run_batch(ActionKind::Admit, batch_request())
            .await
            .expect("batch resolves");
        assert_eq!(report.already_satisfied.len(), 1);
        assert!(report.succeeded.is_empty());
        assert!(report.errored.is_empty());
    }

    // Acting twice on a satisfied candidate is a no-op by re-matching.
    assert!(harness.portal.submissions().is_empty());
    assert_eq!(harness.portal.closes.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn authentication_failure_is_batch_fatal() {
    let harness = build_harness(mixed_cohort());
    harness.portal.fail_login.store(true, Ordering::Relaxed);

    let error = harness
        .service
        .run_batch(ActionKind::Admit, batch_request())
        .await
        .expect_err("batch aborts");
    assert!(matches!(error, BatchError::Authentication(_)));
    assert_eq!(harness.portal.closes.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn fetch_failure_aborts_but_still_releases_the_session() {
    let harness = build_harness(mixed_cohort());
    harness.portal.fail_listing.store(true, Ordering::Relaxed);

    let error = harness
        .service
        .run_batch(ActionKind::Admit, batch_request())
        .await
        .expect_err("batch aborts");
    assert!(matches!(error, BatchError::Fetch(FetchError::Portal(_))));
    assert_eq!(harness.portal.logins.load(Ordering::Relaxed), 1);
    assert_eq!(harness.portal.closes.load(Ordering::Relaxed), 1);
    assert!(harness.portal.submissions().is_empty());
}

#[tokio::test]
async fn empty_external_state_still_drives_placement_requests() {
    let harness = build_harness(vec![
        candidate("cand-1", "Wanjiku Mary", Some("101"), Some("BC-1001"), Some(372), Some(Gender::Female)),
        candidate("cand-2", "Odhiambo Brian", Some("102"), Some("BC-1002"), Some(289), Some(Gender::Male)),
    ]);

    let report = harness
        .service
        .run_batch(ActionKind::Request, batch_request())
        .await
        .expect("batch resolves");

    assert_eq!(report.succeeded.len(), 2);
    assert!(report.errored.is_empty());
    assert_eq!(harness.verification.requests().len(), 2);
    assert_eq!(
        harness.repository.stored("cand-1").stage,
        LifecycleStage::Requested
    );
}

#[tokio::test]
async fn empty_registry_cohort_reports_nothing_without_a_session() {
    let harness = build_harness(Vec::new());

    let report = harness
        .service
        .run_batch(ActionKind::Admit, batch_request())
        .await
        .expect("batch resolves");

    assert_eq!(report.total(), 0);
    assert_eq!(harness.portal.logins.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn store_write_failures_do_not_fail_the_batch() {
    let harness = build_harness(vec![candidate(
        "cand-1",
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(Gender::Female),
    )]);
    harness
        .repository
        .fail_updates
        .store(true, Ordering::Relaxed);

    let report = harness
        .service
        .run_batch(ActionKind::Admit, batch_request())
        .await
        .expect("batch still resolves");
    assert_eq!(report.succeeded.len(), 1);
}
