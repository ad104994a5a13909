use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;

use crate::infra::InMemoryCandidateRepository;
use enrolsync::error::AppError;
use enrolsync::workflows::admission::{
    normalize_identity, ActionKind, AdmissionService, BatchReport, BatchRequest, Candidate,
    ExternalRecord, Gender, IdentitySet, InstitutionId, LifecycleStage, PipelineSettings,
    PortalCredentials, PortalDriver, PortalError, RecordSource, SessionHandle, VerificationApi,
    VerificationError,
};
use enrolsync::workflows::roster::{import_entries, RosterImporter};

const DEMO_INSTITUTION: &str = "10234001";
const OTHER_INSTITUTION: &str = "20107005";

const DEMO_ROSTER: &str = "\
Name,Gender,Marks,Index Number,Birth Certificate No
Wanjiku Mary,F,372,20401001001,BC-1001
Odhiambo Brian,M,289,20401001002,BC-1002
Cherono Faith,F,310,20401001003,BC-1003
Kiptoo Elias,M,355,20401001004,BC-1004
";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the admit pass and only run placement requests
    #[arg(long)]
    pub(crate) skip_admit: bool,
}

/// Portal stand-in with a fixed listing: one learner already admitted here.
struct DemoPortal;

#[async_trait]
impl PortalDriver for DemoPortal {
    async fn login(&self, _credentials: &PortalCredentials) -> Result<SessionHandle, PortalError> {
        Ok(SessionHandle::new("demo-session"))
    }

    async fn list_cohort(
        &self,
        _handle: &SessionHandle,
        _grade: &str,
    ) -> Result<Vec<ExternalRecord>, PortalError> {
        Ok(vec![ExternalRecord {
            source: RecordSource::Portal,
            name: "Wanjiku Mary".to_string(),
            gender: Some(Gender::Female),
            marks: Some(372),
            identity: IdentitySet {
                admission_no: None,
                index_no: Some("20401001001".to_string()),
                birth_certificate_no: Some("BC-1001".to_string()),
                external_uid: None,
            },
            institution_code: Some(DEMO_INSTITUTION.to_string()),
            stage: Some(LifecycleStage::Admitted),
        }])
    }

    async fn submit(
        &self,
        _handle: &SessionHandle,
        _action: ActionKind,
        _candidate: &Candidate,
    ) -> Result<(), PortalError> {
        Ok(())
    }

    async fn close(&self, _handle: &SessionHandle) -> Result<(), PortalError> {
        Ok(())
    }
}

/// Verification stand-in: one learner requested here, one selected elsewhere.
struct DemoVerification;

impl DemoVerification {
    fn record(&self, identity_key: &str) -> Option<ExternalRecord> {
        match identity_key {
            "20401001001" => Some(ExternalRecord {
                source: RecordSource::VerificationApi,
                name: "Wanjiku Mary".to_string(),
                gender: Some(Gender::Female),
                marks: Some(372),
                identity: IdentitySet {
                    admission_no: None,
                    index_no: Some("20401001001".to_string()),
                    birth_certificate_no: None,
                    external_uid: Some("UPI-001".to_string()),
                },
                institution_code: Some(DEMO_INSTITUTION.to_string()),
                stage: Some(LifecycleStage::Requested),
            }),
            "20401001003" => Some(ExternalRecord {
                source: RecordSource::VerificationApi,
                name: "Cherono Faith".to_string(),
                gender: Some(Gender::Female),
                marks: Some(310),
                identity: IdentitySet {
                    admission_no: None,
                    index_no: Some("20401001003".to_string()),
                    birth_certificate_no: None,
                    external_uid: Some("UPI-003".to_string()),
                },
                institution_code: Some(OTHER_INSTITUTION.to_string()),
                stage: Some(LifecycleStage::Admitted),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl VerificationApi for DemoVerification {
    async fn lookup(
        &self,
        identity_key: &str,
    ) -> Result<Option<ExternalRecord>, VerificationError> {
        Ok(self.record(&normalize_identity(identity_key)))
    }

    async fn submit_request(&self, _candidate: &Candidate) -> Result<(), VerificationError> {
        Ok(())
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Learner registry reconciliation demo");

    let repository = Arc::new(InMemoryCandidateRepository::default());
    let institution = InstitutionId(DEMO_INSTITUTION.to_string());

    let preview = RosterImporter::from_reader(Cursor::new(DEMO_ROSTER))?;
    let outcome = import_entries(repository.as_ref(), &institution, "form1", preview.entries);
    println!("\n{}", outcome.summary());

    let service = AdmissionService::new(
        repository,
        Arc::new(DemoPortal) as Arc<dyn PortalDriver>,
        Arc::new(DemoVerification) as Arc<dyn VerificationApi>,
        PipelineSettings::default(),
    );

    let request = || BatchRequest {
        institution: institution.clone(),
        credentials: PortalCredentials {
            username: "demo-registrar".to_string(),
            password: "demo-password".to_string(),
        },
        grade: "form1".to_string(),
        scope: None,
    };

    let report = service.run_batch(ActionKind::Request, request()).await?;
    render_report(&report);

    if !args.skip_admit {
        let report = service.run_batch(ActionKind::Admit, request()).await?;
        render_report(&report);
    }

    Ok(())
}

fn render_report(report: &BatchReport) {
    println!("\n{}", report.summary());

    if !report.succeeded.is_empty() {
        println!("Succeeded");
        for candidate in &report.succeeded {
            println!("- {} ({})", candidate.name, candidate.candidate_id.0);
        }
    }

    if !report.already_satisfied.is_empty() {
        println!("Already satisfied");
        for candidate in &report.already_satisfied {
            println!("- {} ({})", candidate.name, candidate.candidate_id.0);
        }
    }

    if !report.errored.is_empty() {
        println!("Errored");
        for errored in &report.errored {
            println!(
                "- {} ({}): {}",
                errored.candidate.name, errored.candidate.candidate_id.0, errored.reason
            );
        }
    }
}
