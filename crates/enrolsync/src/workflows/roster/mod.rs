//! CSV roster ingestion for the learner registry.
//!
//! Accepts the roster exports institutions already keep (one learner per row)
//! and feeds them into the store with per-row outcomes, so one malformed row
//! never sinks an upload.

mod parser;

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::workflows::admission::domain::{
    Candidate, CandidateFilter, CandidateId, IdentitySet, InstitutionId, LifecycleStage,
};
use crate::workflows::admission::repository::{CandidateRepository, RepositoryError};

pub use parser::{RosterEntry, RosterProblem};

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster file: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Parsed roster: usable entries plus the rows that could not be used.
#[derive(Debug)]
pub struct RosterPreview {
    pub entries: Vec<RosterEntry>,
    pub problems: Vec<RosterProblem>,
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<RosterPreview, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<RosterPreview, RosterImportError> {
        let (entries, problems) = parser::parse_rows(reader)?;
        Ok(RosterPreview { entries, problems })
    }
}

/// Why a roster entry was not inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterSkip {
    pub name: String,
    pub reason: String,
}

/// Per-item outcome of feeding a parsed roster into the store.
#[derive(Debug, Default, Serialize)]
pub struct RosterImportReport {
    pub inserted: Vec<CandidateId>,
    pub skipped: Vec<RosterSkip>,
    pub errored: Vec<RosterSkip>,
}

impl RosterImportReport {
    pub fn summary(&self) -> String {
        format!(
            "roster import: {} inserted, {} skipped, {} errored",
            self.inserted.len(),
            self.skipped.len(),
            self.errored.len()
        )
    }
}

static CANDIDATE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_candidate_id() -> CandidateId {
    let id = CANDIDATE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CandidateId(format!("cand-{id:06}"))
}

/// Insert parsed entries for one institution and grade, collecting per-item
/// outcomes instead of failing the upload wholesale.
pub fn import_entries<R>(
    repository: &R,
    institution: &InstitutionId,
    grade: &str,
    entries: Vec<RosterEntry>,
) -> RosterImportReport
where
    R: CandidateRepository,
{
    let mut import_report = RosterImportReport::default();

    for entry in entries {
        let keys: Vec<String> = [
            entry.index_no.as_deref(),
            entry.birth_certificate_no.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();

        let duplicate_filter = CandidateFilter {
            grade: None,
            scope: Some(keys),
        };
        match repository.find(institution, &duplicate_filter) {
            Ok(existing) if !existing.is_empty() => {
                import_report.skipped.push(RosterSkip {
                    name: entry.name,
                    reason: "already registered under the same identity".to_string(),
                });
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                import_report.errored.push(RosterSkip {
                    name: entry.name,
                    reason: err.to_string(),
                });
                continue;
            }
        }

        let candidate = Candidate {
            id: next_candidate_id(),
            institution: institution.clone(),
            grade: grade.to_string(),
            name: entry.name.clone(),
            gender: entry.gender,
            marks: entry.marks,
            identity: IdentitySet {
                admission_no: None,
                index_no: entry.index_no,
                birth_certificate_no: entry.birth_certificate_no,
                external_uid: None,
            },
            stage: LifecycleStage::Registered,
            last_error: None,
        };

        match repository.insert(candidate) {
            Ok(stored) => import_report.inserted.push(stored.id),
            Err(RepositoryError::Conflict) => import_report.skipped.push(RosterSkip {
                name: entry.name,
                reason: "already registered".to_string(),
            }),
            Err(err) => import_report.errored.push(RosterSkip {
                name: entry.name,
                reason: err.to_string(),
            }),
        }
    }

    import_report
}
