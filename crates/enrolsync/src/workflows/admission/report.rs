use serde::Serialize;

use super::domain::{ActionKind, Candidate, CandidateId, CandidateMap};
use super::executor::ActionOutcome;
use super::matcher::MatchResult;

/// Slim candidate reference carried in batch reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRef {
    pub candidate_id: CandidateId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_certificate_no: Option<String>,
}

impl CandidateRef {
    fn of(candidate: &Candidate) -> Self {
        Self {
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            index_no: candidate.identity.index_no.clone(),
            birth_certificate_no: candidate.identity.birth_certificate_no.clone(),
        }
    }
}

/// A candidate that ended the batch in error, with the reason it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErroredCandidate {
    #[serde(flatten)]
    pub candidate: CandidateRef,
    pub reason: String,
}

/// Outcome of one batch: every candidate lands in exactly one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub action: ActionKind,
    pub errored: Vec<ErroredCandidate>,
    pub succeeded: Vec<CandidateRef>,
    pub already_satisfied: Vec<CandidateRef>,
}

impl BatchReport {
    pub fn empty(action: ActionKind) -> Self {
        Self {
            action,
            errored: Vec::new(),
            succeeded: Vec::new(),
            already_satisfied: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.errored.len() + self.succeeded.len() + self.already_satisfied.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} batch: {} succeeded, {} already satisfied, {} errored",
            self.action.label(),
            self.succeeded.len(),
            self.already_satisfied.len(),
            self.errored.len()
        )
    }
}

/// Merge classification and action outcomes into one report, preserving the
/// candidates' input order. Blocked candidates surface in `errored` with their
/// blocking reason; nothing is dropped.
pub(crate) fn aggregate(
    action: ActionKind,
    candidates: &[Candidate],
    matches: &CandidateMap<MatchResult>,
    outcomes: &CandidateMap<ActionOutcome>,
) -> BatchReport {
    let mut report = BatchReport::empty(action);

    for candidate in candidates {
        match matches.get(&candidate.id) {
            Some(MatchResult::Satisfied) => {
                report.already_satisfied.push(CandidateRef::of(candidate));
            }
            Some(MatchResult::Blocked { reason }) => {
                report.errored.push(ErroredCandidate {
                    candidate: CandidateRef::of(candidate),
                    reason: reason.clone(),
                });
            }
            Some(MatchResult::Actionable) => match outcomes.get(&candidate.id) {
                Some(ActionOutcome::Success) => {
                    report.succeeded.push(CandidateRef::of(candidate));
                }
                Some(ActionOutcome::Failure { reason }) => {
                    report.errored.push(ErroredCandidate {
                        candidate: CandidateRef::of(candidate),
                        reason: reason.clone(),
                    });
                }
                None => {
                    report.errored.push(ErroredCandidate {
                        candidate: CandidateRef::of(candidate),
                        reason: "no action outcome recorded".to_string(),
                    });
                }
            },
            None => {
                report.errored.push(ErroredCandidate {
                    candidate: CandidateRef::of(candidate),
                    reason: "candidate was never classified".to_string(),
                });
            }
        }
    }

    report
}
