use std::collections::{BTreeMap, HashMap, HashSet};

use super::domain::{
    normalize_identity, ActionKind, Candidate, CandidateId, ExternalRecord, IdentityKey,
    InstitutionId, LifecycleStage, RecordSource,
};
use super::fetcher::CohortSnapshot;

/// Classification of one candidate against the external snapshot.
///
/// Immutable once produced for a batch; the executor only ever sees
/// `Actionable` candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The external authority already reflects the desired state.
    Satisfied,
    /// No conflicting external record; the action should proceed.
    Actionable,
    /// A conflicting or under-determined external record; never acted on.
    Blocked { reason: String },
}

impl MatchResult {
    pub fn is_actionable(&self) -> bool {
        matches!(self, MatchResult::Actionable)
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, MatchResult::Satisfied)
    }

    pub fn blocked_reason(&self) -> Option<&str> {
        match self {
            MatchResult::Blocked { reason } => Some(reason),
            _ => None,
        }
    }
}

/// External records grouped by the identity key relevant to the current action.
pub struct ExternalIndex {
    entries: HashMap<String, Vec<ExternalRecord>>,
}

impl ExternalIndex {
    pub fn build<'a>(
        key: IdentityKey,
        records: impl IntoIterator<Item = &'a ExternalRecord>,
    ) -> Self {
        let mut entries: HashMap<String, Vec<ExternalRecord>> = HashMap::new();
        for record in records {
            if let Some(raw) = key.of(&record.identity) {
                let normalized = normalize_identity(raw);
                if !normalized.is_empty() {
                    entries.entry(normalized).or_default().push(record.clone());
                }
            }
        }
        Self { entries }
    }

    fn lookup(&self, key: &str) -> &[ExternalRecord] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pairs candidates with external records and classifies each one.
pub struct CohortMatcher {
    action: ActionKind,
    institution: InstitutionId,
}

impl CohortMatcher {
    pub fn new(action: ActionKind, institution: InstitutionId) -> Self {
        Self {
            action,
            institution,
        }
    }

    pub fn classify_cohort(
        &self,
        candidates: &[Candidate],
        snapshot: &CohortSnapshot,
    ) -> BTreeMap<CandidateId, MatchResult> {
        let index = ExternalIndex::build(self.action.identity_key(), snapshot.records());
        candidates
            .iter()
            .map(|candidate| (candidate.id.clone(), self.classify(candidate, &index)))
            .collect()
    }

    pub fn classify(&self, candidate: &Candidate, index: &ExternalIndex) -> MatchResult {
        let key = self.action.identity_key();
        let key_value = match key.of(&candidate.identity).map(normalize_identity) {
            Some(value) if !value.is_empty() => value,
            _ => {
                return MatchResult::Blocked {
                    reason: format!("missing {}", key.label()),
                }
            }
        };
        if let Err(reason) = self.precondition(candidate) {
            return MatchResult::Blocked { reason };
        }

        let matches = index.lookup(&key_value);
        let portal: Vec<&ExternalRecord> = matches
            .iter()
            .filter(|record| record.source == RecordSource::Portal)
            .collect();
        let api: Vec<&ExternalRecord> = matches
            .iter()
            .filter(|record| record.source == RecordSource::VerificationApi)
            .collect();

        // An under-determined identity must never trigger an irreversible
        // remote action.
        if portal.len() > 1 {
            return MatchResult::Blocked {
                reason: format!(
                    "ambiguous match: {} portal records share {} {}",
                    portal.len(),
                    key.label(),
                    key_value
                ),
            };
        }
        if api.len() > 1 {
            return MatchResult::Blocked {
                reason: format!(
                    "ambiguous match: {} verification records share {} {}",
                    api.len(),
                    key.label(),
                    key_value
                ),
            };
        }

        for record in portal.iter().chain(api.iter()) {
            if let Some(blocked) = self.conflict(candidate, record) {
                return blocked;
            }
        }

        // The surface the action writes to decides whether anything remains
        // to be done; the other surface only contributes conflicts above.
        let authoritative = match self.action {
            ActionKind::Request => api.first(),
            ActionKind::Admit | ActionKind::Capture => portal.first(),
        };
        match authoritative.and_then(|record| record.stage) {
            Some(stage) if stage >= self.action.desired_stage() => MatchResult::Satisfied,
            _ => MatchResult::Actionable,
        }
    }

    fn precondition(&self, candidate: &Candidate) -> Result<(), String> {
        match self.action {
            ActionKind::Request | ActionKind::Admit => {
                if candidate.marks.is_none() {
                    return Err("missing marks total".to_string());
                }
            }
            ActionKind::Capture => {
                if candidate.gender.is_none() {
                    return Err("missing gender".to_string());
                }
            }
        }
        Ok(())
    }

    fn conflict(&self, candidate: &Candidate, record: &ExternalRecord) -> Option<MatchResult> {
        if !name_matches(candidate, record) {
            return Some(MatchResult::Blocked {
                reason: format!("name mismatch against external record '{}'", record.name),
            });
        }

        if let (Some(local), Some(external)) = (candidate.gender, record.gender) {
            if local != external {
                return Some(MatchResult::Blocked {
                    reason: "gender mismatch against external record".to_string(),
                });
            }
        }

        if let (Some(local), Some(external)) = (candidate.marks, record.marks) {
            if local != external {
                return Some(MatchResult::Blocked {
                    reason: format!("marks mismatch (registry {local}, external {external})"),
                });
            }
        }

        let ours = normalize_identity(&self.institution.0);
        let foreign = record
            .institution_code
            .as_deref()
            .map(normalize_identity)
            .filter(|code| !code.is_empty() && *code != ours);
        if let Some(code) = foreign {
            let reason = match record.stage {
                Some(LifecycleStage::Captured) => format!("captured at institution {code}"),
                _ => format!("selected at institution {code}"),
            };
            return Some(MatchResult::Blocked { reason });
        }

        None
    }
}

/// Tokenized, order-insensitive name comparison.
///
/// Every token of the external name must appear in the candidate's name; an
/// overlap of fewer than two tokens is too weak on its own and additionally
/// requires marks agreement.
fn name_matches(candidate: &Candidate, record: &ExternalRecord) -> bool {
    let external = tokens(&record.name);
    if external.is_empty() {
        return true;
    }

    let local: HashSet<String> = tokens(&candidate.name).into_iter().collect();
    let overlap = external.iter().filter(|token| local.contains(*token)).count();
    if overlap < external.len() {
        return false;
    }
    if overlap >= 2 {
        return true;
    }

    matches!(
        (candidate.marks, record.marks),
        (Some(local_marks), Some(external_marks)) if local_marks == external_marks
    )
}

fn tokens(name: &str) -> Vec<String> {
    name.split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}
