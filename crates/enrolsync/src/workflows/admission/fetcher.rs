use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use super::domain::{normalize_identity, Candidate, ExternalRecord, IdentityKey};
use super::portal::{PortalDriver, PortalError};
use super::session::SessionLease;
use super::verification::{VerificationApi, VerificationError};

/// External "current truth" for one cohort, one snapshot per source.
///
/// The fetcher never reconciles disagreements between the two; both are
/// handed to the matcher as-is.
#[derive(Debug, Clone, Default)]
pub struct CohortSnapshot {
    pub portal: Vec<ExternalRecord>,
    pub verification: Vec<ExternalRecord>,
}

impl CohortSnapshot {
    pub fn records(&self) -> impl Iterator<Item = &ExternalRecord> {
        self.portal.iter().chain(self.verification.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.portal.is_empty() && self.verification.is_empty()
    }
}

/// Errors raised while assembling the external snapshot.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("portal listing failed: {0}")]
    Portal(#[from] PortalError),
    #[error("verification lookup failed: {0}")]
    Verification(#[from] VerificationError),
    #[error("no external records exist for the requested cohort")]
    EmptyCohort,
}

/// Retrieves the portal listing through the session and cross-checks the
/// cohort against the verification API.
pub struct CohortFetcher {
    portal: Arc<dyn PortalDriver>,
    verification: Arc<dyn VerificationApi>,
    lookup_limit: usize,
}

impl CohortFetcher {
    pub fn new(
        portal: Arc<dyn PortalDriver>,
        verification: Arc<dyn VerificationApi>,
        lookup_limit: usize,
    ) -> Self {
        Self {
            portal,
            verification,
            lookup_limit: lookup_limit.max(1),
        }
    }

    /// Fetch both snapshots for a cohort.
    ///
    /// The portal listing runs through the exclusive session, one page walk at
    /// a time. Verification lookups hold no session state and fan out under a
    /// bounded permit count; results are re-associated by identity key, never
    /// by completion order.
    pub async fn fetch(
        &self,
        session: &SessionLease,
        grade: &str,
        candidates: &[Candidate],
        key: IdentityKey,
    ) -> Result<CohortSnapshot, FetchError> {
        let portal_records = self.portal.list_cohort(session.handle(), grade).await?;

        let mut seen = HashSet::new();
        let keys: Vec<String> = candidates
            .iter()
            .filter_map(|candidate| key.of(&candidate.identity))
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .filter(|raw| seen.insert(normalize_identity(raw)))
            .map(str::to_string)
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.lookup_limit));
        let lookups = keys.iter().map(|identity_key| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("lookup semaphore closed");
                self.verification.lookup(identity_key).await
            }
        });

        let mut verification_records = Vec::new();
        for result in join_all(lookups).await {
            match result {
                Ok(Some(record)) => verification_records.push(record),
                Ok(None) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let snapshot = CohortSnapshot {
            portal: portal_records,
            verification: verification_records,
        };
        if snapshot.is_empty() {
            return Err(FetchError::EmptyCohort);
        }
        Ok(snapshot)
    }
}
