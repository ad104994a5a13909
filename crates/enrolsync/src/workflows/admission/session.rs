use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::warn;

use super::domain::InstitutionId;
use super::portal::{PortalCredentials, PortalDriver, PortalError, SessionHandle};

/// Owns one authenticated portal session for the duration of a batch.
///
/// `close` is the contract; `Drop` only exists so early returns and panics
/// cannot leak the server-side session.
pub struct SessionGuard {
    driver: Arc<dyn PortalDriver>,
    handle: Option<SessionHandle>,
}

impl SessionGuard {
    pub(crate) fn new(driver: Arc<dyn PortalDriver>, handle: SessionHandle) -> Self {
        Self {
            driver,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        self.handle
            .as_ref()
            .expect("session guard used after close")
    }

    /// Release the session. Errors are logged, not propagated: a failed logout
    /// must never mask the batch outcome.
    pub async fn close(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.driver.close(&handle).await {
                warn!(token = handle.token(), %err, "portal session release failed");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        warn!(
            token = handle.token(),
            "portal session dropped without explicit close; releasing in background"
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let driver = self.driver.clone();
            runtime.spawn(async move {
                let _ = driver.close(&handle).await;
            });
        }
    }
}

/// A leased session: the institution lock permit plus the session guard.
///
/// Holding the lease keeps every other batch for the same institution queued;
/// the portal corrupts listing and form view-state under interleaved use.
pub struct SessionLease {
    guard: SessionGuard,
    _permit: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease").finish_non_exhaustive()
    }
}

impl SessionLease {
    pub fn handle(&self) -> &SessionHandle {
        self.guard.handle()
    }

    /// Release the session first, then the institution lock.
    pub async fn close(self) {
        let SessionLease { guard, _permit } = self;
        guard.close().await;
    }
}

/// Hands out at most one live portal session per institution.
#[derive(Default)]
pub struct SessionBroker {
    locks: Mutex<HashMap<InstitutionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue on the institution lock, then log in and wrap the handle.
    pub async fn lease(
        &self,
        driver: Arc<dyn PortalDriver>,
        institution: &InstitutionId,
        credentials: &PortalCredentials,
    ) -> Result<SessionLease, PortalError> {
        let lock = {
            let mut locks = self.locks.lock().expect("session lock table poisoned");
            locks
                .entry(institution.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let permit = lock.lock_owned().await;

        let handle = driver.login(credentials).await?;
        Ok(SessionLease {
            guard: SessionGuard::new(driver, handle),
            _permit: permit,
        })
    }
}
