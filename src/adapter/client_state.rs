use crate::adapter::keycloak::OidcEndpoints;
use crate::adapter::Error;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Adapter credentials installed by the bootstrap call.
#[derive(Clone)]
pub struct ClientSession {
    pub client_secret: String,
    pub access_token: String,
    pub endpoints: OidcEndpoints,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Process-wide client session, written exactly once.
///
/// Writers first `claim` the state; only one claim can ever succeed until it is
/// released by a failed initialization. Readers go through `session` and never block.
#[derive(Default)]
pub struct ClientState {
    claimed: AtomicBool,
    session: ArcSwapOption<ClientSession>,
}

/// Exclusive right to install the session. Dropping it without calling `install`
/// releases the claim.
pub struct InitGuard<'a> {
    state: &'a ClientState,
    installed: bool,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self) -> Result<InitGuard<'_>, Error> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Conflict("Secret key is already defined.".to_string()))?;

        debug!("Client state claimed for initialization");
        Ok(InitGuard {
            state: self,
            installed: false,
        })
    }

    pub fn session(&self) -> Option<Arc<ClientSession>> {
        self.session.load_full()
    }

    pub fn require_session(&self) -> Result<Arc<ClientSession>, Error> {
        self.session()
            .ok_or_else(|| Error::Internal("Adapter is not configured yet".to_string()))
    }

    pub fn is_configured(&self) -> bool {
        self.session.load().is_some()
    }
}

impl InitGuard<'_> {
    pub fn install(mut self, session: ClientSession) {
        self.state.session.store(Some(Arc::new(session)));
        self.installed = true;
        info!("Client session installed");
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.installed {
            debug!("Client state initialization abandoned, releasing claim");
            self.state.claimed.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClientSession {
        ClientSession {
            client_secret: "secret".to_string(),
            access_token: "token".to_string(),
            endpoints: OidcEndpoints::default(),
        }
    }

    #[test]
    fn test_single_initialization() {
        let state = ClientState::new();
        assert!(!state.is_configured());

        let guard = state.claim().unwrap();
        guard.install(session());

        assert!(state.is_configured());
        assert_eq!(state.session().unwrap().client_secret, "secret");
        assert!(matches!(state.claim(), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_concurrent_claim_is_rejected() {
        let state = ClientState::new();

        let first = state.claim().unwrap();
        assert!(matches!(state.claim(), Err(Error::Conflict(_))));

        first.install(session());
        assert!(state.is_configured());
    }

    #[test]
    fn test_abandoned_claim_is_released() {
        let state = ClientState::new();

        {
            let _guard = state.claim().unwrap();
        }

        assert!(!state.is_configured());
        assert!(state.require_session().is_err());
        assert!(state.claim().is_ok());
    }
}
