use std::sync::Arc;

use shared::{
    domain::{Identity, Session, UserId},
    protocol::DependencyStatus,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{error::StoreError, IdentityProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    SignedIn,
    SignedOut,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChanged {
    SignedIn(Session),
    SignedOut { user_id: UserId },
}

pub struct IdentitySessionManager {
    provider: Arc<dyn IdentityProvider>,
    state: SessionState,
    // Set by a successful `initialize`, cleared by `dispose`. Outlives the
    // subscription if the provider stops publishing.
    active: bool,
    state_changes: Option<broadcast::Receiver<Option<Identity>>>,
    observed: Option<Identity>,
    session: Session,
    events: broadcast::Sender<SessionChanged>,
}

impl IdentitySessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            provider,
            state: SessionState::Uninitialized,
            active: false,
            state_changes: None,
            observed: None,
            session: Session::signed_out(),
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_attached(&self) -> bool {
        self.state_changes.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChanged> {
        self.events.subscribe()
    }

    pub async fn initialize(&mut self) -> Result<(), StoreError> {
        if self.state != SessionState::Uninitialized {
            debug!(state = ?self.state, "identity session already initialized");
            return Ok(());
        }
        self.state = SessionState::Initializing;

        let status = self.provider.check_dependencies().await;
        if !status.is_available() {
            self.state = SessionState::Failed;
            let err = StoreError::DependencyUnavailable(status);
            error!(%err, "identity provider setup failed");
            return Err(err);
        }

        info!("setting up identity provider");
        self.state_changes = Some(self.provider.subscribe_state_changes());
        self.active = true;
        self.state = SessionState::Ready;
        Ok(())
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, StoreError> {
        self.ensure_attached()?;
        match self.provider.sign_up(email, password).await {
            Ok(identity) => {
                info!(
                    user_id = %identity.user_id,
                    display_name = identity.display_name.as_deref().unwrap_or_default(),
                    "user created successfully"
                );
                Ok(identity)
            }
            Err(err) => {
                error!(%err, "sign-up failed");
                Err(err)
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, StoreError> {
        self.ensure_attached()?;
        match self.provider.sign_in(email, password).await {
            Ok(identity) => {
                info!(
                    user_id = %identity.user_id,
                    display_name = identity.display_name.as_deref().unwrap_or_default(),
                    "user logged in successfully"
                );
                Ok(identity)
            }
            Err(err) => {
                error!(%err, "sign-in failed");
                Err(err)
            }
        }
    }

    /// The provider's own notification for this sign-out is then a no-op.
    pub async fn sign_out(&mut self) -> Option<SessionChanged> {
        if !self.active {
            return None;
        }
        self.provider.sign_out().await;
        self.handle_state_changed(None)
    }

    pub async fn dispose(&mut self) -> Option<SessionChanged> {
        if !self.active {
            return None;
        }
        self.active = false;
        self.provider.sign_out().await;
        let transition = self.handle_state_changed(None);
        self.state_changes = None;
        debug!("detached from identity provider notifications");
        transition
    }

    pub async fn next_state_change(&mut self) -> Option<Option<Identity>> {
        let receiver = self.state_changes.as_mut()?;
        match receiver.recv().await {
            Ok(current) => Some(current),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "identity notifications lagged; resyncing from provider");
                Some(self.provider.current_identity().await)
            }
            Err(RecvError::Closed) => {
                warn!("identity provider stopped publishing state changes");
                self.state_changes = None;
                None
            }
        }
    }

    pub fn handle_state_changed(&mut self, current: Option<Identity>) -> Option<SessionChanged> {
        let changed = match (&self.observed, &current) {
            (Some(previous), Some(current)) => !previous.same_account(current),
            (None, None) => false,
            _ => true,
        };
        if !changed {
            return None;
        }

        let previous = std::mem::replace(&mut self.observed, current.clone());
        let transition = match (current, previous) {
            (Some(identity), _) => {
                self.session = Session::signed_in(&identity);
                self.state = SessionState::SignedIn;
                info!(user_id = %identity.user_id, "identity state changed: signed in");
                SessionChanged::SignedIn(self.session.clone())
            }
            (None, Some(previous)) => {
                self.session = Session::signed_out();
                self.state = SessionState::SignedOut;
                info!(user_id = %previous.user_id, "identity state changed: signed out");
                SessionChanged::SignedOut {
                    user_id: previous.user_id,
                }
            }
            (None, None) => return None,
        };

        let _ = self.events.send(transition.clone());
        Some(transition)
    }

    fn ensure_attached(&self) -> Result<(), StoreError> {
        if self.active {
            return Ok(());
        }
        let err = StoreError::DependencyUnavailable(DependencyStatus::UnavailableOther);
        error!(state = ?self.state, %err, "identity provider is not ready");
        Err(err)
    }
}

#[cfg(test)]
#[path = "tests/session_manager_tests.rs"]
mod tests;
