//! Local/remote registration state synchronizer.
//!
//! A single owner task ([`RegistrationSynchronizer`]) holds the
//! registration record. Everything else talks to it through a cloneable
//! [`SyncHandle`]:
//!
//! ```text
//! SyncHandle ──SyncCommand──▶ RegistrationSynchronizer ──spawn──▶ registry
//!      ▲                              │        ▲                     │
//!      └──────── watch<SyncState> ────┘        └──── completions ────┘
//! ```
//!
//! Network calls run in spawned tasks and report back over a completion
//! channel, so only the owner ever mutates the record.

mod engine;
pub mod error;
mod remote;

use tokio::sync::{mpsc, oneshot, watch};

use crate::types::{AuthorizationStatus, SyncState};

pub use engine::RegistrationSynchronizer;
pub use error::SyncError;
pub use remote::{fetch_remote_name, refresh_admin_flag};

// ============================================================================
// SyncCommand
// ============================================================================

/// Commands accepted by the synchronizer.
#[derive(Debug)]
pub enum SyncCommand {
    /// A device token was delivered by the push service.
    SetDeviceToken(String),
    /// The external user identity changed.
    SetUserId(String),
    /// The user chose a display name.
    SetDisplayName(String),
    /// The external sign-in flow finished (or was revoked).
    SetLocalAuthConfirmed(bool),
    /// The push service failed to hand out a token.
    TokenRegistrationFailed(String),
    /// The notification permission status changed.
    PermissionChanged(AuthorizationStatus),
    /// A silent notification delivered a new content value.
    RemoteContent(f64),
    /// Push the current record to the registry.
    SyncToRemote,
    /// Reply once no network work is outstanding.
    WaitIdle(oneshot::Sender<()>),
}

// ============================================================================
// SyncHandle
// ============================================================================

/// Cloneable front door to a running [`RegistrationSynchronizer`].
///
/// Every mutator is fire-and-forget: it only fails when the owner task is
/// gone. Results are observable through [`SyncHandle::subscribe`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
    state: watch::Receiver<SyncState>,
}

impl SyncHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<SyncCommand>,
        state: watch::Receiver<SyncState>,
    ) -> Self {
        Self { commands, state }
    }

    fn send(&self, command: SyncCommand) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::EngineStopped)
    }

    pub fn set_device_token(&self, token: impl Into<String>) -> Result<(), SyncError> {
        self.send(SyncCommand::SetDeviceToken(token.into()))
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) -> Result<(), SyncError> {
        self.send(SyncCommand::SetUserId(user_id.into()))
    }

    pub fn set_display_name(&self, name: impl Into<String>) -> Result<(), SyncError> {
        self.send(SyncCommand::SetDisplayName(name.into()))
    }

    pub fn set_local_auth_confirmed(&self, confirmed: bool) -> Result<(), SyncError> {
        self.send(SyncCommand::SetLocalAuthConfirmed(confirmed))
    }

    pub fn token_registration_failed(&self, reason: impl Into<String>) -> Result<(), SyncError> {
        self.send(SyncCommand::TokenRegistrationFailed(reason.into()))
    }

    pub fn permission_changed(&self, status: AuthorizationStatus) -> Result<(), SyncError> {
        self.send(SyncCommand::PermissionChanged(status))
    }

    pub fn remote_content(&self, size: f64) -> Result<(), SyncError> {
        self.send(SyncCommand::RemoteContent(size))
    }

    pub fn sync_to_remote(&self) -> Result<(), SyncError> {
        self.send(SyncCommand::SyncToRemote)
    }

    /// Returns a receiver that sees every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Returns the latest published state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Waits until every command sent so far is processed and no sync,
    /// name fetch or admin refresh is outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EngineStopped`] if the owner task exits first.
    pub async fn wait_idle(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::WaitIdle(tx))?;
        rx.await.map_err(|_| SyncError::EngineStopped)
    }
}
