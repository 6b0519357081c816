//! Authentication state machine.
//!
//! Drives a protocol client through credential validation, connection, login
//! code delivery, code verification and the optional two-step password. The live
//! client is owned by the in-flight phases only and is released on every
//! terminal transition.

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{AppConfig, AppError, Credentials, Result, SessionKind};
use crate::infrastructure::protocol::{self, ClientFactory, ProtocolClient, ProtocolError};
use crate::infrastructure::{FileSessionStore, MemorySessionStore, SessionStore};

/// Externally observable authentication phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    AwaitingCodeSend,
    AwaitingCodeVerify,
    AwaitingTwoFactorVerify,
    Authorized,
    /// Not sticky: the next `start_auth` re-evaluates from scratch.
    Failed(String),
}

/// Phase with the client attached to the states that need it.
enum Phase {
    Idle,
    AwaitingCodeSend(Box<dyn ProtocolClient>),
    AwaitingCodeVerify(Box<dyn ProtocolClient>),
    AwaitingTwoFactorVerify(Box<dyn ProtocolClient>),
    Authorized,
    Failed(String),
}

impl Phase {
    fn view(&self) -> AuthPhase {
        match self {
            Self::Idle => AuthPhase::Idle,
            Self::AwaitingCodeSend(_) => AuthPhase::AwaitingCodeSend,
            Self::AwaitingCodeVerify(_) => AuthPhase::AwaitingCodeVerify,
            Self::AwaitingTwoFactorVerify(_) => AuthPhase::AwaitingTwoFactorVerify,
            Self::Authorized => AuthPhase::Authorized,
            Self::Failed(message) => AuthPhase::Failed(message.clone()),
        }
    }

    fn into_client(self) -> Option<Box<dyn ProtocolClient>> {
        match self {
            Self::AwaitingCodeSend(client)
            | Self::AwaitingCodeVerify(client)
            | Self::AwaitingTwoFactorVerify(client) => Some(client),
            Self::Idle | Self::Authorized | Self::Failed(_) => None,
        }
    }

    const fn holds_client(&self) -> bool {
        matches!(
            self,
            Self::AwaitingCodeSend(_) | Self::AwaitingCodeVerify(_) | Self::AwaitingTwoFactorVerify(_)
        )
    }
}

/// Where the session blob lives.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub kind: SessionKind,
    pub name: String,
    pub dir: PathBuf,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            kind: config.session.kind,
            name: config.session.name.clone(),
            dir: config.session_dir(),
        }
    }
}

/// Owns the authentication phase and the protocol client during login.
pub struct AuthSession {
    factory: Arc<dyn ClientFactory>,
    settings: SessionSettings,
    memory_store: Arc<MemorySessionStore>,
    phase: Phase,
    message: Option<String>,
    credentials: Option<Credentials>,
    logging: bool,
}

impl AuthSession {
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>, settings: SessionSettings) -> Self {
        Self {
            factory,
            settings,
            memory_store: Arc::new(MemorySessionStore::new()),
            phase: Phase::Idle,
            message: None,
            credentials: None,
            logging: false,
        }
    }

    /// Emit every status message through `tracing`.
    #[must_use]
    pub const fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.phase.view()
    }

    /// Last human-readable status message.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self.phase, Phase::Authorized)
    }

    #[must_use]
    pub const fn awaiting_code_send(&self) -> bool {
        matches!(self.phase, Phase::AwaitingCodeSend(_))
    }

    #[must_use]
    pub const fn awaiting_code_verify(&self) -> bool {
        matches!(self.phase, Phase::AwaitingCodeVerify(_))
    }

    #[must_use]
    pub const fn awaiting_2fa_verify(&self) -> bool {
        matches!(self.phase, Phase::AwaitingTwoFactorVerify(_))
    }

    #[must_use]
    pub const fn session_kind(&self) -> SessionKind {
        self.settings.kind
    }

    /// Store backing clients opened from now on.
    #[must_use]
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        match self.settings.kind {
            SessionKind::File => Arc::new(FileSessionStore::new(
                &self.settings.dir,
                &self.settings.name,
            )),
            SessionKind::Memory => Arc::clone(&self.memory_store) as Arc<dyn SessionStore>,
        }
    }

    /// Validates credentials and checks whether the stored session is already
    /// authorized.
    pub async fn start_auth(&mut self, credentials: &Credentials) -> AuthPhase {
        if !credentials.is_complete() {
            self.fail(None, "api_id and/or api_hash are not set").await;
            return self.phase();
        }

        self.reset().await;
        self.set(Phase::Idle, "Authentication started");
        self.credentials = Some(credentials.clone());

        let mut client = self.factory.open(self.session_store(), credentials);
        match protocol::check_authorized(client.as_mut()).await {
            Ok(true) => self.set(Phase::Authorized, "Client is authorized"),
            Ok(false) => self.set(
                Phase::AwaitingCodeSend(client),
                "Client connection checked. Sending the verification code",
            ),
            Err(e) => {
                self.fail(Some(client), format!("Failed to connect client, cause: {e}"))
                    .await;
            }
        }

        self.phase()
    }

    /// Requests a login code for `phone`. No-op unless a code send is awaited.
    pub async fn send_verification_code(&mut self, phone: &str) -> AuthPhase {
        if !self.awaiting_code_send() {
            return self.phase();
        }
        let Some(mut client) = self.take_client() else {
            return self.phase();
        };

        if phone.trim().is_empty() {
            self.fail(Some(client), "phone number is not set").await;
            return self.phase();
        }

        let result = match protocol::ensure_connected(client.as_mut()).await {
            Ok(()) => client.request_login_code(phone).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.set(
                Phase::AwaitingCodeVerify(client),
                "Code sent to Telegram. Enter it as the verification code",
            ),
            Err(e) => {
                let err = AppError::SignInFailed {
                    stage: "sending the verification code",
                    source: e,
                };
                self.fail(Some(client), err.to_string()).await;
            }
        }

        self.phase()
    }

    /// Signs in with the received code. No-op unless a code is awaited.
    pub async fn verify_code(&mut self, phone: &str, code: &str) -> AuthPhase {
        if !self.awaiting_code_verify() {
            return self.phase();
        }
        let Some(mut client) = self.take_client() else {
            return self.phase();
        };

        match client.sign_in(phone, code).await {
            Ok(()) => {
                protocol::release(client.as_mut()).await;
                self.set(Phase::Authorized, "Client is authorized");
            }
            Err(ProtocolError::PasswordRequired) => self.set(
                Phase::AwaitingTwoFactorVerify(client),
                "Two-step verification is enabled. Enter the cloud password",
            ),
            Err(e) => {
                let err = AppError::SignInFailed {
                    stage: "verifying the code",
                    source: e,
                };
                self.fail(Some(client), err.to_string()).await;
            }
        }

        self.phase()
    }

    /// Signs in with the cloud password. No-op unless a password is awaited.
    pub async fn verify_two_factor(&mut self, secret: &str) -> AuthPhase {
        if !self.awaiting_2fa_verify() {
            return self.phase();
        }
        let Some(mut client) = self.take_client() else {
            return self.phase();
        };

        match client.check_password(secret).await {
            Ok(()) => {
                protocol::release(client.as_mut()).await;
                self.set(Phase::Authorized, "Client is authorized");
            }
            Err(e) => {
                let err = AppError::SignInFailed {
                    stage: "verifying the cloud password",
                    source: e,
                };
                self.fail(Some(client), err.to_string()).await;
            }
        }

        self.phase()
    }

    /// Logs out (best effort) and destroys the session blob. Always ends idle.
    ///
    /// # Errors
    /// Returns error if the persisted session cannot be removed.
    pub async fn delete_session(&mut self) -> Result<()> {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let was_authorized = matches!(phase, Phase::Authorized);

        let client = match phase.into_client() {
            Some(client) => Some(client),
            None if was_authorized => self
                .credentials
                .as_ref()
                .map(|c| self.factory.open(self.session_store(), c)),
            None => None,
        };

        if let Some(mut client) = client {
            if let Err(e) = protocol::log_out(client.as_mut()).await {
                tracing::warn!(error = %e, "Logout failed, removing session anyway");
            }
            protocol::release(client.as_mut()).await;
        }

        let result = self.session_store().destroy();
        self.set(Phase::Idle, "Session deleted");
        result
    }

    /// Switches the storage backend for subsequent `start_auth` calls.
    ///
    /// # Errors
    /// Returns [`AppError::SessionBusy`] while a login is in flight.
    pub fn change_session_kind(&mut self, kind: SessionKind) -> Result<()> {
        if kind == self.settings.kind {
            return Ok(());
        }
        if self.phase.holds_client() {
            return Err(AppError::SessionBusy);
        }

        self.settings.kind = kind;
        // Authorization belongs to the previous store.
        let phase = if self.is_authorized() {
            Phase::Idle
        } else {
            std::mem::replace(&mut self.phase, Phase::Idle)
        };
        self.set(phase, format!("Session kind set to {kind}"));
        Ok(())
    }

    /// Opens a client bound to the authorized session.
    ///
    /// # Errors
    /// Returns [`AppError::NotAuthorized`] unless the session is authorized.
    pub fn open_client(&self, credentials: &Credentials) -> Result<Box<dyn ProtocolClient>> {
        if !self.is_authorized() {
            return Err(AppError::NotAuthorized);
        }
        Ok(self.factory.open(self.session_store(), credentials))
    }

    fn take_client(&mut self) -> Option<Box<dyn ProtocolClient>> {
        std::mem::replace(&mut self.phase, Phase::Idle).into_client()
    }

    /// Releases any held client and clears the phase.
    async fn reset(&mut self) {
        if let Some(mut client) = self.take_client() {
            protocol::release(client.as_mut()).await;
        }
        self.message = None;
    }

    fn set(&mut self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        if self.logging {
            tracing::info!(phase = ?phase.view(), "{message}");
        }
        self.phase = phase;
        self.message = Some(message);
    }

    async fn fail(&mut self, client: Option<Box<dyn ProtocolClient>>, message: impl Into<String>) {
        let message = message.into();
        if let Some(mut client) = client {
            protocol::release(client.as_mut()).await;
        }
        if let Some(mut held) = self.take_client() {
            protocol::release(held.as_mut()).await;
        }
        if self.logging {
            tracing::warn!("{message}");
        }
        self.phase = Phase::Failed(message.clone());
        self.message = Some(message);
    }
}
