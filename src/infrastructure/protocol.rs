//! Protocol client capability.
//!
//! The messaging protocol itself lives behind [`ProtocolClient`]. The core only
//! orchestrates these calls and tolerates their failures.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

use crate::domain::Credentials;

use super::session_store::SessionStore;

/// Errors raised by a protocol client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The account has a cloud password; sign-in needs the second factor.
    #[error("two-step verification password required")]
    PasswordRequired,

    /// No entity is registered under this username.
    #[error("username {0} is not occupied")]
    UsernameNotOccupied(String),

    /// The handle is not a valid username.
    #[error("username {0} is invalid")]
    UsernameInvalid(String),

    /// Transport-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Remote call returned an error.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The backend cannot perform this call.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// Session blob could not be read or written.
    #[error("session error: {0}")]
    Session(String),
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A basic group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntity {
    pub id: i64,
    pub title: String,
}

/// A channel or supergroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntity {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub broadcast: bool,
}

/// Opaque protocol entity. Equality is by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(UserEntity),
    Group(GroupEntity),
    Channel(ChannelEntity),
}

impl Entity {
    /// Numeric identifier of the entity.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::User(u) => u.id,
            Self::Group(g) => g.id,
            Self::Channel(c) => c.id,
        }
    }

    /// Protocol type name (`User`, `Chat` or `Channel`).
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::User(_) => "User",
            Self::Group(_) => "Chat",
            Self::Channel(_) => "Channel",
        }
    }

    /// Public username, if the entity carries one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::User(u) => u.username.as_deref(),
            Self::Channel(c) => c.username.as_deref(),
            Self::Group(_) => None,
        }
    }
}

/// A message as delivered by the protocol.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    /// Formatted body.
    pub text: Option<String>,
    /// Raw body without formatting.
    pub message: Option<String>,
    pub chat: Entity,
    pub sender: Option<Entity>,
    pub sender_id: Option<i64>,
}

/// Iteration parameters passed through to the protocol unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub limit: Option<u64>,
    pub offset_date: Option<DateTime<Utc>>,
    pub reverse: bool,
}

/// Exclusive handle to a protocol connection.
#[async_trait]
pub trait ProtocolClient: Send {
    async fn connect(&mut self) -> Result<(), ProtocolError>;

    async fn disconnect(&mut self) -> Result<(), ProtocolError>;

    fn is_connected(&self) -> bool;

    /// Whether the bound session is authorized without further steps.
    async fn is_authorized(&mut self) -> Result<bool, ProtocolError>;

    async fn request_login_code(&mut self, phone: &str) -> Result<(), ProtocolError>;

    /// Signs in with a login code. Fails with [`ProtocolError::PasswordRequired`]
    /// when a second factor is needed.
    async fn sign_in(&mut self, phone: &str, code: &str) -> Result<(), ProtocolError>;

    async fn check_password(&mut self, secret: &str) -> Result<(), ProtocolError>;

    async fn log_out(&mut self) -> Result<(), ProtocolError>;

    async fn resolve_entity(&mut self, handle: &str) -> Result<Entity, ProtocolError>;

    /// Lazily iterates messages of `entity`, newest first unless `query.reverse`.
    fn iter_messages<'a>(
        &'a mut self,
        entity: &'a Entity,
        query: &MessageQuery,
    ) -> BoxStream<'a, Result<RawMessage, ProtocolError>>;
}

/// Creates unconnected clients bound to a session store.
pub trait ClientFactory: Send + Sync {
    fn open(
        &self,
        session: Arc<dyn SessionStore>,
        credentials: &Credentials,
    ) -> Box<dyn ProtocolClient>;
}

/// Connects the client unless it is already connected.
pub async fn ensure_connected(client: &mut dyn ProtocolClient) -> Result<(), ProtocolError> {
    if !client.is_connected() {
        client.connect().await?;
    }
    Ok(())
}

/// Disconnects the client if connected, logging instead of failing.
pub async fn release(client: &mut dyn ProtocolClient) {
    if client.is_connected() {
        if let Err(e) = client.disconnect().await {
            tracing::warn!(error = %e, "Failed to disconnect client");
        }
    }
}

/// Connects, logs out and disconnects.
pub async fn log_out(client: &mut dyn ProtocolClient) -> Result<(), ProtocolError> {
    ensure_connected(client).await?;
    let result = client.log_out().await;
    release(client).await;
    result
}

/// Checks authorization: connect, ask, always disconnect.
pub async fn check_authorized(client: &mut dyn ProtocolClient) -> Result<bool, ProtocolError> {
    let result = match ensure_connected(client).await {
        Ok(()) => client.is_authorized().await,
        Err(e) => Err(e),
    };
    release(client).await;
    result
}
