//! Scripted protocol client for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use crate::domain::Credentials;

use super::protocol::{
    ClientFactory, Entity, MessageQuery, ProtocolClient, ProtocolError, RawMessage, UserEntity,
};
use super::session_store::SessionStore;

/// Shared script and observations of every client opened by a [`MockFactory`].
#[derive(Debug, Default)]
pub struct MockState {
    pub authorized: bool,
    pub connected: bool,
    pub opened: usize,
    pub connects: usize,
    pub connect_error: Option<ProtocolError>,
    pub auth_check_error: Option<ProtocolError>,
    pub send_code_error: Option<ProtocolError>,
    pub codes_requested: Vec<String>,
    /// Consumed by `sign_in` in order; empty means success.
    pub sign_in_results: VecDeque<Result<(), ProtocolError>>,
    pub password: Option<String>,
    pub logged_out: bool,
    pub log_out_error: Option<ProtocolError>,
    pub entities: HashMap<String, Result<Entity, ProtocolError>>,
    pub lookups: usize,
    pub messages: HashMap<i64, Vec<Result<RawMessage, ProtocolError>>>,
    pub last_query: Option<MessageQuery>,
}

/// Factory handing out clients that share one [`MockState`].
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    pub state: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl ClientFactory for MockFactory {
    fn open(
        &self,
        _session: Arc<dyn SessionStore>,
        _credentials: &Credentials,
    ) -> Box<dyn ProtocolClient> {
        self.state().opened += 1;
        Box::new(MockClient {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn connect(&mut self) -> Result<(), ProtocolError> {
        let mut state = self.state();
        state.connects += 1;
        if let Some(err) = state.connect_error.clone() {
            return Err(err);
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        self.state().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn is_authorized(&mut self) -> Result<bool, ProtocolError> {
        let state = self.state();
        match state.auth_check_error.clone() {
            Some(err) => Err(err),
            None => Ok(state.authorized),
        }
    }

    async fn request_login_code(&mut self, phone: &str) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if let Some(err) = state.send_code_error.clone() {
            return Err(err);
        }
        state.codes_requested.push(phone.to_string());
        Ok(())
    }

    async fn sign_in(&mut self, _phone: &str, _code: &str) -> Result<(), ProtocolError> {
        let mut state = self.state();
        let result = state.sign_in_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            state.authorized = true;
        }
        result
    }

    async fn check_password(&mut self, secret: &str) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if state.password.as_deref() == Some(secret) {
            state.authorized = true;
            Ok(())
        } else {
            Err(ProtocolError::Rpc {
                code: 400,
                message: "PASSWORD_HASH_INVALID".into(),
            })
        }
    }

    async fn log_out(&mut self) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if let Some(err) = state.log_out_error.clone() {
            return Err(err);
        }
        state.logged_out = true;
        state.authorized = false;
        Ok(())
    }

    async fn resolve_entity(&mut self, handle: &str) -> Result<Entity, ProtocolError> {
        let mut state = self.state();
        state.lookups += 1;
        state
            .entities
            .get(handle)
            .cloned()
            .unwrap_or_else(|| Err(ProtocolError::UsernameNotOccupied(handle.to_string())))
    }

    fn iter_messages<'a>(
        &'a mut self,
        entity: &'a Entity,
        query: &MessageQuery,
    ) -> BoxStream<'a, Result<RawMessage, ProtocolError>> {
        let mut state = self.state();
        state.last_query = Some(query.clone());
        let items = state.messages.get(&entity.id()).cloned().unwrap_or_default();
        stream::iter(items).boxed()
    }
}

/// A user entity with the given id and name.
pub fn person(id: i64, first: &str) -> Entity {
    Entity::User(UserEntity {
        id,
        username: Some(first.to_lowercase()),
        first_name: Some(first.to_string()),
        last_name: None,
    })
}

fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A text message in `chat`, dated `id` minutes after a fixed base.
pub fn text_message(chat: &Entity, id: i64, text: &str) -> RawMessage {
    RawMessage {
        id,
        date: base_date() + Duration::minutes(id),
        text: Some(text.to_string()),
        message: Some(text.to_string()),
        chat: chat.clone(),
        sender: Some(chat.clone()),
        sender_id: Some(chat.id()),
    }
}
