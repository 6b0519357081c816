//! Protocol client backed by a Telegram Desktop history export.
//!
//! Serves entities and messages from `result.json` produced by "Export chat
//! history", either a full account export (`chats.list`) or a single chat. A
//! local archive has no account, so it is authorized as soon as it is loaded.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use crate::domain::Credentials;

use super::protocol::{
    ChannelEntity, ClientFactory, Entity, GroupEntity, MessageQuery, ProtocolClient,
    ProtocolError, RawMessage, UserEntity,
};
use super::session_store::SessionStore;

#[derive(Debug, Deserialize)]
struct RawChatList {
    #[serde(default)]
    list: Vec<RawChat>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    #[serde(default)]
    messages: Vec<RawExportMessage>,
}

#[derive(Debug, Deserialize)]
struct RawExportMessage {
    id: i64,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_unixtime: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    from_id: Option<String>,
    #[serde(default)]
    text: RawText,
}

/// Message text: a plain string or a list of plain strings and entities.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawText {
    Plain(String),
    Parts(Vec<RawTextPart>),
}

impl Default for RawText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl RawText {
    fn flatten(&self) -> String {
        match self {
            Self::Plain(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    RawTextPart::Plain(s) => s.as_str(),
                    RawTextPart::Entity { text } => text.as_str(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTextPart {
    Plain(String),
    Entity { text: String },
}

/// A chat loaded from the archive, messages oldest first.
#[derive(Debug, Clone)]
struct ArchivedChat {
    entity: Entity,
    name: String,
    messages: Vec<RawMessage>,
}

/// Session blob recorded on connect.
#[derive(Debug, serde::Serialize, Deserialize)]
struct SessionRecord {
    archive: PathBuf,
    opened_at: DateTime<Utc>,
}

/// Client reading a Telegram Desktop export.
pub struct ArchiveClient {
    path: PathBuf,
    session: Arc<dyn SessionStore>,
    chats: Option<Vec<ArchivedChat>>,
    connected: bool,
}

impl ArchiveClient {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            path: path.into(),
            session,
            chats: None,
            connected: false,
        }
    }

    /// The stored record when it belongs to this archive, a fresh one otherwise.
    /// An unreadable blob is replaced.
    fn session_record(&self) -> Result<SessionRecord, ProtocolError> {
        let previous = self
            .session
            .load()
            .map_err(|e| ProtocolError::Session(e.to_string()))?
            .and_then(|blob| serde_json::from_slice::<SessionRecord>(&blob).ok());

        match previous {
            Some(record) if record.archive == self.path => {
                tracing::debug!(opened_at = %record.opened_at, "Resuming archive session");
                Ok(record)
            }
            previous => {
                if let Some(record) = previous {
                    tracing::info!(
                        previous = %record.archive.display(),
                        "Session rebound to another archive"
                    );
                }
                Ok(SessionRecord {
                    archive: self.path.clone(),
                    opened_at: Utc::now(),
                })
            }
        }
    }

    fn chats(&self) -> Result<&[ArchivedChat], ProtocolError> {
        match (&self.chats, self.connected) {
            (Some(chats), true) => Ok(chats),
            _ => Err(ProtocolError::Connection("client is not connected".into())),
        }
    }
}

#[async_trait]
impl ProtocolClient for ArchiveClient {
    async fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.chats.is_none() {
            let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
                ProtocolError::Connection(format!("cannot read {}: {e}", self.path.display()))
            })?;
            let chats = parse_export(&bytes)?;
            tracing::info!(path = %self.path.display(), chats = chats.len(), "Archive loaded");
            self.chats = Some(chats);
        }

        let record = self.session_record()?;
        let blob =
            serde_json::to_vec(&record).map_err(|e| ProtocolError::Session(e.to_string()))?;
        self.session
            .save(&blob)
            .map_err(|e| ProtocolError::Session(e.to_string()))?;

        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn is_authorized(&mut self) -> Result<bool, ProtocolError> {
        self.chats().map(|_| true)
    }

    async fn request_login_code(&mut self, _phone: &str) -> Result<(), ProtocolError> {
        Err(ProtocolError::Unsupported("login code delivery"))
    }

    async fn sign_in(&mut self, _phone: &str, _code: &str) -> Result<(), ProtocolError> {
        Err(ProtocolError::Unsupported("sign in"))
    }

    async fn check_password(&mut self, _secret: &str) -> Result<(), ProtocolError> {
        Err(ProtocolError::Unsupported("two-step verification"))
    }

    async fn log_out(&mut self) -> Result<(), ProtocolError> {
        self.session
            .destroy()
            .map_err(|e| ProtocolError::Session(e.to_string()))
    }

    async fn resolve_entity(&mut self, handle: &str) -> Result<Entity, ProtocolError> {
        let needle = handle.trim().trim_start_matches('@');
        if needle.is_empty() {
            return Err(ProtocolError::UsernameInvalid(handle.to_string()));
        }

        let chats = self.chats()?;
        let by_id = needle.parse::<i64>().ok();
        let needle = needle.to_lowercase();

        chats
            .iter()
            .find(|chat| {
                let name = chat.name.to_lowercase();
                by_id == Some(chat.entity.id()) || name == needle || name.replace(' ', "_") == needle
            })
            .map(|chat| chat.entity.clone())
            .ok_or_else(|| ProtocolError::UsernameNotOccupied(handle.to_string()))
    }

    fn iter_messages<'a>(
        &'a mut self,
        entity: &'a Entity,
        query: &MessageQuery,
    ) -> BoxStream<'a, Result<RawMessage, ProtocolError>> {
        let chats = match self.chats() {
            Ok(chats) => chats,
            Err(e) => return stream::once(async move { Err::<RawMessage, _>(e) }).boxed(),
        };
        let Some(chat) = chats.iter().find(|c| c.entity == *entity) else {
            let err = ProtocolError::Rpc {
                code: 400,
                message: "PEER_ID_INVALID".into(),
            };
            return stream::once(async move { Err::<RawMessage, _>(err) }).boxed();
        };

        let query = query.clone();
        let ordered: Box<dyn Iterator<Item = &RawMessage> + Send> = if query.reverse {
            Box::new(chat.messages.iter())
        } else {
            Box::new(chat.messages.iter().rev())
        };
        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);

        let selected: Vec<_> = ordered
            .filter(move |m| match query.offset_date {
                Some(offset) if query.reverse => m.date > offset,
                Some(offset) => m.date < offset,
                None => true,
            })
            .take(limit)
            .cloned()
            .map(Ok)
            .collect();

        stream::iter(selected).boxed()
    }
}

/// Opens [`ArchiveClient`]s for one export file.
#[derive(Debug, Clone)]
pub struct ArchiveClientFactory {
    path: PathBuf,
}

impl ArchiveClientFactory {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClientFactory for ArchiveClientFactory {
    fn open(
        &self,
        session: Arc<dyn SessionStore>,
        _credentials: &Credentials,
    ) -> Box<dyn ProtocolClient> {
        Box::new(ArchiveClient::new(self.path.clone(), session))
    }
}

/// Parses an export into chats with protocol-shaped messages.
fn parse_export(bytes: &[u8]) -> Result<Vec<ArchivedChat>, ProtocolError> {
    let invalid = |e: serde_json::Error| ProtocolError::Connection(format!("invalid export: {e}"));
    let mut value: serde_json::Value = serde_json::from_slice(bytes).map_err(invalid)?;

    // Full account exports nest chats under `chats.list`.
    let raw_chats = match value.get_mut("chats").map(serde_json::Value::take) {
        Some(chats) => serde_json::from_value::<RawChatList>(chats)
            .map_err(invalid)?
            .list,
        None => vec![serde_json::from_value::<RawChat>(value).map_err(invalid)?],
    };

    Ok(raw_chats.into_iter().map(convert_chat).collect())
}

fn convert_chat(raw: RawChat) -> ArchivedChat {
    let name = raw.name.unwrap_or_default();
    let entity = chat_entity(&raw.kind, raw.id, &name);

    let mut messages: Vec<RawMessage> = raw
        .messages
        .into_iter()
        .filter_map(|m| {
            let date = parse_date(m.date_unixtime.as_deref(), m.date.as_deref())?;
            let text = m.text.flatten();
            let sender = m
                .from_id
                .as_deref()
                .and_then(|from_id| sender_entity(from_id, m.from.as_deref()));
            Some(RawMessage {
                id: m.id,
                date,
                text: Some(text.clone()),
                message: Some(text),
                chat: entity.clone(),
                sender_id: sender.as_ref().map(Entity::id),
                sender,
            })
        })
        .collect();
    messages.sort_by_key(|m| (m.date, m.id));

    ArchivedChat {
        entity,
        name,
        messages,
    }
}

fn chat_entity(kind: &str, id: i64, name: &str) -> Entity {
    match kind {
        "personal_chat" | "bot_chat" | "saved_messages" => person_entity(id, Some(name)),
        "private_supergroup" | "public_supergroup" => Entity::Channel(ChannelEntity {
            id,
            title: name.to_string(),
            username: None,
            broadcast: false,
        }),
        "private_channel" | "public_channel" => Entity::Channel(ChannelEntity {
            id,
            title: name.to_string(),
            username: None,
            broadcast: true,
        }),
        _ => Entity::Group(GroupEntity {
            id,
            title: name.to_string(),
        }),
    }
}

/// Maps `user123` / `channel123` / `chat123` sender ids.
fn sender_entity(from_id: &str, from: Option<&str>) -> Option<Entity> {
    let split = from_id.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = from_id.split_at(split);
    let id = digits.parse::<i64>().ok()?;
    let title = from.unwrap_or_default().to_string();

    match prefix {
        "user" => Some(person_entity(id, from)),
        "channel" => Some(Entity::Channel(ChannelEntity {
            id,
            title,
            username: None,
            broadcast: true,
        })),
        "chat" => Some(Entity::Group(GroupEntity { id, title })),
        _ => None,
    }
}

fn person_entity(id: i64, name: Option<&str>) -> Entity {
    let name = name.unwrap_or_default().trim();
    let (first, last) = match name.split_once(' ') {
        Some((first, last)) => (first, last.trim()),
        None => (name, ""),
    };
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    Entity::User(UserEntity {
        id,
        username: None,
        first_name: non_empty(first),
        last_name: non_empty(last),
    })
}

/// Unix timestamp when present, otherwise the local ISO date taken as UTC.
fn parse_date(unixtime: Option<&str>, date: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(ts) = unixtime.and_then(|s| s.parse::<i64>().ok()) {
        return DateTime::from_timestamp(ts, 0);
    }
    let date = date?;
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemorySessionStore;
    use tempfile::tempdir;

    const EXPORT: &str = r#"{
        "about": "Here is the data you requested.",
        "chats": {
            "about": "This page lists all chats from this export.",
            "list": [
                {
                    "name": "Rust Club",
                    "type": "private_supergroup",
                    "id": 1001,
                    "messages": [
                        {"id": 1, "type": "service", "date": "2024-01-01T10:00:00",
                         "date_unixtime": "1704103200", "actor": "Ann Lee",
                         "actor_id": "user7", "action": "create_group", "text": ""},
                        {"id": 2, "type": "message", "date": "2024-01-01T10:05:00",
                         "date_unixtime": "1704103500", "from": "Ann Lee",
                         "from_id": "user7", "text": "welcome"},
                        {"id": 3, "type": "message", "date": "2024-01-02T09:00:00",
                         "date_unixtime": "1704186000", "from": "Bot News",
                         "from_id": "channel55",
                         "text": ["see ", {"type": "link", "text": "https://rust-lang.org"}]}
                    ]
                },
                {
                    "name": "Ann Lee",
                    "type": "personal_chat",
                    "id": 7,
                    "messages": []
                }
            ]
        }
    }"#;

    async fn connected_client() -> (ArchiveClient, Arc<MemorySessionStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, EXPORT).unwrap();
        let session = Arc::new(MemorySessionStore::new());
        let mut client = ArchiveClient::new(path, session.clone());
        client.connect().await.unwrap();
        (client, session, dir)
    }

    #[tokio::test]
    async fn test_connect_records_session_and_authorizes() {
        let (mut client, session, _dir) = connected_client().await;
        assert!(client.is_authorized().await.unwrap());
        let blob = session.load().unwrap().unwrap();
        assert!(String::from_utf8(blob).unwrap().contains("result.json"));

        client.log_out().await.unwrap();
        assert_eq!(session.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_session_of_same_archive() {
        let (mut client, session, dir) = connected_client().await;
        let first: SessionRecord = serde_json::from_slice(&session.load().unwrap().unwrap()).unwrap();

        client.disconnect().await.unwrap();
        client.connect().await.unwrap();
        let again: SessionRecord = serde_json::from_slice(&session.load().unwrap().unwrap()).unwrap();
        assert_eq!(again.opened_at, first.opened_at);

        let other = dir.path().join("other.json");
        std::fs::write(&other, EXPORT).unwrap();
        let mut rebound = ArchiveClient::new(&other, session.clone());
        rebound.connect().await.unwrap();
        let record: SessionRecord = serde_json::from_slice(&session.load().unwrap().unwrap()).unwrap();
        assert_eq!(record.archive, other);
    }

    #[tokio::test]
    async fn test_unreadable_session_blob_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, EXPORT).unwrap();
        let session = Arc::new(MemorySessionStore::new());
        session.save(b"not json").unwrap();

        let mut client = ArchiveClient::new(&path, session.clone());
        client.connect().await.unwrap();

        let record: SessionRecord = serde_json::from_slice(&session.load().unwrap().unwrap()).unwrap();
        assert_eq!(record.archive, path);
    }

    #[tokio::test]
    async fn test_missing_archive_is_connection_error() {
        let session = Arc::new(MemorySessionStore::new());
        let mut client = ArchiveClient::new("/nonexistent/result.json", session);
        assert!(matches!(
            client.connect().await,
            Err(ProtocolError::Connection(_))
        ));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_resolve_by_name_and_id() {
        let (mut client, _session, _dir) = connected_client().await;

        let club = client.resolve_entity("rust club").await.unwrap();
        assert_eq!(client.resolve_entity("@Rust_Club").await.unwrap(), club);
        assert!(matches!(club, Entity::Channel(ChannelEntity { id: 1001, broadcast: false, .. })));

        let ann = client.resolve_entity("@7").await.unwrap();
        match ann {
            Entity::User(user) => {
                assert_eq!(user.first_name.as_deref(), Some("Ann"));
                assert_eq!(user.last_name.as_deref(), Some("Lee"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            client.resolve_entity("nobody").await,
            Err(ProtocolError::UsernameNotOccupied(_))
        ));
        assert!(matches!(
            client.resolve_entity("@").await,
            Err(ProtocolError::UsernameInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_iter_messages_orders_and_filters() {
        let (mut client, _session, _dir) = connected_client().await;
        let club = client.resolve_entity("1001").await.unwrap();

        let newest_first: Vec<i64> = client
            .iter_messages(&club, &MessageQuery::default())
            .map(|m| m.unwrap().id)
            .collect()
            .await;
        assert_eq!(newest_first, vec![3, 2, 1]);

        let query = MessageQuery {
            limit: Some(2),
            offset_date: None,
            reverse: true,
        };
        let oldest_first: Vec<i64> = client
            .iter_messages(&club, &query)
            .map(|m| m.unwrap().id)
            .collect()
            .await;
        assert_eq!(oldest_first, vec![1, 2]);

        let query = MessageQuery {
            limit: None,
            offset_date: DateTime::from_timestamp(1_704_186_000, 0),
            reverse: false,
        };
        let older: Vec<i64> = client
            .iter_messages(&club, &query)
            .map(|m| m.unwrap().id)
            .collect()
            .await;
        assert_eq!(older, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_text_parts_and_senders() {
        let (mut client, _session, _dir) = connected_client().await;
        let club = client.resolve_entity("Rust Club").await.unwrap();

        let messages: Vec<RawMessage> = client
            .iter_messages(&club, &MessageQuery::default())
            .map(Result::unwrap)
            .collect()
            .await;

        let link = &messages[0];
        assert_eq!(link.text.as_deref(), Some("see https://rust-lang.org"));
        assert!(matches!(link.sender, Some(Entity::Channel(ChannelEntity { id: 55, .. }))));
        assert_eq!(link.sender_id, Some(55));

        let service = &messages[2];
        assert_eq!(service.text.as_deref(), Some(""));
        assert!(service.sender.is_none());
    }

    #[test]
    fn test_single_chat_export() {
        let single = r#"{"name": "Saved", "type": "saved_messages", "id": 9,
            "messages": [{"id": 1, "date": "2023-06-01T12:00:00", "text": "note"}]}"#;
        let chats = parse_export(single.as_bytes()).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].messages.len(), 1);
        assert_eq!(
            chats[0].messages[0].date,
            DateTime::parse_from_rfc3339("2023-06-01T12:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_unsupported_calls_are_reported() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut client = ArchiveClient::new("x.json", Arc::new(MemorySessionStore::new()));
        let err = rt.block_on(client.sign_in("+1", "123")).unwrap_err();
        assert_eq!(err, ProtocolError::Unsupported("sign in"));
    }
}
