//! Domain models for chat history export.
//!
//! These models represent resolved chats, normalized messages and the outcome
//! of a parse run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::{Entity, MessageQuery};

/// Backing storage for the session blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// One SQLite file per session identifier.
    #[default]
    File,
    /// Held in process memory, lost on restart.
    Memory,
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "sqlite" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown session kind: {s}. Use: file, memory")),
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Application credentials and the account phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: String,
    pub api_hash: String,
    pub phone_number: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(api_id: impl Into<String>, api_hash: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
            api_hash: api_hash.into(),
            phone_number: None,
        }
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Both application credentials are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.api_id.trim().is_empty() && !self.api_hash.trim().is_empty()
    }
}

/// Kind of a resolved chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatKind {
    /// Direct chat with a user.
    Person,
    /// Group, supergroup or channel.
    GroupOrChannel,
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "Chat"),
            Self::GroupOrChannel => write!(f, "Channel/Group"),
        }
    }
}

/// A chat selected for parsing. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ResolvedChat {
    /// Protocol entity, required for later fetch calls.
    pub entity: Entity,
    pub name: String,
    pub kind: ChatKind,
    pub id: i64,
    /// Handle as typed by the user.
    pub handle: String,
}

impl ResolvedChat {
    /// Builds a resolved chat from a looked-up entity.
    #[must_use]
    pub fn from_entity(entity: Entity, handle: impl Into<String>) -> Self {
        let (name, kind) = match &entity {
            Entity::User(user) => (
                person_name(user.first_name.as_deref(), user.last_name.as_deref()),
                ChatKind::Person,
            ),
            Entity::Group(group) => (group.title.clone(), ChatKind::GroupOrChannel),
            Entity::Channel(channel) => (channel.title.clone(), ChatKind::GroupOrChannel),
        };
        let id = entity.id();

        Self {
            entity,
            name,
            kind,
            id,
            handle: handle.into(),
        }
    }

    /// One-line description used in list summaries.
    #[must_use]
    pub fn info(&self) -> String {
        format!(
            "Chat name: {}, Chat type: {}, Chat ID: {}",
            self.name, self.kind, self.id
        )
    }
}

/// Joins first and last name, skipping absent parts.
#[must_use]
pub fn person_name(first: Option<&str>, last: Option<&str>) -> String {
    [first, last]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A message flattened into an export row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMessage {
    pub date: DateTime<Utc>,
    pub chat_type: String,
    pub chat_name: String,
    pub chat_id: i64,
    pub sender_type: String,
    pub sender_username: Option<String>,
    pub sender_first_name: Option<String>,
    pub sender_last_name: Option<String>,
    pub sender_id: Option<i64>,
    pub text: String,
}

/// How much history to fetch and in which order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Unbounded if absent.
    pub max_count: Option<u64>,
    pub cutoff_date: Option<DateTime<Utc>>,
    /// Retrieve oldest messages first.
    pub oldest_first: bool,
}

impl From<&Pagination> for MessageQuery {
    fn from(p: &Pagination) -> Self {
        Self {
            limit: p.max_count,
            offset_date: p.cutoff_date,
            reverse: p.oldest_first,
        }
    }
}

/// Result of parsing a single chat.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Exported {
        handle: String,
        count: usize,
        path: PathBuf,
    },
    Empty {
        handle: String,
    },
    Failed {
        handle: String,
        cause: String,
    },
}

impl std::fmt::Display for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exported { handle, count, .. } => {
                write!(f, "Parsed chat {handle}, messages: {count}")
            }
            Self::Empty { handle } => write!(f, "No messages were extracted from chat {handle}"),
            Self::Failed { handle, cause } => {
                write!(f, "Failed to parse chat {handle}, cause: {cause}")
            }
        }
    }
}

/// Outcome of one parse invocation.
#[derive(Debug, Clone, Default)]
pub struct ParseRunResult {
    /// Set when the run stopped before touching any chat.
    pub notice: Option<String>,
    pub outcomes: Vec<ChatOutcome>,
    /// Produced CSV files, in chat order.
    pub exports: Vec<PathBuf>,
}

impl ParseRunResult {
    /// A run that did not start.
    #[must_use]
    pub fn aborted(notice: impl Into<String>) -> Self {
        Self {
            notice: Some(notice.into()),
            ..Self::default()
        }
    }

    /// Human-readable report, one line per chat.
    #[must_use]
    pub fn report(&self) -> String {
        if let Some(ref notice) = self.notice {
            return notice.clone();
        }
        let mut out = String::new();
        for outcome in &self.outcomes {
            out.push_str(&outcome.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocol::{ChannelEntity, UserEntity};

    #[test]
    fn test_person_display_name() {
        let entity = Entity::User(UserEntity {
            id: 7,
            username: None,
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
        });
        let chat = ResolvedChat::from_entity(entity, "ada");
        assert_eq!(chat.name, "Ada Lovelace");
        assert_eq!(chat.kind, ChatKind::Person);
        assert_eq!(chat.id, 7);
    }

    #[test]
    fn test_channel_display_name_is_title() {
        let entity = Entity::Channel(ChannelEntity {
            id: 99,
            title: "Rust News".into(),
            username: Some("rustnews".into()),
            broadcast: true,
        });
        let chat = ResolvedChat::from_entity(entity, "@rustnews");
        assert_eq!(chat.name, "Rust News");
        assert_eq!(chat.kind, ChatKind::GroupOrChannel);
        assert_eq!(
            chat.info(),
            "Chat name: Rust News, Chat type: Channel/Group, Chat ID: 99"
        );
    }

    #[test]
    fn test_person_name_skips_missing_parts() {
        assert_eq!(person_name(Some("Ada"), None), "Ada");
        assert_eq!(person_name(None, Some("")), "");
    }

    #[test]
    fn test_session_kind_from_str() {
        assert_eq!("memory".parse::<SessionKind>(), Ok(SessionKind::Memory));
        assert_eq!("SQLite".parse::<SessionKind>(), Ok(SessionKind::File));
        assert!("redis".parse::<SessionKind>().is_err());
    }

    #[test]
    fn test_report_prefers_notice() {
        let result = ParseRunResult::aborted("chat list is empty");
        assert_eq!(result.report(), "chat list is empty");
    }

    #[test]
    fn test_credentials_completeness() {
        assert!(Credentials::new("1", "abc").is_complete());
        assert!(!Credentials::new("", "abc").is_complete());
        assert!(!Credentials::new("1", "  ").is_complete());
    }
}
