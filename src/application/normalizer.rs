//! Flattens raw protocol messages into export rows.
//!
//! Handles the heterogeneous chat and sender shapes (user, basic group, channel,
//! missing sender) delivered by the protocol.

use crate::domain::{person_name, NormalizedMessage};
use crate::infrastructure::{Entity, RawMessage};

/// Sender type recorded when the protocol did not deliver a sender.
const UNKNOWN_SENDER: &str = "Unknown";

/// Normalizes a raw message, `None` if it carries no text body.
#[must_use]
pub fn normalize_message(message: &RawMessage) -> Option<NormalizedMessage> {
    let text = extract_text(message)?;

    let chat_name = match &message.chat {
        Entity::User(user) => person_name(user.first_name.as_deref(), user.last_name.as_deref()),
        Entity::Group(group) => group.title.clone(),
        Entity::Channel(channel) => channel.title.clone(),
    };

    let (sender_type, sender_username, sender_first_name, sender_last_name, sender_id) =
        match &message.sender {
            Some(Entity::User(user)) => (
                "User".to_string(),
                user.username.clone(),
                user.first_name.clone(),
                user.last_name.clone(),
                Some(user.id),
            ),
            Some(other) => (
                other.type_name().to_string(),
                other.username().map(str::to_string),
                None,
                None,
                message.sender_id.or(Some(other.id())),
            ),
            None => (
                UNKNOWN_SENDER.to_string(),
                None,
                None,
                None,
                message.sender_id,
            ),
        };

    Some(NormalizedMessage {
        date: message.date,
        chat_type: message.chat.type_name().to_string(),
        chat_name,
        chat_id: message.chat.id(),
        sender_type,
        sender_username,
        sender_first_name,
        sender_last_name,
        sender_id,
        text,
    })
}

/// Formatted body if present, otherwise the raw body.
fn extract_text(message: &RawMessage) -> Option<String> {
    [message.text.as_deref(), message.message.as_deref()]
        .into_iter()
        .flatten()
        .find(|body| !body.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocol::{ChannelEntity, GroupEntity, UserEntity};
    use chrono::{TimeZone, Utc};

    fn user(id: i64) -> Entity {
        Entity::User(UserEntity {
            id,
            username: Some(format!("user{id}")),
            first_name: Some("Grace".into()),
            last_name: Some("Hopper".into()),
        })
    }

    fn raw(chat: Entity, sender: Option<Entity>, text: Option<&str>, body: Option<&str>) -> RawMessage {
        RawMessage {
            id: 1,
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            text: text.map(str::to_string),
            message: body.map(str::to_string),
            chat,
            sender,
            sender_id: Some(555),
        }
    }

    #[test]
    fn test_person_sender_carries_names() {
        let msg = raw(user(10), Some(user(10)), Some("hello"), None);
        let row = normalize_message(&msg).unwrap();

        assert_eq!(row.chat_type, "User");
        assert_eq!(row.chat_name, "Grace Hopper");
        assert_eq!(row.sender_type, "User");
        assert_eq!(row.sender_username.as_deref(), Some("user10"));
        assert_eq!(row.sender_first_name.as_deref(), Some("Grace"));
        assert_eq!(row.sender_id, Some(10));
        assert_eq!(row.text, "hello");
    }

    #[test]
    fn test_channel_sender_has_no_names() {
        let channel = Entity::Channel(ChannelEntity {
            id: 300,
            title: "Announcements".into(),
            username: Some("announce".into()),
            broadcast: true,
        });
        let msg = raw(channel.clone(), Some(channel), None, Some("release"));
        let row = normalize_message(&msg).unwrap();

        assert_eq!(row.chat_type, "Channel");
        assert_eq!(row.chat_name, "Announcements");
        assert_eq!(row.sender_type, "Channel");
        assert_eq!(row.sender_username.as_deref(), Some("announce"));
        assert_eq!(row.sender_first_name, None);
        assert_eq!(row.sender_id, Some(555));
        assert_eq!(row.text, "release");
    }

    #[test]
    fn test_group_chat_without_sender() {
        let group = Entity::Group(GroupEntity {
            id: 42,
            title: "Book club".into(),
        });
        let row = normalize_message(&raw(group, None, Some("hi all"), None)).unwrap();

        assert_eq!(row.chat_type, "Chat");
        assert_eq!(row.chat_name, "Book club");
        assert_eq!(row.sender_type, "Unknown");
        assert_eq!(row.sender_id, Some(555));
    }

    #[test]
    fn test_empty_text_is_dropped() {
        assert!(normalize_message(&raw(user(1), None, Some(""), Some(""))).is_none());
        assert!(normalize_message(&raw(user(1), None, None, None)).is_none());
    }

    #[test]
    fn test_raw_body_used_when_formatted_text_empty() {
        let row = normalize_message(&raw(user(1), None, Some(""), Some("plain"))).unwrap();
        assert_eq!(row.text, "plain");
    }
}
