//! Chat handle resolution.
//!
//! Turns user-supplied handles into resolved chats and maintains the ordered,
//! duplicate-free selection list.

use crate::domain::{AppError, ResolvedChat, Result};
use crate::infrastructure::protocol::{self, ProtocolClient, ProtocolError};

/// Outcome of adding a batch of handles.
#[derive(Debug, Clone, Default)]
pub struct AddReport {
    /// One line per handle in input order.
    pub lines: Vec<String>,
    /// Summary of every chat currently in the list.
    pub summary: String,
}

/// Resolves a single handle. The client must represent an authorized session.
///
/// # Errors
/// [`AppError::NotAuthorized`] for an unauthorized session,
/// [`AppError::ChatNotFound`] for unknown or invalid handles and
/// [`AppError::ResolutionFailed`] for any other protocol failure.
pub async fn resolve(client: &mut dyn ProtocolClient, handle: &str) -> Result<ResolvedChat> {
    ensure_authorized(client, handle).await?;
    lookup(client, handle).await
}

/// Resolves every whitespace-separated handle in `batch` and appends new chats to
/// `chats`. Each handle goes through [`resolve`] on its own; failures and
/// duplicates are reported per handle and never abort the batch.
///
/// # Errors
/// Returns [`AppError::NotAuthorized`] as soon as the session turns out not to be
/// authorized. Chats added before that stay in the list.
pub async fn add_to_list(
    client: &mut dyn ProtocolClient,
    chats: &mut Vec<ResolvedChat>,
    batch: &str,
) -> Result<AddReport> {
    let handles: Vec<&str> = batch.split_whitespace().collect();
    if handles.is_empty() {
        return Ok(AddReport {
            lines: vec!["no chat handles given".to_string()],
            summary: chats_info(chats),
        });
    }

    let mut lines = Vec::with_capacity(handles.len());
    for handle in handles {
        match resolve(client, handle).await {
            Ok(chat) if chats.iter().any(|c| c.entity == chat.entity) => {
                tracing::debug!(handle, "Chat already selected");
                lines.push(format!("Chat {handle} is already in the list"));
            }
            Ok(chat) => {
                tracing::info!(handle, id = chat.id, name = %chat.name, "Chat added");
                lines.push(format!("Added chat {handle}: {}", chat.name));
                chats.push(chat);
            }
            Err(AppError::NotAuthorized) => return Err(AppError::NotAuthorized),
            Err(e) => {
                tracing::warn!(handle, error = %e, "Failed to resolve chat");
                lines.push(e.to_string());
            }
        }
    }

    Ok(AddReport {
        lines,
        summary: chats_info(chats),
    })
}

/// Numbered multi-line description of the list.
#[must_use]
pub fn chats_info(chats: &[ResolvedChat]) -> String {
    let mut out = String::new();
    for (i, chat) in chats.iter().enumerate() {
        out.push_str(&format!("{}: {}\n", i + 1, chat.info()));
    }
    out
}

async fn ensure_authorized(client: &mut dyn ProtocolClient, handle: &str) -> Result<()> {
    match protocol::check_authorized(client).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::NotAuthorized),
        Err(source) => Err(AppError::ResolutionFailed {
            handle: handle.to_string(),
            source,
        }),
    }
}

/// Looks up a handle, connecting for the duration of the call if needed.
async fn lookup(client: &mut dyn ProtocolClient, handle: &str) -> Result<ResolvedChat> {
    let handle = handle.trim();
    let was_connected = client.is_connected();

    let result = match protocol::ensure_connected(client).await {
        Ok(()) => client.resolve_entity(handle).await,
        Err(e) => Err(e),
    };
    if !was_connected {
        protocol::release(client).await;
    }

    match result {
        Ok(entity) => Ok(ResolvedChat::from_entity(entity, handle)),
        Err(ProtocolError::UsernameNotOccupied(_) | ProtocolError::UsernameInvalid(_)) => {
            Err(AppError::ChatNotFound {
                handle: handle.to_string(),
            })
        }
        Err(source) => Err(AppError::ResolutionFailed {
            handle: handle.to_string(),
            source,
        }),
    }
}
