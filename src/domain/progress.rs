//! Progress reporting.
//!
//! The core invokes an observer synchronously at defined checkpoints; any UI
//! subscribes by implementing [`ProgressObserver`].

/// A progress checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A message was processed within one chat.
    Messages {
        chat_index: usize,
        chat_total: usize,
        current: u64,
        /// Known only when a maximum count was requested.
        total: Option<u64>,
    },
    /// A chat finished (successfully or not).
    Chats { current: usize, total: usize },
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Messages {
                chat_index,
                chat_total,
                current,
                total,
            } => {
                write!(f, "Parsing chats {chat_index}/{chat_total}, Parsing messages {current}/")?;
                match total {
                    Some(total) => write!(f, "{total}"),
                    None => write!(f, "?"),
                }
            }
            Self::Chats { current, total } => write!(f, "Parsing chats {current}/{total}"),
        }
    }
}

/// Receives progress checkpoints.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}
