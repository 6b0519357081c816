//! Sequential parse run over the selected chats.
//!
//! Each chat is fetched and exported in turn; a failing chat becomes a report
//! line and never aborts the run.

use crate::domain::{
    ChatOutcome, Credentials, Pagination, ParseRunResult, ProgressEvent, ProgressObserver,
    ResolvedChat,
};

use super::auth::AuthSession;
use super::exporter::Exporter;
use super::fetcher::{ChatPosition, HistoryFetcher};

/// Drives the fetcher across a chat list and exports the results.
#[derive(Debug, Clone)]
pub struct ParseOrchestrator {
    fetcher: HistoryFetcher,
    exporter: Exporter,
}

impl ParseOrchestrator {
    #[must_use]
    pub const fn new(fetcher: HistoryFetcher, exporter: Exporter) -> Self {
        Self { fetcher, exporter }
    }

    #[must_use]
    pub const fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// Parses every chat in list order. Produced tables are returned for the
    /// caller to bundle.
    pub async fn run(
        &self,
        auth: &AuthSession,
        chats: &[ResolvedChat],
        credentials: &Credentials,
        pagination: &Pagination,
        progress: &dyn ProgressObserver,
    ) -> ParseRunResult {
        if chats.is_empty() {
            return ParseRunResult::aborted("The chat list to parse is empty");
        }
        let mut client = match auth.open_client(credentials) {
            Ok(client) => client,
            Err(_) => return ParseRunResult::aborted("Client is not authorized"),
        };

        let total = chats.len();
        let mut result = ParseRunResult::default();

        for (i, chat) in chats.iter().enumerate() {
            let index = i + 1;
            let position = ChatPosition { index, total };
            let handle = chat.handle.clone();
            tracing::info!(handle = %handle, index, total, "Parsing chat");

            let outcome = match self
                .fetcher
                .fetch(client.as_mut(), &chat.entity, pagination, position, progress)
                .await
            {
                Ok(messages) if messages.is_empty() => ChatOutcome::Empty { handle },
                Ok(messages) => match self.exporter.to_table(&messages, &result.exports) {
                    Ok(path) => {
                        result.exports.push(path.clone());
                        ChatOutcome::Exported {
                            handle,
                            count: messages.len(),
                            path,
                        }
                    }
                    Err(e) => ChatOutcome::Failed {
                        handle,
                        cause: e.to_string(),
                    },
                },
                Err(e) => {
                    tracing::warn!(handle = %handle, error = %e, "Chat parse failed");
                    ChatOutcome::Failed {
                        handle,
                        cause: e.to_string(),
                    }
                }
            };

            result.outcomes.push(outcome);
            progress.on_progress(ProgressEvent::Chats {
                current: index,
                total,
            });
        }

        result
    }
}
