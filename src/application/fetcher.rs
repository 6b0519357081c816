//! Paginated history retrieval for one resolved entity.

use std::time::Duration;

use futures::StreamExt;

use crate::domain::{
    AppError, FetchConfig, NormalizedMessage, Pagination, ProgressEvent, ProgressObserver, Result,
};
use crate::infrastructure::protocol::{self, Entity, MessageQuery, ProtocolClient};

use super::normalizer::normalize_message;

/// Cooperative pause applied every `every` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub every: u64,
    pub pause: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            every: 1000,
            pause: Duration::from_secs(1),
        }
    }
}

impl From<&FetchConfig> for ThrottleConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            every: config.throttle_every,
            pause: config.throttle_pause(),
        }
    }
}

/// Position of the fetched chat within the parse run, for progress lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatPosition {
    pub index: usize,
    pub total: usize,
}

impl Default for ChatPosition {
    fn default() -> Self {
        Self { index: 1, total: 1 }
    }
}

/// Retrieves and normalizes message history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFetcher {
    throttle: ThrottleConfig,
}

impl HistoryFetcher {
    #[must_use]
    pub const fn new(throttle: ThrottleConfig) -> Self {
        Self { throttle }
    }

    /// Fetches the history of `entity` in chronological order unless
    /// `pagination.oldest_first` keeps the stream order.
    ///
    /// The client is connected on entry and released on every exit path.
    ///
    /// # Errors
    /// [`AppError::NotAuthorized`] for an unauthorized session,
    /// [`AppError::FetchFailed`] if the protocol fails mid-stream.
    pub async fn fetch(
        &self,
        client: &mut dyn ProtocolClient,
        entity: &Entity,
        pagination: &Pagination,
        position: ChatPosition,
        progress: &dyn ProgressObserver,
    ) -> Result<Vec<NormalizedMessage>> {
        if let Err(source) = protocol::ensure_connected(client).await {
            protocol::release(client).await;
            return Err(AppError::FetchFailed { source });
        }

        let result = self
            .collect(client, entity, pagination, position, progress)
            .await;
        protocol::release(client).await;

        let mut messages = result?;
        if !pagination.oldest_first {
            messages.reverse();
        }
        Ok(messages)
    }

    async fn collect(
        &self,
        client: &mut dyn ProtocolClient,
        entity: &Entity,
        pagination: &Pagination,
        position: ChatPosition,
        progress: &dyn ProgressObserver,
    ) -> Result<Vec<NormalizedMessage>> {
        match client.is_authorized().await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::NotAuthorized),
            Err(source) => return Err(AppError::FetchFailed { source }),
        }

        let query = MessageQuery::from(pagination);
        let mut stream = client.iter_messages(entity, &query);
        let mut messages = Vec::new();
        let mut count: u64 = 0;

        while let Some(item) = stream.next().await {
            let raw = item.map_err(|source| AppError::FetchFailed { source })?;
            count += 1;

            let milestone = self.throttle.every > 0 && count % self.throttle.every == 0;
            if milestone {
                self.pause().await;
            }
            if let Some(message) = normalize_message(&raw) {
                messages.push(message);
            }
            if milestone {
                self.pause().await;
                tracing::debug!(count, kept = messages.len(), "Fetch milestone");
            }

            progress.on_progress(ProgressEvent::Messages {
                chat_index: position.index,
                chat_total: position.total,
                current: count,
                total: pagination.max_count,
            });
        }

        tracing::info!(
            entity = entity.id(),
            processed = count,
            kept = messages.len(),
            "History fetched"
        );

        Ok(messages)
    }

    async fn pause(&self) {
        if !self.throttle.pause.is_zero() {
            tokio::time::sleep(self.throttle.pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::progress::NoProgress;
    use crate::domain::Credentials;
    use crate::infrastructure::mock_client::{person, text_message, MockFactory};
    use crate::infrastructure::protocol::ClientFactory;
    use crate::infrastructure::{MemorySessionStore, ProtocolError, RawMessage};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressObserver for Recorder {
        fn on_progress(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn fetcher() -> HistoryFetcher {
        HistoryFetcher::new(ThrottleConfig {
            every: 3,
            pause: Duration::ZERO,
        })
    }

    fn setup(
        messages: Vec<std::result::Result<RawMessage, ProtocolError>>,
    ) -> (MockFactory, Box<dyn ProtocolClient>, Entity) {
        let factory = MockFactory::new();
        let chat = person(10, "Alice");
        {
            let mut state = factory.state();
            state.authorized = true;
            state.messages.insert(chat.id(), messages);
        }
        let client = factory.open(
            Arc::new(MemorySessionStore::new()),
            &Credentials::new("1", "h"),
        );
        (factory, client, chat)
    }

    /// Newest first, as the protocol delivers by default.
    fn newest_first(chat: &Entity, n: i64) -> Vec<std::result::Result<RawMessage, ProtocolError>> {
        (1..=n)
            .rev()
            .map(|id| Ok(text_message(chat, id, &format!("m{id}"))))
            .collect()
    }

    fn texts(messages: &[NormalizedMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_default_direction_is_chronological() {
        let chat = person(10, "Alice");
        let (_factory, mut client, chat) = setup(newest_first(&chat, 4));

        let messages = fetcher()
            .fetch(client.as_mut(), &chat, &Pagination::default(), ChatPosition::default(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(texts(&messages), vec!["m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_oldest_first_keeps_stream_order() {
        let chat = person(10, "Alice");
        let stream: Vec<_> = (1..=4)
            .map(|id| Ok(text_message(&chat, id, &format!("m{id}"))))
            .collect();
        let (factory, mut client, chat) = setup(stream);
        let pagination = Pagination {
            oldest_first: true,
            ..Pagination::default()
        };

        let messages = fetcher()
            .fetch(client.as_mut(), &chat, &pagination, ChatPosition::default(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(texts(&messages), vec!["m1", "m2", "m3", "m4"]);
        assert!(factory.state().last_query.as_ref().unwrap().reverse);
    }

    #[tokio::test]
    async fn test_empty_texts_are_dropped() {
        let chat = person(10, "Alice");
        let stream: Vec<_> = (1..=10)
            .map(|id| {
                let mut msg = text_message(&chat, id, &format!("m{id}"));
                if id % 3 == 0 {
                    msg.text = None;
                    msg.message = Some(String::new());
                }
                Ok(msg)
            })
            .collect();
        let (_factory, mut client, chat) = setup(stream);
        let recorder = Recorder::default();

        let messages = fetcher()
            .fetch(client.as_mut(), &chat, &Pagination::default(), ChatPosition::default(), &recorder)
            .await
            .unwrap();

        assert_eq!(messages.len(), 7);
        // Progress counts every processed message.
        assert_eq!(recorder.0.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_progress_reports_known_total_and_passes_query() {
        let chat = person(10, "Alice");
        let (factory, mut client, chat) = setup(newest_first(&chat, 2));
        let recorder = Recorder::default();
        let pagination = Pagination {
            max_count: Some(2),
            ..Pagination::default()
        };

        fetcher()
            .fetch(client.as_mut(), &chat, &pagination, ChatPosition { index: 2, total: 3 }, &recorder)
            .await
            .unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Messages {
                chat_index: 2,
                chat_total: 3,
                current: 2,
                total: Some(2),
            })
        );
        assert_eq!(factory.state().last_query.as_ref().unwrap().limit, Some(2));
    }

    #[tokio::test]
    async fn test_unauthorized_client_is_rejected_and_released() {
        let chat = person(10, "Alice");
        let (factory, mut client, chat) = setup(newest_first(&chat, 2));
        factory.state().authorized = false;

        let result = fetcher()
            .fetch(client.as_mut(), &chat, &Pagination::default(), ChatPosition::default(), &NoProgress)
            .await;

        assert!(matches!(result, Err(AppError::NotAuthorized)));
        assert!(!factory.state().connected);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_releases_client() {
        let chat = person(10, "Alice");
        let mut stream = newest_first(&chat, 2);
        stream.push(Err(ProtocolError::Rpc {
            code: 420,
            message: "FLOOD_WAIT_30".into(),
        }));
        let (factory, mut client, chat) = setup(stream);

        let result = fetcher()
            .fetch(client.as_mut(), &chat, &Pagination::default(), ChatPosition::default(), &NoProgress)
            .await;

        match result {
            Err(AppError::FetchFailed { source }) => {
                assert!(source.to_string().contains("FLOOD_WAIT_30"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!factory.state().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_before_and_after_each_milestone() {
        let chat = person(10, "Alice");
        let (_factory, mut client, chat) = setup(newest_first(&chat, 6));
        let fetcher = HistoryFetcher::new(ThrottleConfig {
            every: 3,
            pause: Duration::from_secs(1),
        });

        let started = tokio::time::Instant::now();
        let messages = fetcher
            .fetch(client.as_mut(), &chat, &Pagination::default(), ChatPosition::default(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(messages.len(), 6);
        // Milestones at 3 and 6, each paused twice.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pause_below_first_milestone() {
        let chat = person(10, "Alice");
        let (_factory, mut client, chat) = setup(newest_first(&chat, 2));
        let fetcher = HistoryFetcher::new(ThrottleConfig {
            every: 3,
            pause: Duration::from_secs(1),
        });

        let started = tokio::time::Instant::now();
        fetcher
            .fetch(client.as_mut(), &chat, &Pagination::default(), ChatPosition::default(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
