//! Infrastructure layer - external adapters (protocol client, session storage, config).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod archive_client;
pub mod config;
#[cfg(test)]
pub mod mock_client;
pub mod protocol;
pub mod session_store;

pub use archive_client::ArchiveClientFactory;
pub use config::{apply_env_overrides, ensure_config_exists, load_config, load_config_from_file};
pub use protocol::{Entity, MessageQuery, ProtocolError, RawMessage};
pub use session_store::{
    delete_all_session_files, FileSessionStore, MemorySessionStore, SessionStore,
};
