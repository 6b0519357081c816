//! Application layer - use cases and orchestration.
//!
//! Authentication, chat resolution, history fetching and CSV export, plus the
//! terminal formatting of their results.

pub mod auth;
pub mod exporter;
pub mod fetcher;
pub mod formatter;
pub mod normalizer;
pub mod orchestrator;
pub mod resolver;

pub use auth::{AuthSession, SessionSettings};
pub use exporter::Exporter;
pub use fetcher::{HistoryFetcher, ThrottleConfig};
pub use formatter::{format_auth_status, format_chats_table, format_run_report};
pub use orchestrator::ParseOrchestrator;
pub use resolver::add_to_list;
