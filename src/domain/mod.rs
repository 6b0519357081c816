//! Domain layer - core types shared by every use case.
//!
//! Models, configuration, progress reporting and the error type. Protocol
//! entity types live in the infrastructure layer next to the client trait.

pub mod config;
pub mod error;
pub mod models;
pub mod progress;

pub use config::{AppConfig, ExportConfig, FetchConfig};
pub use error::{AppError, Result};
pub use models::{
    person_name, ChatOutcome, Credentials, NormalizedMessage, Pagination, ParseRunResult,
    ResolvedChat, SessionKind,
};
pub use progress::{NoProgress, ProgressEvent, ProgressObserver};
