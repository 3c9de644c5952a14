//! # chatvault-ingest
//!
//! Incremental archive pipeline for chatvault.
//!
//! This crate provides:
//! - Conversation enumeration with cursor pagination
//! - Conversation resolution to stable local identities
//! - Backward history traversal per conversation
//! - Idempotent message recording with media hand-off
//! - The periodic rescan driver and its configuration
//!
//! ## Example
//!
//! ```ignore
//! use chatvault_ingest::{Cancellation, Collaborators, IngestConfig, IngestionDriver};
//!
//! let driver = IngestionDriver::start(collaborators, IngestConfig::from_env()?, &Span::current()).await?;
//! let (stop, cancel) = Cancellation::channel();
//!
//! let stats = driver.run_once(&cancel).await?;
//! driver.run(cancel).await?;
//! ```

pub mod cancel;
pub mod config;
pub mod driver;
pub mod enumerator;
pub mod paginator;
pub mod recorder;
pub mod resolver;

pub use cancel::Cancellation;
pub use config::IngestConfig;
pub use driver::{Collaborators, IngestionDriver, RescanStats};
pub use enumerator::{ConversationEnumerator, DialogBatch, DialogPages};
pub use paginator::{HistoryBatch, HistoryPages, MessageHistoryPaginator};
pub use recorder::{MessageRecorder, RecordOutcome};
pub use resolver::ConversationResolver;
