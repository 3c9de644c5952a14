//! # chatvault-jobs
//!
//! Media ingestion for chatvault.
//!
//! This crate provides:
//! - A bounded job queue drained by a fixed pool of workers
//! - Per-job timeout and panic isolation
//! - Lifecycle events via a broadcast channel
//! - The handler that downloads, classifies, stores and links attachments
//!
//! ## Example
//!
//! ```ignore
//! use chatvault_jobs::{MediaIngestHandler, MediaIngestionPool, MediaPoolConfig};
//!
//! let handler = Arc::new(MediaIngestHandler::new(remote, messages, store));
//! let pool = MediaIngestionPool::start(MediaPoolConfig::from_env()?, handler, &Span::current())?;
//!
//! pool.submit(job).await?;
//!
//! // Drain queued and in-flight jobs
//! pool.shutdown().await;
//! ```

pub mod handler;
pub mod media;
pub mod worker;

pub use handler::{JobResult, MediaJobHandler};
pub use media::{build_object_name, content_type_for, MediaIngestHandler};
pub use worker::{MediaIngestionPool, MediaPoolConfig, WorkerEvent};
