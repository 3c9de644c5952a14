//! # chatvault-core
//!
//! Core types, traits, and abstractions for chatvault.
//!
//! This crate provides the records the archive persists, the tagged shapes
//! the remote messaging service answers with, pagination cursors, and the
//! collaborator traits every other crate implements or depends on.

pub mod cursor;
pub mod defaults;
pub mod env;
pub mod error;
pub mod models;
pub mod remote;
pub mod traits;

// Re-export commonly used types at crate root
pub use cursor::{DialogCursor, HistoryCursor};
pub use error::{Error, Result};
pub use models::*;
pub use remote::*;
pub use traits::*;
