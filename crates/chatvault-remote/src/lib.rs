//! # chatvault-remote
//!
//! Client side of the remote messaging service.
//!
//! - [`HttpMessagingClient`]: talks to the session bridge over HTTP
//! - [`MockMessenger`]: scripted service for tests

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::{BridgeConfig, HttpMessagingClient};
pub use mock::{MockCall, MockFailure, MockMessenger};
