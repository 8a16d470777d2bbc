//! tusk: a local launcher query service.
//!
//! Clients talk to a single Unix socket. Queries fan out to statically linked
//! providers, are merged by score and streamed back frame by frame; typing
//! more characters refines the same query session instead of starting over.

pub mod client;
pub mod cmd;
pub mod config;
pub mod conn;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod hub;
pub mod ipc;
pub mod provider;
pub mod providers;
pub mod service;
pub mod types;
pub mod usock;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
