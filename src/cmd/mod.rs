//! CLI command implementations for tusk.
//!
//! `serve` runs the service; the other commands are thin protocol clients
//! for scripting and debugging a running instance.

pub mod activate;
pub mod menu;
pub mod providers;
pub mod query;
pub mod serve;
pub mod subscribe;
