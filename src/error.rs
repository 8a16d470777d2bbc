use std::io;

use thiserror::Error;

use crate::usock::SocketError;

/// Main error type for the tusk service.
///
/// Covers transport and protocol failures on the socket, provider failures
/// surfaced outside of a fan-out, configuration problems, and the fatal
/// startup conditions that terminate the process.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file or process operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// Frame encoding, decoding or connection write failure.
   #[error("ipc error: {0}")]
   Ipc(#[from] IpcError),

   /// Socket bind/accept/connect failure.
   #[error("socket error: {0}")]
   Socket(#[from] SocketError),

   /// A provider reported an error.
   #[error("provider error: {0}")]
   Provider(#[from] ProviderError),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML deserialization error occurred.
   #[error("toml error: {0}")]
   Toml(#[from] toml::de::Error),

   /// File watcher setup failed.
   #[error("watch error: {0}")]
   Watch(#[from] notify::Error),

   /// No providers are registered, so the service has nothing to serve.
   #[error("no providers loaded")]
   NoProviders,

   /// Unexpected response received from the server during an operation.
   #[error("unexpected response from server during {0}")]
   UnexpectedResponse(&'static str),

   /// Server error occurred during a specific operation.
   #[error("server error during {op}: {reason}")]
   Server { op: &'static str, reason: String },
}

impl Error {
   pub const fn exit_code(&self) -> i32 {
      match self {
         Self::NoProviders => 2,
         Self::Socket(SocketError::AlreadyRunning) => 3,
         _ => 1,
      }
   }
}

/// Errors that can occur while moving frames over a connection.
#[derive(Debug, Error)]
pub enum IpcError {
   /// The announced payload length exceeds the configured maximum.
   #[error("message too large: {0} bytes")]
   MessageTooLarge(usize),

   /// Failed to serialize a payload.
   #[error("failed to serialize: {0}")]
   Serialize(#[source] postcard::Error),

   /// Failed to deserialize a payload.
   #[error("failed to deserialize: {0}")]
   Deserialize(#[source] postcard::Error),

   /// The type byte does not name a known message.
   #[error("unknown message kind: {0}")]
   UnknownKind(u8),

   /// Failed to read from the connection.
   #[error("failed to read: {0}")]
   Read(#[source] io::Error),

   /// Failed to write to the connection.
   #[error("failed to write: {0}")]
   Write(#[source] io::Error),

   /// The connection was already closed by a previous failure or disconnect.
   #[error("connection {0} closed")]
   Closed(u32),
}

/// Errors raised by provider capabilities.
#[derive(Debug, Error)]
pub enum ProviderError {
   /// The requested provider is not registered.
   #[error("unknown provider: {0}")]
   Unknown(String),

   /// The provider does not support the requested action.
   #[error("{provider}: no such action '{action}'")]
   UnknownAction { provider: String, action: String },

   /// The identifier does not name an item the provider knows about.
   #[error("{provider}: no such item '{identifier}'")]
   UnknownItem { provider: String, identifier: String },

   /// Spawning an external process failed.
   #[error("{provider}: failed to run '{command}': {source}")]
   Spawn {
      provider: String,
      command:  String,
      #[source]
      source:   io::Error,
   },

   /// A configured command line or argument string could not be split.
   #[error("{provider}: cannot parse command '{command}'")]
   InvalidCommand { provider: String, command: String },

   /// The provider task panicked or was cancelled.
   #[error("{provider}: task failed: {reason}")]
   Task { provider: String, reason: String },
}

/// Errors that can occur while loading configuration and definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// The merged configuration could not be extracted.
   #[error("invalid config: {0}")]
   Invalid(String),

   /// A menu definition file could not be parsed.
   #[error("invalid menu definition {path}: {reason}")]
   InvalidMenu { path: String, reason: String },
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
