//! Unix domain socket abstractions for IPC

use std::{io, path::PathBuf};

/// Errors that can occur during socket operations
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
   #[error("server already running")]
   AlreadyRunning,

   #[error("failed to connect: {0}")]
   Connect(#[source] io::Error),

   #[error("failed to bind: {0}")]
   Bind(#[source] io::Error),

   #[error("accept failed: {0}")]
   Accept(#[source] io::Error),

   #[error("failed to create socket directory: {0}")]
   CreateDir(#[source] io::Error),

   #[error("failed to remove stale socket: {0}")]
   RemoveStale(#[source] io::Error),

   #[error("socket path too long ({len} bytes, max {max}): {path}")]
   PathTooLong { path: String, len: usize, max: usize },
}

mod unix;

pub use unix::*;

const SOCKET_NAME: &str = "tusk.sock";
/// `sun_path` is 108 bytes on Linux and 104 on macOS.
pub const MAX_SOCKET_PATH_LEN: usize = 103;

/// Resolves the socket path: explicit override, then the runtime dir, then a
/// per-user directory under /tmp.
pub fn resolve_socket_path(configured: Option<&PathBuf>) -> PathBuf {
   if let Some(path) = configured {
      return path.clone();
   }

   std::env::var_os("XDG_RUNTIME_DIR")
      .map(PathBuf::from)
      .filter(|dir| dir.is_absolute())
      .map_or_else(temp_socket_dir, |dir| dir.join("tusk"))
      .join(SOCKET_NAME)
}

fn temp_socket_dir() -> PathBuf {
   // SAFETY: geteuid has no preconditions and cannot fail.
   let uid = unsafe { libc::geteuid() };
   PathBuf::from(format!("/tmp/tusk-{uid}"))
}

/// Socket path from the global configuration
pub fn socket_path() -> PathBuf {
   resolve_socket_path(crate::config::get().socket_path.as_ref())
}
