//! Unix domain socket listener and stream

use std::{
   fs, io,
   os::unix::fs::{MetadataExt, PermissionsExt},
   path::{Path, PathBuf},
   pin::Pin,
   task::{self, Poll},
};

use tokio::{
   io::ReadBuf,
   net::{UnixListener as TokioUnixListener, UnixStream as TokioUnixStream},
};

use super::{MAX_SOCKET_PATH_LEN, SocketError};
use crate::Result;

/// Unix domain socket listener. Removes its socket file on drop unless
/// another listener has since been bound at the same path.
pub struct Listener {
   inner: TokioUnixListener,
   path:  PathBuf,
   /// (device, inode) of the socket file this listener created.
   node:  Option<(u64, u64)>,
}

fn node_of(path: &Path) -> Option<(u64, u64)> {
   fs::symlink_metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

fn restrict(path: &Path, mode: u32) -> io::Result<()> {
   fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

impl Listener {
   /// Binds to a Unix domain socket path
   pub async fn bind(path: &Path) -> Result<Self> {
      let len = path.as_os_str().len();
      if len > MAX_SOCKET_PATH_LEN {
         return Err(
            SocketError::PathTooLong {
               path: path.display().to_string(),
               len,
               max: MAX_SOCKET_PATH_LEN,
            }
            .into(),
         );
      }

      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent).map_err(SocketError::CreateDir)?;
         // Best effort: the directory may be shared and owned by someone else.
         if let Err(e) = restrict(parent, 0o700) {
            tracing::debug!(dir = %parent.display(), "leaving socket dir mode unchanged: {e}");
         }
      }

      if path.exists() {
         // A live listener means another instance owns this path; unlinking
         // its socket would orphan it. Only a dead socket file is removed.
         if Stream::connect(path).await.is_ok() {
            return Err(SocketError::AlreadyRunning.into());
         }
         fs::remove_file(path).map_err(SocketError::RemoveStale)?;
      }

      let inner = TokioUnixListener::bind(path).map_err(SocketError::Bind)?;
      let listener = Self { inner, path: path.to_path_buf(), node: node_of(path) };
      // Dropping `listener` on failure unlinks the half-configured socket.
      restrict(path, 0o600).map_err(SocketError::Bind)?;
      Ok(listener)
   }

   /// Accepts an incoming connection
   pub async fn accept(&self) -> Result<Stream> {
      let (stream, _) = self.inner.accept().await.map_err(SocketError::Accept)?;
      Ok(Stream { inner: stream })
   }

   /// Returns the socket path as a string
   pub fn local_addr(&self) -> String {
      self.path.display().to_string()
   }
}

impl Drop for Listener {
   fn drop(&mut self) {
      if self.node.is_none() || node_of(&self.path) != self.node {
         return;
      }
      if let Err(e) = fs::remove_file(&self.path) {
         tracing::debug!(path = %self.path.display(), "socket cleanup failed: {e}");
      }
   }
}

/// Unix domain socket stream implementing async I/O
#[repr(transparent)]
pub struct Stream {
   inner: TokioUnixStream,
}

impl Stream {
   /// Connects to a Unix domain socket
   pub async fn connect(path: &Path) -> Result<Self> {
      let inner = TokioUnixStream::connect(path)
         .await
         .map_err(SocketError::Connect)?;
      Ok(Self { inner })
   }
}

impl tokio::io::AsyncRead for Stream {
   fn poll_read(
      mut self: Pin<&mut Self>,
      cx: &mut task::Context<'_>,
      buf: &mut ReadBuf<'_>,
   ) -> Poll<io::Result<()>> {
      Pin::new(&mut self.inner).poll_read(cx, buf)
   }
}

impl tokio::io::AsyncWrite for Stream {
   fn poll_write(
      mut self: Pin<&mut Self>,
      cx: &mut task::Context<'_>,
      buf: &[u8],
   ) -> Poll<io::Result<usize>> {
      Pin::new(&mut self.inner).poll_write(cx, buf)
   }

   fn poll_flush(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
      Pin::new(&mut self.inner).poll_flush(cx)
   }

   fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
      Pin::new(&mut self.inner).poll_shutdown(cx)
   }
}
