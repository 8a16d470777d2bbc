//! A client connection as seen by the handlers.
//!
//! Several tasks produce frames for one connection concurrently: the query
//! batch, the async relay and subscription pushes. All of them go through
//! [`Conn::send_raw`], which holds the connection's write lock for exactly
//! one frame so frames never interleave on the wire.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use serde::Serialize;
use tokio::{io::AsyncWrite, sync::Mutex};

use crate::{
   Result,
   error::IpcError,
   ipc::{self, ResponseKind},
   types::ConnId,
};

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cheaply cloneable handle to a connection's write half
#[derive(Clone)]
pub struct Conn {
   inner: Arc<ConnInner>,
}

struct ConnInner {
   id:     ConnId,
   writer: Mutex<BoxWriter>,
   closed: AtomicBool,
}

impl Conn {
   pub fn new<W>(id: ConnId, writer: W) -> Self
   where
      W: AsyncWrite + Send + Unpin + 'static,
   {
      Self {
         inner: Arc::new(ConnInner {
            id,
            writer: Mutex::new(Box::new(writer)),
            closed: AtomicBool::new(false),
         }),
      }
   }

   pub fn id(&self) -> ConnId {
      self.inner.id
   }

   pub fn is_closed(&self) -> bool {
      self.inner.closed.load(Ordering::Acquire)
   }

   /// Marks the connection closed; later sends fail fast.
   pub fn close(&self) {
      self.inner.closed.store(true, Ordering::Release);
   }

   /// Writes one pre-encoded frame under the connection's write lock.
   ///
   /// A failed write closes the connection for every other producer.
   pub async fn send_raw(&self, frame: &[u8]) -> Result<()> {
      self.send_raw_if(frame, || true).await.map(drop)
   }

   /// Writes `frame` only if `guard` holds once the write lock is taken.
   ///
   /// Checking under the lock orders the check with every other writer: a
   /// frame whose guard passed is on the wire before any frame queued behind
   /// it. Returns false, writing nothing, when the guard fails.
   pub async fn send_raw_if<F>(&self, frame: &[u8], guard: F) -> Result<bool>
   where
      F: FnOnce() -> bool,
   {
      if self.is_closed() {
         return Err(IpcError::Closed(self.id()).into());
      }

      let mut writer = self.inner.writer.lock().await;
      if self.is_closed() {
         return Err(IpcError::Closed(self.id()).into());
      }
      if !guard() {
         return Ok(false);
      }
      let res = ipc::write_raw(&mut *writer, frame).await;
      if res.is_err() {
         self.close();
      }
      res.map(|()| true)
   }

   /// Encodes a payload frame and writes it if `guard` still holds.
   pub async fn send_if<T, F>(&self, kind: ResponseKind, msg: &T, guard: F) -> Result<bool>
   where
      T: Serialize,
      F: FnOnce() -> bool,
   {
      let frame: Bytes = ipc::encode_frame(kind.as_u8(), msg)?;
      self.send_raw_if(&frame, guard).await
   }

   /// Writes a status frame if `guard` still holds.
   pub async fn send_status_if<F>(&self, kind: ResponseKind, guard: F) -> Result<bool>
   where
      F: FnOnce() -> bool,
   {
      self.send_raw_if(&ipc::encode_status(kind), guard).await
   }

   /// Encodes a payload frame outside the lock, then writes it.
   pub async fn send<T: Serialize>(&self, kind: ResponseKind, msg: &T) -> Result<()> {
      let frame: Bytes = ipc::encode_frame(kind.as_u8(), msg)?;
      self.send_raw(&frame).await
   }

   /// Writes a zero-length status frame
   pub async fn send_status(&self, kind: ResponseKind) -> Result<()> {
      self.send_raw(&ipc::encode_status(kind)).await
   }
}

impl std::fmt::Debug for Conn {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Conn")
         .field("id", &self.id())
         .field("closed", &self.is_closed())
         .finish()
   }
}
