//! Routes decoded frames to their handlers by message kind.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
   Result,
   conn::Conn,
   ipc::{Frame, RequestKind},
};

/// Handles one request kind.
///
/// Implementations decode their payload and hand real work off to a spawned
/// task; they must not hold up the connection's read loop.
#[async_trait]
pub trait Handler: Send + Sync {
   async fn handle(&self, conn: &Conn, payload: Bytes) -> Result<()>;
}

/// Fixed table indexed by [`RequestKind`]
#[derive(Default)]
pub struct Dispatcher {
   table: [Option<Arc<dyn Handler>>; RequestKind::ALL.len()],
}

impl Dispatcher {
   pub fn new() -> Self {
      Self::default()
   }

   #[must_use]
   pub fn with(mut self, kind: RequestKind, handler: Arc<dyn Handler>) -> Self {
      self.table[Self::slot(kind)] = Some(handler);
      self
   }

   /// Unknown kinds and kinds without a handler are protocol errors.
   pub async fn dispatch(&self, conn: &Conn, frame: Frame) -> Result<()> {
      let kind = frame.request_kind()?;
      let Some(handler) = &self.table[Self::slot(kind)] else {
         return Err(crate::error::IpcError::UnknownKind(frame.kind).into());
      };
      tracing::trace!(conn = conn.id(), kind = kind.name(), len = frame.payload.len(), "dispatch");
      handler.handle(conn, frame.payload).await
   }

   const fn slot(kind: RequestKind) -> usize {
      kind.as_u8() as usize
   }
}
