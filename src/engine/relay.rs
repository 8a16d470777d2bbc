//! Forwards items a provider computes after its batch returned.
//!
//! The relay runs after the iteration's `Done` frame and writes every queued
//! item as an `AsyncItem` frame until the queue closes. It shares the
//! connection's write lock with every other producer, keeps the session alive
//! while items keep arriving, and stops once the iteration goes stale, the
//! session is torn down or a write fails.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
   conn::Conn,
   ipc::{QueryResponse, ResponseKind},
   types::{Iid, Item, Qid},
};

/// Drains `rx` onto `conn`; returns the number of items written.
///
/// `keep_alive` is checked under the write lock before every item. It
/// refreshes the session and returns false once the iteration is stale.
pub async fn forward<F>(
   conn: &Conn,
   qid: Qid,
   iid: Iid,
   mut rx: mpsc::UnboundedReceiver<Item>,
   cancel: CancellationToken,
   keep_alive: F,
) -> usize
where
   F: Fn() -> bool,
{
   let mut written = 0;

   loop {
      let item = tokio::select! {
         biased;
         () = cancel.cancelled() => {
            tracing::debug!(qid, iid, "async relay cancelled by teardown");
            break;
         }
         item = rx.recv() => match item {
            Some(item) => item,
            None => break,
         },
      };

      let msg = QueryResponse { qid, iid, item };
      match conn.send_if(ResponseKind::AsyncItem, &msg, &keep_alive).await {
         Ok(true) => written += 1,
         Ok(false) => {
            tracing::debug!(qid, iid, "async relay stopped, iteration superseded");
            break;
         },
         Err(e) => {
            tracing::debug!(qid, iid, conn = conn.id(), "async relay write failed: {e}");
            break;
         },
      }
   }

   rx.close();
   written
}
