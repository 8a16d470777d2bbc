//! The capability set every data source implements, and what the engine
//! hands it per query.

mod events;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use events::{EventBus, ProviderEvent};
pub use registry::Registry;

use crate::{
   Result,
   types::{Iid, Item, Qid},
};

/// Separator between a provider name and its scope, as in `menus:power`.
pub const SCOPE_SEPARATOR: char = ':';

/// Splits `menus:power` into `("menus", Some("power"))`.
pub fn split_scope(name: &str) -> (&str, Option<&str>) {
   match name.split_once(SCOPE_SEPARATOR) {
      Some((base, scope)) if !scope.is_empty() => (base, Some(scope)),
      Some((base, _)) => (base, None),
      None => (name, None),
   }
}

/// Per-iteration output queue for items computed after `query` returns.
///
/// Sends after the queue has been closed (iteration superseded, session torn
/// down) are silently discarded.
#[derive(Debug, Clone)]
pub struct AsyncSink {
   tx: Option<mpsc::UnboundedSender<Item>>,
}

impl AsyncSink {
   pub fn channel() -> (Self, mpsc::UnboundedReceiver<Item>) {
      let (tx, rx) = mpsc::unbounded_channel();
      (Self { tx: Some(tx) }, rx)
   }

   /// A sink nobody listens to, for callers without a relay (polling).
   pub const fn detached() -> Self {
      Self { tx: None }
   }

   /// Queues an item; returns false once nobody is listening anymore.
   pub fn send(&self, item: Item) -> bool {
      self.tx.as_ref().is_some_and(|tx| tx.send(item).is_ok())
   }

   pub fn is_closed(&self) -> bool {
      self.tx.as_ref().is_none_or(mpsc::UnboundedSender::is_closed)
   }
}

/// Everything a provider needs to answer one iteration
#[derive(Debug, Clone)]
pub struct QueryContext {
   pub qid:    Qid,
   pub iid:    Iid,
   pub text:   String,
   /// Scope suffix of a scoped provider name (`power` for `menus:power`).
   pub scope:  Option<String>,
   /// True when this provider is the only one queried.
   pub single: bool,
   pub exact:  bool,
   /// Candidates this provider returned for a completed shorter prefix of
   /// the same session. Searching these instead of the full corpus is
   /// always correct because a longer query can only match fewer items.
   pub domain: Option<Arc<[Item]>>,
   pub sink:   AsyncSink,
}

impl QueryContext {
   /// A one-shot context outside any session.
   pub fn standalone(text: impl Into<String>, scope: Option<String>) -> Self {
      Self {
         qid: 0,
         iid: 0,
         text: text.into(),
         scope,
         single: true,
         exact: false,
         domain: None,
         sink: AsyncSink::detached(),
      }
   }
}

/// A request to act on one previously returned item
#[derive(Debug, Clone, Default)]
pub struct Activation {
   pub qid:        Qid,
   pub identifier: String,
   pub action:     String,
   pub arguments:  String,
   pub scope:      Option<String>,
}

/// A data source behind the query engine.
///
/// Implementations may keep their own caches and spawn background work, but
/// must release anything scoped to a qid in [`Provider::cleanup`] and must
/// not block indefinitely in [`Provider::query`].
#[async_trait]
pub trait Provider: Send + Sync {
   fn name(&self) -> &str;

   fn name_pretty(&self) -> &str {
      self.name()
   }

   fn icon(&self) -> String;

   /// Human-readable description of actions and configuration.
   fn doc(&self) -> String;

   /// Starts background work (indexing, watchers). Called once at startup.
   fn start(self: Arc<Self>) {}

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>>;

   async fn activate(&self, activation: Activation) -> Result<()>;

   /// Releases qid-scoped state. Called once per session teardown.
   fn cleanup(&self, _qid: Qid) {}
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn scope_split() {
      assert_eq!(split_scope("menus:power"), ("menus", Some("power")));
      assert_eq!(split_scope("menus:"), ("menus", None));
      assert_eq!(split_scope("files"), ("files", None));
   }

   #[tokio::test]
   async fn detached_sink_discards() {
      let sink = AsyncSink::detached();
      assert!(sink.is_closed());
      assert!(!sink.send(Item::default()));
   }

   #[tokio::test]
   async fn sink_reports_closed_receiver() {
      let (sink, rx) = AsyncSink::channel();
      assert!(sink.send(Item::default()));
      drop(rx);
      assert!(sink.is_closed());
      assert!(!sink.send(Item::default()));
   }
}
