//! Subscription hub: long-lived push updates for a connection.
//!
//! Two flavours. A polling subscription re-runs a provider query every
//! interval and pushes `Changed` when the result set differs from the last
//! snapshot. An event subscription (interval zero) forwards provider change
//! events and costs nothing while idle.

use std::{
   collections::HashMap,
   sync::{
      Arc,
      atomic::{AtomicU32, Ordering},
   },
   time::Duration,
};

use parking_lot::Mutex;
use tokio::{
   sync::broadcast::{self, error::RecvError},
   time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
   Error, Result,
   conn::Conn,
   engine::rank,
   error::ProviderError,
   ipc::{ResponseKind, SubscribeRequest, SubscribeResponse},
   provider::{EventBus, Provider, ProviderEvent, QueryContext, Registry},
   types::{ConnId, Item},
};

/// Subscription ids live above this base so they never collide with qids.
pub const SID_BASE: u32 = 100_000_000;

struct Subscription {
   conn:     ConnId,
   provider: String,
   cancel:   CancellationToken,
}

pub struct Hub {
   registry: Arc<Registry>,
   events:   EventBus,
   last_sid: AtomicU32,
   subs:     Mutex<HashMap<u32, Subscription>>,
}

impl Hub {
   pub fn new(registry: Arc<Registry>, events: EventBus) -> Self {
      Self {
         registry,
         events,
         last_sid: AtomicU32::new(SID_BASE),
         subs: Mutex::new(HashMap::new()),
      }
   }

   pub fn len(&self) -> usize {
      self.subs.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.subs.lock().is_empty()
   }

   /// Registers a subscription, acknowledges it with `Subscribed` and starts
   /// its background task.
   pub async fn subscribe(self: &Arc<Self>, conn: &Conn, req: SubscribeRequest) -> Result<u32> {
      if req.interval_ms == 0 && !req.query.is_empty() {
         return Err(Error::Server {
            op:     "subscribe",
            reason: "event subscriptions cannot carry a query".to_string(),
         });
      }
      let (provider, scope) = self
         .registry
         .resolve(&req.provider)
         .ok_or_else(|| ProviderError::Unknown(req.provider.clone()))?;

      // Subscribe to events before acknowledging so no event published after
      // the ack can be missed.
      let events = (req.interval_ms == 0).then(|| self.events.subscribe());

      let sid = self.last_sid.fetch_add(1, Ordering::Relaxed) + 1;
      let cancel = CancellationToken::new();
      self.subs.lock().insert(sid, Subscription {
         conn:     conn.id(),
         provider: req.provider.clone(),
         cancel:   cancel.clone(),
      });

      let ack = SubscribeResponse { sid, value: req.provider.clone() };
      if let Err(e) = conn.send(ResponseKind::Subscribed, &ack).await {
         self.remove(sid);
         return Err(e);
      }
      tracing::debug!(sid, conn = conn.id(), provider = %req.provider, interval_ms = req.interval_ms, "subscribed");

      let hub = Arc::clone(self);
      let conn = conn.clone();
      match events {
         Some(rx) => {
            tokio::spawn(async move { hub.watch_events(sid, conn, req.provider, rx, cancel).await });
         },
         None => {
            let ctx = QueryContext::standalone(req.query, scope);
            let every = Duration::from_millis(req.interval_ms);
            tokio::spawn(async move { hub.poll(sid, conn, provider, ctx, every, cancel).await });
         },
      }
      Ok(sid)
   }

   /// Cancels a subscription owned by `conn`.
   pub fn unsubscribe(&self, conn: ConnId, sid: u32) -> bool {
      let mut subs = self.subs.lock();
      if subs.get(&sid).is_none_or(|s| s.conn != conn) {
         return false;
      }
      if let Some(sub) = subs.remove(&sid) {
         sub.cancel.cancel();
         tracing::debug!(sid, conn, provider = %sub.provider, "unsubscribed");
      }
      true
   }

   /// Drops every subscription of a disconnected connection.
   pub fn drop_connection(&self, conn: ConnId) -> usize {
      let mut subs = self.subs.lock();
      let before = subs.len();
      subs.retain(|_, s| {
         let keep = s.conn != conn;
         if !keep {
            s.cancel.cancel();
         }
         keep
      });
      before - subs.len()
   }

   fn remove(&self, sid: u32) {
      if let Some(sub) = self.subs.lock().remove(&sid) {
         sub.cancel.cancel();
      }
   }

   async fn notify(&self, sid: u32, conn: &Conn, value: String) -> bool {
      match conn.send(ResponseKind::Changed, &SubscribeResponse { sid, value }).await {
         Ok(()) => true,
         Err(e) => {
            tracing::debug!(sid, conn = conn.id(), "subscription removed, write failed: {e}");
            self.remove(sid);
            false
         },
      }
   }

   async fn poll(
      &self,
      sid: u32,
      conn: Conn,
      provider: Arc<dyn Provider>,
      ctx: QueryContext,
      every: Duration,
      cancel: CancellationToken,
   ) {
      let mut ticker = time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      let mut snapshot: Option<Vec<Item>> = None;

      loop {
         tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {},
         }

         let mut items = match provider.query(ctx.clone()).await {
            Ok(items) => items,
            Err(e) => {
               tracing::warn!(sid, provider = provider.name(), "subscription poll failed: {e}");
               continue;
            },
         };
         rank::rank(&mut items, 0);

         let changed = snapshot.as_ref().is_some_and(|old| differs(old, &items));
         snapshot = Some(items);
         if changed && !self.notify(sid, &conn, provider.name().to_string()).await {
            break;
         }
      }
   }

   async fn watch_events(
      &self,
      sid: u32,
      conn: Conn,
      provider: String,
      mut rx: broadcast::Receiver<ProviderEvent>,
      cancel: CancellationToken,
   ) {
      loop {
         let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => event,
         };
         match event {
            Ok(event) if matches(&provider, &event) => {
               if !self.notify(sid, &conn, event.value).await {
                  break;
               }
            },
            Ok(_) => {},
            Err(RecvError::Lagged(skipped)) => {
               tracing::warn!(sid, skipped, "subscription lagged behind provider events");
            },
            Err(RecvError::Closed) => break,
         }
      }
   }
}

/// An event reaches a subscription to its provider, or to the scoped name it
/// carries (`menus:power`).
fn matches(subscribed: &str, event: &ProviderEvent) -> bool {
   subscribed == event.provider || subscribed == event.value
}

/// Length first, then pairwise content.
fn differs(old: &[Item], new: &[Item]) -> bool {
   old.len() != new.len() || old.iter().zip(new).any(|(a, b)| !a.same_content(b))
}
