//! Query session engine.
//!
//! Turns a query request into a `(qid, iid)` iteration, fans it out to the
//! requested providers concurrently, merges and ranks what comes back and
//! streams it to the connection. A newer iteration on the same qid silently
//! invalidates anything older that has not been written yet.

pub mod rank;
pub mod reaper;
pub mod relay;
pub mod session;
pub mod usage;

use std::{
   collections::HashSet,
   sync::Arc,
   time::Instant,
};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;

pub use session::{ResultCache, Session, SessionTable, Ticket};
pub use usage::UsageHistory;

use crate::{
   Result,
   config::EngineConfig,
   conn::Conn,
   error::ProviderError,
   ipc::{ActivateRequest, QueryRequest, QueryResponse, ResponseKind},
   provider::{Activation, AsyncSink, QueryContext, Registry},
   types::{ConnId, Iid, Item, Qid},
};

/// How an iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
   pub qid:     Qid,
   pub iid:     Iid,
   /// Synchronous items written before `Done`.
   pub emitted: usize,
   /// True when a newer iteration superseded this one mid-flight.
   pub stale:   bool,
}

pub struct Engine {
   registry: Arc<Registry>,
   sessions: Mutex<SessionTable>,
   usage:    Mutex<UsageHistory>,
   config:   EngineConfig,
}

impl Engine {
   pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
      Self {
         registry,
         sessions: Mutex::new(SessionTable::new()),
         usage: Mutex::new(UsageHistory::new()),
         config,
      }
   }

   pub fn registry(&self) -> &Arc<Registry> {
      &self.registry
   }

   pub const fn config(&self) -> &EngineConfig {
      &self.config
   }

   pub fn session_count(&self) -> usize {
      self.sessions.lock().len()
   }

   pub fn is_current(&self, qid: Qid, iid: Iid) -> bool {
      self.sessions.lock().is_current(qid, iid)
   }

   /// Allocates the iteration for a request without running it.
   pub fn begin(&self, conn: ConnId, req: &QueryRequest) -> Ticket {
      self
         .sessions
         .lock()
         .begin(conn, &req.providers, &req.query, req.exact, Instant::now())
   }

   /// Runs one query iteration end to end, including its async relay.
   pub async fn query(&self, conn: &Conn, req: QueryRequest) -> Result<QueryOutcome> {
      let ticket = self.begin(conn.id(), &req);
      self.run(conn, req, ticket).await
   }

   /// Runs an iteration allocated by [`Engine::begin`].
   ///
   /// Callers that receive several queries on one connection must call
   /// `begin` in arrival order and may then run the tickets concurrently.
   pub async fn run(&self, conn: &Conn, req: QueryRequest, ticket: Ticket) -> Result<QueryOutcome> {
      let (qid, iid) = (ticket.qid, ticket.iid);
      tracing::debug!(qid, iid, conn = conn.id(), query = %req.query, resumed = ticket.resumed, "query");

      let (sink, rx) = AsyncSink::channel();
      let (mut items, cache) = self.fan_out(&req, &ticket, sink).await;

      self.sessions.lock().complete(qid, iid, cache);

      if self.config.usage_boost {
         self.usage.lock().boost(&req.query, &mut items, Utc::now());
      }
      rank::rank(&mut items, req.max_results);
      let mut outcome = QueryOutcome { qid, iid, emitted: 0, stale: false };
      let current = || self.is_current(qid, iid);

      for item in items {
         if !conn.send_if(ResponseKind::Item, &QueryResponse { qid, iid, item }, current).await? {
            tracing::debug!(qid, iid, "dropping superseded results");
            outcome.stale = true;
            return Ok(outcome);
         }
         outcome.emitted += 1;
      }

      if outcome.emitted == 0 && !conn.send_status_if(ResponseKind::NoResults, current).await? {
         outcome.stale = true;
         return Ok(outcome);
      }
      if !conn.send_status_if(ResponseKind::Done, current).await? {
         outcome.stale = true;
         return Ok(outcome);
      }

      let keep_alive = || self.sessions.lock().touch(qid, iid, Instant::now());
      let relayed = relay::forward(conn, qid, iid, rx, ticket.cancel, keep_alive).await;
      if relayed > 0 {
         tracing::debug!(qid, iid, relayed, "async items relayed");
      }

      Ok(outcome)
   }

   /// Queries every requested provider concurrently and waits for all of
   /// them. Failed providers contribute nothing and leave no cache entry.
   async fn fan_out(
      &self,
      req: &QueryRequest,
      ticket: &Ticket,
      sink: AsyncSink,
   ) -> (Vec<Item>, ResultCache) {
      let mut seen = HashSet::new();
      let requested: Vec<&String> = req.providers.iter().filter(|p| seen.insert(*p)).collect();
      let single = requested.len() == 1;

      let mut tasks = Vec::with_capacity(requested.len());
      for name in requested {
         let Some((provider, scope)) = self.registry.resolve(name) else {
            tracing::debug!(qid = ticket.qid, provider = %name, "unknown provider requested");
            continue;
         };
         let ctx = QueryContext {
            qid: ticket.qid,
            iid: ticket.iid,
            text: req.query.clone(),
            scope,
            single,
            exact: req.exact,
            domain: ticket.domains.get(name.as_str()).cloned(),
            sink: sink.clone(),
         };
         let name = name.clone();
         tasks.push(async move {
            let handle = tokio::spawn(async move { provider.query(ctx).await });
            let res = match handle.await {
               Ok(res) => res,
               Err(e) => Err(ProviderError::Task { provider: name.clone(), reason: e.to_string() }.into()),
            };
            (name, res)
         });
      }
      drop(sink);

      let mut merged = Vec::new();
      let mut cache = ResultCache::new();
      for (name, res) in join_all(tasks).await {
         match res {
            Ok(items) => {
               merged.extend(items.iter().cloned());
               cache.insert(name, items.into());
            },
            Err(e) => {
               tracing::warn!(qid = ticket.qid, iid = ticket.iid, provider = %name, "query failed: {e}");
            },
         }
      }

      (merged, cache)
   }

   /// Dispatches an activation, then tears the session down.
   pub async fn activate(&self, req: ActivateRequest) -> Result<()> {
      let (provider, scope) = self
         .registry
         .resolve(&req.provider)
         .ok_or_else(|| ProviderError::Unknown(req.provider.clone()))?;

      tracing::debug!(qid = req.qid, provider = %req.provider, action = %req.action, "activate");
      provider
         .activate(Activation {
            qid: req.qid,
            identifier: req.identifier.clone(),
            action: req.action,
            arguments: req.arguments,
            scope,
         })
         .await?;

      let text = self.sessions.lock().last_text(req.qid).map(str::to_string);
      if let Some(text) = text {
         self.usage.lock().record(provider.name(), &text, &req.identifier, Utc::now());
      }
      self.teardown(req.qid);
      Ok(())
   }

   /// Removes a session, cancels its relays and runs each participating
   /// provider's cleanup exactly once. Returns false if it was already gone.
   pub fn teardown(&self, qid: Qid) -> bool {
      let Some(session) = self.sessions.lock().remove(qid) else {
         return false;
      };
      self.release(session);
      true
   }

   /// Tears down every session idle for longer than the configured threshold.
   pub fn sweep(&self, now: Instant) -> usize {
      let idle = self.sessions.lock().take_idle(now, self.config.session_idle);
      let count = idle.len();
      for session in idle {
         self.release(session);
      }
      count
   }

   fn release(&self, session: Session) {
      let qid = session.qid;
      session.cancel.cancel();

      let mut cleaned = HashSet::new();
      for name in &session.providers {
         let Some((provider, _)) = self.registry.resolve(name) else {
            continue;
         };
         if cleaned.insert(provider.name().to_string()) {
            provider.cleanup(qid);
         }
      }
      tracing::debug!(qid, providers = cleaned.len(), "session torn down");
   }
}
