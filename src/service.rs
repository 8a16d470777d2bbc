//! Connection handling: the read loop, handler wiring and the accept loop.

use std::sync::{
   Arc,
   atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
   io::{AsyncRead, AsyncWrite},
   sync::watch,
   task::JoinHandle,
};

use crate::{
   Error, Result,
   config::{DEFAULT_MAX_FRAME_BYTES, EngineConfig},
   conn::Conn,
   dispatch::{Dispatcher, Handler},
   engine::{Engine, reaper},
   error::IpcError,
   hub::Hub,
   ipc::{self, ActivateRequest, MenuRequest, QueryRequest, RequestKind, SubscribeRequest, UnsubscribeRequest},
   provider::{EventBus, Registry},
   types::ConnId,
   usock,
};

/// Everything a running service owns
pub struct Service {
   engine:     Arc<Engine>,
   hub:        Arc<Hub>,
   events:     EventBus,
   dispatcher: Dispatcher,
   last_conn:  AtomicU32,
   max_frame:  usize,
}

impl Service {
   pub fn new(registry: Arc<Registry>, events: EventBus, config: EngineConfig) -> Arc<Self> {
      Self::with_frame_limit(registry, events, config, DEFAULT_MAX_FRAME_BYTES)
   }

   pub fn with_frame_limit(
      registry: Arc<Registry>,
      events: EventBus,
      config: EngineConfig,
      max_frame: usize,
   ) -> Arc<Self> {
      let engine = Arc::new(Engine::new(Arc::clone(&registry), config));
      let hub = Arc::new(Hub::new(registry, events.clone()));

      let dispatcher = Dispatcher::new()
         .with(RequestKind::Query, Arc::new(QueryHandler { engine: Arc::clone(&engine) }))
         .with(RequestKind::Activate, Arc::new(ActivateHandler { engine: Arc::clone(&engine) }))
         .with(RequestKind::Subscribe, Arc::new(SubscribeHandler { hub: Arc::clone(&hub) }))
         .with(RequestKind::Unsubscribe, Arc::new(UnsubscribeHandler { hub: Arc::clone(&hub) }))
         .with(RequestKind::Menu, Arc::new(MenuHandler { events: events.clone() }));

      Arc::new(Self {
         engine,
         hub,
         events,
         dispatcher,
         last_conn: AtomicU32::new(0),
         max_frame,
      })
   }

   pub fn engine(&self) -> &Arc<Engine> {
      &self.engine
   }

   pub fn hub(&self) -> &Arc<Hub> {
      &self.hub
   }

   pub const fn events(&self) -> &EventBus {
      &self.events
   }

   /// Starts the idle-session reaper.
   pub fn spawn_reaper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
      reaper::spawn(Arc::clone(&self.engine), shutdown)
   }

   fn next_conn_id(&self) -> ConnId {
      self.last_conn.fetch_add(1, Ordering::Relaxed) + 1
   }

   /// Serves one client until it disconnects.
   ///
   /// Protocol errors drop the offending frame and keep the connection open.
   /// Transport errors and oversized frames end it, since the stream can no
   /// longer be trusted to be in sync.
   pub async fn serve_connection<S>(self: &Arc<Self>, stream: S)
   where
      S: AsyncRead + AsyncWrite + Send + 'static,
   {
      let id = self.next_conn_id();
      let (mut reader, writer) = tokio::io::split(stream);
      let conn = Conn::new(id, writer);
      tracing::debug!(conn = id, "client connected");

      loop {
         let frame = match ipc::read_frame(&mut reader, self.max_frame).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
               tracing::warn!(conn = id, "closing connection: {e}");
               break;
            },
         };

         if let Err(e) = self.dispatcher.dispatch(&conn, frame).await {
            match e {
               Error::Ipc(IpcError::UnknownKind(_) | IpcError::Deserialize(_)) => {
                  tracing::warn!(conn = id, "dropping frame: {e}");
               },
               e => tracing::error!(conn = id, "request failed: {e}"),
            }
         }
      }

      conn.close();
      let dropped = self.hub.drop_connection(id);
      tracing::debug!(conn = id, subscriptions = dropped, "client disconnected");
   }

   /// Accepts clients until `shutdown` flips to true.
   pub async fn run(self: Arc<Self>, listener: usock::Listener, mut shutdown: watch::Receiver<bool>) {
      loop {
         tokio::select! {
            result = listener.accept() => {
               match result {
                  Ok(stream) => {
                     let service = Arc::clone(&self);
                     tokio::spawn(async move { service.serve_connection(stream).await });
                  }
                  Err(e) => {
                     tracing::error!("Accept error: {}", e);
                  }
               }
            }
            res = shutdown.changed() => {
               if res.is_err() || *shutdown.borrow() {
                  break;
               }
            }
         }
      }
   }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &Bytes) -> Result<T> {
   postcard::from_bytes(payload).map_err(|e| IpcError::Deserialize(e).into())
}

struct QueryHandler {
   engine: Arc<Engine>,
}

#[async_trait]
impl Handler for QueryHandler {
   async fn handle(&self, conn: &Conn, payload: Bytes) -> Result<()> {
      let req: QueryRequest = decode(&payload)?;
      // Iterations are allocated in arrival order; only the fan-out runs
      // concurrently with the read loop.
      let ticket = self.engine.begin(conn.id(), &req);
      let engine = Arc::clone(&self.engine);
      let conn = conn.clone();
      tokio::spawn(async move {
         if let Err(e) = engine.run(&conn, req, ticket).await {
            tracing::debug!(conn = conn.id(), "query aborted: {e}");
         }
      });
      Ok(())
   }
}

struct ActivateHandler {
   engine: Arc<Engine>,
}

#[async_trait]
impl Handler for ActivateHandler {
   async fn handle(&self, _conn: &Conn, payload: Bytes) -> Result<()> {
      let req: ActivateRequest = decode(&payload)?;
      let engine = Arc::clone(&self.engine);
      tokio::spawn(async move {
         let (qid, provider) = (req.qid, req.provider.clone());
         if let Err(e) = engine.activate(req).await {
            tracing::warn!(qid, provider = %provider, "activation failed: {e}");
         }
      });
      Ok(())
   }
}

struct SubscribeHandler {
   hub: Arc<Hub>,
}

#[async_trait]
impl Handler for SubscribeHandler {
   async fn handle(&self, conn: &Conn, payload: Bytes) -> Result<()> {
      let req: SubscribeRequest = decode(&payload)?;
      let hub = Arc::clone(&self.hub);
      let conn = conn.clone();
      tokio::spawn(async move {
         let provider = req.provider.clone();
         if let Err(e) = hub.subscribe(&conn, req).await {
            tracing::warn!(conn = conn.id(), provider = %provider, "subscribe rejected: {e}");
         }
      });
      Ok(())
   }
}

struct UnsubscribeHandler {
   hub: Arc<Hub>,
}

#[async_trait]
impl Handler for UnsubscribeHandler {
   async fn handle(&self, conn: &Conn, payload: Bytes) -> Result<()> {
      let req: UnsubscribeRequest = decode(&payload)?;
      if !self.hub.unsubscribe(conn.id(), req.sid) {
         tracing::debug!(conn = conn.id(), sid = req.sid, "unsubscribe for unknown subscription");
      }
      Ok(())
   }
}

struct MenuHandler {
   events: EventBus,
}

#[async_trait]
impl Handler for MenuHandler {
   async fn handle(&self, _conn: &Conn, payload: Bytes) -> Result<()> {
      let req: MenuRequest = decode(&payload)?;
      self
         .events
         .publish(crate::providers::menus::NAME, format!("menus:{}", req.menu));
      Ok(())
   }
}
