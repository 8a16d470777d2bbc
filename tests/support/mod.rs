#![allow(dead_code)]

use std::{
   collections::HashMap,
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
   time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tusk::{
   client::Client,
   config::EngineConfig,
   error::ProviderError,
   provider::{Activation, EventBus, Provider, QueryContext, Registry},
   service::Service,
   types::{Item, Qid},
};

/// Scriptable provider: fixed items filtered by substring, with optional
/// per-query delays, failures, panics and late async items.
pub struct MockProvider {
   name:        String,
   items:       Vec<Item>,
   delays:      HashMap<String, Duration>,
   late:        Vec<(Duration, Item)>,
   fail:        bool,
   panic:       bool,
   pub queries:     AtomicUsize,
   pub cleanups:    AtomicUsize,
   pub activations: Mutex<Vec<Activation>>,
   /// Domain size seen by each query, `None` when it searched everything.
   pub domains:     Mutex<Vec<Option<usize>>>,
   pub cleaned:     Mutex<Vec<Qid>>,
}

impl MockProvider {
   pub fn new(name: &str) -> Self {
      Self {
         name:        name.to_string(),
         items:       Vec::new(),
         delays:      HashMap::new(),
         late:        Vec::new(),
         fail:        false,
         panic:       false,
         queries:     AtomicUsize::new(0),
         cleanups:    AtomicUsize::new(0),
         activations: Mutex::new(Vec::new()),
         domains:     Mutex::new(Vec::new()),
         cleaned:     Mutex::new(Vec::new()),
      }
   }

   /// Adds an item whose identifier equals its text.
   pub fn item(mut self, text: &str, score: i32) -> Self {
      self.items.push(Item::new(&self.name, text, text).with_score(score));
      self
   }

   pub fn items(mut self, texts: &[(&str, i32)]) -> Self {
      for (text, score) in texts {
         self = self.item(text, *score);
      }
      self
   }

   /// Makes queries for exactly `text` take `delay`.
   pub fn delay(mut self, text: &str, delay: Duration) -> Self {
      self.delays.insert(text.to_string(), delay);
      self
   }

   /// Pushes `text` through the async sink `after` the query returned.
   pub fn late(mut self, text: &str, after: Duration) -> Self {
      self.late.push((after, Item::new(&self.name, text, text).with_score(1)));
      self
   }

   pub fn failing(mut self) -> Self {
      self.fail = true;
      self
   }

   pub fn panicking(mut self) -> Self {
      self.panic = true;
      self
   }

   pub fn arc(self) -> Arc<Self> {
      Arc::new(self)
   }

   pub fn query_count(&self) -> usize {
      self.queries.load(Ordering::SeqCst)
   }

   pub fn cleanup_count(&self) -> usize {
      self.cleanups.load(Ordering::SeqCst)
   }
}

#[async_trait]
impl Provider for MockProvider {
   fn name(&self) -> &str {
      &self.name
   }

   fn icon(&self) -> String {
      "mock".to_string()
   }

   fn doc(&self) -> String {
      format!("mock provider {}", self.name)
   }

   async fn query(&self, ctx: QueryContext) -> tusk::Result<Vec<Item>> {
      self.queries.fetch_add(1, Ordering::SeqCst);
      self.domains.lock().push(ctx.domain.as_ref().map(|d| d.len()));

      if let Some(delay) = self.delays.get(&ctx.text) {
         tokio::time::sleep(*delay).await;
      }
      if self.panic {
         panic!("mock provider {} exploded", self.name);
      }
      if self.fail {
         return Err(ProviderError::Task { provider: self.name.clone(), reason: "mock failure".into() }
            .into());
      }

      for (after, item) in &self.late {
         let (sink, item, after) = (ctx.sink.clone(), item.clone(), *after);
         tokio::spawn(async move {
            tokio::time::sleep(after).await;
            sink.send(item);
         });
      }

      let candidates: Vec<Item> = match &ctx.domain {
         Some(domain) => domain.to_vec(),
         None => self.items.clone(),
      };
      Ok(candidates
         .into_iter()
         .filter(|i| i.text.contains(&ctx.text))
         .collect())
   }

   async fn activate(&self, activation: Activation) -> tusk::Result<()> {
      self.activations.lock().push(activation);
      Ok(())
   }

   fn cleanup(&self, qid: Qid) {
      self.cleanups.fetch_add(1, Ordering::SeqCst);
      self.cleaned.lock().push(qid);
   }
}

pub fn registry(providers: Vec<Arc<dyn Provider>>) -> Arc<Registry> {
   let mut registry = Registry::new();
   for p in providers {
      registry.register(p);
   }
   Arc::new(registry)
}

pub fn service(providers: Vec<Arc<dyn Provider>>) -> (Arc<Service>, EventBus) {
   let events = EventBus::new();
   let service = Service::new(registry(providers), events.clone(), EngineConfig::default());
   (service, events)
}

/// Serves one in-memory connection and returns the client end.
pub fn connect(service: &Arc<Service>) -> Client<DuplexStream> {
   let (client, server) = tokio::io::duplex(64 * 1024);
   let service = Arc::clone(service);
   tokio::spawn(async move { service.serve_connection(server).await });
   Client::new(client)
}

pub fn query(providers: &[&str], text: &str) -> tusk::ipc::QueryRequest {
   tusk::ipc::QueryRequest {
      providers:   providers.iter().map(|p| p.to_string()).collect(),
      query:       text.to_string(),
      max_results: 0,
      exact:       false,
   }
}

pub const QUIET: Duration = Duration::from_millis(300);
