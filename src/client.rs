//! Protocol client used by the CLI and integration tests.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
   Result,
   config::DEFAULT_MAX_FRAME_BYTES,
   ipc::{
      self, ActivateRequest, MenuRequest, QueryRequest, QueryResponse, RequestKind, Response,
      SubscribeRequest, UnsubscribeRequest,
   },
   usock,
};

/// The synchronous part of one query iteration, up to its `Done` frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
   pub items:      Vec<QueryResponse>,
   pub no_results: bool,
}

impl Batch {
   pub fn texts(&self) -> Vec<&str> {
      self.items.iter().map(|r| r.item.text.as_str()).collect()
   }
}

pub struct Client<S> {
   stream:    S,
   max_frame: usize,
}

impl Client<usock::Stream> {
   pub async fn connect(path: &Path) -> Result<Self> {
      Ok(Self::new(usock::Stream::connect(path).await?))
   }
}

impl<S> Client<S>
where
   S: AsyncRead + AsyncWrite + Unpin,
{
   pub const fn new(stream: S) -> Self {
      Self { stream, max_frame: DEFAULT_MAX_FRAME_BYTES }
   }

   pub async fn query(&mut self, req: &QueryRequest) -> Result<()> {
      ipc::send_request(&mut self.stream, RequestKind::Query, req).await
   }

   pub async fn activate(&mut self, req: &ActivateRequest) -> Result<()> {
      ipc::send_request(&mut self.stream, RequestKind::Activate, req).await
   }

   pub async fn subscribe(&mut self, req: &SubscribeRequest) -> Result<()> {
      ipc::send_request(&mut self.stream, RequestKind::Subscribe, req).await
   }

   pub async fn unsubscribe(&mut self, sid: u32) -> Result<()> {
      ipc::send_request(&mut self.stream, RequestKind::Unsubscribe, &UnsubscribeRequest { sid })
         .await
   }

   pub async fn menu(&mut self, menu: &str) -> Result<()> {
      let req = MenuRequest { menu: menu.to_string() };
      ipc::send_request(&mut self.stream, RequestKind::Menu, &req).await
   }

   /// Writes arbitrary bytes, for exercising malformed input.
   pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
      ipc::write_raw(&mut self.stream, bytes).await
   }

   /// Next server frame, or `None` once the server hung up.
   pub async fn recv(&mut self) -> Result<Option<Response>> {
      match ipc::read_frame(&mut self.stream, self.max_frame).await? {
         Some(frame) => Ok(Some(Response::from_frame(&frame)?)),
         None => Ok(None),
      }
   }

   /// Reads frames up to the next `Done`. Async items and subscription
   /// frames arriving in between are skipped.
   pub async fn collect_batch(&mut self) -> Result<Batch> {
      let mut batch = Batch::default();
      loop {
         match self.recv().await? {
            Some(Response::Item(item)) => batch.items.push(item),
            Some(Response::NoResults) => batch.no_results = true,
            Some(Response::Done) => return Ok(batch),
            Some(_) => {},
            None => return Err(crate::Error::UnexpectedResponse("query")),
         }
      }
   }

   /// Sends a query and waits for its batch.
   pub async fn query_batch(&mut self, req: &QueryRequest) -> Result<Batch> {
      self.query(req).await?;
      self.collect_batch().await
   }
}
