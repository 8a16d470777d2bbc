//! Wire protocol for client-server communication over the Unix socket.
//!
//! Every frame is `[kind: u8][length: u32 BE][payload: length bytes]`.
//! Payloads are postcard-encoded messages; status frames (`Done`,
//! `NoResults`) carry an empty payload.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
   Result,
   config::DEFAULT_MAX_FRAME_BYTES,
   error::IpcError,
   types::{Iid, Item, Qid},
};

pub const HEADER_LEN: usize = 5;

/// Message kinds sent by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
   Query       = 0,
   Activate    = 1,
   Subscribe   = 2,
   Menu        = 3,
   Unsubscribe = 4,
}

impl RequestKind {
   pub const ALL: [Self; 5] =
      [Self::Query, Self::Activate, Self::Subscribe, Self::Menu, Self::Unsubscribe];

   pub const fn as_u8(self) -> u8 {
      self as u8
   }

   pub const fn name(self) -> &'static str {
      match self {
         Self::Query => "query",
         Self::Activate => "activate",
         Self::Subscribe => "subscribe",
         Self::Menu => "menu",
         Self::Unsubscribe => "unsubscribe",
      }
   }
}

impl TryFrom<u8> for RequestKind {
   type Error = IpcError;

   fn try_from(value: u8) -> Result<Self, Self::Error> {
      Self::ALL
         .into_iter()
         .find(|k| k.as_u8() == value)
         .ok_or(IpcError::UnknownKind(value))
   }
}

/// Message kinds sent by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseKind {
   Item       = 0,
   AsyncItem  = 1,
   Changed    = 2,
   Subscribed = 3,
   NoResults  = 254,
   Done       = 255,
}

impl ResponseKind {
   pub const ALL: [Self; 6] = [
      Self::Item,
      Self::AsyncItem,
      Self::Changed,
      Self::Subscribed,
      Self::NoResults,
      Self::Done,
   ];

   pub const fn as_u8(self) -> u8 {
      self as u8
   }

   pub const fn is_status(self) -> bool {
      matches!(self, Self::NoResults | Self::Done)
   }
}

impl TryFrom<u8> for ResponseKind {
   type Error = IpcError;

   fn try_from(value: u8) -> Result<Self, Self::Error> {
      Self::ALL
         .into_iter()
         .find(|k| k.as_u8() == value)
         .ok_or(IpcError::UnknownKind(value))
   }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
   pub providers:   Vec<String>,
   pub query:       String,
   /// Zero means unlimited.
   pub max_results: u32,
   pub exact:       bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateRequest {
   pub qid:        Qid,
   pub provider:   String,
   pub identifier: String,
   pub action:     String,
   pub arguments:  String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
   pub provider:    String,
   pub query:       String,
   /// Zero subscribes to provider change events instead of polling.
   pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
   pub sid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRequest {
   pub menu: String,
}

/// Payload of `Item` and `AsyncItem` frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
   pub qid:  Qid,
   pub iid:  Iid,
   pub item: Item,
}

/// Payload of `Subscribed` and `Changed` frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
   pub sid:   u32,
   pub value: String,
}

/// A decoded frame whose payload has not been interpreted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
   pub kind:    u8,
   pub payload: Bytes,
}

impl Frame {
   pub const fn new(kind: u8, payload: Bytes) -> Self {
      Self { kind, payload }
   }

   /// Deserializes the payload into a typed message
   pub fn decode<'de, T: Deserialize<'de>>(&'de self) -> Result<T> {
      postcard::from_bytes(&self.payload).map_err(|e| IpcError::Deserialize(e).into())
   }

   pub fn response_kind(&self) -> Result<ResponseKind> {
      Ok(ResponseKind::try_from(self.kind)?)
   }

   pub fn request_kind(&self) -> Result<RequestKind> {
      Ok(RequestKind::try_from(self.kind)?)
   }
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
   Item(QueryResponse),
   AsyncItem(QueryResponse),
   Changed(SubscribeResponse),
   Subscribed(SubscribeResponse),
   NoResults,
   Done,
}

impl Response {
   pub fn from_frame(frame: &Frame) -> Result<Self> {
      Ok(match frame.response_kind()? {
         ResponseKind::Item => Self::Item(frame.decode()?),
         ResponseKind::AsyncItem => Self::AsyncItem(frame.decode()?),
         ResponseKind::Changed => Self::Changed(frame.decode()?),
         ResponseKind::Subscribed => Self::Subscribed(frame.decode()?),
         ResponseKind::NoResults => Self::NoResults,
         ResponseKind::Done => Self::Done,
      })
   }
}

/// Serializes a message into a complete wire frame
pub fn encode_frame<T: Serialize>(kind: u8, msg: &T) -> Result<Bytes> {
   let mut buf = Vec::with_capacity(128);
   buf.resize(HEADER_LEN, 0u8);
   let mut buf = postcard::to_extend(msg, buf).map_err(IpcError::Serialize)?;
   let payload_len = (buf.len() - HEADER_LEN) as u32;
   buf[0] = kind;
   buf[1..HEADER_LEN].copy_from_slice(&payload_len.to_be_bytes());
   Ok(Bytes::from(buf))
}

/// Builds a zero-length status frame
pub fn encode_status(kind: ResponseKind) -> Bytes {
   Bytes::copy_from_slice(&[kind.as_u8(), 0, 0, 0, 0])
}

/// Reads one frame, returning `None` once the peer has gone away.
///
/// A closed connection or a frame cut short are both treated as the end of
/// the stream. Lengths above `max_len` are rejected before allocating.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Frame>>
where
   R: AsyncRead + Unpin,
{
   let mut header = [0u8; HEADER_LEN];
   match reader.read_exact(&mut header).await {
      Ok(_) => {},
      Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
      Err(e) => return Err(IpcError::Read(e).into()),
   }

   let kind = header[0];
   let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
   if len > max_len {
      return Err(IpcError::MessageTooLarge(len).into());
   }

   let mut payload = BytesMut::zeroed(len);
   match reader.read_exact(&mut payload).await {
      Ok(_) => {},
      Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
      Err(e) => return Err(IpcError::Read(e).into()),
   }

   Ok(Some(Frame::new(kind, payload.freeze())))
}

/// Reads one frame using the default size guard
pub async fn read_frame_default<R>(reader: &mut R) -> Result<Option<Frame>>
where
   R: AsyncRead + Unpin,
{
   read_frame(reader, DEFAULT_MAX_FRAME_BYTES).await
}

/// Writes a pre-encoded frame and flushes it
pub async fn write_raw<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
   W: AsyncWrite + Unpin,
{
   writer.write_all(frame).await.map_err(IpcError::Write)?;
   writer.flush().await.map_err(IpcError::Write)?;
   Ok(())
}

/// Serializes and writes a request frame
pub async fn send_request<W, T>(writer: &mut W, kind: RequestKind, msg: &T) -> Result<()>
where
   W: AsyncWrite + Unpin,
   T: Serialize,
{
   let frame = encode_frame(kind.as_u8(), msg)?;
   write_raw(writer, &frame).await
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn header_is_kind_then_big_endian_length() {
      let frame = encode_frame(RequestKind::Menu.as_u8(), &MenuRequest { menu: "power".into() }).unwrap();
      assert_eq!(frame[0], 3);
      let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
      assert_eq!(len, frame.len() - HEADER_LEN);
   }

   #[test]
   fn kinds_reject_unknown_bytes() {
      assert_eq!(RequestKind::try_from(4).unwrap(), RequestKind::Unsubscribe);
      assert!(matches!(RequestKind::try_from(9), Err(IpcError::UnknownKind(9))));
      assert_eq!(ResponseKind::try_from(255).unwrap(), ResponseKind::Done);
      assert!(ResponseKind::NoResults.is_status());
      assert!(!ResponseKind::Item.is_status());
   }

   #[tokio::test]
   async fn status_frame_decodes_to_response() {
      let bytes = encode_status(ResponseKind::NoResults);
      let mut wire: &[u8] = &bytes;
      let frame = read_frame_default(&mut wire).await.unwrap().unwrap();
      assert!(frame.payload.is_empty());
      assert_eq!(Response::from_frame(&frame).unwrap(), Response::NoResults);
   }
}
