mod support;

use std::time::Duration;

use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;
use tusk::{
   conn::Conn,
   engine::relay,
   ipc::{self, Response},
   types::Item,
};

use support::{MockProvider, QUIET, connect, query, service};

#[tokio::test]
async fn test_async_items_follow_done() {
   let mock = MockProvider::new("mock")
      .item("alpha", 1)
      .late("alpha (resolved)", Duration::from_millis(50))
      .arc();
   let (service, _) = service(vec![mock]);
   let mut client = connect(&service);

   let batch = client.query_batch(&query(&["mock"], "al")).await.unwrap();
   let (qid, iid) = (batch.items[0].qid, batch.items[0].iid);

   let next = time::timeout(Duration::from_secs(2), client.recv())
      .await
      .unwrap()
      .unwrap();
   match next {
      Some(Response::AsyncItem(r)) => {
         assert_eq!((r.qid, r.iid), (qid, iid));
         assert_eq!(r.item.text, "alpha (resolved)");
      },
      other => panic!("expected async item, got {other:?}"),
   }
}

#[tokio::test]
async fn test_async_items_of_superseded_iterations_are_dropped() {
   let mock = MockProvider::new("mock")
      .item("alpha", 1)
      .late("late", Duration::from_millis(200))
      .arc();
   let (service, _) = service(vec![mock]);
   let mut client = connect(&service);

   let first = client.query_batch(&query(&["mock"], "a")).await.unwrap();
   let second = client.query_batch(&query(&["mock"], "al")).await.unwrap();
   assert_eq!(first.items[0].qid, second.items[0].qid);

   // Only the current iteration's async item may arrive.
   let mut seen = Vec::new();
   while let Ok(frame) = time::timeout(Duration::from_millis(200) + QUIET, client.recv()).await {
      match frame.unwrap() {
         Some(Response::AsyncItem(r)) => seen.push(r.iid),
         Some(other) => panic!("unexpected frame {other:?}"),
         None => break,
      }
   }
   assert_eq!(seen, vec![second.items[0].iid]);
}

#[tokio::test]
async fn test_teardown_cancels_pending_relay() {
   let mock = MockProvider::new("mock")
      .item("alpha", 1)
      .late("late", Duration::from_millis(200))
      .arc();
   let (service, _) = service(vec![mock]);
   let mut client = connect(&service);

   let batch = client.query_batch(&query(&["mock"], "al")).await.unwrap();
   assert!(service.engine().teardown(batch.items[0].qid));

   assert!(time::timeout(Duration::from_millis(200) + QUIET, client.recv()).await.is_err());
}

#[tokio::test]
async fn test_forward_stops_when_cancelled() {
   let (mut reader, writer) = tokio::io::duplex(4096);
   let conn = Conn::new(1, writer);
   let (tx, rx) = mpsc::unbounded_channel();
   let cancel = CancellationToken::new();

   tx.send(Item::new("p", "1", "one")).unwrap();
   let relay = {
      let conn = conn.clone();
      let cancel = cancel.clone();
      tokio::spawn(async move { relay::forward(&conn, 4, 1, rx, cancel, || true).await })
   };

   let frame = ipc::read_frame_default(&mut reader).await.unwrap().unwrap();
   assert!(matches!(Response::from_frame(&frame).unwrap(), Response::AsyncItem(r) if r.qid == 4));

   cancel.cancel();
   assert_eq!(relay.await.unwrap(), 1);
   assert!(tx.send(Item::default()).is_err());
}

#[tokio::test]
async fn test_forward_stops_when_stale() {
   let (_reader, writer) = tokio::io::duplex(4096);
   let conn = Conn::new(1, writer);
   let (tx, rx) = mpsc::unbounded_channel();
   tx.send(Item::new("p", "1", "one")).unwrap();

   let written = relay::forward(&conn, 1, 1, rx, CancellationToken::new(), || false).await;
   assert_eq!(written, 0);
   assert!(tx.is_closed());
}
