mod support;

use std::{os::unix::fs::PermissionsExt, time::Duration};

use tokio::{sync::watch, time};
use tusk::{
   Error,
   client::Client,
   usock::{self, Listener, SocketError},
};

use support::{MockProvider, query, service};

#[tokio::test]
async fn test_serves_queries_over_a_real_socket() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("run").join("tusk.sock");
   let listener = Listener::bind(&path).await.unwrap();

   let mode = std::fs::metadata(&path).unwrap().permissions().mode();
   assert_eq!(mode & 0o777, 0o600);

   let (service, _) = service(vec![MockProvider::new("mock").items(&[("alpha", 2), ("alps", 1)]).arc()]);
   let (shutdown_tx, shutdown_rx) = watch::channel(false);
   let server = tokio::spawn(service.run(listener, shutdown_rx));

   let mut client = Client::connect(&path).await.unwrap();
   let batch = client.query_batch(&query(&["mock"], "alp")).await.unwrap();
   assert_eq!(batch.texts(), vec!["alpha", "alps"]);

   let err = Listener::bind(&path).await.err().expect("second bind must fail");
   assert!(matches!(err, Error::Socket(SocketError::AlreadyRunning)));
   assert_eq!(err.exit_code(), 3);

   shutdown_tx.send(true).unwrap();
   time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
   assert!(!path.exists(), "socket file should be removed on shutdown");
}

#[tokio::test]
async fn test_stale_socket_file_is_replaced() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("tusk.sock");
   drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
   assert!(path.exists());

   let listener = Listener::bind(&path).await.unwrap();
   assert_eq!(listener.local_addr(), path.display().to_string());
}

#[tokio::test]
async fn test_overlong_path_is_rejected() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("x".repeat(usock::MAX_SOCKET_PATH_LEN)).join("tusk.sock");
   let err = Listener::bind(&path).await.err().expect("bind must fail");
   assert!(matches!(err, Error::Socket(SocketError::PathTooLong { .. })));
}

#[tokio::test]
async fn test_connect_without_server_fails() {
   let dir = tempfile::tempdir().unwrap();
   let err = Client::connect(&dir.path().join("missing.sock")).await.err().expect("no server");
   assert!(matches!(err, Error::Socket(SocketError::Connect(_))));
}

#[tokio::test]
async fn test_dropping_a_replaced_listener_keeps_the_new_socket() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("tusk.sock");
   let old = Listener::bind(&path).await.unwrap();

   // Another instance unlinks the path and binds its own socket there.
   std::fs::remove_file(&path).unwrap();
   let new = Listener::bind(&path).await.unwrap();

   drop(old);
   assert!(path.exists(), "the newer listener's socket must survive");
   drop(new);
   assert!(!path.exists());
}
