mod support;

use std::time::{Duration, Instant};

use tokio::{sync::watch, time};
use tusk::{config::EngineConfig, engine::Engine, provider::EventBus, service::Service};

use support::{MockProvider, connect, query, registry};

#[tokio::test]
async fn test_sweep_tears_down_idle_sessions_once() {
   let mock = MockProvider::new("mock").item("alpha", 1).arc();
   let other = MockProvider::new("other").item("alpha", 1).arc();
   let engine = Engine::new(registry(vec![mock.clone(), other.clone()]), EngineConfig::default());

   let ticket = engine.begin(1, &query(&["mock", "other", "mock"], "al"));
   assert_eq!(engine.session_count(), 1);

   assert_eq!(engine.sweep(Instant::now()), 0);
   let later = Instant::now() + Duration::from_secs(61);
   assert_eq!(engine.sweep(later), 1);
   assert_eq!(engine.sweep(later), 0);

   assert_eq!(engine.session_count(), 0);
   assert_eq!(mock.cleanup_count(), 1);
   assert_eq!(other.cleanup_count(), 1);
   assert!(ticket.cancel.is_cancelled());
   assert!(!engine.teardown(ticket.qid));
}

#[tokio::test]
async fn test_touched_sessions_survive() {
   let engine = Engine::new(registry(vec![MockProvider::new("mock").arc()]), EngineConfig::default());

   engine.begin(1, &query(&["mock"], "a"));
   time::sleep(Duration::from_millis(20)).await;
   // Refining touches the session.
   let t = engine.begin(1, &query(&["mock"], "al"));
   assert!(t.resumed);

   let idle = EngineConfig::default().session_idle;
   let almost = Instant::now() + idle - Duration::from_millis(5);
   assert_eq!(engine.sweep(almost), 0);
   assert_eq!(engine.session_count(), 1);
}

#[tokio::test]
async fn test_scoped_names_clean_up_their_base_provider_once() {
   let menus = MockProvider::new("menus").arc();
   let engine = Engine::new(registry(vec![menus.clone()]), EngineConfig::default());

   let t = engine.begin(3, &query(&["menus:power", "menus:extra"], "x"));
   assert!(engine.teardown(t.qid));
   assert_eq!(menus.cleanup_count(), 1);
}

#[tokio::test]
async fn test_reaper_task_runs_on_its_interval() {
   let mock = MockProvider::new("mock").item("alpha", 1).arc();
   let config = EngineConfig {
      reaper_interval: Duration::from_millis(50),
      session_idle:    Duration::from_millis(100),
      ..EngineConfig::default()
   };
   let service = Service::new(registry(vec![mock.clone()]), EventBus::new(), config);
   let (shutdown_tx, shutdown_rx) = watch::channel(false);
   let reaper = service.spawn_reaper(shutdown_rx);

   let mut client = connect(&service);
   client.query_batch(&query(&["mock"], "al")).await.unwrap();
   assert_eq!(service.engine().session_count(), 1);

   time::timeout(Duration::from_secs(2), async {
      while service.engine().session_count() > 0 {
         time::sleep(Duration::from_millis(20)).await;
      }
   })
   .await
   .expect("idle session should be reaped");
   assert_eq!(mock.cleanup_count(), 1);

   shutdown_tx.send(true).unwrap();
   time::timeout(Duration::from_secs(1), reaper)
      .await
      .expect("reaper should stop on shutdown")
      .unwrap();
}

#[tokio::test]
async fn test_sweep_sampled_before_a_keystroke_spares_the_session() {
   let mock = MockProvider::new("mock").item("alpha", 1).arc();
   let (service, _) = support::service(vec![mock.clone()]);
   let mut client = connect(&service);
   client.query_batch(&query(&["mock"], "a")).await.unwrap();

   // The reaper reads its clock, then a refinement arrives before it sweeps.
   let sampled = Instant::now();
   time::sleep(Duration::from_millis(20)).await;
   let batch = client.query_batch(&query(&["mock"], "al")).await.unwrap();
   assert_eq!(batch.texts(), vec!["alpha"]);

   let idle = EngineConfig::default().session_idle;
   assert_eq!(service.engine().sweep(sampled + idle + Duration::from_millis(5)), 0);
   assert_eq!(service.engine().session_count(), 1);
   assert_eq!(mock.cleanup_count(), 0);
}
