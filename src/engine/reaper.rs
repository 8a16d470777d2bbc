//! Periodic sweep that frees abandoned query sessions.

use std::{sync::Arc, time::Instant};

use tokio::{
   sync::watch,
   task::JoinHandle,
   time::{self, MissedTickBehavior},
};

use super::Engine;

/// Spawns the reaper; it runs until `shutdown` flips to true.
pub fn spawn(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
   let period = engine.config().reaper_interval;

   tokio::spawn(async move {
      let mut ticker = time::interval_at(time::Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
         tokio::select! {
            _ = ticker.tick() => {
               let reaped = engine.sweep(Instant::now());
               if reaped > 0 {
                  tracing::info!(reaped, remaining = engine.session_count(), "reaped idle sessions");
               }
            }
            res = shutdown.changed() => {
               if res.is_err() || *shutdown.borrow() {
                  break;
               }
            }
         }
      }
   })
}
