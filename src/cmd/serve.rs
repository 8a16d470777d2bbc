//! Long-running service command.
//!
//! Binds the socket, loads and starts every enabled provider, then serves
//! clients until interrupted. The idle-session reaper runs alongside.

use std::{path::PathBuf, sync::Arc};

use console::style;
use tokio::{signal, sync::watch};

use crate::{
   Result, config,
   provider::EventBus,
   providers,
   service::Service,
   usock,
};

/// Executes the serve command.
pub async fn execute(socket: Option<PathBuf>) -> Result<()> {
   let cfg = config::get();
   let path = usock::resolve_socket_path(socket.as_ref().or(cfg.socket_path.as_ref()));

   let listener = match usock::Listener::bind(&path).await {
      Ok(l) => l,
      Err(e @ crate::Error::Socket(usock::SocketError::AlreadyRunning)) => {
         eprintln!("{}", style("Server already running").yellow());
         return Err(e);
      },
      Err(e) => return Err(e),
   };

   println!("{}", style("Starting tusk...").green().bold());
   println!("Listening: {}", style(listener.local_addr()).cyan());
   println!("Config: {}", style(config::config_file_path().display()).dim());

   let events = EventBus::new();
   let registry = Arc::new(providers::build(cfg, &events)?);
   let names: Vec<&str> = registry.names().collect();
   println!("Providers: {}", style(names.join(", ")).cyan());
   registry.start_all();

   let service = Service::with_frame_limit(
      registry,
      events,
      cfg.engine(),
      cfg.effective_max_frame_bytes(),
   );

   let (shutdown_tx, shutdown_rx) = watch::channel(false);
   let reaper = service.spawn_reaper(shutdown_rx.clone());
   let accept = tokio::spawn(Arc::clone(&service).run(listener, shutdown_rx));

   println!("\n{}", style("Server listening").green());
   println!("{}", style("Press Ctrl+C to stop").dim());

   if let Err(e) = signal::ctrl_c().await {
      tracing::error!("failed to listen for ctrl-c: {e}");
   }
   println!("\n{}", style("Shutting down...").yellow());
   let _ = shutdown_tx.send(true);

   let _ = accept.await;
   let _ = reaper.await;

   println!("{}", style("Server stopped").green());
   Ok(())
}
