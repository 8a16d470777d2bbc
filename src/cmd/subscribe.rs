//! Streams change notifications for one provider until interrupted.

use std::path::PathBuf;

use console::style;
use tokio::signal;

use crate::{
   Error, Result,
   client::Client,
   config,
   ipc::{Response, SubscribeRequest},
   usock,
};

/// Executes the subscribe command.
pub async fn execute(req: SubscribeRequest, socket: Option<PathBuf>) -> Result<()> {
   let path = usock::resolve_socket_path(socket.as_ref().or(config::get().socket_path.as_ref()));
   let mut client = Client::connect(&path).await?;
   client.subscribe(&req).await?;

   let sid = match client.recv().await? {
      Some(Response::Subscribed(ack)) => ack.sid,
      _ => return Err(Error::UnexpectedResponse("subscribe")),
   };
   println!("{} {}", style("Subscribed").green(), style(format!("sid {sid} → {}", req.provider)).dim());

   loop {
      tokio::select! {
         frame = client.recv() => match frame? {
            Some(Response::Changed(ev)) => println!("{} {}", style("changed").cyan(), ev.value),
            Some(_) => {},
            None => {
               println!("{}", style("Server closed the connection").yellow());
               return Ok(());
            },
         },
         _ = signal::ctrl_c() => {
            client.unsubscribe(sid).await?;
            return Ok(());
         }
      }
   }
}
