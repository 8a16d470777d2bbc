//! Activates an item of a previous query.

use std::path::PathBuf;

use console::style;

use crate::{Result, client::Client, config, ipc::ActivateRequest, usock};

/// Executes the activate command.
///
/// The request is fire-and-forget: the service reports no outcome, so a
/// successful write is all this command can confirm.
pub async fn execute(req: ActivateRequest, socket: Option<PathBuf>) -> Result<()> {
   let path = usock::resolve_socket_path(socket.as_ref().or(config::get().socket_path.as_ref()));
   let mut client = Client::connect(&path).await?;
   client.activate(&req).await?;
   println!(
      "{} {} {}",
      style("Activated").green(),
      style(&req.provider).cyan(),
      style(&req.identifier).dim(),
   );
   Ok(())
}
