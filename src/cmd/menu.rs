use std::path::PathBuf;

use console::style;

use crate::{Result, client::Client, config, usock};

/// Announces that a menu was opened so its subscribers refresh.
pub async fn execute(menu: String, socket: Option<PathBuf>) -> Result<()> {
   let path = usock::resolve_socket_path(socket.as_ref().or(config::get().socket_path.as_ref()));
   let mut client = Client::connect(&path).await?;
   client.menu(&menu).await?;
   println!("{} {}", style("Opened menu").green(), style(&menu).cyan());
   Ok(())
}
