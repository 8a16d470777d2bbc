use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tusk::{
   Result,
   cmd::{self, query::QueryOptions},
   config,
   ipc::{ActivateRequest, SubscribeRequest},
};

/// Command-line arguments for tusk
#[derive(Parser)]
#[command(name = "tusk")]
#[command(about = "Launcher query service over a Unix socket")]
#[command(version = tusk::VERSION)]
struct Cli {
   #[arg(long, env = "TUSK_CONFIG_DIR", help = "Directory holding config.toml and menus/")]
   config: Option<PathBuf>,

   #[arg(long, env = "TUSK_SOCKET", help = "Socket path override")]
   socket: Option<PathBuf>,

   #[arg(long, help = "Verbose logging")]
   debug: bool,

   #[command(subcommand)]
   command: Option<Cmd>,
}

/// Available subcommands; `serve` is the default
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Run the service in the foreground")]
   Serve,

   #[command(about = "Query a running service")]
   Query {
      #[arg(short = 'p', long = "provider", required = true, help = "Provider to query (repeatable)")]
      providers: Vec<String>,

      #[arg(default_value = "", help = "Query text")]
      query: String,

      #[arg(short = 'm', long, default_value = "0", help = "Maximum results (0 = unlimited)")]
      max: u32,

      #[arg(short = 'e', long, help = "Exact matching")]
      exact: bool,

      #[arg(long, default_value = "0", help = "Milliseconds to wait for async updates")]
      wait_async: u64,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Activate an item returned by a query")]
   Activate {
      #[arg(help = "Provider name, possibly scoped (menus:power)")]
      provider: String,

      #[arg(help = "Item identifier")]
      identifier: String,

      #[arg(short = 'a', long, default_value = "", help = "Action name")]
      action: String,

      #[arg(long, default_value = "", help = "Arguments passed to the action")]
      arguments: String,

      #[arg(long, default_value = "0", help = "Query session the item came from")]
      qid: u32,
   },

   #[command(about = "Print change notifications for a provider")]
   Subscribe {
      #[arg(help = "Provider name")]
      provider: String,

      #[arg(long, default_value = "0", help = "Poll interval in ms (0 = provider events)")]
      interval: u64,

      #[arg(long, default_value = "", help = "Query for polling subscriptions")]
      query: String,
   },

   #[command(about = "Announce that a menu was opened")]
   Menu {
      #[arg(help = "Menu name")]
      name: String,
   },

   #[command(about = "List enabled providers")]
   Providers {
      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Print provider documentation")]
   Doc {
      #[arg(help = "Provider name (default: all)")]
      provider: Option<String>,
   },

   #[command(about = "Print version information")]
   Version,
}

#[tokio::main]
async fn main() {
   let cli = Cli::parse();
   let level = if cli.debug { Level::DEBUG } else { Level::WARN };
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
      .init();

   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   if let Some(dir) = cli.config {
      config::set_config_dir(dir)?;
   }

   match cli.command.unwrap_or(Cmd::Serve) {
      Cmd::Serve => cmd::serve::execute(cli.socket).await,
      Cmd::Query { providers, query, max, exact, wait_async, json } => {
         let opts = QueryOptions {
            max_results: max,
            exact,
            json,
            wait_async: Duration::from_millis(wait_async),
         };
         cmd::query::execute(providers, query, opts, cli.socket).await
      },
      Cmd::Activate { provider, identifier, action, arguments, qid } => {
         let req = ActivateRequest { qid, provider, identifier, action, arguments };
         cmd::activate::execute(req, cli.socket).await
      },
      Cmd::Subscribe { provider, interval, query } => {
         let req = SubscribeRequest { provider, query, interval_ms: interval };
         cmd::subscribe::execute(req, cli.socket).await
      },
      Cmd::Menu { name } => cmd::menu::execute(name, cli.socket).await,
      Cmd::Providers { json } => cmd::providers::execute(json),
      Cmd::Doc { provider } => cmd::providers::doc(provider),
      Cmd::Version => {
         println!("tusk {}", tusk::VERSION);
         Ok(())
      },
   }
}
