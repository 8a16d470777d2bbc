//! One-shot query against a running service.

use std::{path::PathBuf, time::Duration};

use console::style;
use tokio::time;

use crate::{
   Result,
   client::Client,
   config,
   ipc::{QueryRequest, QueryResponse, Response},
   usock,
};

pub struct QueryOptions {
   pub max_results: u32,
   pub exact:       bool,
   pub json:        bool,
   /// How long to keep listening for async updates after `Done`.
   pub wait_async:  Duration,
}

/// Executes the query command and prints the ranked items.
pub async fn execute(
   providers: Vec<String>,
   query: String,
   opts: QueryOptions,
   socket: Option<PathBuf>,
) -> Result<()> {
   let path = usock::resolve_socket_path(socket.as_ref().or(config::get().socket_path.as_ref()));
   let mut client = Client::connect(&path).await?;

   let req = QueryRequest { providers, query, max_results: opts.max_results, exact: opts.exact };
   let batch = client.query_batch(&req).await?;

   let mut late = Vec::new();
   if !opts.wait_async.is_zero() {
      let deadline = time::Instant::now() + opts.wait_async;
      while let Ok(frame) = time::timeout_at(deadline, client.recv()).await {
         match frame? {
            Some(Response::AsyncItem(item)) => late.push(item),
            Some(_) => {},
            None => break,
         }
      }
   }

   if opts.json {
      let out = serde_json::json!({ "items": batch.items, "async": late });
      println!("{}", serde_json::to_string_pretty(&out)?);
      return Ok(());
   }

   if batch.no_results {
      println!("{}", style("No results").yellow());
      return Ok(());
   }
   for r in &batch.items {
      print_item(r);
   }
   if !late.is_empty() {
      println!("{}", style("async updates:").dim());
      for r in &late {
         print_item(r);
      }
   }
   Ok(())
}

fn print_item(r: &QueryResponse) {
   let item = &r.item;
   print!(
      "{} {} {}",
      style(format!("{:>6}", item.score)).dim(),
      style(&item.provider).cyan(),
      style(&item.text).bold(),
   );
   if !item.subtext.is_empty() {
      print!("  {}", style(&item.subtext).dim());
   }
   println!("  {}", style(format!("[{}:{} {}]", r.qid, r.iid, item.identifier)).dim());
}
