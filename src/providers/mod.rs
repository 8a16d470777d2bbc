//! Built-in, statically linked providers and the helpers they share.

pub mod calc;
pub mod clipboard;
pub mod files;
pub mod menus;
pub mod providerlist;
pub mod runner;
pub mod symbols;
pub mod websearch;

use std::{process::Stdio, sync::Arc};

use sha2::{Digest, Sha256};
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{
   Error, Result,
   config::Config,
   error::ProviderError,
   fuzzy,
   provider::{EventBus, Provider, QueryContext, Registry},
   types::Item,
};

/// Builds the registry from every provider not disabled in the config.
pub fn build(config: &Config, events: &EventBus) -> Result<Registry> {
   let mut registry = Registry::new();
   let mut add = |provider: Arc<dyn Provider>| {
      if config.is_disabled(provider.name()) {
         tracing::info!(provider = provider.name(), "provider disabled");
      } else {
         registry.register(provider);
      }
   };

   add(Arc::new(files::FilesProvider::new(config.files.clone(), events.clone())));
   add(Arc::new(menus::MenusProvider::load(
      config.menus.clone(),
      config.argument_delimiter.clone(),
      events.clone(),
   )));
   add(Arc::new(runner::RunnerProvider::new(config.runner.clone())));
   add(Arc::new(websearch::WebsearchProvider::new(config.websearch.clone())));
   add(Arc::new(clipboard::ClipboardProvider::new(config.clipboard.clone(), events.clone())));
   add(Arc::new(calc::CalcProvider::new(config.calc.clone())));
   add(Arc::new(symbols::SymbolsProvider::load(config.symbols.clone())));

   if !config.is_disabled(providerlist::NAME) {
      let listing = providerlist::ProviderList::from_registry(&registry);
      registry.register(Arc::new(listing));
   }

   if registry.is_empty() {
      return Err(Error::NoProviders);
   }
   Ok(registry)
}

/// Stable item identifier: hex SHA-256 over the concatenated parts.
pub fn identifier(parts: &[&str]) -> String {
   let mut hasher = Sha256::new();
   for part in parts {
      hasher.update(part.as_bytes());
   }
   hex::encode(hasher.finalize())
}

/// Scores an item on its text and subtext.
///
/// An empty query keeps the item untouched. Otherwise the item survives only
/// if its prioritised score reaches `min_score`.
pub fn score_item(mut item: Item, ctx: &QueryContext, min_score: i32) -> Option<Item> {
   if ctx.text.is_empty() {
      return Some(item);
   }
   let (score, info) = fuzzy::best_field(
      &ctx.text,
      &[("text", item.text.as_str()), ("subtext", item.subtext.as_str())],
      ctx.exact,
   )?;
   if score < min_score {
      return None;
   }
   item.score = score;
   item.fuzzy = Some(info);
   Some(item)
}

/// Runs a trusted, configured shell command line in its own session.
///
/// Anything user supplied must be quoted with [`quote`] before it is spliced
/// into `command`.
pub fn spawn_shell(provider: &str, command: &str, stdin: Option<Vec<u8>>) -> Result<()> {
   let mut cmd = Command::new("sh");
   cmd.arg("-c").arg(command);
   spawn_detached(provider, command, cmd, stdin)
}

/// Runs a program directly with arguments in its own session.
pub fn spawn_program(provider: &str, program: &str, args: &[&str], stdin: Option<Vec<u8>>) -> Result<()> {
   let mut cmd = Command::new(program);
   cmd.args(args);
   spawn_detached(provider, program, cmd, stdin)
}

/// Launches `args` behind the words of a configured `prefix` such as
/// `uwsm app --`. No shell is involved: every argument reaches the program
/// verbatim, whatever characters it contains.
pub fn launch(provider: &str, prefix: &str, args: &[&str]) -> Result<()> {
   let mut argv = split_command(provider, prefix)?;
   argv.extend(args.iter().map(|a| (*a).to_string()));
   let Some((program, rest)) = argv.split_first() else {
      return Err(ProviderError::InvalidCommand { provider: provider.to_string(), command: String::new() }
         .into());
   };
   let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
   spawn_program(provider, program, &rest, None)
}

/// Splits a command line into words with POSIX shell quoting rules.
pub fn split_command(provider: &str, line: &str) -> Result<Vec<String>> {
   shlex::split(line).ok_or_else(|| {
      ProviderError::InvalidCommand { provider: provider.to_string(), command: line.to_string() }.into()
   })
}

/// Quotes `value` as a single shell word.
pub fn quote(provider: &str, value: &str) -> Result<String> {
   shlex::try_quote(value).map(|q| q.into_owned()).map_err(|_| {
      ProviderError::InvalidCommand { provider: provider.to_string(), command: value.to_string() }.into()
   })
}

fn spawn_detached(provider: &str, label: &str, mut cmd: Command, stdin: Option<Vec<u8>>) -> Result<()> {
   cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
      .stdout(Stdio::null())
      .stderr(Stdio::null());
   // SAFETY: setsid is async-signal-safe and touches no parent state.
   unsafe {
      cmd.pre_exec(|| {
         libc::setsid();
         Ok(())
      });
   }

   let mut child = cmd.spawn().map_err(|source| ProviderError::Spawn {
      provider: provider.to_string(),
      command: label.to_string(),
      source,
   })?;
   tracing::debug!(provider, command = label, "spawned");

   let pipe = child.stdin.take();
   tokio::spawn(async move {
      if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
         let _ = pipe.write_all(&input).await;
         drop(pipe);
      }
      let _ = child.wait().await;
   });
   Ok(())
}

/// Runs `sh -c <command>` and returns its trimmed stdout.
pub async fn capture(provider: &str, command: &str) -> Result<String> {
   let output = Command::new("sh")
      .arg("-c")
      .arg(command)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| ProviderError::Spawn {
         provider: provider.to_string(),
         command: command.to_string(),
         source,
      })?;
   if !output.status.success() {
      return Err(ProviderError::Task {
         provider: provider.to_string(),
         reason:   format!("'{command}' exited with {}", output.status),
      }
      .into());
   }
   Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn identifiers_are_stable_hex() {
      let a = identifier(&["power", "Reboot", "reboot"]);
      assert_eq!(a.len(), 64);
      assert_eq!(a, identifier(&["power", "Reboot", "reboot"]));
      assert_ne!(a, identifier(&["power", "Reboot", "shutdown"]));
   }

   #[test]
   fn score_item_filters_below_threshold() {
      let ctx = QueryContext::standalone("fox", None);
      let item = Item::new("p", "1", "firefox");
      let scored = score_item(item.clone(), &ctx, 0).expect("match");
      assert!(scored.score > 0);
      assert_eq!(scored.fuzzy.as_ref().map(|f| f.field.as_str()), Some("text"));
      assert!(score_item(item, &ctx, i32::MAX).is_none());
   }

   #[test]
   fn empty_query_keeps_everything() {
      let ctx = QueryContext::standalone("", None);
      let item = Item::new("p", "1", "anything").with_score(3);
      assert_eq!(score_item(item.clone(), &ctx, 1000), Some(item));
   }

   #[test]
   fn split_and_quote_follow_shell_rules() {
      assert_eq!(split_command("t", "uwsm app -- ").unwrap(), vec!["uwsm", "app", "--"]);
      assert_eq!(split_command("t", "a 'b c'").unwrap(), vec!["a", "b c"]);
      assert!(split_command("t", "a 'b").is_err());
      assert!(split_command("t", "").unwrap().is_empty());

      let nasty = "a';touch x;'";
      let quoted = quote("t", nasty).unwrap();
      assert_eq!(split_command("t", &quoted).unwrap(), vec![nasty]);
      assert!(quote("t", "nul\0byte").is_err());
   }

   #[tokio::test]
   async fn launch_passes_arguments_verbatim() {
      let dir = tempfile::tempdir().unwrap();
      let rec = testing::Recorder::new(dir.path());
      let marker = dir.path().join("marker");
      let nasty = format!("a';touch {};'", marker.display());

      launch("t", &rec.prefix(), &["one two", &nasty]).unwrap();
      assert_eq!(rec.args().await, vec!["one two".to_string(), nasty]);
      assert!(!marker.exists());

      assert!(launch("t", "", &[]).is_err());
   }

   #[tokio::test]
   async fn capture_trims_output() {
      assert_eq!(capture("test", "printf '  hi \\n'").await.unwrap(), "hi");
      assert!(capture("test", "exit 3").await.is_err());
   }
}
