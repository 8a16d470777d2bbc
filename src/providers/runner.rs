//! Executables found on `$PATH`.

use std::{
   collections::BTreeSet,
   os::unix::fs::PermissionsExt,
   path::PathBuf,
   sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use walkdir::WalkDir;

use super::{identifier, launch, score_item, split_command};
use crate::{
   Result,
   config::RunnerConfig,
   error::ProviderError,
   provider::{Activation, Provider, QueryContext},
   types::Item,
};

pub const NAME: &str = "runner";

#[derive(Debug, Clone)]
struct Binary {
   identifier: String,
   name:       String,
}

pub struct RunnerProvider {
   cfg:      RunnerConfig,
   binaries: RwLock<Vec<Binary>>,
}

impl RunnerProvider {
   pub fn new(cfg: RunnerConfig) -> Self {
      Self { cfg, binaries: RwLock::new(Vec::new()) }
   }

   /// A runner over a fixed list instead of `$PATH`.
   pub fn with_binaries<I, S>(cfg: RunnerConfig, names: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      let this = Self::new(cfg);
      this.set_binaries(names.into_iter().map(Into::into).collect());
      this
   }

   fn set_binaries(&self, names: BTreeSet<String>) {
      let binaries: Vec<Binary> = names
         .into_iter()
         .map(|name| Binary { identifier: identifier(&[&name]), name })
         .collect();
      tracing::info!(provider = NAME, executables = binaries.len(), "executables loaded");
      *self.binaries.write() = binaries;
   }

   /// Arguments for launching `bin`; `arguments` is split with shell
   /// quoting rules but never run through a shell.
   fn args_for(bin: &str, arguments: &str) -> Result<Vec<String>> {
      let mut args = vec![bin.to_string()];
      args.extend(split_command(NAME, arguments)?);
      Ok(args)
   }
}

/// Unique executable names from every `$PATH` directory
pub fn scan_path(path_var: &str) -> BTreeSet<String> {
   std::env::split_paths(path_var)
      .map(PathBuf::from)
      .filter(|dir| dir.is_dir())
      .flat_map(|dir| {
         WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
      })
      .filter(|e| e.file_type().is_file())
      .filter(|e| {
         e.metadata()
            .is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
      })
      .filter_map(|e| e.file_name().to_str().map(str::to_string))
      .collect()
}

#[async_trait]
impl Provider for RunnerProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Runner"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      format!(
         "### Runner\nRun everything in your $PATH. Arguments are appended to the command.\n\
          prefix = {:?}\nmin_score = {}\n",
         self.cfg.prefix, self.cfg.min_score,
      )
   }

   fn start(self: Arc<Self>) {
      tokio::task::spawn_blocking(move || {
         let path = std::env::var("PATH").unwrap_or_default();
         self.set_binaries(scan_path(&path));
      });
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      let binaries = self.binaries.read();
      let items: Vec<Item> = match &ctx.domain {
         Some(domain) => domain
            .iter()
            .map(|i| Item::new(NAME, &i.identifier, &i.text))
            .collect(),
         None => binaries
            .iter()
            .map(|b| Item::new(NAME, &b.identifier, &b.name))
            .collect(),
      };
      drop(binaries);

      Ok(items
         .into_iter()
         .filter_map(|item| score_item(item.with_icon(&self.cfg.icon), &ctx, self.cfg.min_score))
         .collect())
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      let name = self
         .binaries
         .read()
         .iter()
         .find(|b| b.identifier == activation.identifier)
         .map(|b| b.name.clone())
         .ok_or_else(|| ProviderError::UnknownItem {
            provider:   NAME.to_string(),
            identifier: activation.identifier.clone(),
         })?;
      let args = Self::args_for(&name, &activation.arguments)?;
      let args: Vec<&str> = args.iter().map(String::as_str).collect();
      launch(NAME, &self.cfg.prefix, &args)
   }
}

#[cfg(test)]
mod tests {
   use std::fs;

   use super::*;
   use crate::providers::testing;

   #[test]
   fn scans_only_executables() {
      let dir = tempfile::tempdir().unwrap();
      let exe = dir.path().join("tool");
      fs::write(&exe, "#!/bin/sh\n").unwrap();
      fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
      fs::write(dir.path().join("data.txt"), "x").unwrap();

      let found = scan_path(&dir.path().display().to_string());
      assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["tool".to_string()]);
   }

   #[tokio::test]
   async fn fuzzy_filters_binaries() {
      let cfg = RunnerConfig { min_score: 0, ..RunnerConfig::default() };
      let p = RunnerProvider::with_binaries(cfg, ["firefox", "htop", "fish"]);

      let all = p.query(QueryContext::standalone("", None)).await.unwrap();
      assert_eq!(all.len(), 3);

      let mut ctx = QueryContext::standalone("ff", None);
      ctx.exact = false;
      let hits = p.query(ctx).await.unwrap();
      assert_eq!(hits.len(), 1);
      assert_eq!(hits[0].text, "firefox");
   }

   #[test]
   fn arguments_follow_shell_quoting() {
      assert_eq!(RunnerProvider::args_for("ls", "").unwrap(), vec!["ls"]);
      assert_eq!(RunnerProvider::args_for("ls", "-la 'my dir'").unwrap(), vec!["ls", "-la", "my dir"]);
      assert!(RunnerProvider::args_for("ls", "'open").is_err());
   }

   #[tokio::test]
   async fn activation_runs_prefix_and_binary_without_a_shell() {
      let dir = tempfile::tempdir().unwrap();
      let rec = testing::Recorder::new(dir.path());
      let marker = dir.path().join("marker");
      let bin = format!("tool';touch {};'", marker.display());

      let cfg = RunnerConfig { prefix: rec.prefix(), ..RunnerConfig::default() };
      let p = RunnerProvider::with_binaries(cfg, [bin.clone()]);
      p.activate(Activation {
         identifier: identifier(&[&bin]),
         arguments: "--flag 'two words'".into(),
         ..Default::default()
      })
      .await
      .unwrap();

      assert_eq!(rec.args().await, vec![bin, "--flag".to_string(), "two words".to_string()]);
      assert!(!marker.exists());
   }
}
