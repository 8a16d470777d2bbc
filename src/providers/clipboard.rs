//! Clipboard history fed by `wl-paste --watch`.

use std::{collections::HashMap, process::Stdio, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::{
   io::{AsyncBufReadExt, BufReader},
   process::Command,
};

use super::{capture, identifier, score_item, spawn_program};
use crate::{
   Result,
   config::ClipboardConfig,
   error::ProviderError,
   provider::{Activation, EventBus, Provider, QueryContext},
   types::Item,
};

pub const NAME: &str = "clipboard";

#[derive(Debug, Clone)]
struct ClipEntry {
   content: String,
   time:    DateTime<Local>,
}

pub struct ClipboardProvider {
   cfg:     ClipboardConfig,
   events:  EventBus,
   history: Mutex<HashMap<String, ClipEntry>>,
}

impl ClipboardProvider {
   pub fn new(cfg: ClipboardConfig, events: EventBus) -> Self {
      Self { cfg, events, history: Mutex::new(HashMap::new()) }
   }

   pub fn len(&self) -> usize {
      self.history.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.history.lock().is_empty()
   }

   /// Adds or refreshes an entry and publishes a change.
   ///
   /// Returns true when the content was not in the history yet.
   pub fn record(&self, content: impl Into<String>) -> bool {
      let content = content.into();
      if content.trim().is_empty() {
         return false;
      }
      let id = identifier(&[&content]);
      let inserted = {
         let mut history = self.history.lock();
         let inserted = history
            .insert(id, ClipEntry { content, time: Local::now() })
            .is_none();
         while history.len() > self.cfg.max_items.max(1) {
            let oldest = history
               .iter()
               .min_by_key(|(_, e)| e.time)
               .map(|(id, _)| id.clone());
            match oldest {
               Some(id) => history.remove(&id),
               None => break,
            };
         }
         inserted
      };
      self.events.publish(NAME, NAME);
      inserted
   }

   /// History entries, newest first.
   fn snapshot(&self) -> Vec<(String, ClipEntry)> {
      let mut entries: Vec<_> = self
         .history
         .lock()
         .iter()
         .map(|(id, e)| (id.clone(), e.clone()))
         .collect();
      entries.sort_by(|a, b| b.1.time.cmp(&a.1.time).then_with(|| a.0.cmp(&b.0)));
      entries
   }

   async fn watch(self: Arc<Self>) {
      let child = Command::new("wl-paste")
         .args(["--watch", "echo", ""])
         .stdin(Stdio::null())
         .stdout(Stdio::piped())
         .stderr(Stdio::null())
         .kill_on_drop(true)
         .spawn();
      let mut child = match child {
         Ok(child) => child,
         Err(e) => {
            tracing::warn!(provider = NAME, "clipboard watcher unavailable: {e}");
            return;
         },
      };
      let Some(stdout) = child.stdout.take() else {
         return;
      };

      let mut lines = BufReader::new(stdout).lines();
      while let Ok(Some(_)) = lines.next_line().await {
         match capture(NAME, "wl-paste -n").await {
            Ok(content) => {
               self.record(content);
            },
            Err(e) => tracing::debug!(provider = NAME, "reading clipboard failed: {e}"),
         }
      }
      tracing::warn!(provider = NAME, "clipboard watcher exited");
   }
}

#[async_trait]
impl Provider for ClipboardProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Clipboard"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      format!(
         "### Clipboard\nClipboard history. Requires wl-clipboard.\nActions: copy (default), remove.\n\
          max_items = {}\nmin_score = {}\n",
         self.cfg.max_items, self.cfg.min_score,
      )
   }

   fn start(self: Arc<Self>) {
      tokio::spawn(self.watch());
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      let entries = self.snapshot();
      let total = entries.len() as i32;
      Ok(entries
         .into_iter()
         .enumerate()
         .filter_map(|(rank, (id, entry))| {
            let item = Item::new(NAME, id, entry.content.trim())
               .with_subtext(entry.time.to_rfc2822())
               .with_icon(&self.cfg.icon)
               .with_score(total - rank as i32);
            score_item(item, &ctx, self.cfg.min_score)
         })
         .collect())
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      let unknown_item = || ProviderError::UnknownItem {
         provider:   NAME.to_string(),
         identifier: activation.identifier.clone(),
      };

      match activation.action.as_str() {
         "" | "copy" => {
            let content = self
               .history
               .lock()
               .get(&activation.identifier)
               .map(|e| e.content.clone())
               .ok_or_else(unknown_item)?;
            spawn_program(NAME, "wl-copy", &[], Some(content.into_bytes()))
         },
         "remove" => {
            self
               .history
               .lock()
               .remove(&activation.identifier)
               .ok_or_else(unknown_item)?;
            self.events.publish(NAME, NAME);
            Ok(())
         },
         other => Err(ProviderError::UnknownAction {
            provider: NAME.to_string(),
            action:   other.to_string(),
         }
         .into()),
      }
   }
}
