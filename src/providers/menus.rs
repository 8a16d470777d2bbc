//! User-defined menus loaded from TOML files.
//!
//! Each file defines one menu. Queries against `menus:<name>` search that
//! menu only; unscoped queries search menus marked `global_search`.

use std::{
   collections::{BTreeMap, HashSet},
   fs,
   path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use walkdir::WalkDir;

use super::{capture, identifier, quote, score_item, spawn_shell};
use crate::{
   Result,
   config::{self, MenusConfig},
   error::{ConfigError, ProviderError},
   provider::{Activation, EventBus, Provider, QueryContext},
   types::Item,
};

pub const NAME: &str = "menus";
/// Placeholder in actions replaced by the entry value.
pub const RESULT_PLACEHOLDER: &str = "%RESULT%";
/// Text an async entry reports when its command failed; clients drop it.
pub const DELETE_MARKER: &str = "%DELETE%";
const KEEP_OPEN: &str = "keepopen:";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Menu {
   pub name:          String,
   pub name_pretty:   String,
   pub description:   String,
   pub icon:          String,
   pub action:        String,
   pub global_search: bool,
   pub entries:       Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Entry {
   pub text:       String,
   /// Shell command whose output replaces `text` once it finishes.
   #[serde(rename = "async")]
   pub async_cmd:  String,
   pub subtext:    String,
   pub value:      String,
   pub action:     String,
   pub icon:       String,
   pub submenu:    String,
   pub preview:    String,
   #[serde(skip)]
   pub identifier: String,
}

impl Menu {
   /// Assigns entry identifiers; submenu entries point at their target menu.
   fn finalize(mut self) -> Self {
      for entry in &mut self.entries {
         entry.identifier = if entry.submenu.is_empty() {
            identifier(&[&self.name, &entry.text, &entry.value])
         } else {
            format!("{KEEP_OPEN}{NAME}:{}", entry.submenu)
         };
      }
      self
   }
}

/// Parses one menu definition file
pub fn parse_menu(path: &Path) -> Result<Menu> {
   let invalid = |reason: String| ConfigError::InvalidMenu { path: path.display().to_string(), reason };
   let raw = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
   let menu: Menu = toml::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
   if menu.name.is_empty() {
      return Err(invalid("missing `name`".to_string()).into());
   }
   Ok(menu.finalize())
}

pub struct MenusProvider {
   cfg:       MenusConfig,
   delimiter: String,
   events:    EventBus,
   menus:     BTreeMap<String, Menu>,
}

impl MenusProvider {
   /// Loads every `*.toml` under the configured paths and the default menu
   /// directory. Invalid files are logged and skipped.
   pub fn load(cfg: MenusConfig, delimiter: String, events: EventBus) -> Self {
      let mut dirs: Vec<PathBuf> = cfg.paths.clone();
      dirs.push(config::menus_dir());
      Self::from_dirs(cfg, delimiter, events, &dirs)
   }

   pub fn from_dirs(cfg: MenusConfig, delimiter: String, events: EventBus, dirs: &[PathBuf]) -> Self {
      let mut menus = Vec::new();
      for dir in dirs.iter().filter(|d| d.is_dir()) {
         for entry in WalkDir::new(dir).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "toml") {
               continue;
            }
            match parse_menu(path) {
               Ok(menu) => menus.push(menu),
               Err(e) => tracing::error!(provider = NAME, "{e}"),
            }
         }
      }
      Self::from_menus(cfg, delimiter, events, menus)
   }

   pub fn from_menus(cfg: MenusConfig, delimiter: String, events: EventBus, menus: Vec<Menu>) -> Self {
      let menus: BTreeMap<_, _> = menus
         .into_iter()
         .map(|m| {
            let m = m.finalize();
            (m.name.clone(), m)
         })
         .collect();
      tracing::info!(provider = NAME, menus = menus.len(), "menus loaded");
      Self { cfg, delimiter, events, menus }
   }

   pub fn menu(&self, name: &str) -> Option<&Menu> {
      self.menus.get(name)
   }

   fn find_entry(&self, identifier: &str, scope: Option<&str>) -> Option<(&Menu, &Entry)> {
      let scoped = scope.and_then(|s| self.menus.get(s)).into_iter();
      scoped
         .chain(self.menus.values())
         .find_map(|m| m.entries.iter().find(|e| e.identifier == identifier).map(|e| (m, e)))
   }
}

#[async_trait]
impl Provider for MenusProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Menus"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      format!(
         "### Menus\nCustom menus defined in TOML.\nDefinitions are read from `{}` and `menus.paths`.\n\
          Query a single menu with the provider name `menus:<name>`.\n\
          Entries may set `action` (with `{RESULT_PLACEHOLDER}` replaced by `value`), \
          `submenu`, and `async` (a shell command whose output becomes the text).\n\
          min_score = {}\n",
         config::menus_dir().display(),
         self.cfg.min_score,
      )
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      let allowed: Option<HashSet<&str>> = ctx
         .domain
         .as_ref()
         .map(|d| d.iter().map(|i| i.identifier.as_str()).collect());

      let menus: Vec<&Menu> = match ctx.scope.as_deref() {
         Some(scope) => self.menus.get(scope).into_iter().collect(),
         None => self.menus.values().filter(|m| m.global_search).collect(),
      };

      let mut out = Vec::new();
      for menu in menus {
         let provider = format!("{NAME}:{}", menu.name);
         for entry in &menu.entries {
            if allowed.as_ref().is_some_and(|a| !a.contains(entry.identifier.as_str())) {
               continue;
            }
            let icon = [&entry.icon, &menu.icon, &self.cfg.icon]
               .into_iter()
               .find(|i| !i.is_empty())
               .cloned()
               .unwrap_or_default();
            let item = Item::new(&provider, &entry.identifier, &entry.text)
               .with_subtext(&entry.subtext)
               .with_icon(icon);
            let Some(item) = score_item(item, &ctx, self.cfg.min_score) else {
               continue;
            };

            if !entry.async_cmd.is_empty() && !ctx.sink.is_closed() {
               let mut late = item.clone();
               let sink = ctx.sink.clone();
               let cmd = entry.async_cmd.clone();
               tokio::spawn(async move {
                  late.text = match capture(NAME, &cmd).await {
                     Ok(text) => text,
                     Err(e) => {
                        tracing::debug!(provider = NAME, "async entry failed: {e}");
                        DELETE_MARKER.to_string()
                     },
                  };
                  sink.send(late);
               });
            }
            out.push(item);
         }
      }

      tracing::debug!(provider = NAME, qid = ctx.qid, results = out.len(), "query");
      Ok(out)
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      let id = activation.identifier.strip_prefix(KEEP_OPEN).unwrap_or(&activation.identifier);
      let id = id
         .strip_prefix(NAME)
         .and_then(|rest| rest.strip_prefix(':'))
         .unwrap_or(id);

      if let Some(menu) = self.menus.get(id) {
         self.events.publish(NAME, format!("{NAME}:{}", menu.name));
         return Ok(());
      }

      let (menu, entry) = self
         .find_entry(id, activation.scope.as_deref())
         .ok_or_else(|| ProviderError::UnknownItem {
            provider:   NAME.to_string(),
            identifier: activation.identifier.clone(),
         })?;

      let run = if entry.action.is_empty() { &menu.action } else { &entry.action };
      if run.is_empty() {
         return Ok(());
      }

      let argument = activation
         .arguments
         .split_once(self.delimiter.as_str())
         .map(|(_, arg)| arg);
      let value = match argument {
         Some(arg) if entry.value.is_empty() => arg,
         _ => entry.value.as_str(),
      };

      if run.contains(RESULT_PLACEHOLDER) {
         spawn_shell(NAME, &run.replace(RESULT_PLACEHOLDER, &quote(NAME, value)?), None)
      } else {
         let stdin = (!entry.value.is_empty()).then(|| entry.value.clone().into_bytes());
         spawn_shell(NAME, run, stdin)
      }
   }
}
