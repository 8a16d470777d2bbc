//! Files and folders under the configured roots.
//!
//! The index is built once in the background and then kept current by a
//! debounced file watcher, which also publishes a `files` change event per
//! batch of filesystem changes.

use std::{
   collections::HashMap,
   path::{Path, PathBuf},
   sync::Arc,
   time::{Duration, SystemTime},
};

use async_trait::async_trait;
use directories::BaseDirs;
use ignore::WalkBuilder;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use parking_lot::{Mutex, RwLock};

use super::{identifier, launch, spawn_program};
use crate::{
   Result,
   config::FilesConfig,
   error::ProviderError,
   fuzzy,
   provider::{Activation, EventBus, Provider, QueryContext},
   types::{FuzzyInfo, Item, ItemKind},
};

pub const NAME: &str = "files";
const DEBOUNCE: Duration = Duration::from_millis(500);
/// Files changed within this window get a recency boost on empty queries.
const RECENT_SECS: u64 = 3600;

#[derive(Debug, Clone)]
struct FileEntry {
   /// Directories carry a trailing `/`.
   path:    String,
   changed: SystemTime,
}

impl FileEntry {
   fn is_dir(&self) -> bool {
      self.path.ends_with('/')
   }
}

type Index = HashMap<String, FileEntry>;

pub struct FilesProvider {
   cfg:     FilesConfig,
   events:  EventBus,
   index:   Arc<RwLock<Index>>,
   watcher: Mutex<Option<Debouncer<notify::RecommendedWatcher>>>,
}

impl FilesProvider {
   pub fn new(cfg: FilesConfig, events: EventBus) -> Self {
      Self {
         cfg,
         events,
         index: Arc::new(RwLock::new(Index::new())),
         watcher: Mutex::new(None),
      }
   }

   fn roots(&self) -> Vec<PathBuf> {
      if !self.cfg.roots.is_empty() {
         return self.cfg.roots.clone();
      }
      BaseDirs::new()
         .map(|d| vec![d.home_dir().to_path_buf()])
         .unwrap_or_default()
   }

   pub fn len(&self) -> usize {
      self.index.read().len()
   }

   pub fn is_empty(&self) -> bool {
      self.index.read().is_empty()
   }

   /// Rebuilds the index from scratch; returns the number of entries.
   pub fn reindex(&self) -> usize {
      let mut fresh = Index::new();
      for root in self.roots() {
         let walker = WalkBuilder::new(&root)
            .hidden(!self.cfg.hidden)
            .git_ignore(true)
            .parents(true)
            .max_depth(Some(self.cfg.max_depth))
            .build();
         for entry in walker.filter_map(|e| e.ok()) {
            if entry.depth() == 0 {
               continue;
            }
            if fresh.len() >= self.cfg.max_entries {
               tracing::warn!(provider = NAME, limit = self.cfg.max_entries, "index limit reached");
               break;
            }
            if let Some(file) = stat_entry(entry.path()) {
               fresh.insert(identifier(&[&file.path]), file);
            }
         }
      }
      let count = fresh.len();
      *self.index.write() = fresh;
      tracing::info!(provider = NAME, files = count, "index built");
      count
   }

   fn watch(&self) -> Result<()> {
      let index = Arc::clone(&self.index);
      let events = self.events.clone();
      let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
         Ok(changes) => {
            let paths: Vec<PathBuf> = changes.into_iter().map(|c| c.path).collect();
            apply_changes(&index, &paths);
            events.publish(NAME, NAME);
         },
         Err(e) => tracing::warn!(provider = NAME, "watch error: {e}"),
      })?;
      for root in self.roots() {
         debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;
      }
      *self.watcher.lock() = Some(debouncer);
      Ok(())
   }

   fn path_of(&self, id: &str) -> Option<String> {
      self.index.read().get(id).map(|f| f.path.clone())
   }
}

fn stat_entry(path: &Path) -> Option<FileEntry> {
   let meta = std::fs::metadata(path).ok()?;
   let mut display = path.to_string_lossy().into_owned();
   if meta.is_dir() && !display.ends_with('/') {
      display.push('/');
   }
   Some(FileEntry { path: display, changed: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH) })
}

/// Re-stats changed paths: existing ones are inserted or refreshed, vanished
/// ones are dropped together with anything below them.
fn apply_changes(index: &RwLock<Index>, paths: &[PathBuf]) {
   let mut index = index.write();
   for path in paths {
      match stat_entry(path) {
         Some(file) => {
            index.insert(identifier(&[&file.path]), file);
         },
         None => {
            let gone = path.to_string_lossy();
            index.retain(|_, f| {
               let p = f.path.trim_end_matches('/');
               p != gone && !p.starts_with(&format!("{gone}/"))
            });
         },
      }
   }
}

fn recency_boost(changed: SystemTime, now: SystemTime) -> i32 {
   let age = now.duration_since(changed).map_or(0, |d| d.as_secs());
   RECENT_SECS.saturating_sub(age) as i32
}

#[async_trait]
impl Provider for FilesProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Files"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      format!(
         "### Files\nSearch files and folders.\nActions: open (default), opendir, copypath, copyfile.\n\
          roots = {:?}\nmax_depth = {}\nhidden = {}\nmin_score = {}\n",
         self.cfg.roots, self.cfg.max_depth, self.cfg.hidden, self.cfg.min_score,
      )
   }

   fn start(self: Arc<Self>) {
      tokio::spawn(async move {
         let this = Arc::clone(&self);
         if let Err(e) = tokio::task::spawn_blocking(move || this.reindex()).await {
            tracing::error!(provider = NAME, "indexing task failed: {e}");
            return;
         }
         if let Err(e) = self.watch() {
            tracing::warn!(provider = NAME, "file watcher unavailable: {e}");
         }
      });
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      let now = SystemTime::now();
      let index = self.index.read();

      let candidates: Box<dyn Iterator<Item = (&String, &FileEntry)> + '_> = match &ctx.domain {
         Some(domain) => Box::new(
            domain
               .iter()
               .filter_map(|i| index.get_key_value(&i.identifier)),
         ),
         None => Box::new(index.iter()),
      };

      let mut out = Vec::new();
      for (id, file) in candidates {
         let kind = if file.is_dir() { ItemKind::Regular } else { ItemKind::File };
         let mut item = Item::new(NAME, id, &file.path)
            .with_icon(&self.cfg.icon)
            .with_kind(kind);

         if ctx.text.is_empty() {
            if !file.is_dir() {
               item.score = recency_boost(file.changed, now);
            }
         } else {
            let Some(m) = fuzzy::score(&ctx.text, &file.path, ctx.exact) else {
               continue;
            };
            if m.score < self.cfg.min_score {
               continue;
            }
            item.score = m.score;
            item.fuzzy = Some(FuzzyInfo { field: "text".into(), positions: m.positions, start: m.start });
         }
         out.push(item);
      }

      tracing::debug!(provider = NAME, qid = ctx.qid, results = out.len(), "query");
      Ok(out)
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      let path = self
         .path_of(&activation.identifier)
         .ok_or_else(|| ProviderError::UnknownItem {
            provider:   NAME.to_string(),
            identifier: activation.identifier.clone(),
         })?;

      match activation.action.as_str() {
         "" | "open" => launch(NAME, &self.cfg.launch_prefix, &["xdg-open", &path]),
         "opendir" => {
            let dir = Path::new(path.trim_end_matches('/'))
               .parent()
               .map_or_else(|| path.clone(), |p| p.display().to_string());
            launch(NAME, &self.cfg.launch_prefix, &["xdg-open", &dir])
         },
         "copypath" => spawn_program(NAME, "wl-copy", &[&path], None),
         "copyfile" => {
            let uri = format!("file://{path}");
            spawn_program(NAME, "wl-copy", &["-t", "text/uri-list", &uri], None)
         },
         other => Err(ProviderError::UnknownAction {
            provider: NAME.to_string(),
            action:   other.to_string(),
         }
         .into()),
      }
   }
}

#[cfg(test)]
mod tests {
   use std::fs;

   use super::*;
   use crate::providers::testing;

   fn provider(root: &Path) -> FilesProvider {
      let cfg = FilesConfig { roots: vec![root.to_path_buf()], min_score: 0, ..FilesConfig::default() };
      FilesProvider::new(cfg, EventBus::new())
   }

   #[tokio::test]
   async fn indexes_files_and_directories() {
      let dir = tempfile::tempdir().unwrap();
      fs::create_dir(dir.path().join("repo")).unwrap();
      fs::write(dir.path().join("repo/readme.md"), "x").unwrap();
      fs::write(dir.path().join("notes.txt"), "x").unwrap();

      let p = provider(dir.path());
      assert_eq!(p.reindex(), 3);

      let mut ctx = QueryContext::standalone("readme", None);
      ctx.exact = true;
      let items = p.query(ctx).await.unwrap();
      assert_eq!(items.len(), 1);
      assert!(items[0].text.ends_with("repo/readme.md"));
      assert_eq!(items[0].kind, ItemKind::File);

      let dirs = p.query(QueryContext::standalone("repo/", None)).await.unwrap();
      assert!(dirs.iter().any(|i| i.kind == ItemKind::Regular && i.text.ends_with("repo/")));
   }

   #[tokio::test]
   async fn opening_passes_the_path_as_one_argument() {
      let dir = tempfile::tempdir().unwrap();
      let rec_dir = tempfile::tempdir().unwrap();
      let rec = testing::Recorder::new(rec_dir.path());
      let name = "a';touch tusk_files_marker;'";
      fs::write(dir.path().join(name), "x").unwrap();

      let cfg = FilesConfig {
         roots: vec![dir.path().to_path_buf()],
         min_score: 0,
         launch_prefix: rec.prefix(),
         ..FilesConfig::default()
      };
      let p = FilesProvider::new(cfg, EventBus::new());
      p.reindex();

      let items = p.query(QueryContext::standalone("touch", None)).await.unwrap();
      let item = items.iter().find(|i| i.text.ends_with(name)).expect("indexed");
      p.activate(Activation { identifier: item.identifier.clone(), ..Default::default() })
         .await
         .unwrap();

      assert_eq!(rec.args().await, vec!["xdg-open".to_string(), item.text.clone()]);
      assert!(!std::env::current_dir().unwrap().join("tusk_files_marker").exists());
   }

   #[tokio::test]
   async fn empty_query_boosts_recent_files() {
      let dir = tempfile::tempdir().unwrap();
      fs::write(dir.path().join("fresh.txt"), "x").unwrap();
      let p = provider(dir.path());
      p.reindex();

      let items = p.query(QueryContext::standalone("", None)).await.unwrap();
      assert_eq!(items.len(), 1);
      assert!(items[0].score > 3000);
   }

   #[tokio::test]
   async fn domain_restricts_candidates() {
      let dir = tempfile::tempdir().unwrap();
      fs::write(dir.path().join("alpha.txt"), "x").unwrap();
      fs::write(dir.path().join("alps.txt"), "x").unwrap();
      let p = provider(dir.path());
      p.reindex();

      let mut ctx = QueryContext::standalone("alpha", None);
      ctx.exact = true;
      let first = p.query(ctx).await.unwrap();
      assert_eq!(first.len(), 1);

      let mut ctx = QueryContext::standalone("al", None);
      ctx.domain = Some(first.into());
      let narrowed = p.query(ctx).await.unwrap();
      assert_eq!(narrowed.len(), 1);
      assert!(narrowed[0].text.ends_with("alpha.txt"));
   }

   #[test]
   fn vanished_directories_drop_their_children() {
      let index = RwLock::new(Index::new());
      for path in ["/gone/", "/gone/a.txt", "/gone/sub/b.txt", "/gonezo.txt"] {
         index.write().insert(identifier(&[path]), FileEntry {
            path:    path.to_string(),
            changed: SystemTime::UNIX_EPOCH,
         });
      }
      apply_changes(&index, &[PathBuf::from("/gone")]);
      let left: Vec<String> = index.read().values().map(|f| f.path.clone()).collect();
      assert_eq!(left, vec!["/gonezo.txt".to_string()]);
   }

   #[test]
   fn recency_is_floored() {
      let now = SystemTime::now();
      assert_eq!(recency_boost(now, now), 3600);
      assert_eq!(recency_boost(now - Duration::from_secs(7200), now), 0);
   }
}
