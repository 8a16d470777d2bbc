//! Configuration management for the service, its engine and the built-in
//! providers.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<Config> = OnceLock::new();
static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
pub const MAX_FRAME_BYTES_CAP: usize = 256 * 1024 * 1024;

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub socket_path:          Option<PathBuf>,
   pub max_frame_bytes:      usize,
   pub reaper_interval_secs: u64,
   pub session_idle_secs:    u64,
   /// Boost items the user activated before for the same query prefix.
   pub usage_boost:          bool,
   pub argument_delimiter:   String,
   pub disabled_providers:   Vec<String>,

   pub files:     FilesConfig,
   pub menus:     MenusConfig,
   pub runner:    RunnerConfig,
   pub websearch: WebsearchConfig,
   pub clipboard: ClipboardConfig,
   pub calc:      CalcConfig,
   pub symbols:   SymbolsConfig,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         socket_path:          None,
         max_frame_bytes:      DEFAULT_MAX_FRAME_BYTES,
         reaper_interval_secs: 60,
         session_idle_secs:    60,
         usage_boost:          true,
         argument_delimiter:   "#".to_string(),
         disabled_providers:   Vec::new(),
         files:                FilesConfig::default(),
         menus:                MenusConfig::default(),
         runner:               RunnerConfig::default(),
         websearch:            WebsearchConfig::default(),
         clipboard:            ClipboardConfig::default(),
         calc:                 CalcConfig::default(),
         symbols:              SymbolsConfig::default(),
      }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
   pub icon:          String,
   pub min_score:     i32,
   pub roots:         Vec<PathBuf>,
   pub max_depth:     usize,
   pub hidden:        bool,
   pub max_entries:   usize,
   /// Words placed before `xdg-open`, e.g. `uwsm app --`.
   pub launch_prefix: String,
}

impl Default for FilesConfig {
   fn default() -> Self {
      Self {
         icon:          "folder".to_string(),
         min_score:     50,
         roots:         Vec::new(),
         max_depth:     8,
         hidden:        false,
         max_entries:   200_000,
         launch_prefix: String::new(),
      }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenusConfig {
   pub icon:      String,
   pub min_score: i32,
   pub paths:     Vec<PathBuf>,
}

impl Default for MenusConfig {
   fn default() -> Self {
      Self { icon: "view-list".to_string(), min_score: 10, paths: Vec::new() }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
   pub icon:      String,
   pub min_score: i32,
   pub prefix:    String,
}

impl Default for RunnerConfig {
   fn default() -> Self {
      Self { icon: "utilities-terminal".to_string(), min_score: 50, prefix: String::new() }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsearchConfig {
   pub icon:      String,
   pub min_score: i32,
   pub opener:    String,
   pub engines:   Vec<SearchEngine>,
}

impl Default for WebsearchConfig {
   fn default() -> Self {
      Self {
         icon:      "applications-internet".to_string(),
         min_score: 10,
         opener:    "xdg-open".to_string(),
         engines:   vec![SearchEngine {
            name:    "DuckDuckGo".to_string(),
            url:     "https://duckduckgo.com/?q=%TERM%".to_string(),
            icon:    String::new(),
            default: true,
         }],
      }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchEngine {
   pub name:    String,
   pub url:     String,
   #[serde(default)]
   pub icon:    String,
   #[serde(default)]
   pub default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
   pub icon:      String,
   pub min_score: i32,
   pub max_items: usize,
}

impl Default for ClipboardConfig {
   fn default() -> Self {
      Self { icon: "edit-paste".to_string(), min_score: 30, max_items: 100 }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
   pub icon:      String,
   pub max_items: usize,
   /// Evaluator; the query is appended as its last argument.
   pub command:   String,
}

impl Default for CalcConfig {
   fn default() -> Self {
      Self { icon: "accessories-calculator".to_string(), max_items: 100, command: "qalc -t".to_string() }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolsConfig {
   pub icon:      String,
   pub min_score: i32,
   pub locale:    String,
   /// CLDR annotation files. Empty means the system files for `locale`.
   pub paths:     Vec<PathBuf>,
}

impl Default for SymbolsConfig {
   fn default() -> Self {
      Self {
         icon:      "face-smile".to_string(),
         min_score: 0,
         locale:    "en".to_string(),
         paths:     Vec::new(),
      }
   }
}

/// Settings the query engine needs, decoupled from the global config so
/// engines can be instantiated freely in tests.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
   pub reaper_interval: Duration,
   pub session_idle:    Duration,
   pub usage_boost:     bool,
}

impl Default for EngineConfig {
   fn default() -> Self {
      Self {
         reaper_interval: Duration::from_secs(60),
         session_idle:    Duration::from_secs(60),
         usage_boost:     true,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      let config_path = ensure_config_file();

      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(config_path))
         .merge(Env::prefixed("TUSK_").lowercase(true).split("__"))
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   pub fn engine(&self) -> EngineConfig {
      EngineConfig {
         reaper_interval: Duration::from_secs(self.reaper_interval_secs.max(1)),
         session_idle:    Duration::from_secs(self.session_idle_secs),
         usage_boost:     self.usage_boost,
      }
   }

   pub fn effective_max_frame_bytes(&self) -> usize {
      self.max_frame_bytes.clamp(1, MAX_FRAME_BYTES_CAP)
   }

   pub fn is_disabled(&self, provider: &str) -> bool {
      self.disabled_providers.iter().any(|p| p == provider)
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      if let Ok(toml) = toml::to_string_pretty(&Self::default()) {
         let _ = fs::write(path, toml);
      }
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Overrides the configuration directory. Must run before the first `get()`.
pub fn set_config_dir(dir: PathBuf) -> Result<()> {
   CONFIG_DIR
      .set(dir)
      .map_err(|dir| ConfigError::Invalid(format!("config dir already set to {}", dir.display())))?;
   Ok(())
}

/// Returns the directory holding `config.toml` and `menus/`
pub fn config_dir() -> &'static PathBuf {
   CONFIG_DIR.get_or_init(|| {
      BaseDirs::new()
         .map(|d| d.config_dir().join("tusk"))
         .or_else(|| {
            std::env::var("HOME")
               .ok()
               .map(|h| PathBuf::from(h).join(".config").join("tusk"))
         })
         .unwrap_or_else(|| PathBuf::from(".tusk"))
   })
}

pub fn config_file_path() -> PathBuf {
   config_dir().join("config.toml")
}

pub fn menus_dir() -> PathBuf {
   config_dir().join("menus")
}

fn ensure_config_file() -> PathBuf {
   let path = config_file_path();
   if !path.exists() {
      Config::create_default_config(&path);
   }
   path
}
