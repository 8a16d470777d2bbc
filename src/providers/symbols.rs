//! Symbols and emojis searchable by their CLDR annotation keywords.

use std::{
   collections::BTreeMap,
   fs,
   path::{Path, PathBuf},
};

use async_trait::async_trait;
use quick_xml::{Reader, events::Event};

use super::{identifier, spawn_program};
use crate::{
   Result,
   config::SymbolsConfig,
   error::ProviderError,
   fuzzy,
   provider::{Activation, Provider, QueryContext},
   types::{FuzzyInfo, Item},
};

pub const NAME: &str = "symbols";

const CLDR_DIR: &str = "/usr/share/unicode/cldr/common";
const BUILTIN: &str = include_str!("../../data/annotations.xml");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbol {
   pub cp:       String,
   pub keywords: Vec<String>,
}

/// Merges the `<annotation>` elements of one CLDR file into `symbols`,
/// keyed by item identifier. Returns how many elements were read.
///
/// Plain annotations hold `|`-separated keywords; `type="tts"` ones hold a
/// single spoken name.
pub fn parse_annotations(xml: &str, symbols: &mut BTreeMap<String, Symbol>) -> quick_xml::Result<usize> {
   let mut reader = Reader::from_str(xml);
   let mut current: Option<(String, bool)> = None;
   let mut count = 0;

   loop {
      match reader.read_event()? {
         Event::Start(e) if e.name().as_ref() == b"annotation" => {
            let Some(cp) = e.try_get_attribute("cp")? else {
               continue;
            };
            let cp = cp.unescape_value()?.into_owned();
            let tts = e.try_get_attribute("type")?.is_some();
            current = Some((cp, tts));
         },
         Event::Text(text) => {
            let Some((cp, tts)) = &current else {
               continue;
            };
            let text = text.unescape()?;
            let symbol = symbols
               .entry(identifier(&[cp]))
               .or_insert_with(|| Symbol { cp: cp.clone(), keywords: Vec::new() });
            if *tts {
               symbol.keywords.push(text.trim().to_string());
            } else {
               symbol
                  .keywords
                  .extend(text.split('|').map(str::trim).filter(|k| !k.is_empty()).map(str::to_string));
            }
            count += 1;
         },
         Event::End(e) if e.name().as_ref() == b"annotation" => current = None,
         Event::Eof => break,
         _ => {},
      }
   }
   Ok(count)
}

pub struct SymbolsProvider {
   cfg:     SymbolsConfig,
   symbols: BTreeMap<String, Symbol>,
}

impl SymbolsProvider {
   /// Loads the configured annotation files, or the system CLDR files for
   /// the locale. Falls back to a small built-in English set when nothing
   /// could be read.
   pub fn load(cfg: SymbolsConfig) -> Self {
      let paths = if cfg.paths.is_empty() { default_paths(&cfg.locale) } else { cfg.paths.clone() };

      let mut symbols = BTreeMap::new();
      for path in paths.iter().filter(|p| p.is_file()) {
         if let Err(e) = load_file(path, &mut symbols) {
            tracing::warn!(provider = NAME, path = %path.display(), "skipping annotations: {e}");
         }
      }
      if symbols.is_empty() {
         if let Err(e) = parse_annotations(BUILTIN, &mut symbols) {
            tracing::error!(provider = NAME, "built-in annotations: {e}");
         }
      }

      tracing::info!(provider = NAME, symbols = symbols.len(), "symbols loaded");
      Self { cfg, symbols }
   }

   pub fn len(&self) -> usize {
      self.symbols.len()
   }

   pub fn is_empty(&self) -> bool {
      self.symbols.is_empty()
   }

   fn item(&self, id: &str, symbol: &Symbol, ctx: &QueryContext) -> Option<Item> {
      let item = Item::new(NAME, id, &symbol.cp).with_icon(&symbol.cp);
      if ctx.text.is_empty() {
         return Some(item);
      }

      let (keyword, m) = symbol
         .keywords
         .iter()
         .filter_map(|k| fuzzy::score(&ctx.text, k, ctx.exact).map(|m| (k, m)))
         .max_by_key(|(_, m)| m.score)?;
      if m.score < self.cfg.min_score {
         return None;
      }

      let mut item = item.with_subtext(keyword).with_score(m.score);
      item.fuzzy = Some(FuzzyInfo { field: "subtext".to_string(), positions: m.positions, start: m.start });
      Some(item)
   }
}

fn default_paths(locale: &str) -> Vec<PathBuf> {
   ["annotations", "annotationsDerived"]
      .iter()
      .map(|dir| Path::new(CLDR_DIR).join(dir).join(format!("{locale}.xml")))
      .collect()
}

fn load_file(path: &Path, symbols: &mut BTreeMap<String, Symbol>) -> Result<()> {
   let xml = fs::read_to_string(path)?;
   parse_annotations(&xml, symbols).map_err(|e| ProviderError::Task {
      provider: NAME.to_string(),
      reason:   e.to_string(),
   })?;
   Ok(())
}

#[async_trait]
impl Provider for SymbolsProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Symbols/Emojis"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      format!(
         "### Symbols/Emojis\nFind symbols and emojis by keyword and copy them. Requires wl-clipboard.\n\
          locale = {}\nsymbols = {}\n",
         self.cfg.locale,
         self.symbols.len(),
      )
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      let items = match &ctx.domain {
         Some(domain) => domain
            .iter()
            .filter_map(|prev| {
               let symbol = self.symbols.get(&prev.identifier)?;
               self.item(&prev.identifier, symbol, &ctx)
            })
            .collect(),
         None => self
            .symbols
            .iter()
            .filter_map(|(id, symbol)| self.item(id, symbol, &ctx))
            .collect(),
      };
      Ok(items)
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      if !matches!(activation.action.as_str(), "" | "copy") {
         return Err(ProviderError::UnknownAction {
            provider: NAME.to_string(),
            action:   activation.action.clone(),
         }
         .into());
      }
      let symbol = self.symbols.get(&activation.identifier).ok_or_else(|| ProviderError::UnknownItem {
         provider:   NAME.to_string(),
         identifier: activation.identifier.clone(),
      })?;
      spawn_program(NAME, "wl-copy", &[], Some(symbol.cp.clone().into_bytes()))
   }
}
