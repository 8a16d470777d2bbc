//! Web search shortcuts built from configured URL templates.

use async_trait::async_trait;

use super::launch;
use crate::{
   Result,
   config::{SearchEngine, WebsearchConfig},
   error::ProviderError,
   provider::{Activation, Provider, QueryContext},
   types::Item,
};

pub const NAME: &str = "websearch";
pub const TERM_PLACEHOLDER: &str = "%TERM%";

pub struct WebsearchProvider {
   cfg: WebsearchConfig,
}

impl WebsearchProvider {
   pub const fn new(cfg: WebsearchConfig) -> Self {
      Self { cfg }
   }

   fn item(&self, idx: usize, engine: &SearchEngine) -> Item {
      let icon = if engine.icon.is_empty() { &self.cfg.icon } else { &engine.icon };
      Item::new(NAME, idx.to_string(), &engine.name)
         .with_icon(icon)
         .with_score(100 - idx as i32)
   }
}

/// Substitutes the url-encoded term into an engine's URL template.
pub fn expand_url(template: &str, term: &str) -> String {
   template.replace(TERM_PLACEHOLDER, &urlencoding::encode(term))
}

#[async_trait]
impl Provider for WebsearchProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Websearch"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      let engines: Vec<String> = self
         .cfg
         .engines
         .iter()
         .map(|e| format!("- {} ({}){}", e.name, e.url, if e.default { " [default]" } else { "" }))
         .collect();
      format!(
         "### Websearch\nSearch the web with configured engines. The query is passed as the \
          activation argument and substituted for `{TERM_PLACEHOLDER}`.\n{}\n",
         engines.join("\n"),
      )
   }

   /// Every engine when queried alone, otherwise only default engines.
   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      Ok(self
         .cfg
         .engines
         .iter()
         .enumerate()
         .filter(|(_, e)| ctx.single || e.default)
         .map(|(idx, e)| self.item(idx, e))
         .collect())
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      let engine = activation
         .identifier
         .parse::<usize>()
         .ok()
         .and_then(|idx| self.cfg.engines.get(idx))
         .ok_or_else(|| ProviderError::UnknownItem {
            provider:   NAME.to_string(),
            identifier: activation.identifier.clone(),
         })?;
      let url = expand_url(&engine.url, &activation.arguments);
      launch(NAME, &self.cfg.opener, &[&url])
   }
}
