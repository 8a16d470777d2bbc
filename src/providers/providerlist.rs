//! Lists the other providers so a client can switch into one.

use async_trait::async_trait;

use super::score_item;
use crate::{
   Result,
   provider::{Activation, Provider, QueryContext, Registry},
   types::Item,
};

pub const NAME: &str = "providerlist";
const ICON: &str = "view-grid";

#[derive(Debug, Clone)]
struct Entry {
   name:        String,
   name_pretty: String,
   icon:        String,
}

pub struct ProviderList {
   entries: Vec<Entry>,
}

impl ProviderList {
   /// Snapshots the providers registered so far.
   pub fn from_registry(registry: &Registry) -> Self {
      let entries = registry
         .iter()
         .filter(|p| p.name() != NAME)
         .map(|p| Entry {
            name:        p.name().to_string(),
            name_pretty: p.name_pretty().to_string(),
            icon:        p.icon(),
         })
         .collect();
      Self { entries }
   }
}

#[async_trait]
impl Provider for ProviderList {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Providerlist"
   }

   fn icon(&self) -> String {
      ICON.to_string()
   }

   fn doc(&self) -> String {
      "### Providerlist\nLists all loaded providers. The identifier of each item is the provider name.\n"
         .to_string()
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      Ok(self
         .entries
         .iter()
         .filter_map(|e| {
            let item = Item::new(NAME, &e.name, &e.name_pretty)
               .with_subtext(&e.name)
               .with_icon(&e.icon);
            score_item(item, &ctx, 0)
         })
         .collect())
   }

   /// Switching providers happens client side.
   async fn activate(&self, _activation: Activation) -> Result<()> {
      Ok(())
   }
}
