//! Offline inspection of the providers the current config would load.

use console::style;

use crate::{Result, config, error::ProviderError, provider::EventBus, providers};

/// Lists enabled providers.
pub fn execute(json: bool) -> Result<()> {
   let registry = providers::build(config::get(), &EventBus::new())?;

   if json {
      let list: Vec<_> = registry
         .iter()
         .map(|p| {
            serde_json::json!({
               "name": p.name(),
               "name_pretty": p.name_pretty(),
               "icon": p.icon(),
            })
         })
         .collect();
      println!("{}", serde_json::to_string_pretty(&list)?);
      return Ok(());
   }

   for p in registry.iter() {
      println!("{:<14} {}", style(p.name()).cyan(), style(p.name_pretty()).dim());
   }
   Ok(())
}

/// Prints one provider's documentation, or every provider's when `name` is
/// `None`.
pub fn doc(name: Option<String>) -> Result<()> {
   let registry = providers::build(config::get(), &EventBus::new())?;
   match name {
      Some(name) => {
         let (provider, _) = registry
            .resolve(&name)
            .ok_or(ProviderError::Unknown(name))?;
         println!("{}", provider.doc());
      },
      None => {
         for provider in registry.iter() {
            println!("{}", provider.doc());
         }
      },
   }
   Ok(())
}
