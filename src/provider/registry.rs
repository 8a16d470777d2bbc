use std::{collections::BTreeMap, sync::Arc};

use super::{Provider, split_scope};

/// Name → provider map, built once at startup and read-only afterwards
#[derive(Default)]
pub struct Registry {
   providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl Registry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Adds a provider under its own name, replacing any previous one.
   pub fn register(&mut self, provider: Arc<dyn Provider>) {
      let name = provider.name().to_string();
      if self.providers.insert(name.clone(), provider).is_some() {
         tracing::warn!(provider = %name, "provider registered twice, keeping the last one");
      }
   }

   pub fn get(&self, name: &str) -> Option<&Arc<dyn Provider>> {
      self.providers.get(name)
   }

   /// Looks up a possibly scoped name such as `menus:power`.
   pub fn resolve(&self, name: &str) -> Option<(Arc<dyn Provider>, Option<String>)> {
      let (base, scope) = split_scope(name);
      self
         .providers
         .get(base)
         .map(|p| (Arc::clone(p), scope.map(str::to_string)))
   }

   pub fn names(&self) -> impl Iterator<Item = &str> {
      self.providers.keys().map(String::as_str)
   }

   pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
      self.providers.values()
   }

   pub fn len(&self) -> usize {
      self.providers.len()
   }

   pub fn is_empty(&self) -> bool {
      self.providers.is_empty()
   }

   /// Kicks off every provider's background work.
   pub fn start_all(&self) {
      for provider in self.providers.values() {
         tracing::debug!(provider = provider.name(), "starting provider");
         Arc::clone(provider).start();
      }
   }
}

impl std::fmt::Debug for Registry {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_list().entries(self.providers.keys()).finish()
   }
}
