//! Result items exchanged between providers, the engine and clients.

use serde::{Deserialize, Serialize};

/// Query-session identifier. Zero is reserved for "no session".
pub type Qid = u32;
/// Iteration identifier within one query session.
pub type Iid = u32;
/// Connection identifier assigned by the listener.
pub type ConnId = u32;

/// How a client should render an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
   #[default]
   Regular,
   File,
   Other,
}

/// Explanation of a fuzzy match: which field matched and where
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyInfo {
   pub field:     String,
   pub positions: Vec<u32>,
   pub start:     u32,
}

/// One candidate produced by a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
   pub identifier: String,
   pub text:       String,
   pub subtext:    String,
   pub icon:       String,
   pub provider:   String,
   pub score:      i32,
   pub kind:       ItemKind,
   pub fuzzy:      Option<FuzzyInfo>,
}

impl Item {
   pub fn new(provider: impl Into<String>, identifier: impl Into<String>, text: impl Into<String>) -> Self {
      Self {
         identifier: identifier.into(),
         text: text.into(),
         provider: provider.into(),
         ..Self::default()
      }
   }

   pub fn with_subtext(mut self, subtext: impl Into<String>) -> Self {
      self.subtext = subtext.into();
      self
   }

   pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
      self.icon = icon.into();
      self
   }

   pub const fn with_score(mut self, score: i32) -> Self {
      self.score = score;
      self
   }

   pub const fn with_kind(mut self, kind: ItemKind) -> Self {
      self.kind = kind;
      self
   }

   /// Content equality used when diffing subscription snapshots.
   pub fn same_content(&self, other: &Self) -> bool {
      self.icon == other.icon
         && self.text == other.text
         && self.subtext == other.subtext
         && self.score == other.score
   }
}
