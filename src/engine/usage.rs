//! In-memory usage history.
//!
//! Every successful activation is remembered under its provider, the query
//! text that found it and the item identifier. Later queries extending a
//! remembered text boost those items: more for frequent use, less the longer
//! ago the last use was. Nothing is persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::Item;

/// Uses counted per query before the count saturates.
const MAX_USES: u32 = 10;
/// Boost per use on the day of use; decays by one per day.
const BOOST_PER_USE: i64 = 10;

#[derive(Debug, Clone, Copy)]
struct Usage {
   uses:      u32,
   last_used: DateTime<Utc>,
}

/// provider → query text → identifier → usage
#[derive(Debug, Default)]
pub struct UsageHistory {
   data: HashMap<String, HashMap<String, HashMap<String, Usage>>>,
}

impl UsageHistory {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn record(&mut self, provider: &str, query: &str, identifier: &str, now: DateTime<Utc>) {
      let usage = self
         .data
         .entry(provider.to_string())
         .or_default()
         .entry(query.to_string())
         .or_default()
         .entry(identifier.to_string())
         .or_insert(Usage { uses: 0, last_used: now });
      usage.uses = (usage.uses + 1).min(MAX_USES);
      usage.last_used = now;
   }

   /// `max((10 - days since last use) * uses, 1)`, summing the uses of every
   /// remembered text that prefixes `query`, or of all of them for an empty
   /// query. Zero for items never used.
   pub fn score(&self, provider: &str, query: &str, identifier: &str, now: DateTime<Utc>) -> i32 {
      let Some(queries) = self.data.get(provider) else {
         return 0;
      };

      let mut uses = 0i64;
      let mut last: Option<DateTime<Utc>> = None;
      for (text, items) in queries {
         if !query.is_empty() && !query.starts_with(text.as_str()) {
            continue;
         }
         if let Some(usage) = items.get(identifier) {
            uses += i64::from(usage.uses);
            last = last.max(Some(usage.last_used));
         }
      }

      let Some(last) = last else {
         return 0;
      };
      let days = (now - last).num_days().max(0);
      let boost = ((BOOST_PER_USE - days) * uses).max(1);
      i32::try_from(boost).unwrap_or(i32::MAX)
   }

   /// Adds the usage score to every item.
   pub fn boost(&self, query: &str, items: &mut [Item], now: DateTime<Utc>) {
      if self.data.is_empty() {
         return;
      }
      for item in items {
         let bonus = self.score(&item.provider, query, &item.identifier, now);
         item.score = item.score.saturating_add(bonus);
      }
   }
}

#[cfg(test)]
mod tests {
   use chrono::Duration;

   use super::*;

   #[test]
   fn unused_items_get_nothing() {
      let history = UsageHistory::new();
      assert_eq!(history.score("files", "re", "a", Utc::now()), 0);
   }

   #[test]
   fn boost_grows_with_use_and_applies_to_extensions() {
      let mut history = UsageHistory::new();
      let now = Utc::now();

      history.record("files", "re", "a", now);
      assert_eq!(history.score("files", "re", "a", now), 10);
      assert_eq!(history.score("files", "repo", "a", now), 10);
      assert_eq!(history.score("files", "r", "a", now), 0);
      assert_eq!(history.score("menus", "re", "a", now), 0);

      history.record("files", "", "a", now);
      history.record("files", "re", "a", now);
      assert_eq!(history.score("files", "re", "a", now), 30);
      assert_eq!(history.score("files", "x", "a", now), 10);
      assert_eq!(history.score("files", "", "a", now), 30);
   }

   #[test]
   fn boost_decays_by_day_and_never_drops_below_one() {
      let mut history = UsageHistory::new();
      let then = Utc::now();
      history.record("files", "re", "a", then);
      history.record("files", "re", "a", then);

      assert_eq!(history.score("files", "re", "a", then + Duration::days(3)), 14);
      assert_eq!(history.score("files", "re", "a", then + Duration::days(40)), 1);
   }

   #[test]
   fn uses_saturate() {
      let mut history = UsageHistory::new();
      let now = Utc::now();
      for _ in 0..25 {
         history.record("files", "", "a", now);
      }
      assert_eq!(history.score("files", "", "a", now), 100);
   }

   #[test]
   fn boost_adds_to_item_scores() {
      let mut history = UsageHistory::new();
      let now = Utc::now();
      history.record("files", "al", "2", now);

      let mut items = vec![
         Item::new("files", "1", "alpha").with_score(5),
         Item::new("files", "2", "alps").with_score(1),
      ];
      history.boost("alp", &mut items, now);
      assert_eq!(items[0].score, 5);
      assert_eq!(items[1].score, 11);
   }
}
