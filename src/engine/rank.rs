//! Deterministic merge order for fan-out results.

use std::cmp::Ordering;

use crate::types::Item;

/// Score descending, then display text ascending.
pub fn compare(a: &Item, b: &Item) -> Ordering {
   b.score.cmp(&a.score).then_with(|| a.text.cmp(&b.text))
}

/// Sorts in place and keeps at most `max_results` items (zero keeps all).
pub fn rank(items: &mut Vec<Item>, max_results: u32) {
   items.sort_by(compare);
   if max_results > 0 {
      items.truncate(max_results as usize);
   }
}
