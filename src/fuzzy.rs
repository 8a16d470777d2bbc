//! Text-similarity scoring shared by all providers.
//!
//! Wraps `nucleo-matcher` behind a pure function. Smart case: a query with no
//! uppercase characters matches case-insensitively.

use std::cell::RefCell;

use nucleo_matcher::{Config, Matcher, Utf32Str};

use crate::types::FuzzyInfo;

/// Floor applied by [`prioritised`] so a weak but real match still ranks.
pub const MIN_PRIORITISED: i32 = 10;

thread_local! {
   static MATCHER: RefCell<Matcher> = RefCell::new(Matcher::new(Config::DEFAULT));
}

/// Outcome of matching one query against one candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzyMatch {
   pub score:     i32,
   /// Matched character offsets, ascending.
   pub positions: Vec<u32>,
   /// Offset of the first matched character.
   pub start:     u32,
}

/// Scores `candidate` against `query`.
///
/// Exact mode requires a literal substring; fuzzy mode accepts any in-order
/// character subsequence. An empty query matches everything with score 0.
pub fn score(query: &str, candidate: &str, exact: bool) -> Option<FuzzyMatch> {
   if query.is_empty() {
      return Some(FuzzyMatch::default());
   }

   let smart_case = query.chars().any(char::is_uppercase);
   let needle = if smart_case { query.to_string() } else { query.to_lowercase() };

   MATCHER.with_borrow_mut(|matcher| {
      matcher.config.ignore_case = !smart_case;

      let mut hay_buf = Vec::new();
      let mut needle_buf = Vec::new();
      let haystack = Utf32Str::new(candidate, &mut hay_buf);
      let needle = Utf32Str::new(&needle, &mut needle_buf);

      let mut positions = Vec::new();
      let score = if exact {
         matcher.substring_indices(haystack, needle, &mut positions)
      } else {
         matcher.fuzzy_indices(haystack, needle, &mut positions)
      }?;

      positions.sort_unstable();
      positions.dedup();
      let start = positions.first().copied().unwrap_or(0);
      Some(FuzzyMatch { score: i32::from(score), positions, start })
   })
}

/// Penalises matches in later fields and late match starts:
/// `max(score - min(field_index * 10, 50) - start, 10)`.
pub fn prioritised(score: i32, field_index: usize, start: u32) -> i32 {
   let field_penalty = (field_index as i32).saturating_mul(10).min(50);
   let start = i32::try_from(start).unwrap_or(i32::MAX);
   score
      .saturating_sub(field_penalty)
      .saturating_sub(start)
      .max(MIN_PRIORITISED)
}

/// Matches a query against several named fields in priority order and keeps
/// the best prioritised score. Empty fields are skipped.
pub fn best_field(query: &str, fields: &[(&str, &str)], exact: bool) -> Option<(i32, FuzzyInfo)> {
   let mut best: Option<(i32, FuzzyInfo)> = None;

   for (idx, (name, value)) in fields.iter().enumerate() {
      if value.is_empty() {
         continue;
      }
      let Some(m) = score(query, value, exact) else {
         continue;
      };
      let total = prioritised(m.score, idx, m.start);
      if best.as_ref().is_none_or(|(s, _)| total > *s) {
         best = Some((
            total,
            FuzzyInfo { field: (*name).to_string(), positions: m.positions, start: m.start },
         ));
      }
   }

   best
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn fuzzy_accepts_subsequence() {
      let m = score("frx", "firefox", false).expect("match");
      assert!(m.score > 0);
      assert_eq!(m.positions.len(), 3);
      assert_eq!(m.start, 0);
   }

   #[test]
   fn exact_requires_substring() {
      assert!(score("frx", "firefox", true).is_none());
      let m = score("fox", "firefox", true).expect("match");
      assert_eq!(m.positions, vec![4, 5, 6]);
      assert_eq!(m.start, 4);
   }

   #[test]
   fn smart_case() {
      assert!(score("fire", "FireFox", false).is_some());
      assert!(score("Fire", "firefox", false).is_none());
   }

   #[test]
   fn empty_query_matches_everything() {
      assert_eq!(score("", "anything", false), Some(FuzzyMatch::default()));
   }

   #[test]
   fn no_match() {
      assert!(score("zzz", "firefox", false).is_none());
   }

   #[test]
   fn prioritised_applies_penalties_and_floor() {
      assert_eq!(prioritised(100, 0, 0), 100);
      assert_eq!(prioritised(100, 2, 5), 75);
      assert_eq!(prioritised(100, 9, 0), 50);
      assert_eq!(prioritised(30, 3, 10), MIN_PRIORITISED);
   }

   #[test]
   fn best_field_prefers_first_field_on_equal_match() {
      let (score, info) =
         best_field("term", &[("text", "terminal"), ("subtext", "terminal")], false).unwrap();
      assert_eq!(info.field, "text");
      assert!(score >= MIN_PRIORITISED);
   }

   #[test]
   fn best_field_skips_empty_and_non_matching() {
      let (_, info) =
         best_field("gimp", &[("text", ""), ("subtext", "nope"), ("value", "gimp-2.10")], false)
            .unwrap();
      assert_eq!(info.field, "value");
      assert!(best_field("zzz", &[("text", "abc")], false).is_none());
   }
}
