//! Query sessions and their iterations.
//!
//! The table is the single authority on staleness: an iteration is current
//! only while its iid equals the session's latest iid. All mutations happen
//! under the engine's lock and never span a provider call or a socket write.

use std::{
   collections::HashMap,
   sync::Arc,
   time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::types::{ConnId, Iid, Item, Qid};

/// Iterations kept per session; the oldest are dropped first.
const MAX_ITERATIONS: usize = 32;

/// Per-provider candidate sets, keyed by the requested (possibly scoped) name
pub type ResultCache = HashMap<String, Arc<[Item]>>;

#[derive(Debug)]
pub struct Iteration {
   pub iid:      Iid,
   pub text:     String,
   pub exact:    bool,
   pub complete: bool,
   pub results:  ResultCache,
}

#[derive(Debug)]
pub struct Session {
   pub qid:        Qid,
   pub conn:       ConnId,
   /// Requested provider names, sorted and deduplicated.
   pub providers:  Vec<String>,
   pub last_touch: Instant,
   /// Empty-query sessions are never continued.
   pub resumable:  bool,
   pub current:    Iid,
   pub iterations: Vec<Iteration>,
   pub cancel:     CancellationToken,
}

impl Session {
   /// Longest completed iteration whose text prefixes `text` in the same mode.
   fn narrowing_source(&self, text: &str, exact: bool) -> Option<&Iteration> {
      self
         .iterations
         .iter()
         .filter(|it| it.complete && it.exact == exact && text.starts_with(it.text.as_str()))
         .max_by_key(|it| (it.text.len(), it.iid))
   }

   /// Length of the longest iteration text that prefixes `text`.
   fn prefix_len(&self, text: &str) -> Option<usize> {
      self
         .iterations
         .iter()
         .filter(|it| text.starts_with(it.text.as_str()))
         .map(|it| it.text.len())
         .max()
   }
}

/// What a caller needs to run one iteration
#[derive(Debug, Clone)]
pub struct Ticket {
   pub qid:     Qid,
   pub iid:     Iid,
   /// Whether an existing session was continued.
   pub resumed: bool,
   pub domains: ResultCache,
   pub cancel:  CancellationToken,
}

#[derive(Debug, Default)]
pub struct SessionTable {
   last_qid: Qid,
   sessions: HashMap<Qid, Session>,
}

impl SessionTable {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn len(&self) -> usize {
      self.sessions.len()
   }

   pub fn is_empty(&self) -> bool {
      self.sessions.is_empty()
   }

   /// Resolves the session a query belongs to, bumps its iteration and
   /// captures the narrowing domains.
   ///
   /// A non-empty query continues the session on the same connection, with
   /// the same providers, holding the longest iteration text that prefixes
   /// it. Ties go to the most recently touched session. Anything else,
   /// including every empty query, opens a fresh session.
   pub fn begin(
      &mut self,
      conn: ConnId,
      providers: &[String],
      text: &str,
      exact: bool,
      now: Instant,
   ) -> Ticket {
      let mut providers = providers.to_vec();
      providers.sort_unstable();
      providers.dedup();

      let resumed = if text.is_empty() {
         None
      } else {
         self
            .sessions
            .values()
            .filter(|s| s.resumable && s.conn == conn && s.providers == providers)
            .filter_map(|s| s.prefix_len(text).map(|len| (len, s.last_touch, s.qid)))
            .max()
            .map(|(_, _, qid)| qid)
      };

      let qid = resumed.unwrap_or_else(|| {
         self.last_qid = self.last_qid.wrapping_add(1).max(1);
         self.last_qid
      });
      let session = self.sessions.entry(qid).or_insert_with(|| Session {
         qid,
         conn,
         providers,
         last_touch: now,
         resumable: !text.is_empty(),
         current: 0,
         iterations: Vec::new(),
         cancel: CancellationToken::new(),
      });

      let domains = session
         .narrowing_source(text, exact)
         .map(|it| it.results.clone())
         .unwrap_or_default();

      session.current += 1;
      session.last_touch = now;
      session.iterations.push(Iteration {
         iid: session.current,
         text: text.to_string(),
         exact,
         complete: false,
         results: ResultCache::new(),
      });
      if session.iterations.len() > MAX_ITERATIONS {
         let excess = session.iterations.len() - MAX_ITERATIONS;
         session.iterations.drain(..excess);
      }

      Ticket {
         qid,
         iid: session.current,
         resumed: resumed.is_some(),
         domains,
         cancel: session.cancel.clone(),
      }
   }

   /// Text of the newest iteration of a live session.
   pub fn last_text(&self, qid: Qid) -> Option<&str> {
      self.sessions.get(&qid)?.iterations.last().map(|it| it.text.as_str())
   }

   /// True while `iid` is the newest iteration of a live session.
   pub fn is_current(&self, qid: Qid, iid: Iid) -> bool {
      self.sessions.get(&qid).is_some_and(|s| s.current == iid)
   }

   /// Stores the candidate sets of the providers that completed `iid`.
   pub fn complete(&mut self, qid: Qid, iid: Iid, results: ResultCache) {
      let Some(session) = self.sessions.get_mut(&qid) else {
         return;
      };
      if let Some(it) = session.iterations.iter_mut().find(|it| it.iid == iid) {
         it.results = results;
         it.complete = true;
      }
   }

   /// Refreshes the last touch of `iid` while it is still current.
   pub fn touch(&mut self, qid: Qid, iid: Iid, now: Instant) -> bool {
      match self.sessions.get_mut(&qid) {
         Some(s) if s.current == iid => {
            s.last_touch = now.max(s.last_touch);
            true
         },
         _ => false,
      }
   }

   /// Removes and returns every session whose last touch is older than
   /// `idle` at `now`. Selection and removal happen in one pass, so a
   /// session touched concurrently is either kept or taken whole.
   pub fn take_idle(&mut self, now: Instant, idle: Duration) -> Vec<Session> {
      let idle: Vec<Qid> = self
         .sessions
         .values()
         .filter(|s| now.saturating_duration_since(s.last_touch) > idle)
         .map(|s| s.qid)
         .collect();
      idle.into_iter().filter_map(|qid| self.sessions.remove(&qid)).collect()
   }

   pub fn remove(&mut self, qid: Qid) -> Option<Session> {
      self.sessions.remove(&qid)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn names(list: &[&str]) -> Vec<String> {
      list.iter().map(|s| (*s).to_string()).collect()
   }

   #[test]
   fn prefix_extension_keeps_qid() {
      let mut table = SessionTable::new();
      let now = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "r", false, now);
      let b = table.begin(1, &p, "re", false, now);
      let c = table.begin(1, &p, "rep", false, now);
      assert_eq!(a.qid, b.qid);
      assert_eq!(b.qid, c.qid);
      assert_eq!((a.iid, b.iid, c.iid), (1, 2, 3));
      assert!(!a.resumed && b.resumed && c.resumed);
   }

   #[test]
   fn unrelated_query_opens_new_session() {
      let mut table = SessionTable::new();
      let now = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "rep", false, now);
      let b = table.begin(1, &p, "xyz", false, now);
      assert_ne!(a.qid, b.qid);
      assert_eq!(b.iid, 1);
   }

   #[test]
   fn empty_query_always_fresh() {
      let mut table = SessionTable::new();
      let now = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "", false, now);
      let b = table.begin(1, &p, "", false, now);
      let c = table.begin(1, &p, "a", false, now);
      assert_ne!(a.qid, b.qid);
      assert_ne!(b.qid, c.qid);
      assert_eq!(c.iid, 1);
   }

   #[test]
   fn sessions_are_per_connection_and_provider_set() {
      let mut table = SessionTable::new();
      let now = Instant::now();

      let a = table.begin(1, &names(&["files"]), "re", false, now);
      let b = table.begin(2, &names(&["files"]), "rep", false, now);
      let c = table.begin(1, &names(&["menus"]), "rep", false, now);
      let d = table.begin(1, &names(&["files", "files"]), "rep", false, now);
      assert_ne!(a.qid, b.qid);
      assert_ne!(a.qid, c.qid);
      assert_eq!(a.qid, d.qid);
   }

   #[test]
   fn longest_prefix_wins() {
      let mut table = SessionTable::new();
      let t0 = Instant::now();
      let p = names(&["files"]);

      let short = table.begin(1, &p, "a", false, t0);
      let long = table.begin(1, &p, "abx", false, t0);
      assert_ne!(short.qid, long.qid);
      let pick = table.begin(1, &p, "abxy", false, t0 + Duration::from_secs(1));
      assert_eq!(pick.qid, long.qid);

      // "abx" does not prefix "ab", so only the short session qualifies.
      let back = table.begin(1, &p, "ab", false, t0 + Duration::from_secs(2));
      assert_eq!(back.qid, short.qid);
      assert_eq!(back.iid, 2);
   }

   #[test]
   fn newer_iteration_makes_older_stale() {
      let mut table = SessionTable::new();
      let now = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "r", false, now);
      assert!(table.is_current(a.qid, a.iid));
      let b = table.begin(1, &p, "re", false, now);
      assert!(!table.is_current(a.qid, a.iid));
      assert!(table.is_current(b.qid, b.iid));
      table.remove(b.qid);
      assert!(!table.is_current(b.qid, b.iid));
   }

   #[test]
   fn narrowing_uses_completed_same_mode_iterations() {
      let mut table = SessionTable::new();
      let now = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "re", false, now);
      let cached: Arc<[Item]> = vec![Item::new("files", "1", "repo")].into();
      table.complete(a.qid, a.iid, ResultCache::from([("files".to_string(), cached)]));

      let b = table.begin(1, &p, "rep", false, now);
      assert_eq!(b.domains.get("files").map(|d| d.len()), Some(1));

      // b never completed, so "repo" still narrows from "re".
      let c = table.begin(1, &p, "repo", false, now);
      assert_eq!(c.domains.get("files").map(|d| d.len()), Some(1));

      let d = table.begin(1, &p, "repos", true, now);
      assert!(d.domains.is_empty());
   }

   #[test]
   fn expiry_respects_idle_threshold() {
      let mut table = SessionTable::new();
      let t0 = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "a", false, t0);
      let b = table.begin(1, &p, "b", false, t0 + Duration::from_secs(30));
      let idle = Duration::from_secs(60);

      assert!(table.take_idle(t0 + Duration::from_secs(60), idle).is_empty());
      assert!(table.touch(a.qid, a.iid, t0 + Duration::from_secs(59)));
      assert!(table.take_idle(t0 + Duration::from_secs(61), idle).is_empty());

      let mut late: Vec<Qid> = table
         .take_idle(t0 + Duration::from_secs(200), idle)
         .into_iter()
         .map(|s| s.qid)
         .collect();
      late.sort_unstable();
      assert_eq!(late, vec![a.qid, b.qid]);
      assert!(table.is_empty());
   }

   #[test]
   fn refined_session_is_not_taken_as_idle() {
      let mut table = SessionTable::new();
      let t0 = Instant::now();
      let p = names(&["files"]);
      let idle = Duration::from_secs(60);

      let a = table.begin(1, &p, "r", false, t0);
      // A keystroke lands after the reaper sampled its clock but before it
      // got the lock; the session is fresh again and must stay.
      let b = table.begin(1, &p, "re", false, t0 + Duration::from_secs(62));
      assert_eq!(a.qid, b.qid);
      assert!(table.take_idle(t0 + Duration::from_secs(61), idle).is_empty());
      assert!(table.is_current(b.qid, b.iid));
   }

   #[test]
   fn touch_ignores_superseded_iterations() {
      let mut table = SessionTable::new();
      let t0 = Instant::now();
      let p = names(&["files"]);

      let a = table.begin(1, &p, "r", false, t0);
      let b = table.begin(1, &p, "re", false, t0);
      assert!(!table.touch(a.qid, a.iid, t0 + Duration::from_secs(30)));
      assert!(table.touch(b.qid, b.iid, t0 + Duration::from_secs(30)));
      assert!(table.take_idle(t0 + Duration::from_secs(61), Duration::from_secs(60)).is_empty());
   }
}
