//! Calculator and unit conversion through `qalc`, with an in-memory history
//! of saved results.

use std::{collections::HashMap, process::Stdio};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use super::{identifier, spawn_program, split_command};
use crate::{
   Result,
   config::CalcConfig,
   error::ProviderError,
   provider::{Activation, Provider, QueryContext},
   types::{Item, Qid},
};

pub const NAME: &str = "calc";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Calculation {
   identifier: String,
   input:      String,
   result:     String,
}

pub struct CalcProvider {
   cfg:     CalcConfig,
   /// Newest first.
   history: Mutex<Vec<Calculation>>,
   results: Mutex<HashMap<Qid, HashMap<String, Calculation>>>,
}

impl CalcProvider {
   pub fn new(cfg: CalcConfig) -> Self {
      Self { cfg, history: Mutex::new(Vec::new()), results: Mutex::new(HashMap::new()) }
   }

   pub fn history_len(&self) -> usize {
      self.history.lock().len()
   }

   /// Runs the configured command with `input` as its last argument.
   async fn evaluate(&self, input: &str) -> Result<String> {
      let mut argv = split_command(NAME, &self.cfg.command)?;
      argv.push(input.to_string());
      let Some((program, args)) = argv.split_first() else {
         return Err(ProviderError::InvalidCommand { provider: NAME.to_string(), command: String::new() }
            .into());
      };

      let output = Command::new(program)
         .args(args)
         .stdin(Stdio::null())
         .kill_on_drop(true)
         .output()
         .await
         .map_err(|source| ProviderError::Spawn {
            provider: NAME.to_string(),
            command: program.clone(),
            source,
         })?;
      if !output.status.success() {
         return Err(ProviderError::Task {
            provider: NAME.to_string(),
            reason:   format!("'{program}' exited with {}", output.status),
         }
         .into());
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
   }

   fn save(&self, calculation: Calculation) {
      let mut history = self.history.lock();
      history.retain(|c| c.identifier != calculation.identifier);
      history.insert(0, calculation);
      history.truncate(self.cfg.max_items.max(1));
   }

   /// Finds an item in the history, or else among the qid's fresh results.
   /// The flag is true for fresh results.
   fn find(&self, qid: Qid, identifier: &str) -> Option<(Calculation, bool)> {
      if let Some(saved) = self.history.lock().iter().find(|c| c.identifier == identifier) {
         return Some((saved.clone(), false));
      }
      self
         .results
         .lock()
         .get(&qid)
         .and_then(|r| r.get(identifier))
         .map(|c| (c.clone(), true))
   }
}

#[async_trait]
impl Provider for CalcProvider {
   fn name(&self) -> &str {
      NAME
   }

   fn name_pretty(&self) -> &str {
      "Calculator/Unit-Conversion"
   }

   fn icon(&self) -> String {
      self.cfg.icon.clone()
   }

   fn doc(&self) -> String {
      format!(
         "### Calculator/Unit-Conversion\nEvaluates the query with `{}` and keeps a history of saved \
          results.\nActions: copy (default, also saves), save, delete.\nmax_items = {}\n",
         self.cfg.command, self.cfg.max_items,
      )
   }

   async fn query(&self, ctx: QueryContext) -> Result<Vec<Item>> {
      let max = self.cfg.max_items as i32;
      let mut items = Vec::new();

      if !ctx.text.is_empty() {
         match self.evaluate(&ctx.text).await {
            Ok(result) if !result.is_empty() => {
               let calculation =
                  Calculation { identifier: identifier(&[&ctx.text]), input: ctx.text.clone(), result };
               items.push(
                  Item::new(NAME, &calculation.identifier, &calculation.result)
                     .with_subtext(&calculation.input)
                     .with_icon(&self.cfg.icon)
                     .with_score(max + 1),
               );
               self
                  .results
                  .lock()
                  .entry(ctx.qid)
                  .or_default()
                  .insert(calculation.identifier.clone(), calculation);
            },
            Ok(_) => {},
            Err(e) => tracing::debug!(provider = NAME, "evaluation failed: {e}"),
         }
      }

      let history = self.history.lock();
      items.extend(history.iter().enumerate().map(|(idx, c)| {
         Item::new(NAME, &c.identifier, &c.result)
            .with_subtext(&c.input)
            .with_icon(&self.cfg.icon)
            .with_score(max - idx as i32)
      }));
      Ok(items)
   }

   async fn activate(&self, activation: Activation) -> Result<()> {
      let unknown_item = || ProviderError::UnknownItem {
         provider:   NAME.to_string(),
         identifier: activation.identifier.clone(),
      };

      match activation.action.as_str() {
         "" | "copy" => {
            let (calculation, fresh) =
               self.find(activation.qid, &activation.identifier).ok_or_else(unknown_item)?;
            spawn_program(NAME, "wl-copy", &[], Some(calculation.result.clone().into_bytes()))?;
            if fresh {
               self.save(calculation);
            }
            Ok(())
         },
         "save" => {
            let (calculation, fresh) =
               self.find(activation.qid, &activation.identifier).ok_or_else(unknown_item)?;
            if fresh {
               self.save(calculation);
            }
            Ok(())
         },
         "delete" => {
            let mut history = self.history.lock();
            let idx = history
               .iter()
               .position(|c| c.identifier == activation.identifier)
               .ok_or_else(unknown_item)?;
            history.remove(idx);
            Ok(())
         },
         other => Err(ProviderError::UnknownAction {
            provider: NAME.to_string(),
            action:   other.to_string(),
         }
         .into()),
      }
   }

   fn cleanup(&self, qid: Qid) {
      self.results.lock().remove(&qid);
   }
}
