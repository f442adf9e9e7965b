//! Bounded parallel fan-out for use inside a target action.
//!
//! Targets themselves run sequentially. An action that has many independent
//! items (test projects, packages to push) can hand them to [`FanOut`], which
//! runs them on a private tokio runtime with at most `parallelism` in flight
//! and yields one [`FanOutReport`] for the owning target.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::capture;
use super::types::ExecuteError;
use crate::params::SecretStore;

#[derive(Debug, Clone)]
pub struct FanOut {
  parallelism: usize,
  tolerate_failures: bool,
  secrets: SecretStore,
}

impl Default for FanOut {
  fn default() -> Self {
    Self::new(std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4))
  }
}

/// Per-item outcome.
#[derive(Debug)]
enum ItemOutcome {
  Succeeded,
  Failed(String),
  Cancelled,
}

/// Results of a fan-out, in input order within each list.
#[derive(Debug, Default)]
pub struct FanOutReport {
  pub succeeded: Vec<String>,
  /// Item label and error message.
  pub failed: Vec<(String, String)>,
  /// Items never started because an earlier item failed.
  pub cancelled: Vec<String>,
}

impl FanOutReport {
  pub fn total(&self) -> usize {
    self.succeeded.len() + self.failed.len() + self.cancelled.len()
  }

  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }

  /// Fail the owning target if any item failed.
  pub fn into_result(self) -> Result<(), ExecuteError> {
    match self.failed.first() {
      None => Ok(()),
      Some((item, message)) => Err(ExecuteError::FanOutFailed {
        failed: self.failed.len(),
        total: self.total(),
        first: format!("{item}: {message}"),
      }),
    }
  }
}

impl FanOut {
  pub fn new(parallelism: usize) -> Self {
    Self {
      parallelism: parallelism.max(1),
      tolerate_failures: false,
      secrets: SecretStore::new(),
    }
  }

  /// Redact these secrets from item errors before they are logged or reported.
  pub fn redacting(mut self, secrets: SecretStore) -> Self {
    self.secrets = secrets;
    self
  }

  /// Keep starting items after one fails.
  pub fn tolerate_failures(mut self, tolerate: bool) -> Self {
    self.tolerate_failures = tolerate;
    self
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism
  }

  /// Run `op` for every item and wait for all of them.
  ///
  /// Must not be called from within a tokio runtime.
  pub fn run<T, F, Fut>(&self, items: Vec<T>, op: F) -> Result<FanOutReport, ExecuteError>
  where
    T: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(self.parallelism)
      .on_thread_start(capture::capture_current_thread)
      .enable_all()
      .build()?;

    let labels: Vec<String> = items.iter().map(ToString::to_string).collect();
    debug!(items = labels.len(), parallelism = self.parallelism, "starting fan-out");

    let outcomes = runtime.block_on(self.drive(items, op));

    let mut report = FanOutReport::default();
    for (label, outcome) in labels.into_iter().zip(outcomes) {
      match outcome {
        ItemOutcome::Succeeded => report.succeeded.push(label),
        ItemOutcome::Failed(message) => report.failed.push((label, message)),
        ItemOutcome::Cancelled => report.cancelled.push(label),
      }
    }

    if !report.is_success() {
      warn!(
        failed = report.failed.len(),
        cancelled = report.cancelled.len(),
        total = report.total(),
        "fan-out finished with failures"
      );
    }
    Ok(report)
  }

  async fn drive<T, F, Fut>(&self, items: Vec<T>, op: F) -> Vec<ItemOutcome>
  where
    T: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let cancelled = Arc::new(AtomicBool::new(false));
    let op = Arc::new(op);
    let tolerate = self.tolerate_failures;
    let secrets = &self.secrets;
    let count = items.len();

    let mut join_set = JoinSet::new();
    for (idx, item) in items.into_iter().enumerate() {
      let semaphore = semaphore.clone();
      let cancelled = cancelled.clone();
      let op = op.clone();
      let secrets = secrets.clone();

      join_set.spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
          return (idx, ItemOutcome::Cancelled);
        };
        if cancelled.load(Ordering::SeqCst) {
          return (idx, ItemOutcome::Cancelled);
        }

        let label = item.to_string();
        match op(item).await {
          Ok(()) => (idx, ItemOutcome::Succeeded),
          Err(e) => {
            // Flag before the permit is released so waiting items see it.
            if !tolerate {
              cancelled.store(true, Ordering::SeqCst);
            }
            let message = secrets.redact(&format!("{e:#}")).into_owned();
            error!(item = %label, error = %message, "fan-out item failed");
            (idx, ItemOutcome::Failed(message))
          }
        }
      });
    }

    let mut outcomes: Vec<Option<ItemOutcome>> = (0..count).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
        Err(e) => {
          // The panicking task's index is lost; its slot is filled below.
          let message = secrets.redact(&e.to_string()).into_owned();
          error!(error = %message, "fan-out task panicked");
          if !tolerate {
            cancelled.store(true, Ordering::SeqCst);
          }
        }
      }
    }

    outcomes
      .into_iter()
      .map(|o| o.unwrap_or_else(|| ItemOutcome::Failed("task panicked".to_string())))
      .collect()
  }
}
