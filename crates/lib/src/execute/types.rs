//! Types for target execution.

use std::time::Duration;

use thiserror::Error;

use crate::consts::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::output::TargetSummary;
use crate::plan::{ExecutionPlan, ExecutionStatus};
use crate::tool::ToolError;

/// Why a target ended Failed or Aborted.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The target's action returned an error.
  #[error("target '{target}' failed: {message}")]
  ActionFailed { target: String, message: String },

  /// The target's action panicked.
  #[error("target '{target}' panicked: {message}")]
  Panicked { target: String, message: String },

  /// A dependency ended Failed or Aborted, so this target never ran.
  #[error("target '{target}' aborted: dependency '{dependency}' did not succeed")]
  DependencyFailed { target: String, dependency: String },

  /// An external tool invoked by the action failed.
  #[error("target '{target}': {source}")]
  Tool {
    target: String,
    #[source]
    source: ToolError,
  },

  /// One or more items of a fan-out failed.
  #[error("{failed} of {total} items failed, first: {first}")]
  FanOutFailed { failed: usize, total: usize, first: String },

  /// I/O error while setting up execution.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// What happens to the rest of the plan after a target fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
  /// No further target starts, except those assured to run after failure.
  #[default]
  StopOnFirstFailure,
  /// Targets that do not depend on the failure keep running.
  ContinueOnFailure,
}

/// Outcome of one engine run.
///
/// Owns the plan, so the status queries reflect the final states.
pub struct RunReport<R> {
  plan: ExecutionPlan<R>,
  elapsed: Duration,
}

impl<R> RunReport<R> {
  pub(crate) fn new(plan: ExecutionPlan<R>, elapsed: Duration) -> Self {
    Self { plan, elapsed }
  }

  pub fn plan(&self) -> &ExecutionPlan<R> {
    &self.plan
  }

  pub fn elapsed(&self) -> Duration {
    self.elapsed
  }

  /// Returns true if no target ended Failed or Aborted.
  pub fn is_success(&self) -> bool {
    !self.plan.targets().iter().any(|t| t.status().is_failure())
  }

  pub fn exit_code(&self) -> i32 {
    if self.is_success() { EXIT_SUCCESS } else { EXIT_FAILURE }
  }

  pub fn status(&self, name: &str) -> Option<ExecutionStatus> {
    self.plan.status(name)
  }

  pub fn invoked(&self) -> Vec<&R> {
    self.plan.invoked()
  }

  pub fn skipped(&self) -> Vec<&R> {
    self.plan.skipped()
  }

  pub fn executing(&self) -> Vec<&R> {
    self.plan.executing()
  }

  /// Names of the targets that ended with the given status.
  pub fn with_status(&self, status: ExecutionStatus) -> Vec<&str> {
    self
      .plan
      .targets()
      .iter()
      .filter(|t| t.status() == status)
      .map(|t| t.name())
      .collect()
  }

  /// One row per plan target, in plan order.
  pub fn summary(&self) -> Vec<TargetSummary> {
    self
      .plan
      .targets()
      .iter()
      .map(|t| TargetSummary {
        name: t.name().to_string(),
        status: t.status(),
        duration: t.duration(),
        note: t
          .failure()
          .map(ToString::to_string)
          .or_else(|| t.skip_reason().map(|r| r.to_string())),
      })
      .collect()
  }
}
