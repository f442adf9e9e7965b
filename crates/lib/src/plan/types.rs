//! Types shared by plan building and execution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::execute::ExecuteError;
use crate::target::Target;

/// Configuration errors. All of them are raised before any action runs.
#[derive(Debug, Error)]
pub enum PlanError {
  /// The dependency graph contains a cycle.
  #[error("dependency cycle detected between targets: {}", .0.join(", "))]
  Cycle(Vec<String>),

  /// A requested, skipped or default target name is not declared.
  #[error("unknown target: {0}")]
  UnknownTarget(String),

  /// A target references an undeclared target.
  #[error("target '{target}' references unknown target '{dependency}'")]
  UnknownDependency { target: String, dependency: String },

  /// Two targets share a name.
  #[error("target '{0}' is declared more than once")]
  DuplicateTarget(String),

  /// A target that will run requires a parameter that has no value.
  #[error("target '{target}' requires parameter '{parameter}' which has no value")]
  MissingParameter { target: String, parameter: String },

  /// Nothing was requested and the definition declares no default target.
  #[error("no target requested and no default target declared")]
  NoDefaultTarget,
}

/// Lifecycle state of a target within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
  NotRun,
  Skipped,
  Running,
  Succeeded,
  Failed,
  Aborted,
}

impl ExecutionStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ExecutionStatus::Skipped | ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Aborted
    )
  }

  /// Failed or Aborted: counts against the exit code.
  pub fn is_failure(&self) -> bool {
    matches!(self, ExecutionStatus::Failed | ExecutionStatus::Aborted)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ExecutionStatus::NotRun => "not run",
      ExecutionStatus::Skipped => "skipped",
      ExecutionStatus::Running => "running",
      ExecutionStatus::Succeeded => "succeeded",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Aborted => "aborted",
    }
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Why a target was marked skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// Named in the skip list, or not invoked under the skip-all sentinel.
  Explicit,
  /// A condition evaluated to false.
  Condition,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::Explicit => f.write_str("skip requested"),
      SkipReason::Condition => f.write_str("condition false"),
    }
  }
}

/// Runtime state of one target for the current invocation.
pub struct ExecutableTarget<R> {
  target: Arc<Target<R>>,
  status: ExecutionStatus,
  invoked: bool,
  skip_reason: Option<SkipReason>,
  /// Plan positions of direct dependencies.
  dependencies: Vec<usize>,
  failure: Option<ExecuteError>,
  duration: Option<Duration>,
}

impl<R> ExecutableTarget<R> {
  pub(crate) fn new(
    target: Arc<Target<R>>,
    invoked: bool,
    skip_reason: Option<SkipReason>,
    dependencies: Vec<usize>,
  ) -> Self {
    let status = if skip_reason.is_some() {
      ExecutionStatus::Skipped
    } else {
      ExecutionStatus::NotRun
    };

    Self {
      target,
      status,
      invoked,
      skip_reason,
      dependencies,
      failure: None,
      duration: None,
    }
  }

  pub fn target(&self) -> &Target<R> {
    &self.target
  }

  pub(crate) fn shared(&self) -> Arc<Target<R>> {
    Arc::clone(&self.target)
  }

  pub fn name(&self) -> &str {
    self.target.name()
  }

  pub fn reference(&self) -> &R {
    self.target.reference()
  }

  pub fn status(&self) -> ExecutionStatus {
    self.status
  }

  /// Requested explicitly, rather than pulled in as a dependency.
  pub fn is_invoked(&self) -> bool {
    self.invoked
  }

  pub fn skip_reason(&self) -> Option<SkipReason> {
    self.skip_reason
  }

  pub fn dependencies(&self) -> &[usize] {
    &self.dependencies
  }

  pub fn failure(&self) -> Option<&ExecuteError> {
    self.failure.as_ref()
  }

  pub fn duration(&self) -> Option<Duration> {
    self.duration
  }

  pub(crate) fn skip(&mut self, reason: SkipReason) {
    self.status = ExecutionStatus::Skipped;
    self.skip_reason = Some(reason);
  }

  pub(crate) fn set_status(&mut self, status: ExecutionStatus) {
    self.status = status;
  }

  pub(crate) fn fail(&mut self, status: ExecutionStatus, error: ExecuteError) {
    self.status = status;
    self.failure = Some(error);
  }

  pub(crate) fn set_duration(&mut self, duration: Duration) {
    self.duration = Some(duration);
  }
}

impl<R> fmt::Debug for ExecutableTarget<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecutableTarget")
      .field("name", &self.name())
      .field("status", &self.status)
      .field("invoked", &self.invoked)
      .field("skip_reason", &self.skip_reason)
      .finish_non_exhaustive()
  }
}
