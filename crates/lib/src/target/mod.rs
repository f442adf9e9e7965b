//! Target declarations.
//!
//! A [`Target`] is plain data: a name, the names of the targets it depends on,
//! optional conditions, required parameters and an action. Targets are built
//! with a consuming builder and registered into a [`TargetRegistry`].

pub mod registry;

use std::fmt;

use crate::execute::FanOut;
use crate::host::HostType;
use crate::output::{OutputSink, Severity};
use crate::params::Parameters;

pub use registry::{TargetModule, TargetRegistry};

/// Side-effecting body of a target.
pub type ActionFn = dyn Fn(&TargetContext<'_>) -> anyhow::Result<()> + Send + Sync;

/// Predicate gating whether a target runs.
pub type ConditionFn = dyn Fn(&Parameters) -> bool + Send + Sync;

/// A named unit of build work.
///
/// `R` is the build definition's handle for this target (an enum variant, a
/// string, ...). The engine never inspects it; it is handed back by the status
/// queries on plans and reports.
pub struct Target<R> {
  name: String,
  reference: R,
  description: Option<String>,
  dependencies: Vec<String>,
  after: Vec<String>,
  requires: Vec<String>,
  static_conditions: Vec<Box<ConditionFn>>,
  dynamic_conditions: Vec<Box<ConditionFn>>,
  action: Option<Box<ActionFn>>,
  proceed_after_failure: bool,
  assured_after_failure: bool,
}

impl<R> Target<R> {
  pub fn new(name: impl Into<String>, reference: R) -> Self {
    Self {
      name: name.into(),
      reference,
      description: None,
      dependencies: Vec::new(),
      after: Vec::new(),
      requires: Vec::new(),
      static_conditions: Vec::new(),
      dynamic_conditions: Vec::new(),
      action: None,
      proceed_after_failure: false,
      assured_after_failure: false,
    }
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Targets that must run (or be skipped) before this one.
  pub fn depends_on<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.dependencies.extend(names.into_iter().map(Into::into));
    self
  }

  /// Ordering-only edges: if both targets are in the plan, this one runs after
  /// them, but they are not pulled into the plan by this target.
  pub fn after<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.after.extend(names.into_iter().map(Into::into));
    self
  }

  /// Parameters that must resolve to a value before the build starts.
  pub fn requires<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.requires.extend(names.into_iter().map(Into::into));
    self
  }

  /// Condition evaluated while the plan is built.
  pub fn only_when<F>(mut self, condition: F) -> Self
  where
    F: Fn(&Parameters) -> bool + Send + Sync + 'static,
  {
    self.static_conditions.push(Box::new(condition));
    self
  }

  /// Condition evaluated right before the action would run.
  pub fn only_when_dynamic<F>(mut self, condition: F) -> Self
  where
    F: Fn(&Parameters) -> bool + Send + Sync + 'static,
  {
    self.dynamic_conditions.push(Box::new(condition));
    self
  }

  pub fn executes<F>(mut self, action: F) -> Self
  where
    F: Fn(&TargetContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.action = Some(Box::new(action));
    self
  }

  /// A failure of this target does not stop the remaining plan.
  pub fn proceed_after_failure(mut self) -> Self {
    self.proceed_after_failure = true;
    self
  }

  /// Run this target even after the plan was halted by a failure.
  pub fn assured_after_failure(mut self) -> Self {
    self.assured_after_failure = true;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn reference(&self) -> &R {
    &self.reference
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn dependencies(&self) -> &[String] {
    &self.dependencies
  }

  pub fn ordering(&self) -> &[String] {
    &self.after
  }

  pub fn required_parameters(&self) -> &[String] {
    &self.requires
  }

  pub fn is_proceed_after_failure(&self) -> bool {
    self.proceed_after_failure
  }

  pub fn is_assured_after_failure(&self) -> bool {
    self.assured_after_failure
  }

  pub fn has_action(&self) -> bool {
    self.action.is_some()
  }

  pub(crate) fn static_conditions_hold(&self, params: &Parameters) -> bool {
    self.static_conditions.iter().all(|c| c(params))
  }

  pub(crate) fn dynamic_conditions_hold(&self, params: &Parameters) -> bool {
    self.dynamic_conditions.iter().all(|c| c(params))
  }

  pub(crate) fn invoke(&self, ctx: &TargetContext<'_>) -> anyhow::Result<()> {
    match &self.action {
      Some(action) => action(ctx),
      None => Ok(()),
    }
  }
}

impl<R: fmt::Debug> fmt::Debug for Target<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Target")
      .field("name", &self.name)
      .field("reference", &self.reference)
      .field("dependencies", &self.dependencies)
      .field("after", &self.after)
      .field("requires", &self.requires)
      .field("has_action", &self.action.is_some())
      .finish_non_exhaustive()
  }
}

/// What a running action can see.
pub struct TargetContext<'a> {
  name: &'a str,
  params: &'a Parameters,
  sink: &'a dyn OutputSink,
  host: HostType,
}

impl<'a> TargetContext<'a> {
  pub fn new(name: &'a str, params: &'a Parameters, sink: &'a dyn OutputSink, host: HostType) -> Self {
    Self {
      name,
      params,
      sink,
      host,
    }
  }

  pub fn name(&self) -> &str {
    self.name
  }

  pub fn params(&self) -> &Parameters {
    self.params
  }

  pub fn host(&self) -> HostType {
    self.host
  }

  pub fn sink(&self) -> &dyn OutputSink {
    self.sink
  }

  pub fn log(&self, severity: Severity, message: &str) {
    self.sink.log(severity, message);
  }

  /// A fan-out that redacts this run's secrets from item errors.
  pub fn fan_out(&self, parallelism: usize) -> FanOut {
    FanOut::new(parallelism).redacting(self.params.secrets().clone())
  }

  pub fn info(&self, message: &str) {
    self.log(Severity::Info, message);
  }

  pub fn warn(&self, message: &str) {
    self.log(Severity::Warning, message);
  }

  pub fn error(&self, message: &str) {
    self.log(Severity::Error, message);
  }
}
