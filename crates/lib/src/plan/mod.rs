//! Execution plan building.
//!
//! Turns the declared targets plus an [`Invocation`] into an ordered
//! [`ExecutionPlan`]:
//! - requested targets (or the default target) and their transitive
//!   dependencies, each exactly once
//! - dependencies before dependents, ties broken by declaration order
//! - skipped targets stay in the plan with status `Skipped`
//! - required parameters of every target that will run are checked up front

pub mod dag;
pub mod types;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::execute::FailurePolicy;
use crate::params::Parameters;
use crate::target::TargetRegistry;
use crate::target::registry::target_key;

pub use dag::TargetDag;
pub use types::{ExecutableTarget, ExecutionStatus, PlanError, SkipReason};

/// Which targets to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SkipList {
  /// Skip nothing.
  #[default]
  None,
  /// Skip every target that was not invoked explicitly.
  All,
  /// Skip the named targets.
  Only(Vec<String>),
}

impl SkipList {
  /// Interpret a skip argument: absent skips nothing, present but empty skips
  /// all non-invoked targets.
  pub fn from_arg(names: Option<Vec<String>>) -> Self {
    match names {
      None => SkipList::None,
      Some(names) if names.is_empty() => SkipList::All,
      Some(names) => SkipList::Only(names),
    }
  }
}

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
  /// Requested target names; empty means the default target.
  pub targets: Vec<String>,
  pub skip: SkipList,
  pub policy: FailurePolicy,
}

impl Invocation {
  pub fn new<I, S>(targets: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      targets: targets.into_iter().map(Into::into).collect(),
      skip: SkipList::None,
      policy: FailurePolicy::default(),
    }
  }

  pub fn skip(mut self, skip: SkipList) -> Self {
    self.skip = skip;
    self
  }

  pub fn policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }
}

/// Ordered targets to visit for one invocation.
pub struct ExecutionPlan<R> {
  targets: Vec<ExecutableTarget<R>>,
  index: HashMap<String, usize>,
  policy: FailurePolicy,
}

impl<R> ExecutionPlan<R> {
  /// Targets in execution order.
  pub fn targets(&self) -> &[ExecutableTarget<R>] {
    &self.targets
  }

  pub fn policy(&self) -> FailurePolicy {
    self.policy
  }

  pub(crate) fn targets_mut(&mut self) -> &mut [ExecutableTarget<R>] {
    &mut self.targets
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn get(&self, name: &str) -> Option<&ExecutableTarget<R>> {
    self.index.get(&target_key(name)).map(|&i| &self.targets[i])
  }

  pub fn status(&self, name: &str) -> Option<ExecutionStatus> {
    self.get(name).map(ExecutableTarget::status)
  }

  pub fn names(&self) -> Vec<&str> {
    self.targets.iter().map(ExecutableTarget::name).collect()
  }

  /// Handles of the explicitly requested targets.
  pub fn invoked(&self) -> Vec<&R> {
    self.references(ExecutableTarget::is_invoked)
  }

  /// Handles of the targets that are (or ended) skipped.
  pub fn skipped(&self) -> Vec<&R> {
    self.references(|t| t.status() == ExecutionStatus::Skipped)
  }

  /// Handles of the targets that are not skipped.
  pub fn executing(&self) -> Vec<&R> {
    self.references(|t| t.status() != ExecutionStatus::Skipped)
  }

  fn references(&self, keep: impl Fn(&ExecutableTarget<R>) -> bool) -> Vec<&R> {
    self
      .targets
      .iter()
      .filter(|t| keep(t))
      .map(ExecutableTarget::reference)
      .collect()
  }
}

/// Build the execution plan for `invocation`.
///
/// # Errors
///
/// Any [`PlanError`]: cycles, unknown names, or missing required parameters.
/// No target action has run when this returns an error.
pub fn build_plan<R>(
  registry: &TargetRegistry<R>,
  invocation: &Invocation,
  params: &Parameters,
) -> Result<ExecutionPlan<R>, PlanError> {
  let dag = TargetDag::from_registry(registry)?;

  let requested = requested_targets(registry, invocation)?;
  let explicit_skips: HashSet<usize> = match &invocation.skip {
    SkipList::Only(names) => names
      .iter()
      .map(|name| {
        registry
          .index_of(name)
          .ok_or_else(|| PlanError::UnknownTarget(name.clone()))
      })
      .collect::<Result<_, _>>()?,
    SkipList::None | SkipList::All => HashSet::new(),
  };

  let closure = dag.closure(&requested);
  let order = dag.linearize(&closure)?;
  let position: HashMap<usize, usize> = order.iter().enumerate().map(|(pos, &decl)| (decl, pos)).collect();

  let mut targets = Vec::with_capacity(order.len());
  let mut index = HashMap::with_capacity(order.len());

  for &decl in &order {
    let target = registry.targets()[decl].clone();
    let invoked = requested.contains(&decl);

    let skip_reason = if explicit_skips.contains(&decl) || (invocation.skip == SkipList::All && !invoked) {
      Some(SkipReason::Explicit)
    } else if !target.static_conditions_hold(params) {
      Some(SkipReason::Condition)
    } else {
      None
    };

    if let Some(reason) = skip_reason {
      debug!(target_name = %target.name(), %reason, "target will be skipped");
    }

    let dependencies = dag
      .dependencies(decl)
      .into_iter()
      .filter_map(|d| position.get(&d).copied())
      .collect();

    index.insert(target_key(target.name()), targets.len());
    targets.push(ExecutableTarget::new(target, invoked, skip_reason, dependencies));
  }

  for planned in &targets {
    if planned.status() == ExecutionStatus::Skipped {
      continue;
    }
    for parameter in planned.target().required_parameters() {
      if !params.is_set(parameter) {
        return Err(PlanError::MissingParameter {
          target: planned.name().to_string(),
          parameter: parameter.clone(),
        });
      }
    }
  }

  let plan = ExecutionPlan {
    targets,
    index,
    policy: invocation.policy,
  };
  info!(
    targets = plan.len(),
    skipped = plan.skipped().len(),
    order = ?plan.names(),
    "execution plan ready"
  );
  Ok(plan)
}

fn requested_targets<R>(registry: &TargetRegistry<R>, invocation: &Invocation) -> Result<Vec<usize>, PlanError> {
  if invocation.targets.is_empty() {
    let default = registry.default_target().ok_or(PlanError::NoDefaultTarget)?;
    let idx = registry
      .index_of(default)
      .ok_or_else(|| PlanError::UnknownTarget(default.to_string()))?;
    return Ok(vec![idx]);
  }

  let mut requested = Vec::with_capacity(invocation.targets.len());
  for name in &invocation.targets {
    let idx = registry
      .index_of(name)
      .ok_or_else(|| PlanError::UnknownTarget(name.clone()))?;
    if !requested.contains(&idx) {
      requested.push(idx);
    }
  }
  Ok(requested)
}
