//! Shared registry that build-definition modules contribute targets to.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::Target;
use crate::plan::PlanError;

/// A group of related targets that registers itself into a registry.
///
/// Definitions are composed from several modules; a module may depend on
/// targets contributed by another module by name.
pub trait TargetModule<R> {
  fn register(&self, registry: &mut TargetRegistry<R>) -> Result<(), PlanError>;
}

/// All declared targets, in declaration order.
pub struct TargetRegistry<R> {
  targets: Vec<Arc<Target<R>>>,
  index: HashMap<String, usize>,
  default: Option<String>,
}

impl<R> Default for TargetRegistry<R> {
  fn default() -> Self {
    Self {
      targets: Vec::new(),
      index: HashMap::new(),
      default: None,
    }
  }
}

/// Lookup key for target names, which match case-insensitively.
pub(crate) fn target_key(name: &str) -> String {
  name.to_lowercase()
}

impl<R> TargetRegistry<R> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare a target. Names must be unique, ignoring case.
  pub fn add(&mut self, target: Target<R>) -> Result<(), PlanError> {
    let key = target_key(target.name());
    if self.index.contains_key(&key) {
      return Err(PlanError::DuplicateTarget(target.name().to_string()));
    }

    debug!(target_name = %target.name(), deps = ?target.dependencies(), "registered target");
    self.index.insert(key, self.targets.len());
    self.targets.push(Arc::new(target));
    Ok(())
  }

  /// Let a module contribute its targets.
  pub fn register(&mut self, module: &dyn TargetModule<R>) -> Result<(), PlanError> {
    module.register(self)
  }

  /// Target run when an invocation names none.
  pub fn set_default(&mut self, name: impl Into<String>) {
    self.default = Some(name.into());
  }

  pub fn default_target(&self) -> Option<&str> {
    self.default.as_deref()
  }

  pub fn get(&self, name: &str) -> Option<&Arc<Target<R>>> {
    self.index_of(name).map(|i| &self.targets[i])
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.index.get(&target_key(name)).copied()
  }

  /// Targets in declaration order.
  pub fn targets(&self) -> &[Arc<Target<R>>] {
    &self.targets
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Check that every referenced name is declared.
  pub fn validate(&self) -> Result<(), PlanError> {
    for target in &self.targets {
      for dep in target.dependencies().iter().chain(target.ordering()) {
        if self.index_of(dep).is_none() {
          return Err(PlanError::UnknownDependency {
            target: target.name().to_string(),
            dependency: dep.clone(),
          });
        }
      }
    }

    if let Some(default) = &self.default
      && self.index_of(default).is_none()
    {
      return Err(PlanError::UnknownTarget(default.clone()));
    }

    Ok(())
  }
}

impl<R> fmt::Debug for TargetRegistry<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names: Vec<&str> = self.targets.iter().map(|t| t.name()).collect();
    f.debug_struct("TargetRegistry")
      .field("targets", &names)
      .field("default", &self.default)
      .finish()
  }
}
