//! External parameter sources: command line, environment and parameters file.
//!
//! Every source is captured once into a map keyed by the normalized parameter
//! name, so resolution never re-reads mutable process state.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::ParamError;
use crate::consts::ENV_PREFIX;

/// Normalize a parameter name for matching.
///
/// Matching ignores case, dashes and underscores, so `--api-key`, `API_KEY`
/// and `ApiKey` all name the same parameter.
pub fn normalize(name: &str) -> String {
  name
    .chars()
    .filter(|c| *c != '-' && *c != '_')
    .flat_map(char::to_lowercase)
    .collect()
}

/// Captured values from every external source.
#[derive(Debug, Clone, Default)]
pub struct ParameterSources {
  command_line: HashMap<String, Vec<String>>,
  environment: HashMap<String, String>,
  file: HashMap<String, Vec<String>>,
}

impl ParameterSources {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a command-line value. Repeating a key accumulates values.
  pub fn with_command_line(mut self, name: &str, value: impl Into<String>) -> Self {
    self.command_line.entry(normalize(name)).or_default().push(value.into());
    self
  }

  /// Add command-line values given as `KEY=VALUE` pairs.
  pub fn with_assignments<I, S>(mut self, assignments: I) -> Result<Self, ParamError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    for assignment in assignments {
      let assignment = assignment.as_ref();
      let (name, value) = assignment
        .split_once('=')
        .ok_or_else(|| ParamError::InvalidAssignment(assignment.to_string()))?;
      if name.trim().is_empty() {
        return Err(ParamError::InvalidAssignment(assignment.to_string()));
      }
      self = self.with_command_line(name.trim(), value);
    }
    Ok(self)
  }

  /// Capture the given environment variables.
  pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
  {
    for (key, value) in vars {
      self.environment.insert(normalize(key.as_ref()), value.into());
    }
    self
  }

  /// Capture the current process environment.
  pub fn with_process_environment(self) -> Self {
    self.with_environment(std::env::vars())
  }

  /// Add a value as if read from the parameters file.
  pub fn with_file_value(mut self, name: &str, values: Vec<String>) -> Self {
    self.file.insert(normalize(name), values);
    self
  }

  /// Load a JSON parameters file. A missing file is not an error.
  pub fn with_parameters_file(mut self, path: &Path) -> Result<Self, ParamError> {
    if !path.exists() {
      debug!(path = %path.display(), "no parameters file");
      return Ok(self);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ParamError::File {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    let map: HashMap<String, Value> = serde_json::from_str(&content).map_err(|e| ParamError::File {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;

    for (name, value) in map {
      let values = match value {
        Value::Null => continue,
        Value::Array(items) => items.into_iter().map(json_scalar).collect(),
        other => vec![json_scalar(other)],
      };
      self.file.insert(normalize(&name), values);
    }

    debug!(path = %path.display(), count = self.file.len(), "loaded parameters file");
    Ok(self)
  }

  pub(crate) fn command_line(&self, key: &str) -> Option<&[String]> {
    self.command_line.get(key).map(Vec::as_slice)
  }

  /// Environment lookup; the prefixed form wins over the bare name.
  pub(crate) fn environment(&self, key: &str) -> Option<&str> {
    let prefixed = format!("{}{}", normalize(ENV_PREFIX), key);
    self
      .environment
      .get(&prefixed)
      .or_else(|| self.environment.get(key))
      .map(String::as_str)
      .filter(|v| !v.is_empty())
  }

  pub(crate) fn file(&self, key: &str) -> Option<&[String]> {
    self.file.get(key).map(Vec::as_slice)
  }
}

fn json_scalar(value: Value) -> String {
  match value {
    Value::String(s) => s,
    other => other.to_string(),
  }
}
