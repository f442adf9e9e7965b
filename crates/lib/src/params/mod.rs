//! Parameter resolution.
//!
//! Parameters are registered explicitly as [`ParameterSpec`]s and resolved on
//! first access from the first source that has a value:
//!
//! 1. values injected programmatically (tests, embedding applications)
//! 2. command-line overrides
//! 3. environment variables (`KEEL_<NAME>` before `<NAME>`)
//! 4. the parameters file
//! 5. the declared default expression
//!
//! The first resolution of a name is cached, so repeated access within one run
//! always yields the same value. Values of secret parameters are registered in
//! the [`SecretStore`] as soon as they resolve.

pub mod secret;
pub mod source;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

pub use secret::SecretStore;
pub use source::{ParameterSources, normalize};

/// Errors raised while resolving parameters.
#[derive(Debug, Error)]
pub enum ParamError {
  /// A required parameter has no value from any source.
  #[error("parameter '{0}' is required but has no value")]
  Missing(String),

  /// A value could not be converted to the requested type.
  #[error("parameter '{name}' could not be parsed: {message}")]
  Parse { name: String, message: String },

  /// A single value was requested but several were supplied.
  #[error("parameter '{name}' has {count} values but a single value was requested")]
  MultipleValues { name: String, count: usize },

  /// A command-line assignment was not of the form `KEY=VALUE`.
  #[error("invalid parameter assignment '{0}': expected KEY=VALUE")]
  InvalidAssignment(String),

  /// The parameters file could not be read or parsed.
  #[error("failed to load parameters file {path}: {message}")]
  File { path: PathBuf, message: String },
}

type DefaultFn = dyn Fn() -> Option<String> + Send + Sync;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
  Injected,
  CommandLine,
  Environment,
  File,
  Default,
}

impl fmt::Display for ValueSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ValueSource::Injected => "injected",
      ValueSource::CommandLine => "command line",
      ValueSource::Environment => "environment",
      ValueSource::File => "parameters file",
      ValueSource::Default => "default",
    };
    f.write_str(s)
  }
}

/// Declaration of a named parameter.
pub struct ParameterSpec {
  name: String,
  description: Option<String>,
  secret: bool,
  separator: Option<char>,
  default: Option<Box<DefaultFn>>,
}

impl ParameterSpec {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: None,
      secret: false,
      separator: None,
      default: None,
    }
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Mark the parameter secret: its value is redacted from all output.
  pub fn secret(mut self) -> Self {
    self.secret = true;
    self
  }

  /// Split single string values on `separator` into multiple values.
  pub fn separator(mut self, separator: char) -> Self {
    self.separator = Some(separator);
    self
  }

  /// Constant default value.
  pub fn default_value(self, value: impl Into<String>) -> Self {
    let value = value.into();
    self.default_with(move || Some(value.clone()))
  }

  /// Default expression, evaluated at most once, on first access.
  pub fn default_with<F>(mut self, default: F) -> Self
  where
    F: Fn() -> Option<String> + Send + Sync + 'static,
  {
    self.default = Some(Box::new(default));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn is_secret(&self) -> bool {
    self.secret
  }

  pub fn has_default(&self) -> bool {
    self.default.is_some()
  }
}

impl fmt::Debug for ParameterSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ParameterSpec")
      .field("name", &self.name)
      .field("secret", &self.secret)
      .field("separator", &self.separator)
      .field("has_default", &self.default.is_some())
      .finish()
  }
}

#[derive(Debug, Clone)]
struct Resolved {
  values: Vec<String>,
  source: ValueSource,
}

/// Resolves parameter values with a fixed precedence and caches the result.
pub struct Parameters {
  specs: HashMap<String, ParameterSpec>,
  order: Vec<String>,
  injected: HashMap<String, Vec<String>>,
  sources: ParameterSources,
  cache: Mutex<HashMap<String, Option<Resolved>>>,
  secrets: SecretStore,
}

impl Default for Parameters {
  fn default() -> Self {
    Self::new(ParameterSources::default())
  }
}

impl Parameters {
  pub fn new(sources: ParameterSources) -> Self {
    Self {
      specs: HashMap::new(),
      order: Vec::new(),
      injected: HashMap::new(),
      sources,
      cache: Mutex::new(HashMap::new()),
      secrets: SecretStore::new(),
    }
  }

  /// Share an existing secret store, typically the one given to the output sink.
  pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
    self.secrets = secrets;
    self
  }

  /// Register a parameter declaration. Re-declaring a name replaces it.
  pub fn declare(mut self, spec: ParameterSpec) -> Self {
    let key = normalize(&spec.name);
    if !self.specs.contains_key(&key) {
      self.order.push(key.clone());
    }
    self.specs.insert(key, spec);
    self
  }

  /// Inject a value that takes precedence over every external source.
  pub fn inject(mut self, name: &str, value: impl Into<String>) -> Self {
    self.injected.entry(normalize(name)).or_default().push(value.into());
    self
  }

  pub fn secrets(&self) -> &SecretStore {
    &self.secrets
  }

  /// Declared parameters in declaration order.
  pub fn specs(&self) -> impl Iterator<Item = &ParameterSpec> {
    self.order.iter().filter_map(|key| self.specs.get(key))
  }

  pub fn is_secret(&self, name: &str) -> bool {
    self.specs.get(&normalize(name)).is_some_and(ParameterSpec::is_secret)
  }

  /// True if the parameter resolves to at least one value.
  pub fn is_set(&self, name: &str) -> bool {
    self.values(name).is_some_and(|v| !v.is_empty())
  }

  /// Where the value of `name` came from, if it has one.
  pub fn source_of(&self, name: &str) -> Option<ValueSource> {
    self.resolve(name).map(|r| r.source)
  }

  /// All raw values of a parameter, resolving and caching on first access.
  pub fn values(&self, name: &str) -> Option<Vec<String>> {
    self.resolve(name).map(|r| r.values)
  }

  /// Single raw value of a parameter.
  pub fn value(&self, name: &str) -> Result<Option<String>, ParamError> {
    match self.values(name) {
      None => Ok(None),
      Some(mut values) => match values.len() {
        0 => Ok(None),
        1 => Ok(values.pop()),
        count => Err(ParamError::MultipleValues {
          name: name.to_string(),
          count,
        }),
      },
    }
  }

  /// Typed single value, `None` when unset.
  pub fn get<T>(&self, name: &str) -> Result<Option<T>, ParamError>
  where
    T: FromStr,
    T::Err: fmt::Display,
  {
    self.value(name)?.map(|raw| self.parse(name, &raw)).transpose()
  }

  /// Typed single value that must be present.
  pub fn require<T>(&self, name: &str) -> Result<T, ParamError>
  where
    T: FromStr,
    T::Err: fmt::Display,
  {
    self.get(name)?.ok_or_else(|| ParamError::Missing(name.to_string()))
  }

  /// Typed list of values, empty when unset.
  pub fn get_list<T>(&self, name: &str) -> Result<Vec<T>, ParamError>
  where
    T: FromStr,
    T::Err: fmt::Display,
  {
    self
      .values(name)
      .unwrap_or_default()
      .iter()
      .map(|raw| self.parse(name, raw))
      .collect()
  }

  /// Render a value for display, redacting secrets.
  pub fn display_value(&self, name: &str) -> Option<String> {
    let values = self.values(name)?;
    if self.is_secret(name) {
      return Some(crate::consts::REDACTED.to_string());
    }
    Some(values.join(", "))
  }

  fn parse<T>(&self, name: &str, raw: &str) -> Result<T, ParamError>
  where
    T: FromStr,
    T::Err: fmt::Display,
  {
    raw.parse::<T>().map_err(|e| ParamError::Parse {
      name: name.to_string(),
      message: if self.is_secret(name) {
        "value is not valid for the requested type".to_string()
      } else {
        e.to_string()
      },
    })
  }

  fn resolve(&self, name: &str) -> Option<Resolved> {
    let key = normalize(name);
    let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(cached) = cache.get(&key) {
      return cached.clone();
    }

    let resolved = self.resolve_uncached(&key);
    match &resolved {
      Some(r) => {
        if self.specs.get(&key).is_some_and(ParameterSpec::is_secret) {
          for value in &r.values {
            self.secrets.register(value);
          }
        }
        debug!(parameter = %name, source = %r.source, "resolved parameter");
      }
      None => debug!(parameter = %name, "parameter has no value"),
    }

    cache.insert(key, resolved.clone());
    resolved
  }

  fn resolve_uncached(&self, key: &str) -> Option<Resolved> {
    let spec = self.specs.get(key);
    let separator = spec.and_then(|s| s.separator);
    let split = |values: &[String]| -> Vec<String> { split_values(values, separator) };

    if let Some(values) = self.injected.get(key) {
      return Some(Resolved {
        values: split(values),
        source: ValueSource::Injected,
      });
    }
    if let Some(values) = self.sources.command_line(key) {
      return Some(Resolved {
        values: split(values),
        source: ValueSource::CommandLine,
      });
    }
    if let Some(value) = self.sources.environment(key) {
      return Some(Resolved {
        values: split(&[value.to_string()]),
        source: ValueSource::Environment,
      });
    }
    if let Some(values) = self.sources.file(key) {
      return Some(Resolved {
        values: split(values),
        source: ValueSource::File,
      });
    }

    let default = spec.and_then(|s| s.default.as_ref())?;
    default().map(|value| Resolved {
      values: split(&[value]),
      source: ValueSource::Default,
    })
  }
}

impl fmt::Debug for Parameters {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Parameters")
      .field("declared", &self.order)
      .finish_non_exhaustive()
  }
}

fn split_values(values: &[String], separator: Option<char>) -> Vec<String> {
  match separator {
    Some(sep) if values.len() == 1 => values[0]
      .split(sep)
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(str::to_string)
      .collect(),
    _ => values.to_vec(),
  }
}
