//! Declarative build definitions.
//!
//! A `keel.toml` file declares parameters and targets whose actions are shell
//! commands. Targets are an array of tables so that declaration order, which
//! breaks ties in the execution order, is the file order.
//!
//! ```toml
//! default = "Compile"
//!
//! [parameters.Configuration]
//! description = "Build configuration"
//! default = "Debug"
//!
//! [parameters.ApiKey]
//! secret = true
//!
//! [[targets]]
//! name = "Compile"
//! run = ["cargo build --profile $${param:Configuration}"]
//!
//! [[targets]]
//! name = "Publish"
//! depends_on = ["Compile"]
//! requires = ["ApiKey"]
//! run = ["cargo publish --token $${param:ApiKey}"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::PARAMETERS_FILE;
use crate::params::{ParameterSpec, Parameters, normalize};
use crate::placeholder::{self, PlaceholderError, Resolver};
use crate::plan::PlanError;
use crate::target::{Target, TargetContext, TargetModule, TargetRegistry};
use crate::tool::{ShellCommand, ToolError, ToolRunner};

#[derive(Debug, Error)]
pub enum DefinitionError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid build definition {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("target '{target}' has an invalid command: {source}")]
  Placeholder {
    target: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("target '{target}' references undeclared parameter '{parameter}'")]
  UndeclaredParameter { target: String, parameter: String },

  #[error(transparent)]
  Plan(#[from] PlanError),
}

/// Top level of a definition file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionFile {
  /// Target run when none is requested.
  pub default: Option<String>,
  /// Shell used for `run` commands instead of the platform default.
  pub shell: Option<String>,
  #[serde(default)]
  pub parameters: BTreeMap<String, ParameterDecl>,
  #[serde(default)]
  pub targets: Vec<TargetDecl>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDecl {
  pub description: Option<String>,
  #[serde(default)]
  pub secret: bool,
  pub separator: Option<char>,
  pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDecl {
  pub name: String,
  pub description: Option<String>,
  #[serde(default)]
  pub depends_on: Vec<String>,
  #[serde(default)]
  pub after: Vec<String>,
  #[serde(default)]
  pub requires: Vec<String>,
  /// Run only when every named parameter has a value.
  #[serde(default)]
  pub only_when_set: Vec<String>,
  #[serde(default)]
  pub run: Vec<String>,
  #[serde(default)]
  pub proceed_after_failure: bool,
  #[serde(default)]
  pub assured_after_failure: bool,
}

/// A loaded definition file and the directory it lives in.
#[derive(Debug, Clone)]
pub struct Definition {
  path: PathBuf,
  root: PathBuf,
  file: DefinitionFile,
}

impl Definition {
  /// Read and parse a definition file.
  ///
  /// # Errors
  ///
  /// `Io` if the file cannot be read, `Parse` for invalid TOML or unknown keys.
  pub fn load(path: &Path) -> Result<Self, DefinitionError> {
    let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let root = match path.parent() {
      Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
      _ => PathBuf::from("."),
    };
    let definition = Self::parse(&content, path, &root)?;
    info!(
      path = %path.display(),
      targets = definition.file.targets.len(),
      parameters = definition.file.parameters.len(),
      "loaded build definition"
    );
    Ok(definition)
  }

  /// Parse definition text as if it were read from `path`.
  pub fn parse(content: &str, path: &Path, root: &Path) -> Result<Self, DefinitionError> {
    let file: DefinitionFile = toml::from_str(content).map_err(|e| DefinitionError::Parse {
      path: path.to_path_buf(),
      message: e.to_string().trim_end().to_string(),
    })?;

    Ok(Self {
      path: path.to_path_buf(),
      root: root.to_path_buf(),
      file,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Directory containing the definition; commands run here.
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn file(&self) -> &DefinitionFile {
    &self.file
  }

  pub fn parameters_file(&self) -> PathBuf {
    self.root.join(PARAMETERS_FILE)
  }

  /// Add every declared parameter to `params`.
  pub fn declare_parameters(&self, mut params: Parameters) -> Parameters {
    for (name, decl) in &self.file.parameters {
      let mut spec = ParameterSpec::new(name.as_str());
      if let Some(description) = &decl.description {
        spec = spec.describe(description.as_str());
      }
      if decl.secret {
        spec = spec.secret();
      }
      if let Some(separator) = decl.separator {
        spec = spec.separator(separator);
      }
      if let Some(default) = &decl.default {
        spec = spec.default_value(default.as_str());
      }
      params = params.declare(spec);
    }
    params
  }

  /// Build the target registry; actions run their commands through `runner`.
  ///
  /// # Errors
  ///
  /// Malformed placeholders, duplicate names, and references to undeclared
  /// targets or parameters.
  pub fn registry(&self, runner: Arc<dyn ToolRunner>) -> Result<TargetRegistry<String>, DefinitionError> {
    let module = ShellTargets {
      decls: &self.file.targets,
      parameters: &self.file.parameters,
      root: self.root.clone(),
      shell: self.file.shell.clone(),
      runner,
    };
    module.check_commands()?;

    let mut registry = TargetRegistry::new();
    registry.register(&module)?;
    if let Some(default) = &self.file.default {
      registry.set_default(default.as_str());
    }
    registry.validate()?;
    Ok(registry)
  }
}

/// Targets whose actions are shell commands.
struct ShellTargets<'a> {
  decls: &'a [TargetDecl],
  parameters: &'a BTreeMap<String, ParameterDecl>,
  root: PathBuf,
  shell: Option<String>,
  runner: Arc<dyn ToolRunner>,
}

impl ShellTargets<'_> {
  fn check_commands(&self) -> Result<(), DefinitionError> {
    for decl in self.decls {
      for command in &decl.run {
        let referenced = placeholder::referenced_params(command).map_err(|source| DefinitionError::Placeholder {
          target: decl.name.clone(),
          source,
        })?;
        if let Some(parameter) = referenced.into_iter().find(|name| self.parameter(name).is_none()) {
          return Err(DefinitionError::UndeclaredParameter {
            target: decl.name.clone(),
            parameter,
          });
        }
      }
    }
    Ok(())
  }

  fn parameter(&self, name: &str) -> Option<&ParameterDecl> {
    let key = normalize(name);
    self
      .parameters
      .iter()
      .find_map(|(declared, decl)| (normalize(declared) == key).then_some(decl))
  }

  /// Parameters a command substitutes that have no default and are not
  /// already listed in `requires`. Missing values then fail planning
  /// instead of the command.
  fn implied_requirements(&self, decl: &TargetDecl) -> Vec<String> {
    let mut implied: Vec<String> = Vec::new();
    for command in &decl.run {
      for name in placeholder::referenced_params(command).unwrap_or_default() {
        let key = normalize(&name);
        let listed = decl.requires.iter().chain(&implied).any(|r| normalize(r) == key);
        let defaulted = self.parameter(&name).is_some_and(|p| p.default.is_some());
        if !listed && !defaulted {
          implied.push(name);
        }
      }
    }
    implied
  }

  fn target(&self, decl: &TargetDecl) -> Target<String> {
    let mut target = Target::new(decl.name.as_str(), decl.name.clone())
      .depends_on(decl.depends_on.iter().cloned())
      .after(decl.after.iter().cloned())
      .requires(decl.requires.iter().cloned())
      .requires(self.implied_requirements(decl));

    if let Some(description) = &decl.description {
      target = target.describe(description.as_str());
    }
    if !decl.only_when_set.is_empty() {
      let names = decl.only_when_set.clone();
      target = target.only_when(move |params| names.iter().all(|n| params.is_set(n)));
    }
    if decl.proceed_after_failure {
      target = target.proceed_after_failure();
    }
    if decl.assured_after_failure {
      target = target.assured_after_failure();
    }

    if !decl.run.is_empty() {
      let commands = decl.run.clone();
      let root = self.root.clone();
      let shell = self.shell.clone();
      let runner = Arc::clone(&self.runner);
      target = target.executes(move |ctx| run_commands(ctx, &commands, &root, shell.as_deref(), runner.as_ref()));
    }
    target
  }
}

impl TargetModule<String> for ShellTargets<'_> {
  fn register(&self, registry: &mut TargetRegistry<String>) -> Result<(), PlanError> {
    for decl in self.decls {
      registry.add(self.target(decl))?;
    }
    Ok(())
  }
}

fn run_commands(
  ctx: &TargetContext<'_>,
  commands: &[String],
  root: &Path,
  shell: Option<&str>,
  runner: &dyn ToolRunner,
) -> anyhow::Result<()> {
  let root_text = root.display().to_string();
  let resolver = ContextResolver { ctx, root: &root_text };

  for command in commands {
    let script = placeholder::substitute(command, &resolver)?;
    let mut shell_command = ShellCommand::new(script).current_dir(root);
    if let Some(shell) = shell {
      shell_command = shell_command.shell(shell);
    }

    debug!(target_name = %ctx.name(), "running command");
    match runner.run(&shell_command) {
      Ok(output) => {
        for line in output.stdout.lines().chain(output.stderr.lines()) {
          ctx.info(line);
        }
      }
      Err(err) => {
        if let ToolError::Failed { stderr, .. } = &err {
          for line in stderr.lines() {
            ctx.error(line);
          }
        }
        return Err(err.into());
      }
    }
  }
  Ok(())
}

/// Placeholder values for a running target.
struct ContextResolver<'a> {
  ctx: &'a TargetContext<'a>,
  root: &'a str,
}

impl Resolver for ContextResolver<'_> {
  fn resolve_param(&self, name: &str) -> Result<String, PlaceholderError> {
    self
      .ctx
      .params()
      .values(name)
      .filter(|values| !values.is_empty())
      .map(|values| values.join(" "))
      .ok_or_else(|| PlaceholderError::Unresolved(name.to_string()))
  }

  fn resolve_target(&self) -> &str {
    self.ctx.name()
  }

  fn resolve_root(&self) -> &str {
    self.root
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::execute::Engine;
  use crate::host::HostType;
  use crate::output::testing::RecordingSink;
  use crate::plan::{ExecutionStatus, Invocation, build_plan};
  use crate::tool::{ToolOutput, ToolSettings};
  use std::sync::Mutex;

  /// Records scripts instead of running them; fails scripts containing "fail".
  #[derive(Default)]
  struct Scripted {
    scripts: Mutex<Vec<String>>,
  }

  impl ToolRunner for Scripted {
    fn run(&self, settings: &dyn ToolSettings) -> Result<ToolOutput, ToolError> {
      let script = settings
        .arguments()
        .last()
        .map(|a| a.value().to_string())
        .unwrap_or_default();
      self.scripts.lock().unwrap().push(script.clone());

      if script.contains("fail") {
        return Err(ToolError::Failed {
          command: script,
          code: Some(1),
          stderr: "it broke".to_string(),
        });
      }
      Ok(ToolOutput {
        code: Some(0),
        stdout: format!("ran {script}\n"),
        stderr: String::new(),
      })
    }
  }

  const SAMPLE: &str = r#"
default = "Compile"

[parameters.Configuration]
description = "Build configuration"
default = "Debug"

[parameters.ApiKey]
secret = true

[parameters.Projects]
separator = ","

[[targets]]
name = "Clean"
run = ["rm -rf out"]

[[targets]]
name = "Compile"
description = "Compile everything"
depends_on = ["Clean"]
run = ["build -c $${param:Configuration} $${target}"]

[[targets]]
name = "Publish"
depends_on = ["Compile"]
requires = ["ApiKey"]
run = ["push --key $${param:ApiKey}"]

[[targets]]
name = "Sign"
only_when_set = ["Certificate"]
"#;

  fn definition(text: &str) -> Definition {
    Definition::parse(text, Path::new("keel.toml"), Path::new("/repo")).unwrap()
  }

  #[test]
  fn parses_targets_in_file_order() {
    let def = definition(SAMPLE);
    let names: Vec<&str> = def.file().targets.iter().map(|t| t.name.as_str()).collect();

    assert_eq!(names, ["Clean", "Compile", "Publish", "Sign"]);
    assert_eq!(def.file().default.as_deref(), Some("Compile"));
    assert_eq!(def.parameters_file(), Path::new("/repo").join(".keel/parameters.json"));
  }

  #[test]
  fn declares_parameters_with_defaults_and_secrets() {
    let params = definition(SAMPLE).declare_parameters(Parameters::default());

    assert_eq!(params.value("Configuration").unwrap().as_deref(), Some("Debug"));
    assert!(params.is_secret("ApiKey"));
    assert_eq!(params.specs().count(), 3);
  }

  #[test]
  fn unknown_keys_are_rejected() {
    let err = Definition::parse("[[targets]]\nname = \"A\"\nrunn = []\n", Path::new("k.toml"), Path::new("."))
      .unwrap_err();
    assert!(matches!(err, DefinitionError::Parse { .. }));
  }

  #[test]
  fn malformed_placeholder_is_reported_with_target() {
    let def = definition("[[targets]]\nname = \"A\"\nrun = [\"echo $${param:X\"]\n");
    let err = def.registry(Arc::new(Scripted::default())).unwrap_err();

    assert!(matches!(err, DefinitionError::Placeholder { ref target, .. } if target == "A"));
  }

  #[test]
  fn undeclared_parameter_in_command_is_rejected() {
    let def = definition("[[targets]]\nname = \"A\"\nrun = [\"push $${param:ApiKey}\"]\n");
    let err = def.registry(Arc::new(Scripted::default())).unwrap_err();

    assert!(matches!(
      err,
      DefinitionError::UndeclaredParameter { ref target, ref parameter } if target == "A" && parameter == "ApiKey"
    ));
  }

  #[test]
  fn referenced_parameter_without_default_is_required() {
    let def = definition(
      "[parameters.api-key]\nsecret = true\n\n[parameters.Configuration]\ndefault = \"Debug\"\n\n\
       [[targets]]\nname = \"Push\"\nrun = [\"push -c $${param:Configuration} $${param:ApiKey}\"]\n",
    );
    let registry = def.registry(Arc::new(Scripted::default())).unwrap();
    let params = def.declare_parameters(Parameters::default());

    assert_eq!(registry.get("Push").unwrap().required_parameters(), ["ApiKey"]);
    let err = build_plan(&registry, &Invocation::new(["Push"]), &params).err().unwrap();
    assert!(matches!(err, PlanError::MissingParameter { ref parameter, .. } if parameter == "ApiKey"));
  }

  #[test]
  fn undeclared_dependency_is_a_plan_error() {
    let def = definition("[[targets]]\nname = \"A\"\ndepends_on = [\"Ghost\"]\n");
    let err = def.registry(Arc::new(Scripted::default())).unwrap_err();

    assert!(matches!(err, DefinitionError::Plan(PlanError::UnknownDependency { .. })));
  }

  #[test]
  fn commands_receive_substituted_placeholders() {
    let runner = Arc::new(Scripted::default());
    let def = definition(SAMPLE);
    let registry = def.registry(runner.clone()).unwrap();
    let params = def.declare_parameters(Parameters::default()).inject("Configuration", "Release");

    let plan = build_plan(&registry, &Invocation::default(), &params).unwrap();
    let sink = RecordingSink::default();
    let report = Engine::new(&params, &sink, HostType::Terminal).run(plan);

    assert!(report.is_success());
    assert_eq!(
      *runner.scripts.lock().unwrap(),
      ["rm -rf out", "build -c Release Compile"]
    );
    assert!(sink.messages().iter().any(|(_, m)| m == "ran build -c Release Compile"));
  }

  #[test]
  fn failing_command_fails_target_and_forwards_stderr() {
    let runner = Arc::new(Scripted::default());
    let def = definition("[[targets]]\nname = \"A\"\nrun = [\"fail now\", \"never\"]\n");
    let registry = def.registry(runner.clone()).unwrap();
    let params = Parameters::default();

    let plan = build_plan(&registry, &Invocation::new(["A"]), &params).unwrap();
    let sink = RecordingSink::default();
    let report = Engine::new(&params, &sink, HostType::Terminal).run(plan);

    assert_eq!(report.status("A"), Some(ExecutionStatus::Failed));
    assert_eq!(*runner.scripts.lock().unwrap(), ["fail now"]);
    assert!(sink.messages().iter().any(|(_, m)| m == "it broke"));
  }

  #[test]
  fn only_when_set_skips_without_parameter() {
    let def = definition(SAMPLE);
    let registry = def.registry(Arc::new(Scripted::default())).unwrap();
    let params = def.declare_parameters(Parameters::default());

    let plan = build_plan(&registry, &Invocation::new(["Sign"]), &params).unwrap();
    assert_eq!(plan.status("Sign"), Some(ExecutionStatus::Skipped));

    let params = def.declare_parameters(Parameters::default()).inject("Certificate", "cert.pfx");
    let plan = build_plan(&registry, &Invocation::new(["Sign"]), &params).unwrap();
    assert_eq!(plan.status("Sign"), Some(ExecutionStatus::NotRun));
  }

  #[test]
  fn loads_from_disk_relative_to_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("keel.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let def = Definition::load(&path).unwrap();
    assert_eq!(def.root(), dir.path());
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let err = Definition::load(Path::new("/no/such/keel.toml")).unwrap_err();
    assert!(matches!(err, DefinitionError::Io { .. }));
  }
}
