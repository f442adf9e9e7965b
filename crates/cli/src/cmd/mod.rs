mod host;
mod list;
mod plan;
mod run;

pub use host::cmd_host;
pub use list::cmd_list;
pub use plan::cmd_plan;
pub use run::cmd_run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use keel_lib::definition::Definition;
use keel_lib::host::HostType;
use keel_lib::params::{ParameterSources, Parameters, SecretStore};
use keel_lib::plan::{Invocation, SkipList};
use keel_lib::target::TargetRegistry;
use keel_lib::tool::ProcessRunner;

use crate::Selection;

/// Everything a command needs once the definition is loaded.
///
/// One [`SecretStore`] is shared by the parameters, the process runner, and
/// the output sink so a secret resolved anywhere is redacted everywhere.
pub(crate) struct Session {
  pub definition: Definition,
  pub params: Parameters,
  pub secrets: SecretStore,
  pub host: HostType,
}

impl Session {
  pub fn load(file: &Path, host: Option<&str>, assignments: &[String]) -> Result<Self> {
    let definition = load_definition(file)?;

    let sources = ParameterSources::default()
      .with_process_environment()
      .with_parameters_file(&definition.parameters_file())?
      .with_assignments(assignments)?;

    let secrets = SecretStore::new();
    let params = definition.declare_parameters(Parameters::new(sources).with_secrets(secrets.clone()));

    Ok(Self {
      definition,
      params,
      secrets,
      host: resolve_host(host)?,
    })
  }

  pub fn registry(&self) -> Result<TargetRegistry<String>> {
    let runner = Arc::new(ProcessRunner::new(self.secrets.clone()));
    self
      .definition
      .registry(runner)
      .with_context(|| format!("Invalid build definition: {}", self.definition.path().display()))
  }
}

pub(crate) fn load_definition(file: &Path) -> Result<Definition> {
  // An absolute path gives `$${root}` a stable meaning regardless of cwd.
  let path = dunce::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
  Definition::load(&path).with_context(|| format!("Failed to load build definition: {}", file.display()))
}

pub(crate) fn resolve_host(forced: Option<&str>) -> Result<HostType> {
  match forced {
    Some(name) => name.parse().context("Invalid --host"),
    None => Ok(HostType::detect()),
  }
}

impl Selection {
  pub fn invocation(&self) -> Invocation {
    Invocation::new(self.targets.iter().cloned()).skip(SkipList::from_arg(self.skip.clone()))
  }
}
