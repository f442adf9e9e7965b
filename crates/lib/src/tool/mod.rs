//! External tool invocation.
//!
//! Build definitions describe a tool call through [`ToolSettings`] and hand it
//! to a [`ToolRunner`]. [`ProcessRunner`] spawns the process, logs the command
//! line with secret arguments masked, and captures its output.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::REDACTED;
use crate::params::SecretStore;

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command failed with exit code {code:?}: {command}")]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("tool not found: {0}")]
  NotFound(String),
}

/// One command-line argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
  value: String,
  secret: bool,
}

impl Argument {
  pub fn new(value: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      secret: false,
    }
  }

  /// An argument that is masked wherever the command line is rendered.
  pub fn secret(value: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      secret: true,
    }
  }

  pub fn value(&self) -> &str {
    &self.value
  }

  pub fn is_secret(&self) -> bool {
    self.secret
  }

  fn rendered(&self) -> &str {
    if self.secret { REDACTED } else { &self.value }
  }
}

impl From<&str> for Argument {
  fn from(value: &str) -> Self {
    Argument::new(value)
  }
}

impl From<String> for Argument {
  fn from(value: String) -> Self {
    Argument::new(value)
  }
}

/// Description of one tool invocation.
pub trait ToolSettings {
  fn program(&self) -> &Path;

  fn arguments(&self) -> Vec<Argument>;

  fn working_dir(&self) -> Option<&Path> {
    None
  }

  fn environment(&self) -> Vec<(String, String)> {
    Vec::new()
  }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ToolOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

pub trait ToolRunner: Send + Sync {
  /// Run the tool and wait for it. A non-zero exit is an error.
  fn run(&self, settings: &dyn ToolSettings) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
  secrets: SecretStore,
}

impl ProcessRunner {
  pub fn new(secrets: SecretStore) -> Self {
    Self { secrets }
  }

  /// Command line as it may appear in logs.
  pub fn render(&self, settings: &dyn ToolSettings) -> String {
    let mut parts = vec![settings.program().display().to_string()];
    parts.extend(settings.arguments().iter().map(|a| a.rendered().to_string()));
    self.secrets.redact(&parts.join(" ")).into_owned()
  }
}

impl ToolRunner for ProcessRunner {
  fn run(&self, settings: &dyn ToolSettings) -> Result<ToolOutput, ToolError> {
    let arguments = settings.arguments();
    for arg in arguments.iter().filter(|a| a.is_secret()) {
      self.secrets.register(arg.value());
    }

    let rendered = self.render(settings);
    info!(command = %rendered, "executing command");

    let mut command = Command::new(settings.program());
    command.args(arguments.iter().map(Argument::value));
    if let Some(dir) = settings.working_dir() {
      command.current_dir(dir);
    }
    for (key, value) in settings.environment() {
      command.env(key, value);
    }

    debug!(working_dir = ?settings.working_dir(), "spawning process");
    let output = command.output().map_err(|source| ToolError::Spawn {
      program: settings.program().display().to_string(),
      source,
    })?;

    let result = ToolOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success() {
      if !result.stderr.is_empty() {
        debug!(stderr = %self.secrets.redact(&result.stderr), "command stderr");
      }
      return Err(ToolError::Failed {
        command: rendered,
        code: result.code,
        stderr: self.secrets.redact(result.stderr.trim()).into_owned(),
      });
    }

    Ok(result)
  }
}

/// A script run through the platform shell.
#[derive(Debug, Clone)]
pub struct ShellCommand {
  shell: PathBuf,
  shell_args: Vec<String>,
  script: String,
  secret: bool,
  working_dir: Option<PathBuf>,
  environment: Vec<(String, String)>,
}

impl ShellCommand {
  pub fn new(script: impl Into<String>) -> Self {
    let (shell, shell_args) = default_shell();
    Self {
      shell,
      shell_args,
      script: script.into(),
      secret: false,
      working_dir: None,
      environment: Vec::new(),
    }
  }

  /// Use a specific shell; its flag is picked from the shell's name.
  pub fn shell(mut self, shell: &str) -> Self {
    self.shell_args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    self.shell = PathBuf::from(shell);
    self
  }

  /// Mask the whole script when rendering the command line.
  pub fn secret(mut self, secret: bool) -> Self {
    self.secret = secret;
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_dir = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.environment.push((key.into(), value.into()));
    self
  }

  pub fn script(&self) -> &str {
    &self.script
  }
}

impl ToolSettings for ShellCommand {
  fn program(&self) -> &Path {
    &self.shell
  }

  fn arguments(&self) -> Vec<Argument> {
    let mut args: Vec<Argument> = self.shell_args.iter().map(|a| Argument::new(a.as_str())).collect();
    args.push(if self.secret {
      Argument::secret(self.script.as_str())
    } else {
      Argument::new(self.script.as_str())
    });
    args
  }

  fn working_dir(&self) -> Option<&Path> {
    self.working_dir.as_deref()
  }

  fn environment(&self) -> Vec<(String, String)> {
    self.environment.clone()
  }
}

#[cfg(unix)]
fn default_shell() -> (PathBuf, Vec<String>) {
  (PathBuf::from("/bin/sh"), vec!["-c".to_string()])
}

#[cfg(windows)]
fn default_shell() -> (PathBuf, Vec<String>) {
  (
    PathBuf::from("powershell.exe"),
    vec![
      "-NoProfile".to_string(),
      "-ExecutionPolicy".to_string(),
      "Bypass".to_string(),
      "-Command".to_string(),
    ],
  )
}

/// Name of the environment variable that overrides the location of `tool`.
///
/// `dotnet` becomes `DOTNET_EXE`, `git-lfs` becomes `GIT_LFS_EXE`.
pub fn override_variable(tool: &str) -> String {
  let mut name: String = tool
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
    .collect();
  name.push_str("_EXE");
  name
}

/// Locate an executable, preferring the `<NAME>_EXE` override over `PATH`.
pub fn resolve_tool(tool: &str) -> Result<PathBuf, ToolError> {
  resolve_tool_with(tool, |key| std::env::var(key).ok())
}

pub fn resolve_tool_with<F>(tool: &str, lookup: F) -> Result<PathBuf, ToolError>
where
  F: Fn(&str) -> Option<String>,
{
  let variable = override_variable(tool);
  if let Some(path) = lookup(&variable).filter(|p| !p.is_empty()) {
    debug!(tool, variable = %variable, path = %path, "using tool override");
    return Ok(PathBuf::from(path));
  }

  which::which(tool).map_err(|e| {
    debug!(tool, error = %e, "tool not found on PATH");
    ToolError::NotFound(tool.to_string())
  })
}
