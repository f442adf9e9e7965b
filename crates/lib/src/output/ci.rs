//! Continuous-integration backends.
//!
//! Each flavor renders targets as collapsible blocks and warnings/errors as
//! native annotations of that CI system. Hosts without a dedicated dialect use
//! the uncolored terminal backend.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{Channel, OutputSink, Severity, TargetSummary, format_duration, summary_lines};
use crate::host::HostType;
use crate::plan::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiFlavor {
  GitHubActions,
  GitLab,
  AzurePipelines,
  TeamCity,
}

impl CiFlavor {
  pub fn for_host(host: HostType) -> Option<Self> {
    match host {
      HostType::GitHubActions => Some(CiFlavor::GitHubActions),
      HostType::GitLab => Some(CiFlavor::GitLab),
      HostType::AzurePipelines => Some(CiFlavor::AzurePipelines),
      HostType::TeamCity => Some(CiFlavor::TeamCity),
      HostType::Terminal | HostType::AppVeyor | HostType::Jenkins | HostType::TravisCi | HostType::Bitbucket => None,
    }
  }
}

pub struct CiSink {
  flavor: CiFlavor,
  channel: Channel,
}

impl CiSink {
  pub fn new(flavor: CiFlavor, channel: Channel) -> Self {
    Self { flavor, channel }
  }

  fn open_block(&self, name: &str) -> String {
    match self.flavor {
      CiFlavor::GitHubActions => format!("::group::{}", escape_github(name)),
      CiFlavor::GitLab => format!("section_start:{}:{}\r\x1b[0K{}", unix_time(), section_id(name), name),
      CiFlavor::AzurePipelines => format!("##[group]{name}"),
      CiFlavor::TeamCity => format!("##teamcity[blockOpened name='{}']", escape_teamcity(name)),
    }
  }

  fn close_block(&self, name: &str) -> String {
    match self.flavor {
      CiFlavor::GitHubActions => "::endgroup::".to_string(),
      CiFlavor::GitLab => format!("section_end:{}:{}\r\x1b[0K", unix_time(), section_id(name)),
      CiFlavor::AzurePipelines => "##[endgroup]".to_string(),
      CiFlavor::TeamCity => format!("##teamcity[blockClosed name='{}']", escape_teamcity(name)),
    }
  }

  fn annotate(&self, severity: Severity, message: &str) -> String {
    match (self.flavor, severity) {
      (_, Severity::Info) => message.to_string(),

      (CiFlavor::GitHubActions, Severity::Debug) => format!("::debug::{}", escape_github(message)),
      (CiFlavor::GitHubActions, Severity::Warning) => format!("::warning::{}", escape_github(message)),
      (CiFlavor::GitHubActions, Severity::Error) => format!("::error::{}", escape_github(message)),

      (CiFlavor::GitLab, Severity::Debug) => message.to_string(),
      (CiFlavor::GitLab, Severity::Warning) => format!("\x1b[33mWARNING: {message}\x1b[0m"),
      (CiFlavor::GitLab, Severity::Error) => format!("\x1b[31mERROR: {message}\x1b[0m"),

      (CiFlavor::AzurePipelines, Severity::Debug) => format!("##[debug]{message}"),
      (CiFlavor::AzurePipelines, Severity::Warning) => {
        format!("##vso[task.logissue type=warning]{}", escape_azure(message))
      }
      (CiFlavor::AzurePipelines, Severity::Error) => {
        format!("##vso[task.logissue type=error]{}", escape_azure(message))
      }

      (CiFlavor::TeamCity, Severity::Debug) => message.to_string(),
      (CiFlavor::TeamCity, Severity::Warning) => {
        format!("##teamcity[message text='{}' status='WARNING']", escape_teamcity(message))
      }
      (CiFlavor::TeamCity, Severity::Error) => {
        format!("##teamcity[message text='{}' status='ERROR']", escape_teamcity(message))
      }
    }
  }
}

impl OutputSink for CiSink {
  fn target_started(&self, name: &str) {
    self.channel.line(&self.open_block(name));
  }

  fn target_finished(&self, name: &str, status: ExecutionStatus, duration: Option<Duration>) {
    // Only targets that ran had a block opened.
    if matches!(status, ExecutionStatus::Succeeded | ExecutionStatus::Failed) {
      self.channel.line(&self.close_block(name));
    }

    let elapsed = duration.map(|d| format!(" ({})", format_duration(d))).unwrap_or_default();
    self.channel.line(&format!("{name}: {status}{elapsed}"));

    if self.flavor == CiFlavor::TeamCity && status.is_failure() {
      self.channel.line(&format!(
        "##teamcity[buildProblem description='{}']",
        escape_teamcity(&format!("Target {name} {status}"))
      ));
    }
  }

  fn log(&self, severity: Severity, message: &str) {
    self.channel.line(&self.annotate(severity, message));
  }

  fn summary(&self, rows: &[TargetSummary]) {
    for line in summary_lines(rows) {
      self.channel.line(&line);
    }
  }
}

fn unix_time() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default()
}

/// GitLab section names allow `[a-z0-9_.-]`.
fn section_id(name: &str) -> String {
  name
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
        c.to_ascii_lowercase()
      } else {
        '_'
      }
    })
    .collect()
}

fn escape_github(text: &str) -> String {
  text.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

fn escape_azure(text: &str) -> String {
  text.replace('%', "%AZP25").replace('\r', "%0D").replace('\n', "%0A")
}

fn escape_teamcity(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '|' => escaped.push_str("||"),
      '\'' => escaped.push_str("|'"),
      '\n' => escaped.push_str("|n"),
      '\r' => escaped.push_str("|r"),
      '[' => escaped.push_str("|["),
      ']' => escaped.push_str("|]"),
      other => escaped.push(other),
    }
  }
  escaped
}
