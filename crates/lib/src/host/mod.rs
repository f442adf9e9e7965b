//! Detection of the hosting environment.

use std::fmt;
use std::str::FromStr;

use crate::consts::HOST_OVERRIDE_ENV;

/// Environment a build runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
  Terminal,
  GitHubActions,
  GitLab,
  AzurePipelines,
  TeamCity,
  AppVeyor,
  Jenkins,
  TravisCi,
  Bitbucket,
}

/// Detection signals, checked in order. The first variable that is present
/// selects the host.
const SIGNALS: &[(&str, HostType)] = &[
  ("GITHUB_ACTIONS", HostType::GitHubActions),
  ("GITLAB_CI", HostType::GitLab),
  ("TF_BUILD", HostType::AzurePipelines),
  ("TEAMCITY_VERSION", HostType::TeamCity),
  ("APPVEYOR", HostType::AppVeyor),
  ("JENKINS_URL", HostType::Jenkins),
  ("TRAVIS", HostType::TravisCi),
  ("BITBUCKET_BUILD_NUMBER", HostType::Bitbucket),
];

impl HostType {
  pub const ALL: [HostType; 9] = [
    HostType::Terminal,
    HostType::GitHubActions,
    HostType::GitLab,
    HostType::AzurePipelines,
    HostType::TeamCity,
    HostType::AppVeyor,
    HostType::Jenkins,
    HostType::TravisCi,
    HostType::Bitbucket,
  ];

  /// Classify the environment described by `lookup`.
  ///
  /// An explicit `KEEL_HOST` naming a known host wins over detection.
  pub fn detect_from<F>(lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(forced) = lookup(HOST_OVERRIDE_ENV).and_then(|v| v.parse().ok()) {
      return forced;
    }

    SIGNALS
      .iter()
      .find(|(var, _)| lookup(var).is_some_and(|v| !v.is_empty() && !v.eq_ignore_ascii_case("false")))
      .map(|(_, host)| *host)
      .unwrap_or(HostType::Terminal)
  }

  /// Classify the current process environment.
  pub fn detect() -> Self {
    Self::detect_from(|key| std::env::var(key).ok())
  }

  pub fn is_ci(&self) -> bool {
    !matches!(self, HostType::Terminal)
  }

  /// Returns the lowercase identifier for this host
  pub fn as_str(&self) -> &'static str {
    match self {
      HostType::Terminal => "terminal",
      HostType::GitHubActions => "github-actions",
      HostType::GitLab => "gitlab",
      HostType::AzurePipelines => "azure-pipelines",
      HostType::TeamCity => "teamcity",
      HostType::AppVeyor => "appveyor",
      HostType::Jenkins => "jenkins",
      HostType::TravisCi => "travis-ci",
      HostType::Bitbucket => "bitbucket",
    }
  }
}

impl fmt::Display for HostType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown host type '{0}'")]
pub struct UnknownHost(pub String);

impl FromStr for HostType {
  type Err = UnknownHost;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
    HostType::ALL
      .into_iter()
      .find(|host| host.as_str() == wanted)
      .ok_or_else(|| UnknownHost(s.to_string()))
  }
}
