//! Implementation of the `keel plan` command.
//!
//! Builds the plan exactly as `keel run` would and prints it. No target
//! action runs.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use keel_lib::consts::EXIT_SUCCESS;
use keel_lib::plan::build_plan;

use super::Session;
use crate::Selection;
use crate::output::{print_json, print_stat, symbols};

#[derive(Serialize)]
struct PlannedTarget<'a> {
  name: &'a str,
  invoked: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  skipped: Option<String>,
  depends_on: Vec<&'a str>,
}

#[derive(Serialize)]
struct PlanView<'a> {
  host: &'static str,
  targets: Vec<PlannedTarget<'a>>,
  parameters: Vec<(String, String)>,
}

pub fn cmd_plan(file: &Path, host: Option<&str>, selection: &Selection, json: bool) -> Result<i32> {
  let session = Session::load(file, host, &selection.params)?;
  let registry = session.registry()?;
  let plan = build_plan(&registry, &selection.invocation(), &session.params).context("Failed to build execution plan")?;

  let names = plan.names();
  let targets: Vec<PlannedTarget> = plan
    .targets()
    .iter()
    .map(|t| PlannedTarget {
      name: t.name(),
      invoked: t.is_invoked(),
      skipped: t.skip_reason().map(|r| r.to_string()),
      depends_on: t.dependencies().iter().map(|&pos| names[pos]).collect(),
    })
    .collect();

  let parameters = session
    .params
    .specs()
    .filter_map(|spec| session.params.display_value(spec.name()).map(|v| (spec.name().to_string(), v)))
    .collect();

  let view = PlanView {
    host: session.host.as_str(),
    targets,
    parameters,
  };

  if json {
    print_json(&view)?;
    return Ok(EXIT_SUCCESS);
  }

  println!("Plan: {} target(s) on {}", view.targets.len(), view.host);
  for (pos, target) in view.targets.iter().enumerate() {
    let marker = if target.skipped.is_some() {
      symbols::SKIP
    } else if target.invoked {
      symbols::ARROW
    } else {
      symbols::INFO
    };
    let mut line = format!("  {:>2}. {} {}", pos + 1, marker, target.name);
    if let Some(reason) = &target.skipped {
      line.push_str(&format!(" (skipped: {reason})"));
    }
    if !target.depends_on.is_empty() {
      line.push_str(&format!(" <- {}", target.depends_on.join(", ")));
    }
    println!("{}", line.if_supports_color(Stream::Stdout, |s| s.bold()));
  }

  if !view.parameters.is_empty() {
    println!("Parameters:");
    for (name, value) in &view.parameters {
      print_stat(name, value);
    }
  }
  Ok(EXIT_SUCCESS)
}
