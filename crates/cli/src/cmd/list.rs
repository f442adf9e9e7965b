use std::path::Path;

use anyhow::Result;

use keel_lib::consts::EXIT_SUCCESS;

use super::load_definition;
use crate::output::{print_info, print_stat};

pub fn cmd_list(file: &Path) -> Result<i32> {
  let definition = load_definition(file)?;
  let file = definition.file();

  println!("Targets:");
  for target in &file.targets {
    let mut label = target.name.clone();
    if file.default.as_deref() == Some(target.name.as_str()) {
      label.push_str(" (default)");
    }
    print_stat(&label, target.description.as_deref().unwrap_or(""));
  }

  if !file.parameters.is_empty() {
    println!("Parameters:");
    for (name, decl) in &file.parameters {
      let mut label = name.clone();
      if decl.secret {
        label.push_str(" (secret)");
      }
      print_stat(&label, decl.description.as_deref().unwrap_or(""));
    }
  }

  if file.targets.is_empty() {
    print_info("No targets declared");
  }
  Ok(EXIT_SUCCESS)
}
