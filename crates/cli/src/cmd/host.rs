use anyhow::Result;

use keel_lib::consts::EXIT_SUCCESS;

use super::resolve_host;
use crate::output::print_stat;

pub fn cmd_host(forced: Option<&str>) -> Result<i32> {
  let host = resolve_host(forced)?;
  println!("Host:");
  print_stat("Type", host.as_str());
  print_stat("CI", if host.is_ci() { "yes" } else { "no" });
  Ok(EXIT_SUCCESS)
}
