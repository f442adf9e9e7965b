//! Placeholders in build definition commands.
//!
//! Commands are written before parameter values are known. Placeholders are
//! substituted right before a command runs:
//!
//! - `$${param:Name}`: the resolved value of parameter `Name` (list values are
//!   joined with a space)
//! - `$${target}`: the name of the running target
//! - `$${root}`: the directory containing the build definition
//!
//! Single `$` characters pass through, so shell variables like `$HOME` need
//! no escaping. `$$$` directly before `{` produces a literal `$${`.
//!
//! ```
//! use keel_lib::placeholder::{Placeholder, Segment, parse};
//!
//! let segments = parse("deploy --key $${param:ApiKey} $HOME").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("deploy --key ".to_string()),
//!     Segment::Placeholder(Placeholder::Param("ApiKey".to_string())),
//!     Segment::Literal(" $HOME".to_string()),
//! ]);
//! ```

use thiserror::Error;

const OPEN: &str = "$${";
const ESCAPED_OPEN: &str = "$$${";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  Param(String),
  Target,
  Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("parameter '{0}' has no value")]
  Unresolved(String),
}

/// Supplies values for placeholders at execution time.
pub trait Resolver {
  fn resolve_param(&self, name: &str) -> Result<String, PlaceholderError>;

  fn resolve_target(&self) -> &str;

  fn resolve_root(&self) -> &str;
}

/// Split `input` into literal text and placeholders.
///
/// # Errors
///
/// Unclosed placeholders, unknown kinds, and `param` without a name.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;
  let mut offset = 0;

  while let Some(found) = rest.find(OPEN) {
    // `$$${` is the escape; the match starts one `$` later.
    if found > 0 && rest[..found].ends_with('$') {
      literal.push_str(&rest[..found - 1]);
      literal.push_str(OPEN);
      let consumed = found + OPEN.len();
      rest = &rest[consumed..];
      offset += consumed;
      continue;
    }

    literal.push_str(&rest[..found]);
    let body_start = found + OPEN.len();
    let Some(len) = rest[body_start..].find('}') else {
      return Err(PlaceholderError::Unclosed(offset + found));
    };

    if !literal.is_empty() {
      segments.push(Segment::Literal(std::mem::take(&mut literal)));
    }
    segments.push(Segment::Placeholder(parse_body(&rest[body_start..body_start + len])?));

    let consumed = body_start + len + 1;
    rest = &rest[consumed..];
    offset += consumed;
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  Ok(segments)
}

fn parse_body(body: &str) -> Result<Placeholder, PlaceholderError> {
  let (kind, arg) = match body.split_once(':') {
    Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
    None => (body.trim(), None),
  };

  match (kind, arg) {
    ("param", Some(name)) if !name.is_empty() => Ok(Placeholder::Param(name.to_string())),
    ("param", _) => Err(PlaceholderError::Malformed(body.to_string())),
    ("target", None) => Ok(Placeholder::Target),
    ("root", None) => Ok(Placeholder::Root),
    ("target" | "root", Some(_)) => Err(PlaceholderError::Malformed(body.to_string())),
    (other, _) => Err(PlaceholderError::UnknownType(other.to_string())),
  }
}

/// Parse and resolve in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut out = String::new();
  for segment in segments {
    match segment {
      Segment::Literal(text) => out.push_str(text),
      Segment::Placeholder(Placeholder::Param(name)) => out.push_str(&resolver.resolve_param(name)?),
      Segment::Placeholder(Placeholder::Target) => out.push_str(resolver.resolve_target()),
      Segment::Placeholder(Placeholder::Root) => out.push_str(resolver.resolve_root()),
    }
  }
  Ok(out)
}

/// Parameter names referenced by `input`, in order of appearance.
pub fn referenced_params(input: &str) -> Result<Vec<String>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|s| match s {
        Segment::Placeholder(Placeholder::Param(name)) => Some(name),
        _ => None,
      })
      .collect(),
  )
}
