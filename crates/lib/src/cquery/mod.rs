//! Query kinds evaluated by Bazel's `cquery --output=starlark`.
//!
//! A query kind contributes a Starlark function body that turns a configured
//! target into a string, and knows how to parse that string back into a typed
//! fact. Many targets' requests are batched into one script, so function bodies
//! must be pure: the same target always yields the same text.

mod cc_info;
mod output_files;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use thiserror::Error;

pub use cc_info::{CC_INFO, CcInfo, CcInfoQuery};
pub use output_files::{OUTPUT_FILES, OutputFilesQuery};

/// Errors raised while registering query kinds or parsing their results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  #[error("query kind {0:?} is already registered")]
  DuplicateKind(String),

  #[error("query kind name {0:?} must be non-empty and alphanumeric")]
  InvalidName(String),

  #[error("malformed {kind} result: expected {expected} items, got {actual} in {raw:?}")]
  Malformed {
    kind: &'static str,
    expected: usize,
    actual: usize,
    raw: String,
  },
}

/// A named Starlark request that can be issued for a configured target.
pub trait QueryKind: fmt::Debug + Send + Sync {
  /// Unique, alphanumeric name; used to build Starlark identifiers.
  fn name(&self) -> &'static str;

  /// Body of a Starlark function taking `target` and returning a string.
  ///
  /// The body is not indented outside of its own scope; the synthesizer
  /// indents it into place.
  fn function_body(&self) -> &'static str;
}

/// A query kind whose output parses into a typed fact.
pub trait ParseFact: QueryKind {
  type Fact;

  /// Parse one result payload.
  ///
  /// # Errors
  ///
  /// Malformed payloads are errors, never partial values: they mean the
  /// Starlark side and this parser disagree about the format.
  fn parse(&self, raw: &str) -> Result<Self::Fact, QueryError>;
}

/// Query kinds known to a process, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct QueryRegistry {
  kinds: BTreeMap<&'static str, &'static dyn QueryKind>,
}

impl QueryRegistry {
  /// Register a query kind.
  ///
  /// # Errors
  ///
  /// Rejects names that are empty, non-alphanumeric or already registered.
  pub fn register(&mut self, kind: &'static dyn QueryKind) -> Result<(), QueryError> {
    let name = kind.name();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
      return Err(QueryError::InvalidName(name.to_string()));
    }
    if self.kinds.contains_key(name) {
      return Err(QueryError::DuplicateKind(name.to_string()));
    }
    self.kinds.insert(name, kind);
    Ok(())
  }

  /// Look up a kind by name.
  pub fn get(&self, name: &str) -> Option<&'static dyn QueryKind> {
    self.kinds.get(name).copied()
  }

  /// Iterate kinds in name order.
  pub fn iter(&self) -> impl Iterator<Item = &'static dyn QueryKind> + '_ {
    self.kinds.values().copied()
  }

  pub fn len(&self) -> usize {
    self.kinds.len()
  }

  pub fn is_empty(&self) -> bool {
    self.kinds.is_empty()
  }

  /// The registry of built-in kinds, created on first use.
  ///
  /// # Panics
  ///
  /// Panics if two built-in kinds share a name.
  pub fn builtin() -> &'static QueryRegistry {
    static BUILTIN: LazyLock<QueryRegistry> = LazyLock::new(|| {
      let mut registry = QueryRegistry::default();
      let kinds: [&'static dyn QueryKind; 2] = [&OUTPUT_FILES, &CC_INFO];
      for kind in kinds {
        if let Err(err) = registry.register(kind) {
          panic!("invalid built-in query kind: {err}");
        }
      }
      registry
    });
    &BUILTIN
  }
}

/// Split a `", "`-joined list, treating the empty string as an empty list.
pub(crate) fn split_or_empty(raw: &str, separator: &str) -> Vec<String> {
  if raw.is_empty() {
    Vec::new()
  } else {
    raw.split(separator).map(str::to_string).collect()
  }
}
