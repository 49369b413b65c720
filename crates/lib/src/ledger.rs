//! Deduplicating record of facts requested from the remote engine.
//!
//! Analysis threads call [`RequestLedger::get_fact`] concurrently through a
//! shared reference. Requests that have not been answered yet are collected
//! in a mutex-guarded pending set; answers are written only through `&mut`
//! once the engine has run, so reads of resolved facts never take the lock.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::consts::{ID_ARCH_SEPARATOR, SOURCE_ROOT_REPO};
use crate::platform::Arch;

/// Identifies one fact: a label evaluated by one query kind under one architecture.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey {
  pub label: String,
  pub kind: &'static str,
  pub arch: Arch,
}

impl RequestKey {
  pub fn new(label: impl Into<String>, kind: &'static str, arch: Arch) -> Self {
    Self {
      label: label.into(),
      kind,
      arch,
    }
  }

  /// The label as seen from the synthesized workspace.
  pub fn canonical_label(&self) -> String {
    canonicalize_label(&self.label)
  }

  /// Request id used in the query script and its output: `<canonical-label>|<arch>`.
  pub fn id(&self) -> String {
    format!(
      "{}{}{}",
      self.canonical_label(),
      ID_ARCH_SEPARATOR,
      self.arch.request_tag()
    )
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.id(), self.kind)
  }
}

/// Reference a source-tree label through the `@sourceroot` repository.
///
/// `//foo:bar` and `foo:bar` both become `@sourceroot//foo:bar`.
pub fn canonicalize_label(label: &str) -> String {
  if label.starts_with("//") {
    format!("{SOURCE_ROOT_REPO}{label}")
  } else {
    format!("{SOURCE_ROOT_REPO}//{label}")
  }
}

#[derive(Debug, Default)]
pub struct RequestLedger {
  pending: Mutex<BTreeSet<RequestKey>>,
  resolved: HashMap<RequestKey, String>,
}

impl RequestLedger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the resolved value for `key`, or queue it and return `None`.
  ///
  /// Never blocks on the remote engine. Asking for the same key twice queues
  /// it once.
  pub fn get_fact(&self, key: &RequestKey) -> Option<&str> {
    if let Some(value) = self.resolved.get(key) {
      return Some(value.as_str());
    }

    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    if pending.insert(key.clone()) {
      trace!(request = %key, "queued remote fact");
    }
    None
  }

  /// Snapshot of the pending keys in sorted order.
  pub fn pending_keys(&self) -> Vec<RequestKey> {
    let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    pending.iter().cloned().collect()
  }

  pub fn pending_len(&self) -> usize {
    self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn has_pending(&self) -> bool {
    self.pending_len() > 0
  }

  pub fn resolved_len(&self) -> usize {
    self.resolved.len()
  }

  pub fn is_resolved(&self, key: &RequestKey) -> bool {
    self.resolved.contains_key(key)
  }

  /// Record the answer for `key`. Later lookups return it without queuing.
  pub fn resolve(&mut self, key: RequestKey, value: String) {
    self.resolved.insert(key, value);
  }

  /// Drop every pending key after a completed invocation cycle.
  pub fn clear_pending(&mut self) {
    self.pending.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
  }
}
