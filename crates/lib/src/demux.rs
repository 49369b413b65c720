//! Routing cquery output back to the requests that asked for it.
//!
//! Each line of interest reads `<id>>><kind>>><detail>`; lines for targets
//! nobody asked about read `<id>>>NONE` and are dropped.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::consts::TAG_SEPARATOR;
use crate::ledger::RequestLedger;
use crate::runner::CommandOutput;

const NONE_PAYLOAD: &str = "NONE";

#[derive(Debug, Error)]
pub enum DemuxError {
  #[error(
    "missing result for bazel target(s) {}. malformed lines: [{}], query output: [{stdout}], cquery err: [{stderr}]",
    .missing.join(", "),
    .malformed.join("; ")
  )]
  MissingResults {
    missing: Vec<String>,
    /// Lines carrying an id but no kind.
    malformed: Vec<String>,
    stdout: String,
    stderr: String,
  },
}

/// Query stdout split into answers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct QueryResults {
  /// `(id, kind) -> detail`; a repeated `(id, kind)` keeps the last detail.
  pub answers: HashMap<(String, String), String>,
  /// Lines with an id but no kind segment.
  pub malformed: Vec<String>,
}

/// Split query stdout into answers.
///
/// Lines without the separator are Bazel chatter and are skipped.
pub fn parse_query_output(stdout: &str) -> QueryResults {
  let mut results = QueryResults::default();
  for line in stdout.lines() {
    let Some((id, payload)) = line.split_once(TAG_SEPARATOR) else {
      continue;
    };
    if payload == NONE_PAYLOAD {
      continue;
    }
    let Some((kind, detail)) = payload.split_once(TAG_SEPARATOR) else {
      debug!(line = %line, "query line without a kind");
      results.malformed.push(line.to_string());
      continue;
    };
    results
      .answers
      .insert((id.to_string(), kind.to_string()), detail.to_string());
  }
  results
}

/// Resolve every pending request in `ledger` from `output`.
///
/// Nothing is recorded unless every pending request has an answer.
///
/// # Errors
///
/// Returns [`DemuxError::MissingResults`] listing each unanswered request id
/// together with any malformed lines and the raw stdout and stderr.
pub fn resolve_pending(ledger: &mut RequestLedger, output: &CommandOutput) -> Result<usize, DemuxError> {
  let QueryResults { answers, malformed } = parse_query_output(&output.stdout);
  let pending = ledger.pending_keys();

  let missing: Vec<String> = pending
    .iter()
    .filter(|key| !answers.contains_key(&(key.id(), key.kind.to_string())))
    .map(|key| key.id())
    .collect();
  if !missing.is_empty() {
    return Err(DemuxError::MissingResults {
      missing,
      malformed,
      stdout: output.stdout.clone(),
      stderr: output.stderr.clone(),
    });
  }

  let resolved = pending.len();
  for key in pending {
    // Common and the default arch share an id, so answers are copied rather than taken.
    if let Some(detail) = answers.get(&(key.id(), key.kind.to_string())) {
      ledger.resolve(key, detail.clone());
    }
  }

  debug!(resolved, "resolved pending requests");
  Ok(resolved)
}
