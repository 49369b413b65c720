use std::path::{Path, PathBuf};

use crate::aquery::BuildStatement;
use crate::ledger::RequestKey;

use super::{InvokeError, MixedBuildContext};

/// Delegation disabled. Callers must check [`MixedBuildContext::enabled`]
/// before asking for facts; doing otherwise panics.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledContext;

impl MixedBuildContext for DisabledContext {
  fn enabled(&self) -> bool {
    false
  }

  fn get_fact(&self, key: &RequestKey) -> Option<&str> {
    panic!("requested {key} from a context with bazel disabled");
  }

  fn invoke(&mut self) -> Result<(), InvokeError> {
    panic!("invoked a context with bazel disabled");
  }

  fn output_base(&self) -> Option<&Path> {
    None
  }

  fn build_statements(&self) -> &[BuildStatement] {
    &[]
  }

  fn pending_requests(&self) -> Vec<RequestKey> {
    Vec::new()
  }

  fn generated_files(&self) -> Vec<PathBuf> {
    Vec::new()
  }
}
