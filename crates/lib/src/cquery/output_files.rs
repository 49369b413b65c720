use super::{ParseFact, QueryError, QueryKind, split_or_empty};

/// Lists the paths of a target's default output files.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFilesQuery;

pub static OUTPUT_FILES: OutputFilesQuery = OutputFilesQuery;

impl OutputFilesQuery {
  /// Split a payload into paths. Every string is a valid payload.
  pub fn files(&self, raw: &str) -> Vec<String> {
    split_or_empty(raw.trim(), ", ")
  }
}

impl QueryKind for OutputFilesQuery {
  fn name(&self) -> &'static str {
    "getOutputFiles"
  }

  fn function_body(&self) -> &'static str {
    "return ', '.join([f.path for f in target.files.to_list()])"
  }
}

impl ParseFact for OutputFilesQuery {
  type Fact = Vec<String>;

  fn parse(&self, raw: &str) -> Result<Vec<String>, QueryError> {
    Ok(self.files(raw))
  }
}
