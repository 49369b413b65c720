use serde::{Deserialize, Serialize};

use super::{ParseFact, QueryError, QueryKind, split_or_empty};

/// Compile and link facts about a native-code target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcInfo {
  pub output_files: Vec<String>,
  pub cc_object_files: Vec<String>,
  pub cc_static_library_files: Vec<String>,
  pub includes: Vec<String>,
  pub system_includes: Vec<String>,
}

/// Collects [`CcInfo`] from a target's `CcInfo` provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct CcInfoQuery;

pub static CC_INFO: CcInfoQuery = CcInfoQuery;

const SECTION_COUNT: usize = 5;

const CC_INFO_BODY: &str = r#"outputFiles = [f.path for f in target.files.to_list()]

cc_info = providers(target)["CcInfo"]
includes = cc_info.compilation_context.includes.to_list()
system_includes = cc_info.compilation_context.system_includes.to_list()

ccObjectFiles = []
staticLibraries = []
linker_inputs = cc_info.linking_context.linker_inputs.to_list()

for linker_input in linker_inputs:
  for library in linker_input.libraries:
    for object in library.objects:
      ccObjectFiles += [object.path]
    if library.static_library:
      staticLibraries.append(library.static_library.path)

returns = [
  outputFiles,
  staticLibraries,
  ccObjectFiles,
  includes,
  system_includes,
]

return "|".join([", ".join(r) for r in returns])"#;

impl QueryKind for CcInfoQuery {
  fn name(&self) -> &'static str {
    "getCcInfo"
  }

  fn function_body(&self) -> &'static str {
    CC_INFO_BODY
  }
}

impl ParseFact for CcInfoQuery {
  type Fact = CcInfo;

  /// Sections arrive in the order the Starlark body emits them: outputs,
  /// static libraries, objects, includes, system includes.
  fn parse(&self, raw: &str) -> Result<CcInfo, QueryError> {
    let raw = raw.trim();
    let sections: Vec<&str> = raw.split('|').collect();
    if sections.len() != SECTION_COUNT {
      return Err(QueryError::Malformed {
        kind: self.name(),
        expected: SECTION_COUNT,
        actual: sections.len(),
        raw: raw.to_string(),
      });
    }

    Ok(CcInfo {
      output_files: split_or_empty(sections[0], ", "),
      cc_static_library_files: split_or_empty(sections[1], ", "),
      cc_object_files: split_or_empty(sections[2], ", "),
      includes: split_or_empty(sections[3], ", "),
      system_includes: split_or_empty(sections[4], ", "),
    })
  }
}
