use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_ARCH_TAG;

/// Target architecture of a module variant.
///
/// `Common` is the architecture-independent variant; it has no name of its own
/// and is requested from Bazel under [`DEFAULT_ARCH_TAG`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
  Common,
  Arm,
  Arm64,
  X86,
  X86_64,
}

impl Arch {
  /// Returns the architecture's own name, empty for [`Arch::Common`].
  pub fn name(&self) -> &'static str {
    match self {
      Self::Common => "",
      Self::Arm => "arm",
      Self::Arm64 => "arm64",
      Self::X86 => "x86",
      Self::X86_64 => "x86_64",
    }
  }

  /// Returns the tag used in request ids and config node names.
  pub fn request_tag(&self) -> &'static str {
    match self.name() {
      "" => DEFAULT_ARCH_TAG,
      name => name,
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Common => write!(f, "common"),
      other => write!(f, "{}", other.name()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown architecture: {0}")]
pub struct UnknownArch(pub String);

impl FromStr for Arch {
  type Err = UnknownArch;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "" | "common" => Ok(Self::Common),
      "arm" => Ok(Self::Arm),
      "arm64" => Ok(Self::Arm64),
      "x86" => Ok(Self::X86),
      "x86_64" => Ok(Self::X86_64),
      other => Err(UnknownArch(other.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn common_requests_default_tag() {
    assert_eq!(Arch::Common.name(), "");
    assert_eq!(Arch::Common.request_tag(), "x86_64");
    assert_eq!(Arch::Arm64.request_tag(), "arm64");
  }

  #[test]
  fn parses_names_and_display_round_trip() {
    for arch in [Arch::Common, Arch::Arm, Arch::Arm64, Arch::X86, Arch::X86_64] {
      assert_eq!(arch.to_string().parse::<Arch>().unwrap(), arch);
    }
    assert!("mips".parse::<Arch>().is_err());
  }

  #[test]
  fn serde_uses_snake_case_names() {
    let json = serde_json::to_string(&[Arch::Arm64, Arch::X86_64]).unwrap();
    assert_eq!(json, r#"["arm64","x86_64"]"#);
  }
}
