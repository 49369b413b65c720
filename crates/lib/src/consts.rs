//! Names shared across the crate.

/// Application name, used in generated file banners.
pub const APP_NAME: &str = "mixbuild";

/// Local repository alias through which source-tree labels are referenced.
pub const SOURCE_ROOT_REPO: &str = "@sourceroot";

/// Architecture tag used for requests whose architecture has no name.
pub const DEFAULT_ARCH_TAG: &str = "x86_64";

/// Separator between the request id, the query kind and the detail in cquery output.
pub const TAG_SEPARATOR: &str = ">>";

/// Separator between the canonical label and the architecture in a request id.
pub const ID_ARCH_SEPARATOR: &str = "|";

/// Label of the synthetic root target depending on every requested target.
pub const BUILDROOT_LABEL: &str = "//:buildroot";

/// Label of the synthetic target that builds nothing but materializes symlink forests.
pub const PHONYROOT_LABEL: &str = "//:phonyroot";

/// Subdirectory of the native build directory holding generated Bazel files.
pub const INTERMEDIATES_DIR_NAME: &str = "bazel";

/// Manifest listing every build-definition file Bazel reads, next to the module list file.
pub const BAZEL_LIST_FILENAME: &str = "bazel.list";
