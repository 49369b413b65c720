//! Static Bazel and Starlark boilerplate for the generated workspace.
//!
//! Placeholders in `{braces}` are substituted with `.replace`.

/// Contains {workspace} placeholder.
pub const WORKSPACE_TEMPLATE: &str = r#"local_repository(
    name = "sourceroot",
    path = "{workspace}",
)

local_repository(
    name = "rules_cc",
    path = "{workspace}/build/bazel/rules_cc",
)

local_repository(
    name = "bazel_skylib",
    path = "{workspace}/build/bazel/bazel_skylib",
)
"#;

pub const MAIN_BZL: &str = r#"def _config_node_transition_impl(settings, attr):
    return {
        "//command_line_option:platforms": "@sourceroot//build/bazel/platforms:android_%s" % attr.arch,
    }

_config_node_transition = transition(
    implementation = _config_node_transition_impl,
    inputs = [],
    outputs = [
        "//command_line_option:platforms",
    ],
)

def _passthrough_rule_impl(ctx):
    return [DefaultInfo(files = depset(ctx.files.deps))]

config_node = rule(
    implementation = _passthrough_rule_impl,
    attrs = {
        "arch": attr.string(mandatory = True),
        "deps": attr.label_list(cfg = _config_node_transition),
        "_allowlist_function_transition": attr.label(default = "@bazel_tools//tools/allowlists/function_transition_allowlist"),
    },
)

# Depends on every requested target; building it builds the whole delegated tree.
mixed_build_root = rule(
    implementation = _passthrough_rule_impl,
    attrs = {"deps": attr.label_list()},
)

def _phony_root_impl(ctx):
    return []

# Builds nothing, but materializes the symlink forest of its dependencies.
phony_root = rule(
    implementation = _phony_root_impl,
    attrs = {"deps": attr.label_list()},
)
"#;

/// Contains {config_nodes} and {config_node_labels} placeholders.
pub const BUILD_TEMPLATE: &str = r#"load(":main.bzl", "config_node", "mixed_build_root", "phony_root")

{config_nodes}
mixed_build_root(name = "buildroot",
    deps = [{config_node_labels}],
)

phony_root(name = "phonyroot",
    deps = [":buildroot"],
)
"#;

/// Contains {arch} and {labels} placeholders.
pub const CONFIG_NODE_TEMPLATE: &str = r#"config_node(name = "{arch}",
    arch = "{arch}",
    deps = [{labels}],
)
"#;

/// Contains {kind}, {ids} and {body} placeholders.
pub const QUERY_KIND_TEMPLATE: &str = r#"{kind}_Labels = {
{ids}}

def {kind}_Fn(target):
{body}
"#;

/// Contains {kind} placeholder.
pub const QUERY_DISPATCH_TEMPLATE: &str = r#"  if id_string in {kind}_Labels:
    results.append(id_string + ">>{kind}>>" + {kind}_Fn(target))
"#;

/// Contains {kinds} and {dispatch} placeholders.
pub const CQUERY_TEMPLATE: &str = r#"{kinds}
def get_arch(target):
  platforms = build_options(target)["//command_line_option:platforms"]
  if len(platforms) != 1:
    # Each configured target has exactly one platform; the same label under
    # another architecture is a separate configured target.
    fail("expected exactly 1 platform for " + str(target.label) + " but got " + str(platforms))
  platform_name = platforms[0].name
  if platform_name == "host":
    return "HOST"
  elif not platform_name.startswith("android_"):
    fail("expected platform name of the form 'android_<arch>', but was " + str(platforms))
    return "UNKNOWN"
  return platform_name[len("android_"):]

def format(target):
  id_string = str(target.label) + "|" + get_arch(target)
  results = []
{dispatch}
  if not results:
    return id_string + ">>NONE"
  return "\n".join(results)
"#;
