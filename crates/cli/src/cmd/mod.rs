mod actions;
mod build;
mod scripts;

pub use actions::cmd_actions;
pub use build::cmd_build;
pub use scripts::cmd_scripts;
