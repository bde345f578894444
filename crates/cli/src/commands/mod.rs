//! CLI subcommand implementations

pub mod bundles;
pub mod run;
