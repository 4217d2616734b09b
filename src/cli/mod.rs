//! Command Line Interface (CLI) layer for glacierprep.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) that loads the workflow
//! configuration, opens the object store and dispatches each subcommand to
//! the library functionality exposed via `glacierprep::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
