//! Subcommand implementations. Each writes its report to the given writer.

pub mod allocate;
pub mod cleanup;
pub mod list;
pub mod stop;
