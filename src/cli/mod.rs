//! Terminal front-end. Each invocation opens the data directory, rehydrates
//! the session and runs one command against it.

mod args;
mod bootstrap;
mod output;
mod runner;

pub use args::{Args, Command, SettingsAction};
pub use bootstrap::{initialize, CliContext};
pub use runner::execute;
