pub mod outcome;
pub mod runner;

pub use outcome::{CompletionTrigger, TrialOutcome};
pub use runner::{TrialCompleter, TrialHandle, TrialRunner};
