pub mod controller;
pub mod state;

pub use controller::{SessionConfig, SessionController, DEFAULT_MEDIA_DURATION_SECS};
pub use state::{Rejection, SessionPhase, SessionState, StartSession};
