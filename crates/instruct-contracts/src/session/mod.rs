//! Generation lifecycle for a single streaming session.
//!
//! The machine consumes user actions and decoded server frames and answers
//! with [`Effect`]s. Rendering and networking live with the caller.

mod intents;
mod machine;
mod state;

pub use intents::{Banner, DropReason, Effect, Outcome, RejectReason, ViewIntent};
pub use machine::SessionMachine;
pub use state::{ActiveRequest, InputMode, Phase, SessionState};
