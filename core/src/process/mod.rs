//! Process execution adapter.
//!
//! Runs an external program with piped stdout/stderr and reports everything
//! through [`ProcessCallbacks`]:
//!
//! - output chunks are delivered in the order they are read,
//! - [`ProcessCallbacks::on_continue`] is polled on every loop iteration (at
//!   least every [`POLL_INTERVAL`] while the process is silent); returning
//!   `false` kills the process and its descendants,
//! - [`ProcessCallbacks::on_exit`] is called exactly once, after the last
//!   output chunk. Exit is observed as soon as the process ends; output still
//!   buffered in the pipes is read for a short grace period, so a descendant
//!   holding the pipes open cannot delay completion.

mod cancel;
mod children;
mod exit;
mod run;

pub use cancel::CancelFlag;
pub use exit::normalize_exit;
pub use run::{
    resolve_program, run_program, run_to_completion, CapturedOutput, ProcessCallbacks, ProcessExit,
    ProcessSpec, POLL_INTERVAL,
};
