//! HTTP surface: render RPCs, the event stream and rendered output.

pub mod error;
pub mod middleware;
pub mod output;
pub mod routes;
pub mod server;
pub mod state;

pub use state::AppState;
