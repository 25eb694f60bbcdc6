pub mod api;
pub mod config;
pub mod environment;
pub mod error;
pub mod events;
pub mod output;
pub mod paths;
pub mod process;
pub mod render;
pub mod rewrite;
pub mod source_type;
