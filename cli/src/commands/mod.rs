pub mod cli;
pub mod context;
pub mod render;
pub mod serve;
