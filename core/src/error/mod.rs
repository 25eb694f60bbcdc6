mod config_error;
mod environment_error;
mod process_error;
mod resolve_error;

pub use config_error::ConfigError;
pub use environment_error::EnvironmentError;
pub use process_error::ProcessError;
pub use resolve_error::ResolveError;
