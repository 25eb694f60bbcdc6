use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Interpreter binary; a bare name is looked up on `PATH`.
    #[serde(default = "default_rscript")]
    pub rscript: String,

    /// Exported to the interpreter as `RSTUDIO_PANDOC` when set.
    #[serde(default)]
    pub pandoc_path: Option<String>,

    /// Hosted inside a desktop shell, which needs an inline MathJax config.
    #[serde(default)]
    pub desktop_mode: bool,

    /// Overrides discovery of the MathJax bundle shipped with rmarkdown.
    #[serde(default)]
    pub mathjax_dir: Option<PathBuf>,

    #[serde(default = "default_required_version")]
    pub required_version: String,

    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,

    /// A custom markdown-to-HTML converter is configured; `.md`/`.Rmd` files
    /// are then left to it instead of being reported as rmarkdown sources.
    #[serde(default)]
    pub markdown_to_html_override: bool,
}

fn default_rscript() -> String {
    "Rscript".to_string()
}

fn default_required_version() -> String {
    "0.9.2".to_string()
}

fn default_discovery_timeout_ms() -> u64 {
    30_000
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            rscript: default_rscript(),
            pandoc_path: None,
            desktop_mode: false,
            mathjax_dir: None,
            required_version: default_required_version(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            markdown_to_html_override: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` still wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files. Logs go to stderr when unset.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// JSON file mapping output paths to previous upload ids. Defaults to
    /// `~/.rmdrender/publish.json`.
    #[serde(default)]
    pub records_file: Option<String>,
}
