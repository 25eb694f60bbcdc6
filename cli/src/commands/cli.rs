use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use rmdrender_core::api::AppConfig;
use rmdrender_core::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Render R Markdown documents and serve their output")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file; defaults apply when it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Interpreter used to run rmarkdown.
    #[arg(long, global = true)]
    pub rscript: Option<String>,

    /// Pandoc directory exported as RSTUDIO_PANDOC.
    #[arg(long, global = true)]
    pub pandoc: Option<String>,

    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub session_id: Option<String>,

    /// Preview is hosted by a desktop shell.
    #[arg(long, default_value_t = false)]
    pub desktop: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFormat {
    Text,
    Jsonl,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RenderArgs {
    /// Document to render.
    pub file: PathBuf,

    /// Source line for preview positioning; negative means none.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub line: i32,

    #[arg(long, default_value = "UTF-8")]
    pub encoding: String,

    #[arg(long, value_enum, default_value_t = EventFormat::Text)]
    pub format: EventFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Render one document and print its events.
    Render(RenderArgs),
    /// Report whether rmarkdown is available.
    Context,
}

impl Args {
    /// Flags take precedence over the config file and environment.
    pub fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(rscript) = &self.rscript {
            cfg.render.rscript = rscript.clone();
        }
        if let Some(pandoc) = &self.pandoc {
            cfg.render.pandoc_path = Some(pandoc.clone());
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level = level.clone();
        }
        if let Commands::Serve(serve) = &self.command {
            if let Some(host) = &serve.host {
                cfg.http_server.host = host.clone();
            }
            if let Some(port) = serve.port {
                cfg.http_server.port = port;
            }
            if serve.desktop {
                cfg.render.desktop_mode = true;
            }
        }
    }
}
