use clap::Parser;

mod commands;
mod http;
mod logging;

use commands::cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut cfg = rmdrender_core::config::load(&args.config)?;
    args.apply_overrides(&mut cfg);
    let guard = logging::init(&cfg.logging)?;

    let exit = match args.command {
        Commands::Serve(serve_args) => commands::serve::handle_serve(serve_args, cfg).await?,
        Commands::Render(render_args) => commands::render::handle_render(render_args, cfg).await?,
        Commands::Context => commands::context::handle_context(cfg).await?,
    };

    drop(guard);
    std::process::exit(exit);
}
