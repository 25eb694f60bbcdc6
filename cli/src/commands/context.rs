use anyhow::Result;
use rmdrender_core::api::{AppConfig, RenderEnvironment};
use rmdrender_plugins::factory::build_environment;

pub async fn handle_context(cfg: AppConfig) -> Result<i32> {
    let environment = build_environment(&cfg);
    let rmarkdown_installed = environment.have_required_version().await;
    let mathjax_dir = environment.mathjax_directory().await;

    let context = serde_json::json!({
        "rmarkdown_installed": rmarkdown_installed,
        "render_running": false,
        "required_version": cfg.render.required_version,
        "mathjax_dir": mathjax_dir,
    });
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(if rmarkdown_installed { 0 } else { 1 })
}
