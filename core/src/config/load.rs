use std::path::Path;

use crate::error::ConfigError;

use super::types::AppConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

pub fn load_default() -> Result<AppConfig, ConfigError> {
    load(Path::new(DEFAULT_CONFIG_FILE))
}

/// Load `path` (missing file → defaults) and apply `RMDRENDER_*` overrides.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut cfg: AppConfig = if path.exists() {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?
    } else {
        tracing::debug!(target: "rmdrender.config", path = %path.display(), "config file absent, using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

fn apply_env_overrides<F>(cfg: &mut AppConfig, var: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("RMDRENDER_RSCRIPT") {
        cfg.render.rscript = v;
    }
    if let Some(v) = non_empty("RMDRENDER_PANDOC") {
        cfg.render.pandoc_path = Some(v);
    }
    if let Some(v) = non_empty("RMDRENDER_MATHJAX_DIR") {
        cfg.render.mathjax_dir = Some(v.into());
    }
    if let Some(v) = non_empty("RMDRENDER_HOST") {
        cfg.http_server.host = v;
    }
    if let Some(v) = non_empty("RMDRENDER_PORT") {
        cfg.http_server.port = v.trim().parse().map_err(|_| ConfigError::EnvInvalid {
            key: "RMDRENDER_PORT".into(),
            value: v.clone(),
        })?;
    }
    if let Some(v) = non_empty("RMDRENDER_LOG") {
        cfg.logging.level = v;
    }
    Ok(())
}
