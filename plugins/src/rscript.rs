//! [`RenderEnvironment`] answered by short `Rscript -e` queries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rmdrender_core::api::{
    r_string, resolve_program, run_to_completion, EnvironmentError, OutputFormat, ProcessSpec,
    RenderConfig, RenderEnvironment,
};
use tokio::sync::OnceCell;

/// MathJax bundle location inside the installed rmarkdown package.
const MATHJAX_PACKAGE_DIR: &str = "rmd/h/m";

pub struct RscriptEnvironment {
    rscript: String,
    pandoc_path: Option<String>,
    required_version: String,
    timeout: Duration,
    mathjax_dir: Option<PathBuf>,
    /// Only successful answers are cached; a failed query is retried.
    discovered_mathjax: OnceCell<PathBuf>,
    version_ok: OnceCell<()>,
}

impl RscriptEnvironment {
    pub fn new(cfg: &RenderConfig) -> Self {
        Self {
            rscript: cfg.rscript.clone(),
            pandoc_path: cfg.pandoc_path.clone(),
            required_version: cfg.required_version.clone(),
            timeout: Duration::from_millis(cfg.discovery_timeout_ms),
            mathjax_dir: cfg.mathjax_dir.clone(),
            discovered_mathjax: OnceCell::new(),
            version_ok: OnceCell::new(),
        }
    }

    async fn query(&self, expr: String, working_dir: Option<&Path>) -> Result<String, EnvironmentError> {
        let mut spec = ProcessSpec::new(resolve_program(&self.rscript)?);
        spec.args = vec![
            "--slave".into(),
            "--no-save".into(),
            "--no-restore".into(),
            "-e".into(),
            expr,
        ];
        spec.working_dir = working_dir.map(Path::to_path_buf);
        if let Some(pandoc) = &self.pandoc_path {
            spec.envs.push(("RSTUDIO_PANDOC".into(), pandoc.clone()));
        }

        let captured = tokio::time::timeout(self.timeout, run_to_completion(&spec))
            .await
            .map_err(|_| EnvironmentError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if captured.exit_code != 0 {
            return Err(EnvironmentError::QueryFailed {
                code: captured.exit_code,
                stderr: String::from_utf8_lossy(&captured.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&captured.stdout).into_owned())
    }
}

/// Serializes the document's default output format as
/// `{"format_name": ..., "format_options": ...}`.
pub fn output_format_query(target: &Path, encoding: &str) -> String {
    format!(
        "local({{ f <- rmarkdown:::default_output_format({}, encoding = {}); \
         cat(jsonlite::toJSON(list(format_name = f$name, format_options = f$options), \
         auto_unbox = TRUE, null = 'null', force = TRUE)) }})",
        r_string(&target.to_string_lossy()),
        r_string(encoding)
    )
}

pub fn version_query(required: &str) -> String {
    format!(
        "cat(requireNamespace('rmarkdown', quietly = TRUE) && \
         utils::packageVersion('rmarkdown') >= {})",
        r_string(required)
    )
}

pub fn mathjax_query() -> String {
    format!(
        "cat(system.file({}, package = 'rmarkdown'))",
        r_string(MATHJAX_PACKAGE_DIR)
    )
}

/// Last non-empty line of the query output; package start-up messages may
/// precede it.
fn last_line(stdout: &str) -> &str {
    stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

pub fn parse_output_format(stdout: &str) -> Result<OutputFormat, EnvironmentError> {
    serde_json::from_str(last_line(stdout)).map_err(EnvironmentError::Decode)
}

pub fn parse_flag(stdout: &str) -> bool {
    last_line(stdout) == "TRUE"
}

#[async_trait]
impl RenderEnvironment for RscriptEnvironment {
    async fn output_format(
        &self,
        target: &Path,
        encoding: &str,
    ) -> Result<OutputFormat, EnvironmentError> {
        let stdout = self
            .query(output_format_query(target, encoding), target.parent())
            .await?;
        parse_output_format(&stdout)
    }

    async fn have_required_version(&self) -> bool {
        let checked = self
            .version_ok
            .get_or_try_init(|| async {
                match self.query(version_query(&self.required_version), None).await {
                    Ok(stdout) if parse_flag(&stdout) => Ok(()),
                    Ok(_) => Err(()),
                    Err(e) => {
                        tracing::warn!(target: "rmdrender.environment", error = %e, "rmarkdown version check failed");
                        Err(())
                    }
                }
            })
            .await;
        checked.is_ok()
    }

    async fn mathjax_directory(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.mathjax_dir {
            return dir.is_dir().then(|| dir.clone());
        }
        let discovered = self
            .discovered_mathjax
            .get_or_try_init(|| async {
                match self.query(mathjax_query(), None).await {
                    Ok(stdout) => {
                        let dir = PathBuf::from(last_line(&stdout));
                        if !dir.as_os_str().is_empty() && dir.is_dir() {
                            Ok(dir)
                        } else {
                            tracing::debug!(target: "rmdrender.environment", "no MathJax bundle installed");
                            Err(())
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "rmdrender.environment", error = %e, "MathJax discovery failed");
                        Err(())
                    }
                }
            })
            .await;
        discovered.ok().cloned()
    }
}
