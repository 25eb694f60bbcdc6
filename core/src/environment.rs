//! Queries answered by the rendering interpreter itself.
//!
//! The render pipeline only depends on the [`RenderEnvironment`] trait; the
//! Rscript-backed implementation lives in `rmdrender-plugins` so tests can
//! substitute a fake without an R installation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EnvironmentError;

/// Name of the output format a document declares (`html_document`,
/// `pdf_document`, ...). `Unknown` when discovery failed or returned nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormatName {
    Named(String),
    #[default]
    Unknown,
}

impl FormatName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim().is_empty() {
            FormatName::Unknown
        } else {
            FormatName::Named(name)
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FormatName::Named(name) => Some(name),
            FormatName::Unknown => None,
        }
    }
}

impl Serialize for FormatName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FormatName::Named(name) => serializer.serialize_str(name),
            FormatName::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for FormatName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.map(FormatName::new).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputFormat {
    #[serde(default)]
    pub format_name: FormatName,
    #[serde(default)]
    pub format_options: serde_json::Value,
}

impl OutputFormat {
    pub fn unknown() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait RenderEnvironment: Send + Sync {
    /// Output format declared by `target`, read with `encoding`.
    async fn output_format(
        &self,
        target: &Path,
        encoding: &str,
    ) -> Result<OutputFormat, EnvironmentError>;

    /// Whether the renderer package is installed at the required version.
    async fn have_required_version(&self) -> bool;

    /// Directory holding the MathJax bundle served under the `mathjax`
    /// segment, if one is installed.
    async fn mathjax_directory(&self) -> Option<PathBuf>;
}
