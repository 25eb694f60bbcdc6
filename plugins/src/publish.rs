use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rmdrender_core::api::PublishRecords;

const RECORDS_DIR: &str = ".rmdrender";
const RECORDS_FILE: &str = "publish.json";

/// Upload ids keyed by absolute output path, stored as a JSON object.
///
/// The file is re-read on every lookup so uploads recorded by another process
/// are picked up without a restart.
#[derive(Debug, Clone)]
pub struct JsonPublishRecords {
    path: PathBuf,
}

impl JsonPublishRecords {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.rmdrender/publish.json`, when a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(RECORDS_DIR).join(RECORDS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read publish records {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parse publish records {}", self.path.display()))
    }

    /// Remember `upload_id` for `output_file`, replacing any earlier id.
    pub fn record(&self, output_file: &Path, upload_id: &str) -> Result<()> {
        let mut records = self.read()?;
        records.insert(output_file.to_string_lossy().into_owned(), upload_id.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write publish records {}", self.path.display()))
    }
}

impl PublishRecords for JsonPublishRecords {
    fn previous_upload_id(&self, output_file: &Path) -> Option<String> {
        match self.read() {
            Ok(records) => records
                .get(output_file.to_string_lossy().as_ref())
                .filter(|id| !id.is_empty())
                .cloned(),
            Err(e) => {
                tracing::warn!(target: "rmdrender.publish", error = %e, "publish records unreadable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_unpublished() {
        let dir = tempfile::tempdir().unwrap();
        let records = JsonPublishRecords::new(dir.path().join("publish.json"));
        assert_eq!(records.previous_upload_id(Path::new("/a/report.html")), None);
    }

    #[test]
    fn recorded_uploads_are_found() {
        let dir = tempfile::tempdir().unwrap();
        let records = JsonPublishRecords::new(dir.path().join("nested").join("publish.json"));
        records
            .record(Path::new("/a/report.html"), "https://rpubs.com/ada/42")
            .unwrap();

        assert_eq!(
            records.previous_upload_id(Path::new("/a/report.html")).as_deref(),
            Some("https://rpubs.com/ada/42")
        );
        assert_eq!(records.previous_upload_id(Path::new("/a/other.html")), None);
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publish.json");
        std::fs::write(&path, "not json").unwrap();
        let records = JsonPublishRecords::new(path);
        assert_eq!(records.previous_upload_id(Path::new("/a/report.html")), None);
        assert!(records.record(Path::new("/a/report.html"), "1").is_err());
    }
}
