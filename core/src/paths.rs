use std::path::{Path, PathBuf};

/// Converts between absolute filesystem paths and the display/transport form
/// used in events and URLs.
pub trait PathAliaser: Send + Sync {
    fn alias(&self, path: &Path) -> String;
    fn resolve(&self, aliased: &str) -> PathBuf;
}

/// Rewrites paths under the user's home directory as `~/...`.
#[derive(Debug, Clone)]
pub struct HomeAliaser {
    home: Option<PathBuf>,
}

impl HomeAliaser {
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }
}

impl Default for HomeAliaser {
    fn default() -> Self {
        Self::new()
    }
}

impl PathAliaser for HomeAliaser {
    fn alias(&self, path: &Path) -> String {
        if path.as_os_str().is_empty() {
            return String::new();
        }
        if let Some(home) = &self.home {
            if let Ok(rest) = path.strip_prefix(home) {
                let rest = rest.to_string_lossy().replace('\\', "/");
                return if rest.is_empty() {
                    "~".to_string()
                } else {
                    format!("~/{rest}")
                };
            }
        }
        path.to_string_lossy().into_owned()
    }

    fn resolve(&self, aliased: &str) -> PathBuf {
        match (&self.home, aliased) {
            (Some(home), "~") => home.clone(),
            (Some(home), s) if s.starts_with("~/") => home.join(&s[2..]),
            _ => PathBuf::from(aliased),
        }
    }
}
