use std::path::{Path, PathBuf};

/// Line prefix printed by `rmarkdown::render` once the artifact is written.
pub const COMPLETION_MARKER: &str = "Output created: ";

/// Interleaved stdout and stderr text of one render, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn output_file_name(&self) -> Option<&str> {
        find_output_file(&self.text)
    }
}

/// File name announced by the first completion marker line, trailing
/// whitespace (including a CR from CRLF output) removed.
pub fn find_output_file(output: &str) -> Option<&str> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(COMPLETION_MARKER))
        .map(str::trim_end)
        .filter(|name| !name.is_empty())
}

/// Absolute names are used as-is; relative ones live next to the document.
pub fn resolve_output_file(name: &str, target_dir: &Path) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        target_dir.join(path)
    }
}
