use std::path::Path;

pub const RMARKDOWN_SOURCE_TYPE: &str = "rmarkdown";

const V1_MARKER: &str = "<!-- rmarkdown v1 -->";

/// Extended source type for an editor document, if it should be rendered with
/// rmarkdown. Documents carrying the v1 marker keep the legacy rendering path,
/// as does everything when a markdown-to-HTML override is configured.
/// Package availability is checked by the caller.
pub fn detect_source_type(
    path: &Path,
    contents: &str,
    markdown_to_html_override: bool,
) -> Option<&'static str> {
    if path.as_os_str().is_empty() || markdown_to_html_override {
        return None;
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext != "rmd" && ext != "md" {
        return None;
    }
    if contents.to_ascii_lowercase().contains(V1_MARKER) {
        return None;
    }
    Some(RMARKDOWN_SOURCE_TYPE)
}
