use std::path::{Component, Path, PathBuf};

use crate::error::ResolveError;
use crate::paths::PathAliaser;

use super::url::decode_component;
use super::MATHJAX_SEGMENT;

/// What a request beneath the output mount refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputResource {
    /// The rendered document itself; served uncached through the rewriter.
    Artifact(PathBuf),
    /// A file from the MathJax bundle; cacheable, unfiltered.
    MathJax(PathBuf),
    /// A file next to (or below) the artifact; cacheable, unfiltered.
    Nested(PathBuf),
}

impl OutputResource {
    pub fn path(&self) -> &Path {
        match self {
            OutputResource::Artifact(p) | OutputResource::MathJax(p) | OutputResource::Nested(p) => p,
        }
    }
}

/// Split at the first `/` after offset 0, which ends the output file segment.
fn split_output_path(path: &str) -> Option<(&str, &str)> {
    let pos = path.get(1..)?.find('/')? + 1;
    Some((&path[..pos], &path[pos + 1..]))
}

/// Whether `path` addresses the MathJax bundle, so callers only look the
/// bundle up when it is needed.
pub fn requests_mathjax(path: &str) -> bool {
    split_output_path(path).is_some_and(|(_, rest)| mathjax_subpath(rest).is_some())
}

/// Resolve `path`, the part of the request path after the mount, which the
/// HTTP layer has already percent-decoded once.
pub fn resolve_output_request(
    path: &str,
    aliaser: &dyn PathAliaser,
    mathjax_dir: Option<&Path>,
) -> Result<OutputResource, ResolveError> {
    let (segment, rest) = split_output_path(path).ok_or(ResolveError::NoOutputFile)?;

    let output_file = decode_component(segment);
    let artifact = aliaser.resolve(&output_file);
    if !artifact.exists() {
        return Err(ResolveError::NotFound(output_file.into_owned()));
    }

    if rest.is_empty() {
        return Ok(OutputResource::Artifact(artifact));
    }

    if let Some(sub) = mathjax_subpath(rest) {
        let dir = mathjax_dir.ok_or(ResolveError::MathJaxUnavailable)?;
        let file = existing_file_below(dir, sub)
            .ok_or_else(|| ResolveError::NotFound(rest.to_string()))?;
        return Ok(OutputResource::MathJax(file));
    }

    let parent = artifact.parent().unwrap_or_else(|| Path::new("/"));
    let file =
        existing_file_below(parent, rest).ok_or_else(|| ResolveError::NotFound(rest.to_string()))?;
    Ok(OutputResource::Nested(file))
}

fn mathjax_subpath(rest: &str) -> Option<&str> {
    let sub = rest.strip_prefix(MATHJAX_SEGMENT)?;
    if sub.is_empty() {
        Some(sub)
    } else {
        sub.strip_prefix('/')
    }
}

fn existing_file_below(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let confined = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !confined {
        return None;
    }
    let file = base.join(relative);
    file.is_file().then_some(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::encode_component;
    use crate::paths::HomeAliaser;
    use std::fs;

    struct Fixture {
        _home: tempfile::TempDir,
        mathjax: tempfile::TempDir,
        aliaser: HomeAliaser,
    }

    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let docs = home.path().join("docs");
        fs::create_dir_all(docs.join("img")).unwrap();
        fs::write(docs.join("report.html"), "<html></html>").unwrap();
        fs::write(docs.join("img/plot.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let mathjax = tempfile::tempdir().unwrap();
        fs::write(mathjax.path().join("MathJax.js"), "// mathjax").unwrap();

        let aliaser = HomeAliaser::with_home(home.path());
        Fixture {
            _home: home,
            mathjax,
            aliaser,
        }
    }

    /// The request path as seen after the HTTP layer's decoding pass.
    fn request(aliased: &str, rest: &str) -> String {
        format!("{}/{}", encode_component(aliased), rest)
    }

    #[test]
    fn empty_remainder_is_the_artifact() {
        let fx = fixture();
        let res = resolve_output_request(
            &request("~/docs/report.html", ""),
            &fx.aliaser,
            Some(fx.mathjax.path()),
        )
        .unwrap();
        assert!(matches!(res, OutputResource::Artifact(ref p) if p.ends_with("docs/report.html")));
    }

    #[test]
    fn mathjax_segment_maps_into_bundle() {
        let fx = fixture();
        let res = resolve_output_request(
            &request("~/docs/report.html", "mathjax/MathJax.js"),
            &fx.aliaser,
            Some(fx.mathjax.path()),
        )
        .unwrap();
        assert_eq!(res, OutputResource::MathJax(fx.mathjax.path().join("MathJax.js")));

        let err = resolve_output_request(
            &request("~/docs/report.html", "mathjax/MathJax.js"),
            &fx.aliaser,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::MathJaxUnavailable);
    }

    #[test]
    fn other_paths_resolve_next_to_artifact() {
        let fx = fixture();
        let res = resolve_output_request(
            &request("~/docs/report.html", "img/plot.png"),
            &fx.aliaser,
            Some(fx.mathjax.path()),
        )
        .unwrap();
        assert!(matches!(res, OutputResource::Nested(ref p) if p.ends_with("docs/img/plot.png")));
    }

    #[test]
    fn missing_artifact_names_the_file() {
        let fx = fixture();
        let err = resolve_output_request(
            &request("~/docs/gone.html", ""),
            &fx.aliaser,
            Some(fx.mathjax.path()),
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::NotFound("~/docs/gone.html".into()));
        assert_eq!(err.to_string(), "~/docs/gone.html not found");
    }

    #[test]
    fn only_mathjax_segment_requests_the_bundle() {
        assert!(requests_mathjax(&request("~/docs/report.html", "mathjax/MathJax.js")));
        assert!(requests_mathjax(&request("~/docs/report.html", "mathjax")));
        assert!(!requests_mathjax(&request("~/docs/report.html", "")));
        assert!(!requests_mathjax(&request("~/docs/report.html", "img/plot.png")));
        assert!(!requests_mathjax(&request("~/docs/report.html", "mathjaxish.js")));
        assert!(!requests_mathjax("~%2Fdocs%2Freport.html"));
    }

    #[test]
    fn missing_separator_means_no_output_file() {
        let fx = fixture();
        let err = resolve_output_request("~%2Fdocs%2Freport.html", &fx.aliaser, None).unwrap_err();
        assert_eq!(err, ResolveError::NoOutputFile);
    }

    #[test]
    fn traversal_and_missing_resources_are_not_found() {
        let fx = fixture();
        for rest in ["../../etc/passwd", "img/missing.png", "mathjax/../report.html"] {
            let err = resolve_output_request(
                &request("~/docs/report.html", rest),
                &fx.aliaser,
                Some(fx.mathjax.path()),
            )
            .unwrap_err();
            assert_eq!(err, ResolveError::NotFound(rest.to_string()), "{rest}");
        }
    }
}
