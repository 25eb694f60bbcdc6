//! Redirects MathJax loading to the locally installed bundle.
//!
//! ```text
//! in:  script.src  = "https://mathjax.rstudio.com/latest/MathJax.js?config=TeX-AMS"
//! out: script.src  = "mathjax/MathJax.js?config=TeX-AMS"
//! ```
//!
//! When no math markup precedes the loader line, the line is dropped so the
//! preview does not pay for loading MathJax at all.

use std::sync::OnceLock;

use async_stream::try_stream;
use bytes::Bytes;
use futures::Stream;
use regex::bytes::{Captures, Regex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::output::MATHJAX_SEGMENT;

const CONFIG_COMMENT: &str = "<!-- dynamically load mathjax";

/// Inline configuration emitted for desktop-hosted previews, whose embedded
/// browser needs web fonts disabled and a larger minimum scale.
pub const MATHJAX_CONFIG_SCRIPT: &str = concat!(
    "<script type=\"text/x-mathjax-config\">",
    "MathJax.Hub.Config({\"HTML-CSS\": { minScaleAdjust: 125, availableFonts: [] } });",
    "</script>"
);

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Math start tokens, the config comment, and the loader assignment.
        Regex::new(concat!(
            r"<!-- dynamically load mathjax|\\\[|\\\(|<math|",
            r#"(?m)^(\s*script.src\s*=\s*)"http.*?(MathJax\.js[^"]*)""#
        ))
        .expect("mathjax pattern is valid")
    })
}

#[derive(Debug, Clone)]
pub struct MathjaxFilter {
    inject_config: bool,
    has_math: bool,
}

impl MathjaxFilter {
    pub fn new(inject_config: bool) -> Self {
        Self {
            inject_config,
            has_math: false,
        }
    }

    /// Filter for the current host: the config block is only needed for
    /// desktop previews, and never on macOS where the system web view copes.
    pub fn for_host(desktop_mode: bool) -> Self {
        Self::new(desktop_mode && !cfg!(target_os = "macos"))
    }

    pub fn has_math(&self) -> bool {
        self.has_math
    }

    /// Rewrite one line (including its terminator). Every construct the
    /// filter reacts to fits on a single line.
    pub fn filter_line(&mut self, line: &[u8]) -> Vec<u8> {
        pattern()
            .replace_all(line, |caps: &Captures<'_>| self.substitute(caps))
            .into_owned()
    }

    fn substitute(&mut self, caps: &Captures<'_>) -> Vec<u8> {
        let matched = &caps[0];
        match matched {
            b"\\[" | b"\\(" | b"<math" => {
                self.has_math = true;
                matched.to_vec()
            }
            m if m == CONFIG_COMMENT.as_bytes() => {
                if !self.inject_config {
                    return m.to_vec();
                }
                let mut out = Vec::with_capacity(MATHJAX_CONFIG_SCRIPT.len() + 1 + m.len());
                out.extend_from_slice(MATHJAX_CONFIG_SCRIPT.as_bytes());
                out.push(b'\n');
                out.extend_from_slice(m);
                out
            }
            _ if self.has_math => {
                let mut out = caps[1].to_vec();
                out.push(b'"');
                out.extend_from_slice(MATHJAX_SEGMENT.as_bytes());
                out.push(b'/');
                out.extend_from_slice(&caps[2]);
                out.push(b'"');
                out
            }
            _ => Vec::new(),
        }
    }

    /// Stream `reader` through the filter line by line.
    pub fn filter_stream<R>(mut self, mut reader: R) -> impl Stream<Item = std::io::Result<Bytes>>
    where
        R: AsyncBufRead + Unpin,
    {
        try_stream! {
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                yield Bytes::from(self.filter_line(&line));
            }
        }
    }
}
