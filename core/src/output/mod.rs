//! Addressing of rendered output over HTTP.
//!
//! Artifacts are served under `/rmd_output/<encoded-output-file>/<resource>`.
//! The output file segment is percent-encoded **twice** when the URL is
//! published: the HTTP layer decodes the whole path once before routing, and
//! [`resolve_output_request`] decodes the output file segment a second time.
//! A single encoding pass would turn the `/` separators of the output path
//! into real path separators before we could find where the file ends.

mod resolve;
mod url;

pub use resolve::{requests_mathjax, resolve_output_request, OutputResource};
pub use url::{decode_component, encode_component, output_url};

/// URL path segment all rendered output is mounted under.
pub const OUTPUT_MOUNT: &str = "rmd_output";

/// Reserved first resource segment that maps into the MathJax bundle.
pub const MATHJAX_SEGMENT: &str = "mathjax";
