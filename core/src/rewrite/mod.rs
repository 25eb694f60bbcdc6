//! Streaming rewriter for rendered HTML served to the preview.

mod mathjax;

pub use mathjax::{MathjaxFilter, MATHJAX_CONFIG_SCRIPT};
