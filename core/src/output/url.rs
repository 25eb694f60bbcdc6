use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::OUTPUT_MOUNT;

/// Everything but ASCII alphanumerics and `-_.~` is escaped; in particular
/// `/`, `%` and spaces.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

pub fn decode_component(s: &str) -> Cow<'_, str> {
    percent_decode_str(s).decode_utf8_lossy()
}

/// Relative URL advertised for an aliased output file: the mount, the file
/// encoded twice, and a trailing `/` so relative resource references in the
/// document resolve beneath it.
pub fn output_url(aliased_output_file: &str) -> String {
    let encoded = encode_component(&encode_component(aliased_output_file));
    format!("{OUTPUT_MOUNT}/{encoded}/")
}
