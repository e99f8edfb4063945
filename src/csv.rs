//! Minimal CSV field quoting for the append-only report files.

use std::borrow::Cow;

/// Quotes a field when it contains a separator, quote, or line break.
pub(crate) fn field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
