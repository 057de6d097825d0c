//! Registry object file parser.
//!
//! Registry objects are flat text files in an RPSL-like, column-sensitive
//! layout: an attribute starts on a line whose `:` separator sits before
//! column 20, the value occupies everything from column 20 onward, and
//! longer values continue on subsequent lines indented past column 20.
//! A line starting with `+` continues the previous value with a bare
//! empty line.

use std::path::Path;

use tracing::{error, warn};

/// One `key: value` attribute of a registry object.
///
/// `raw_value` is the value exactly as read from the registry file.
/// `value` starts empty and is filled during decoration: either a plain
/// copy of `raw_value`, or `[raw_value](type/name)` when the value
/// resolves to another registry object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    pub raw_value: String,
}

impl Attribute {
    #[must_use]
    pub fn new(key: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Attribute {
            key: key.into(),
            value: String::new(),
            raw_value: raw_value.into(),
        }
    }
}

/// Column at which attribute values begin.
const VALUE_COLUMN: usize = 20;

/// Parse registry file content into an ordered attribute list.
///
/// Grammar errors (short lines, continuations before any attribute) are
/// logged against `path` and the offending line is skipped; parsing always
/// continues.
#[must_use]
pub fn parse_attributes(content: &str, path: &Path) -> Vec<Attribute> {
    let mut attributes: Vec<Attribute> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');

        // lines starting with '+' denote an empty line in the value
        if line.starts_with('+') {
            match attributes.last_mut() {
                Some(previous) => previous.raw_value.push('\n'),
                None => error!(
                    path = %path.display(),
                    line,
                    "Continuation line before any attribute"
                ),
            }
            continue;
        }

        // look for a ':' separator before the value column
        match line.find(':').filter(|&ix| ix < VALUE_COLUMN) {
            Some(ix) => {
                attributes.push(Attribute::new(&line[..ix], value_part(line)));
            }
            None => {
                // no key on this line; either a continuation of the
                // previous value or a malformed short line
                let value = value_part(line);
                if value.is_empty() {
                    warn!(path = %path.display(), line, "Short line detected");
                } else if let Some(previous) = attributes.last_mut() {
                    previous.raw_value.push('\n');
                    previous.raw_value.push_str(value);
                } else {
                    error!(
                        path = %path.display(),
                        line,
                        "Continuation line before any attribute"
                    );
                }
            }
        }
    }

    attributes
}

/// The part of a line from the value column onward, or `""` for lines
/// that end before it. Indexed by character to stay robust against
/// multi-byte values.
fn value_part(line: &str) -> &str {
    line.char_indices()
        .nth(VALUE_COLUMN)
        .map_or("", |(ix, _)| &line[ix..])
}

/// Read and parse one registry object file.
///
/// An unreadable file is logged and yields an empty attribute list; the
/// registry build is best-effort and never aborts on a single bad object.
#[must_use]
pub fn load_attributes(path: &Path) -> Vec<Attribute> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_attributes(&content, path),
        Err(err) => {
            error!(
                path = %path.display(),
                error = %err,
                "Failed to read attributes from file"
            );
            Vec::new()
        }
    }
}
