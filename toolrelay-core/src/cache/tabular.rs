//! Decoder for the comma-separated destination listing.
//!
//! Grammar:
//! ```text
//! table  := header (NEWLINE row)*
//! header := field ("," field)*
//! row    := field ("," field)*
//! ```
//! Lines are trimmed and blank lines dropped. Fields are trimmed and zipped
//! positionally against the header; a short row simply lacks the trailing
//! columns, extra fields past the header are dropped. Quoting is not
//! supported, so a field can never contain a comma.

use indexmap::IndexMap;

/// One data row keyed by header name, in header order.
pub type TabularRecord = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularTable {
    pub headers: Vec<String>,
    pub rows: Vec<TabularRecord>,
}

/// Shape of a destination payload before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Nothing to decode; the cache stays as it is.
    Empty,
    Tabular,
    /// Anything else (an error message, a single free-text line).
    Unrecognized,
}

/// Classify `text`: tabular when the first line starts with
/// `header_prefix` or the text spans more than one line.
pub fn detect_shape(text: &str, header_prefix: &str) -> PayloadShape {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PayloadShape::Empty;
    }

    let first_line = trimmed.lines().next().unwrap_or_default().trim();
    let header_match = !header_prefix.is_empty() && first_line.starts_with(header_prefix);
    if header_match || trimmed.contains('\n') {
        PayloadShape::Tabular
    } else {
        PayloadShape::Unrecognized
    }
}

fn split_fields(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(',').map(|field| field.trim().to_string())
}

/// Decode `text` into a header row and records. Returns `None` when no
/// non-blank line exists.
pub fn decode(text: &str) -> Option<TabularTable> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let headers: Vec<String> = split_fields(lines.next()?).collect();

    let rows = lines
        .map(|line| {
            headers
                .iter()
                .cloned()
                .zip(split_fields(line))
                .collect::<TabularRecord>()
        })
        .collect();

    Some(TabularTable { headers, rows })
}
