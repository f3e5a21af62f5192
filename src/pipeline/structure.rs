//! Structuring: classify extracted Markdown line by line.
//!
//! Rules, first match wins:
//!
//! | Line | Record |
//! |------|--------|
//! | starts with `# `  | `title`, text after the marker |
//! | starts with `## ` | `subtitle`, text after the marker |
//! | contains `![alt](target)` | `image-reference`, whole line |
//! | anything else non-empty | `paragraph`, whole line |
//! | empty | skipped |
//!
//! Deeper headings (`### …`) fall through to `paragraph`. Lines are split on
//! `'\n'` only, so a stray `'\r'` stays part of the content.

use crate::output::{RecordKind, StructuredRecord};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_IMAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[.*?\]\(.*?\)").unwrap());

/// Classify every non-empty line of `text`, preserving line order.
pub fn structure_markdown(text: &str) -> Vec<StructuredRecord> {
    text.split('\n').filter_map(classify_line).collect()
}

/// Classify a single line; `None` for empty lines.
pub fn classify_line(line: &str) -> Option<StructuredRecord> {
    if let Some(rest) = line.strip_prefix("# ") {
        Some(StructuredRecord::new(RecordKind::Title, rest))
    } else if let Some(rest) = line.strip_prefix("## ") {
        Some(StructuredRecord::new(RecordKind::Subtitle, rest))
    } else if RE_IMAGE_REFERENCE.is_match(line) {
        Some(StructuredRecord::new(RecordKind::ImageReference, line))
    } else if !line.is_empty() {
        Some(StructuredRecord::new(RecordKind::Paragraph, line))
    } else {
        None
    }
}
