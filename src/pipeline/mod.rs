//! Pipeline stages for batch corpus conversion.
//!
//! Each submodule implements exactly one step; [`crate::batch`] wires them
//! together.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ adapter ─┬─▶ engine (external)
//! (corpus)     (1 unit) ├─▶ structure
//!                       └─▶ artifacts ──▶ ConversionRecord ──▶ manifest
//! ```
//!
//! 1. [`discover`]: enumerate `<root>/*/*.<ext>` into `DocumentTask`s
//! 2. [`adapter`]: engine call, validation, structuring and artifact
//!    writes for one document, as one failure scope
//! 3. [`structure`]: classify Markdown lines into typed records
//! 4. [`artifacts`]: write `X.md`, `image_<i>.png`, `X_meta.json`
//! 5. [`manifest`]: write every collected record to `result.json`, once

pub mod adapter;
pub mod artifacts;
pub mod discover;
pub mod manifest;
pub mod structure;

use serde::Serialize;

/// Pretty-print as JSON with 4-space indentation. Non-ASCII text is written
/// as-is, never `\u` escaped.
pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}
