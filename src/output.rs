//! Data model shared by every pipeline stage.
//!
//! The manifest written at the end of a run is a JSON array of
//! [`ConversionRecord`]s, so the serde field names here are the on-disk
//! format: `source_pdf`, `markdown_file`, `conversion_time`,
//! `structured_data`, `output_folder`.

use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// One input document, identified by its filesystem path.
///
/// Created during corpus discovery and consumed exactly once by the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentTask {
    path: PathBuf,
}

impl DocumentTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name with its extension stripped: `corpus/a/report.pdf` → `report`.
    ///
    /// Names the per-document output directory and its artifacts.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Type tag of a [`StructuredRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// `# ` heading; content is the text after the marker.
    #[serde(rename = "title")]
    Title,
    /// `## ` heading; content is the text after the marker.
    #[serde(rename = "subtitle")]
    Subtitle,
    /// A line containing `![alt](target)`; content is the whole line.
    #[serde(rename = "image-reference", alias = "image")]
    ImageReference,
    /// Any other non-empty line; content is the whole line.
    #[serde(rename = "paragraph")]
    Paragraph,
}

/// One classified line of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub content: String,
}

impl StructuredRecord {
    pub fn new(kind: RecordKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// The durable result of successfully converting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Path of the input document, as discovered.
    #[serde(rename = "source_pdf", serialize_with = "serialize_path_lossy")]
    pub source_path: PathBuf,

    /// Path of the written `<base>.md` artifact.
    #[serde(rename = "markdown_file", serialize_with = "serialize_path_lossy")]
    pub markdown_path: PathBuf,

    /// Local wall-clock completion time, `ctime` layout
    /// (`Mon Oct 19 14:03:05 2026`).
    pub conversion_time: String,

    /// The extracted text, classified line by line, in source order.
    #[serde(rename = "structured_data")]
    pub records: Vec<StructuredRecord>,

    /// The per-document output directory.
    #[serde(rename = "output_folder", serialize_with = "serialize_path_lossy")]
    pub output_dir: PathBuf,
}

/// Paths are written as strings; bytes that are not valid UTF-8 become
/// U+FFFD instead of failing the whole manifest.
fn serialize_path_lossy<P, S>(path: &P, serializer: S) -> Result<S::Ok, S::Error>
where
    P: AsRef<Path>,
    S: Serializer,
{
    serializer.serialize_str(&path.as_ref().to_string_lossy())
}

/// Current local time in `ctime` layout.
pub fn ctime_now() -> String {
    chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}
