//! Error types for the edgequake-corpus2md library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`BatchError`]: **Fatal**: the run cannot proceed or cannot finish
//!   (corpus root unreadable, invalid configuration, manifest write failed).
//!   Returned as `Err(BatchError)` from [`crate::batch::run_batch`].
//!
//! * [`ConversionError`]: **Non-fatal**: a single document failed. The
//!   dispatcher logs it with the document path, leaves the document out of
//!   the manifest, and keeps converting its siblings.
//!
//! * [`EngineError`]: what a [`crate::engine::ConversionEngine`] reports.
//!   Engines do not know which run they belong to, so the adapter attaches
//!   the document path when it lifts an `EngineError` into a
//!   [`ConversionError`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-corpus2md library.
///
/// Document-level failures use [`ConversionError`] and never surface here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The corpus root directory could not be listed.
    #[error("Cannot read corpus directory '{path}': {source}\nCheck the --input path exists and is readable.")]
    CorpusUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the manifest file.
    #[error("Failed to write manifest '{path}': {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An existing manifest could not be read.
    #[error("Failed to read manifest '{path}': {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The collected records could not be serialised.
    #[error("Failed to serialise manifest: {0}")]
    ManifestSerialize(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Engine initialisation ─────────────────────────────────────────────
    /// The conversion engine could not be initialised (missing pdfium,
    /// provider not configured, converter executable not found).
    #[error("Conversion engine '{engine}' is unavailable.\n{hint}")]
    EngineUnavailable { engine: String, hint: String },
}

/// Failure reported by a conversion engine for one document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine itself failed or could not be run.
    #[error("engine failed: {0}")]
    Invocation(String),

    /// The engine ran but its result is not the expected
    /// `(text, images, metadata)` triple.
    #[error("malformed engine output: {0}")]
    MalformedOutput(String),
}

/// Coarse classification of a [`ConversionError`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    EngineInvocation,
    MalformedEngineOutput,
    UnsupportedImagePayload,
    ArtifactWrite,
    Scheduling,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::EngineInvocation => "engine-invocation",
            ErrorClass::MalformedEngineOutput => "malformed-engine-output",
            ErrorClass::UnsupportedImagePayload => "unsupported-image-payload",
            ErrorClass::ArtifactWrite => "artifact-write",
            ErrorClass::Scheduling => "scheduling",
        };
        f.write_str(name)
    }
}

/// A non-fatal error for a single document.
///
/// Every variant is fatal to its document and harmless to the run: the
/// document is simply absent from the manifest.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The conversion engine failed for this document.
    #[error("'{path}': conversion engine failed: {detail}")]
    EngineInvocation { path: PathBuf, detail: String },

    /// The engine returned something other than a valid
    /// `(text, images, metadata)` triple.
    #[error("'{path}': malformed engine output: {detail}")]
    MalformedEngineOutput { path: PathBuf, detail: String },

    /// An image payload is neither a decoded image nor a base64 string.
    #[error("'{path}': unsupported image payload for '{image_id}' ({kind})")]
    UnsupportedImagePayload {
        path: PathBuf,
        image_id: String,
        kind: String,
    },

    /// A base64 image payload could not be decoded.
    #[error("'{path}': image '{image_id}' is not valid base64: {source}")]
    InvalidBase64Payload {
        path: PathBuf,
        image_id: String,
        #[source]
        source: base64::DecodeError,
    },

    /// Filesystem failure while persisting text, images, or metadata.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A decoded image could not be PNG-encoded to disk.
    #[error("Failed to encode image '{path}': {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The unit never produced a result (its task panicked or was cancelled).
    #[error("'{path}': conversion task did not complete: {detail}")]
    Scheduling { path: PathBuf, detail: String },
}

impl ConversionError {
    /// Attach the document path to an engine failure.
    pub fn from_engine(path: impl Into<PathBuf>, err: EngineError) -> Self {
        let path = path.into();
        match err {
            EngineError::Invocation(detail) => ConversionError::EngineInvocation { path, detail },
            EngineError::MalformedOutput(detail) => {
                ConversionError::MalformedEngineOutput { path, detail }
            }
        }
    }

    /// The failure class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            ConversionError::EngineInvocation { .. } => ErrorClass::EngineInvocation,
            ConversionError::MalformedEngineOutput { .. } => ErrorClass::MalformedEngineOutput,
            ConversionError::UnsupportedImagePayload { .. }
            | ConversionError::InvalidBase64Payload { .. } => ErrorClass::UnsupportedImagePayload,
            ConversionError::ArtifactWrite { .. } | ConversionError::ImageEncode { .. } => {
                ErrorClass::ArtifactWrite
            }
            ConversionError::Scheduling { .. } => ErrorClass::Scheduling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_keeps_document_path() {
        let e = ConversionError::from_engine(
            "corpus/a/report.pdf",
            EngineError::Invocation("model crashed".into()),
        );
        let msg = e.to_string();
        assert!(msg.contains("corpus/a/report.pdf"), "got: {msg}");
        assert!(msg.contains("model crashed"), "got: {msg}");
        assert_eq!(e.class(), ErrorClass::EngineInvocation);
    }

    #[test]
    fn malformed_output_classified() {
        let e = ConversionError::from_engine(
            "x.pdf",
            EngineError::MalformedOutput("missing 'images'".into()),
        );
        assert_eq!(e.class(), ErrorClass::MalformedEngineOutput);
        assert!(e.to_string().contains("missing 'images'"));
    }

    #[test]
    fn invalid_base64_counts_as_unsupported_payload() {
        let source = {
            use base64::{engine::general_purpose::STANDARD, Engine as _};
            STANDARD.decode("***").unwrap_err()
        };
        let e = ConversionError::InvalidBase64Payload {
            path: "x.pdf".into(),
            image_id: "fig1".into(),
            source,
        };
        assert_eq!(e.class(), ErrorClass::UnsupportedImagePayload);
        assert!(e.to_string().contains("fig1"));
    }

    #[test]
    fn manifest_write_display() {
        let e = BatchError::ManifestWrite {
            path: "result.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = e.to_string();
        assert!(msg.contains("result.json"), "got: {msg}");
        assert!(msg.contains("denied"), "got: {msg}");
    }

    #[test]
    fn error_class_display() {
        assert_eq!(ErrorClass::Scheduling.to_string(), "scheduling");
        assert_eq!(
            ErrorClass::UnsupportedImagePayload.to_string(),
            "unsupported-image-payload"
        );
    }
}
