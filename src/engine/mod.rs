//! Conversion engines: the component that turns one document into text,
//! images, and metadata.
//!
//! The batch pipeline treats an engine as a black box behind
//! [`ConversionEngine`]. Two implementations ship with the crate:
//!
//! * [`vision::VisionEngine`]: rasterises pages with pdfium and transcribes
//!   them with a vision LLM.
//! * [`command::CommandEngine`]: runs an external converter executable that
//!   prints a JSON result on stdout.
//!
//! Engines are initialised once per process and then shared by every worker
//! (`Arc<dyn ConversionEngine>`), so implementations must be `Send + Sync`.

pub mod command;
pub mod prompts;
pub mod vision;

use crate::config::EngineSettings;
use crate::error::EngineError;
use async_trait::async_trait;
use image::DynamicImage;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Converts one document.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Short identifier used in logs (`"vision"`, `"command"`).
    fn name(&self) -> &str;

    /// Convert the document at `path` under the run's fixed `settings`.
    async fn convert(
        &self,
        path: &Path,
        settings: &EngineSettings,
    ) -> Result<EngineOutput, EngineError>;
}

/// One image produced by an engine.
pub enum ImagePayload {
    /// An in-memory image; saved by PNG-encoding it.
    Decoded(DynamicImage),
    /// Base64-encoded image bytes; saved verbatim after decoding.
    Base64(String),
    /// Any other shape the engine produced. Persisting it fails with
    /// [`crate::error::ConversionError::UnsupportedImagePayload`].
    Unsupported { kind: String },
}

impl ImagePayload {
    /// Human-readable name of the payload shape.
    pub fn kind(&self) -> &str {
        match self {
            ImagePayload::Decoded(_) => "decoded image",
            ImagePayload::Base64(_) => "base64 string",
            ImagePayload::Unsupported { kind } => kind,
        }
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImagePayload::Decoded(img) => write!(f, "Decoded({}x{})", img.width(), img.height()),
            ImagePayload::Base64(s) => write!(f, "Base64({} chars)", s.len()),
            ImagePayload::Unsupported { kind } => write!(f, "Unsupported({kind})"),
        }
    }
}

/// An engine's result for one document.
#[derive(Debug)]
pub struct EngineOutput {
    /// Full extracted text (Markdown).
    pub text: String,
    /// Image identifier → payload, in the order the engine produced them.
    pub images: Vec<(String, ImagePayload)>,
    /// Free-form key/value metadata; must be a JSON object.
    pub metadata: Value,
}

impl EngineOutput {
    /// Check the invariants every engine result must satisfy: metadata is a
    /// JSON object and image identifiers are unique.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.metadata.is_object() {
            return Err(EngineError::MalformedOutput(format!(
                "metadata must be a JSON object, got {}",
                json_kind(&self.metadata)
            )));
        }
        let mut seen = HashSet::with_capacity(self.images.len());
        for (id, _) in &self.images {
            if !seen.insert(id.as_str()) {
                return Err(EngineError::MalformedOutput(format!(
                    "duplicate image identifier '{id}'"
                )));
            }
        }
        Ok(())
    }

    /// Shape-check a JSON result of the form
    /// `{"text": str, "images": {id: payload}, "metadata": {…}}`.
    ///
    /// Exactly these three fields must be present and `images` must be an
    /// object. String image values become [`ImagePayload::Base64`]; anything
    /// else becomes [`ImagePayload::Unsupported`] and fails later, when the
    /// artifacts are written.
    pub fn from_json(value: Value) -> Result<Self, EngineError> {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(EngineError::MalformedOutput(format!(
                    "expected an object with text, images and metadata, got {}",
                    json_kind(&other)
                )))
            }
        };

        if fields.len() != 3 {
            let names: Vec<&str> = fields.keys().map(String::as_str).collect();
            return Err(EngineError::MalformedOutput(format!(
                "expected exactly the fields text, images and metadata, got [{}]",
                names.join(", ")
            )));
        }

        let text = match fields.remove("text") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(EngineError::MalformedOutput(format!(
                    "'text' must be a string, got {}",
                    json_kind(&other)
                )))
            }
            None => return Err(EngineError::MalformedOutput("missing 'text'".into())),
        };

        let images = match fields.remove("images") {
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(id, payload)| {
                    let payload = match payload {
                        Value::String(b64) => ImagePayload::Base64(b64),
                        other => ImagePayload::Unsupported {
                            kind: format!("JSON {}", json_kind(&other)),
                        },
                    };
                    (id, payload)
                })
                .collect(),
            Some(other) => {
                return Err(EngineError::MalformedOutput(format!(
                    "'images' must be an object, got {}",
                    json_kind(&other)
                )))
            }
            None => return Err(EngineError::MalformedOutput("missing 'images'".into())),
        };

        let metadata = fields
            .remove("metadata")
            .ok_or_else(|| EngineError::MalformedOutput("missing 'metadata'".into()))?;

        let output = EngineOutput {
            text,
            images,
            metadata,
        };
        output.validate()?;
        Ok(output)
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
