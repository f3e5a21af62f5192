//! Vision engine: rasterise PDF pages with pdfium and let a vision LLM read
//! them.
//!
//! ## Per-document flow
//!
//! ```text
//! PDF ──▶ metadata + render ──▶ PNG/base64 ──▶ VLM (≤ batch_multiplier pages at once)
//!         (pdfium, blocking)                   │
//!                                              ▼
//!                                 cleanup ──▶ joined Markdown
//! ```
//!
//! The engine is initialised once per process ([`VisionEngine::initialize`]):
//! the pdfium shared library is located or downloaded and the LLM provider is
//! resolved. Conversions afterwards only pay for rendering and API calls.
//!
//! A page that still fails after all retries fails the whole document; the
//! batch pipeline then leaves that document out of the manifest rather than
//! writing a Markdown file with silent holes in it.

use super::prompts::{system_prompt, PAGE_SYSTEM_PROMPT};
use super::{ConversionEngine, EngineOutput, ImagePayload};
use crate::config::EngineSettings;
use crate::error::{BatchError, EngineError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt, TryStreamExt};
use image::DynamicImage;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Knobs of the vision engine that are not part of [`EngineSettings`].
#[derive(Clone)]
pub struct VisionEngineConfig {
    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (`openai`, `anthropic`, `gemini`, `ollama`, …).
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Model identifier. Default when a provider is named: `gpt-4.1-nano`.
    pub model: Option<String>,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries per page on LLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Return rendered pages as the document's images. Default: true.
    pub include_page_images: bool,

    /// Custom system prompt. If None, uses [`PAGE_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for VisionEngineConfig {
    fn default() -> Self {
        Self {
            provider: None,
            provider_name: None,
            model: None,
            max_rendered_pixels: 2000,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            include_page_images: true,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for VisionEngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionEngineConfig")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("include_page_images", &self.include_page_images)
            .finish()
    }
}

/// pdfium + vision-LLM conversion engine.
pub struct VisionEngine {
    provider: Arc<dyn LLMProvider>,
    pdfium_library: PathBuf,
    config: VisionEngineConfig,
}

impl VisionEngine {
    /// One-time process initialisation: make pdfium loadable and resolve the
    /// LLM provider.
    ///
    /// pdfium is downloaded into the pdfium-auto cache on first use (or taken
    /// from `PDFIUM_LIB_PATH`); this can take a while and runs on the
    /// blocking pool.
    pub async fn initialize(config: VisionEngineConfig) -> Result<Self, BatchError> {
        let pdfium_library =
            tokio::task::spawn_blocking(|| pdfium_auto::ensure_pdfium_library(None))
                .await
                .map_err(|e| BatchError::EngineUnavailable {
                    engine: "vision".into(),
                    hint: format!("pdfium setup task failed: {e}"),
                })?
                .map_err(|e| BatchError::EngineUnavailable {
                    engine: "vision".into(),
                    hint: format!(
                        "PDFium could not be provisioned: {e}\n\
                         Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
                    ),
                })?;
        info!("PDFium library: {}", pdfium_library.display());

        let provider = resolve_provider(&config)?;

        Ok(Self {
            provider,
            pdfium_library,
            config,
        })
    }

    pub fn config(&self) -> &VisionEngineConfig {
        &self.config
    }
}

#[async_trait]
impl ConversionEngine for VisionEngine {
    fn name(&self) -> &str {
        "vision"
    }

    async fn convert(
        &self,
        path: &Path,
        settings: &EngineSettings,
    ) -> Result<EngineOutput, EngineError> {
        check_pdf_magic(path)?;

        let lib = self.pdfium_library.clone();
        let doc_path = path.to_path_buf();
        let render_settings = settings.clone();
        let max_px = self.config.max_rendered_pixels;
        let rendered = tokio::task::spawn_blocking(move || {
            render_document(&lib, &doc_path, &render_settings, max_px)
        })
        .await
        .map_err(|e| EngineError::Invocation(format!("render task panicked: {e}")))??;

        info!(
            "{}: rendered {} page(s)",
            path.display(),
            rendered.pages.len()
        );

        let prompt = system_prompt(
            self.config
                .system_prompt
                .as_deref()
                .unwrap_or(PAGE_SYSTEM_PROMPT),
            &settings.langs,
        );

        let encoded = rendered
            .pages
            .iter()
            .map(|(idx, img)| {
                encode_page(img).map(|data| (*idx, data)).map_err(|e| {
                    EngineError::Invocation(format!("page {}: PNG encoding failed: {e}", idx + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let markdown_pages = transcribe_pages(
            Arc::clone(&self.provider),
            encoded,
            Arc::from(prompt),
            self.config.clone(),
            settings.batch_multiplier,
        )
        .await?;

        let text = markdown_pages.join("\n\n");

        let images = if self.config.include_page_images {
            rendered
                .pages
                .into_iter()
                .map(|(idx, img)| (format!("page_{}", idx + 1), ImagePayload::Decoded(img)))
                .collect()
        } else {
            Vec::new()
        };

        let mut metadata = rendered.metadata;
        metadata.insert("engine".into(), json!("vision"));
        if let Some(ref model) = self.config.model {
            metadata.insert("model".into(), json!(model));
        }

        Ok(EngineOutput {
            text,
            images,
            metadata: Value::Object(metadata),
        })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the LLM provider, from most-specific to least-specific:
/// pre-built provider, named provider + model, then auto-detection from the
/// API keys present in the environment.
fn resolve_provider(config: &VisionEngineConfig) -> Result<Arc<dyn LLMProvider>, BatchError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            BatchError::EngineUnavailable {
                engine: "vision".into(),
                hint: format!("LLM provider '{name}' is not configured: {e}"),
            }
        });
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| BatchError::EngineUnavailable {
            engine: "vision".into(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                 Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

// ── Rendering (blocking) ─────────────────────────────────────────────────

struct RenderedDocument {
    metadata: Map<String, Value>,
    pages: Vec<(usize, DynamicImage)>,
}

/// Read a few bytes up front so non-PDF inputs fail with a clear message
/// instead of a pdfium error code.
fn check_pdf_magic(path: &Path) -> Result<(), EngineError> {
    let mut f = std::fs::File::open(path)
        .map_err(|e| EngineError::Invocation(format!("cannot open document: {e}")))?;
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(EngineError::Invocation(format!(
            "not a PDF (first bytes: {magic:?})"
        )));
    }
    Ok(())
}

fn render_document(
    pdfium_library: &Path,
    pdf_path: &Path,
    settings: &EngineSettings,
    max_pixels: u32,
) -> Result<RenderedDocument, EngineError> {
    let pdfium = pdfium_auto::bind_pdfium_from_path(pdfium_library)
        .map_err(|e| EngineError::Invocation(e.to_string()))?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| EngineError::Invocation(format!("pdfium could not open document: {e:?}")))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let indices = settings.page_indices(total_pages);
    debug!(
        "{}: {} pages, converting {:?}",
        pdf_path.display(),
        total_pages,
        indices
    );

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = pages.get(idx as u16).map_err(|e| {
            EngineError::Invocation(format!("page {}: {e:?}", idx + 1))
        })?;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            EngineError::Invocation(format!("page {}: rasterisation failed: {e:?}", idx + 1))
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        rendered.push((idx, image));
    }

    let meta = document.metadata();
    let tag = |t: PdfDocumentMetadataTagType| -> Value {
        meta.get(t)
            .map(|v| v.value().to_string())
            .filter(|v| !v.is_empty())
            .map(Value::String)
            .unwrap_or(Value::Null)
    };

    let mut metadata = Map::new();
    metadata.insert("title".into(), tag(PdfDocumentMetadataTagType::Title));
    metadata.insert("author".into(), tag(PdfDocumentMetadataTagType::Author));
    metadata.insert("subject".into(), tag(PdfDocumentMetadataTagType::Subject));
    metadata.insert("creator".into(), tag(PdfDocumentMetadataTagType::Creator));
    metadata.insert("producer".into(), tag(PdfDocumentMetadataTagType::Producer));
    metadata.insert(
        "creation_date".into(),
        tag(PdfDocumentMetadataTagType::CreationDate),
    );
    metadata.insert(
        "modification_date".into(),
        tag(PdfDocumentMetadataTagType::ModificationDate),
    );
    metadata.insert("page_count".into(), json!(total_pages));
    metadata.insert(
        "pdf_version".into(),
        json!(format!("{:?}", document.version())),
    );
    metadata.insert(
        "converted_pages".into(),
        json!(rendered.iter().map(|(i, _)| i + 1).collect::<Vec<_>>()),
    );
    metadata.insert("languages".into(), json!(settings.langs));

    Ok(RenderedDocument {
        metadata,
        pages: rendered,
    })
}

// ── VLM call ─────────────────────────────────────────────────────────────

/// PNG-encode a rendered page and wrap it for a multimodal request
/// (`detail: "high"`).
fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

/// Transcribe encoded pages with at most `concurrency` requests in flight,
/// returning cleaned Markdown in page order.
async fn transcribe_pages(
    provider: Arc<dyn LLMProvider>,
    pages: Vec<(usize, ImageData)>,
    prompt: Arc<str>,
    config: VisionEngineConfig,
    concurrency: usize,
) -> Result<Vec<String>, EngineError> {
    let config = Arc::new(config);
    stream::iter(pages.into_iter().map(move |(idx, image)| {
        let provider = Arc::clone(&provider);
        let prompt = Arc::clone(&prompt);
        let config = Arc::clone(&config);
        async move {
            let md = transcribe_page(&provider, idx + 1, image, &prompt, &config).await?;
            Ok::<_, EngineError>(clean_markdown(&md))
        }
    }))
    .buffered(concurrency.max(1))
    .try_collect()
    .await
}

/// Transcribe one page, retrying with exponential backoff.
async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image: ImageData,
    prompt: &str,
    config: &VisionEngineConfig,
) -> Result<String, EngineError> {
    let messages = vec![
        ChatMessage::system(prompt),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };

    let mut last_err = String::from("no attempt made");
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok(response.content);
            }
            Err(e) => {
                last_err = e.to_string();
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, last_err);
            }
        }
    }

    Err(EngineError::Invocation(format!(
        "page {page_num}: LLM call failed after {} retries: {last_err}",
        config.max_retries
    )))
}

// ── Markdown cleanup ─────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```$").unwrap());

/// Deterministic cleanup of model output: unwrap a fenced reply, normalise
/// line endings, drop invisible characters and trailing blanks.
pub(crate) fn clean_markdown(raw: &str) -> String {
    let unix = raw.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unix.trim();
    let unfenced = RE_OUTER_FENCES
        .captures(trimmed)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| trimmed.to_string());

    unfenced
        .replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn clean_unwraps_fenced_reply() {
        let raw = "```markdown\r\n# Report\r\nBody  \r\n```\r\n";
        assert_eq!(clean_markdown(raw), "# Report\nBody");
    }

    #[test]
    fn clean_keeps_inner_code_blocks() {
        let raw = "Intro\n```rust\nfn main() {}\n```\nOutro";
        assert_eq!(clean_markdown(raw), raw);
    }

    #[test]
    fn clean_drops_invisible_chars() {
        assert_eq!(clean_markdown("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn encode_page_is_base64_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let bytes = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn non_pdf_rejected_before_pdfium() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("notes.pdf");
        std::fs::write(&p, b"hello").unwrap();
        let err = check_pdf_magic(&p).unwrap_err();
        assert!(matches!(err, EngineError::Invocation(_)));

        std::fs::write(&p, b"%PDF-1.7\n").unwrap();
        assert!(check_pdf_magic(&p).is_ok());
    }

    fn page(idx: usize) -> (usize, ImageData) {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        (idx, encode_page(&img).unwrap())
    }

    #[tokio::test]
    async fn pages_transcribed_in_order_and_cleaned() {
        let mock = edgequake_llm::MockProvider::new();
        mock.add_response("```markdown\n# Annual report\n```").await;
        mock.add_response("Revenue grew.  ").await;
        let provider: Arc<dyn LLMProvider> = Arc::new(mock);

        let pages = transcribe_pages(
            provider,
            vec![page(0), page(1)],
            Arc::from(PAGE_SYSTEM_PROMPT),
            VisionEngineConfig::default(),
            1,
        )
        .await
        .unwrap();

        assert_eq!(pages, vec!["# Annual report", "Revenue grew."]);
    }

    #[test]
    fn transcription_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let provider: Arc<dyn LLMProvider> = Arc::new(edgequake_llm::MockProvider::new());
        let fut = transcribe_pages(
            provider,
            vec![page(0)],
            Arc::from("prompt"),
            VisionEngineConfig::default(),
            2,
        );
        assert_send(&fut);
    }

    #[test]
    fn default_config() {
        let c = VisionEngineConfig::default();
        assert_eq!(c.max_rendered_pixels, 2000);
        assert_eq!(c.max_retries, 3);
        assert!(c.include_page_images);
    }
}
