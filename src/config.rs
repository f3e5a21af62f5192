//! Configuration types for a batch conversion run.
//!
//! Everything a run needs is held in [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The engine knobs that stay constant for the whole
//! run live in [`EngineSettings`] and are handed to the engine verbatim on
//! every call.
//!
//! Nothing here reads or writes process environment variables: the CLI
//! resolves its flags (and their `CORPUS2MD_*` fallbacks) and passes plain
//! values in.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Fixed per-run configuration passed to the conversion engine on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum number of pages converted per document. Default: 10.
    pub max_pages: usize,

    /// Languages the documents are expected to contain. Default: `["zh", "en"]`.
    pub langs: Vec<String>,

    /// Engine batching factor. Default: 1.
    ///
    /// The vision engine reads it as the number of pages transcribed
    /// concurrently within one document.
    pub batch_multiplier: usize,

    /// First page to convert, 0-indexed. Default: 0.
    pub start_page: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_pages: 10,
            langs: vec!["zh".to_string(), "en".to_string()],
            batch_multiplier: 1,
            start_page: 0,
        }
    }
}

impl EngineSettings {
    /// The 0-indexed pages to convert for a document with `total_pages` pages.
    pub fn page_indices(&self, total_pages: usize) -> Vec<usize> {
        let end = self.start_page.saturating_add(self.max_pages).min(total_pages);
        (self.start_page.min(end)..end).collect()
    }
}

/// Configuration for one batch conversion run.
///
/// Built via [`BatchConfig::builder()`].
///
/// # Example
/// ```rust
/// use edgequake_corpus2md::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .input_root("corpus")
///     .output_root("output")
///     .workers(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Corpus root: documents are discovered at `<input_root>/*/*.<extension>`.
    pub input_root: PathBuf,

    /// Root under which one directory per document is created.
    pub output_root: PathBuf,

    /// Manifest file. Default: `result.json` in the working directory.
    pub manifest_path: PathBuf,

    /// File extension (without the dot) of input documents. Default: `pdf`.
    pub extension: String,

    /// Maximum number of documents converted at the same time. Default: 2.
    pub workers: usize,

    /// Fixed engine configuration for the run.
    pub engine: EngineSettings,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from("output"),
            manifest_path: PathBuf::from("result.json"),
            extension: "pdf".to_string(),
            workers: 2,
            engine: EngineSettings::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_root", &self.input_root)
            .field("output_root", &self.output_root)
            .field("manifest_path", &self.manifest_path)
            .field("extension", &self.extension)
            .field("workers", &self.workers)
            .field("engine", &self.engine)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input_root = path.into();
        self
    }

    pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_root = path.into();
        self
    }

    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifest_path = path.into();
        self
    }

    /// Accepts `pdf` or `.pdf`.
    pub fn extension(mut self, ext: impl AsRef<str>) -> Self {
        self.config.extension = ext.as_ref().trim_start_matches('.').to_string();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.engine.max_pages = n.max(1);
        self
    }

    pub fn langs<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.engine.langs = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn batch_multiplier(mut self, n: usize) -> Self {
        self.config.engine.batch_multiplier = n.max(1);
        self
    }

    pub fn start_page(mut self, page: usize) -> Self {
        self.config.engine.start_page = page;
        self
    }

    pub fn engine_settings(mut self, settings: EngineSettings) -> Self {
        self.config.engine = settings;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(BatchError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.extension.is_empty() {
            return Err(BatchError::InvalidConfig(
                "Input extension must not be empty".into(),
            ));
        }
        if c.engine.max_pages == 0 {
            return Err(BatchError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.engine.batch_multiplier == 0 {
            return Err(BatchError::InvalidConfig(
                "batch_multiplier must be ≥ 1".into(),
            ));
        }
        if c.manifest_path.as_os_str().is_empty() {
            return Err(BatchError::InvalidConfig(
                "Manifest path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let c = BatchConfig::default();
        assert_eq!(c.workers, 2);
        assert_eq!(c.extension, "pdf");
        assert_eq!(c.manifest_path, PathBuf::from("result.json"));
        assert_eq!(c.engine.max_pages, 10);
        assert_eq!(c.engine.langs, vec!["zh", "en"]);
        assert_eq!(c.engine.batch_multiplier, 1);
        assert_eq!(c.engine.start_page, 0);
    }

    #[test]
    fn builder_clamps_workers() {
        let c = BatchConfig::builder().workers(0).build().unwrap();
        assert_eq!(c.workers, 1);
    }

    #[test]
    fn builder_normalises_extension() {
        let c = BatchConfig::builder().extension(".pdf").build().unwrap();
        assert_eq!(c.extension, "pdf");
    }

    #[test]
    fn empty_extension_rejected() {
        let err = BatchConfig::builder().extension("").build().unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn page_indices_window() {
        let s = EngineSettings::default();
        assert_eq!(s.page_indices(3), vec![0, 1, 2]);
        assert_eq!(s.page_indices(25), (0..10).collect::<Vec<_>>());

        let s = EngineSettings {
            start_page: 4,
            max_pages: 3,
            ..EngineSettings::default()
        };
        assert_eq!(s.page_indices(6), vec![4, 5]);
        assert!(s.page_indices(2).is_empty());
    }

    #[test]
    fn debug_hides_callback() {
        let c = BatchConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn BatchProgressCallback>"), "got: {dbg}");
    }
}
