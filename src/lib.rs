//! # edgequake-corpus2md
//!
//! Batch-convert a corpus of documents into Markdown artifacts plus a single
//! JSON manifest, with a bounded number of conversions in flight.
//!
//! ## Pipeline Overview
//!
//! ```text
//! <input_root>/*/*.pdf
//!  │
//!  ├─ 1. Discover   enumerate documents one directory level deep
//!  ├─ 2. Dispatch   at most `workers` documents in flight, each its own task
//!  │     ├─ Engine     document → (text, images, metadata)
//!  │     ├─ Structure  classify lines as title / subtitle / image / paragraph
//!  │     └─ Artifacts  <output_root>/X/{X.md, image_<i>.png, X_meta.json}
//!  └─ 3. Manifest   every successful record → result.json, written once
//! ```
//!
//! A document that fails at any step is logged with its path and simply
//! left out of the manifest; the rest of the run is unaffected.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_corpus2md::{run_batch, BatchConfig, CommandEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CommandEngine::new("marker-json")?;
//!     let config = BatchConfig::builder()
//!         .input_root("corpus")
//!         .output_root("output")
//!         .workers(2)
//!         .build()?;
//!     let summary = run_batch(Arc::new(engine), &config).await?;
//!     eprintln!("{}/{} converted", summary.succeeded(), summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `corpus2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-corpus2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, BatchSummary};
pub use config::{BatchConfig, BatchConfigBuilder, EngineSettings};
pub use engine::command::CommandEngine;
pub use engine::vision::{VisionEngine, VisionEngineConfig};
pub use engine::{ConversionEngine, EngineOutput, ImagePayload};
pub use error::{BatchError, ConversionError, EngineError, ErrorClass};
pub use output::{ConversionRecord, DocumentTask, RecordKind, StructuredRecord};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
