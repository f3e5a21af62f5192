//! Conversion adapter: one document in, one [`ConversionRecord`] (or
//! nothing) out.
//!
//! [`convert_document`] is the whole per-document unit of work: engine call,
//! output validation, structuring, artifact writes. [`run_unit`] wraps it as
//! the failure capture scope the dispatcher spawns. Whatever goes wrong in
//! there is logged against the document path and reported as `None`, so a
//! failing document can never disturb its siblings.

use super::{artifacts, structure};
use crate::config::BatchConfig;
use crate::engine::ConversionEngine;
use crate::error::ConversionError;
use crate::output::{ctime_now, ConversionRecord, DocumentTask};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Convert one document and persist its artifacts.
///
/// Returns the record to be aggregated into the manifest. On error, any
/// artifacts written before the failure are left on disk.
pub async fn convert_document(
    engine: &dyn ConversionEngine,
    task: &DocumentTask,
    config: &BatchConfig,
) -> Result<ConversionRecord, ConversionError> {
    let source = task.path().to_path_buf();
    let base_name = task.base_name();

    let start = Instant::now();
    let output = engine
        .convert(&source, &config.engine)
        .await
        .map_err(|e| ConversionError::from_engine(&source, e))?;
    output
        .validate()
        .map_err(|e| ConversionError::from_engine(&source, e))?;
    debug!(
        "{}: engine '{}' returned {} chars, {} image(s) in {}ms",
        source.display(),
        engine.name(),
        output.text.len(),
        output.images.len(),
        start.elapsed().as_millis()
    );

    let records = structure::structure_markdown(&output.text);

    let output_root = config.output_root.clone();
    let output_dir = artifacts::document_dir(&output_root, &base_name);
    let markdown_path = {
        let source = source.clone();
        let base_name = base_name.clone();
        tokio::task::spawn_blocking(move || {
            artifacts::write_artifacts(
                &source,
                &output_root,
                &base_name,
                &output.text,
                &output.images,
                &output.metadata,
            )
        })
        .await
        .map_err(|e| ConversionError::ArtifactWrite {
            path: output_dir.clone(),
            source: std::io::Error::other(format!("artifact writer task failed: {e}")),
        })??
    };

    Ok(ConversionRecord {
        source_path: source,
        markdown_path,
        conversion_time: ctime_now(),
        records,
        output_dir,
    })
}

/// Run one document as an isolated unit of work.
///
/// Fires the per-document progress events and logs the outcome. Failures
/// are logged at `error` level with the document path and cause, then
/// swallowed: the caller only learns that there is no record.
pub async fn run_unit(
    engine: Arc<dyn ConversionEngine>,
    task: DocumentTask,
    config: Arc<BatchConfig>,
) -> Option<ConversionRecord> {
    let path = task.path();
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(path);
    }

    let start = Instant::now();
    match convert_document(engine.as_ref(), &task, &config).await {
        Ok(record) => {
            info!(
                "Converted {} ({} records) in {}ms",
                path.display(),
                record.records.len(),
                start.elapsed().as_millis()
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_complete(path, record.records.len());
            }
            Some(record)
        }
        Err(e) => {
            error!(class = %e.class(), "Error processing {}: {}", path.display(), e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(path, &e.to_string());
            }
            None
        }
    }
}
