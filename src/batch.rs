//! Task dispatcher: fan documents out to a bounded set of workers, collect
//! their records, and write the manifest once every unit has finished.
//!
//! ## Flow
//!
//! ```text
//! discover ──▶ [task, task, …] ──▶ buffer_unordered(workers) ──▶ records ──▶ manifest
//!                                    │   spawn(run_unit) × ≤ workers
//!                                    ▼
//!                              single collector
//! ```
//!
//! Every document runs as its own spawned tokio task, so a panic inside one
//! unit surfaces as a [`tokio::task::JoinError`] for that document only.
//! `buffer_unordered` admits at most `workers` units at a time, and the
//! collector is the only place records are appended, so no locking is
//! involved. The manifest is written after the stream is drained.

use crate::config::BatchConfig;
use crate::engine::ConversionEngine;
use crate::error::{BatchError, ConversionError};
use crate::output::{ConversionRecord, DocumentTask};
use crate::pipeline::{adapter, discover, manifest};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Documents discovered (and dispatched).
    pub total: usize,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    /// Successful records, in completion order. Same content as the manifest.
    pub records: Vec<ConversionRecord>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    pub fn failed(&self) -> usize {
        self.total - self.records.len()
    }
}

/// Convert every document under `config.input_root` and write the manifest.
///
/// Per-document failures are logged and leave the document out of the
/// manifest; they never make this function fail.
///
/// # Errors
/// Only fatal conditions: the corpus root cannot be listed, or the manifest
/// cannot be written.
pub async fn run_batch(
    engine: Arc<dyn ConversionEngine>,
    config: &BatchConfig,
) -> Result<BatchSummary, BatchError> {
    let run_start = Instant::now();
    let tasks = discover::discover_documents(&config.input_root, &config.extension).await?;
    let total = tasks.len();

    if total == 0 {
        warn!(
            "No *.{} documents found under {}/*/",
            config.extension,
            config.input_root.display()
        );
    }
    info!(
        "Dispatching {} document(s) to {} worker(s) using engine '{}'",
        total,
        config.workers,
        engine.name()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let records = dispatch(engine, tasks, config).await;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, records.len());
    }

    manifest::write_manifest(&config.manifest_path, &records)?;

    let summary = BatchSummary {
        total,
        manifest_path: config.manifest_path.clone(),
        records,
    };
    info!(
        "Batch complete: {}/{} converted, {} failed in {}ms",
        summary.succeeded(),
        total,
        summary.failed(),
        run_start.elapsed().as_millis()
    );
    Ok(summary)
}

/// Run all `tasks` with at most `config.workers` in flight and return the
/// successful records in completion order.
async fn dispatch(
    engine: Arc<dyn ConversionEngine>,
    tasks: Vec<DocumentTask>,
    config: &BatchConfig,
) -> Vec<ConversionRecord> {
    let shared = Arc::new(config.clone());
    let workers = config.workers.max(1);

    stream::iter(tasks.into_iter().map(|task| {
        let engine = Arc::clone(&engine);
        let config = Arc::clone(&shared);
        async move {
            let path = task.path().to_path_buf();
            let handle = tokio::spawn(adapter::run_unit(engine, task, Arc::clone(&config)));
            match handle.await {
                Ok(record) => record,
                Err(join_err) => {
                    let e = ConversionError::Scheduling {
                        path: path.clone(),
                        detail: join_err.to_string(),
                    };
                    error!(
                        class = %e.class(),
                        "Conversion task for {} did not complete: {}",
                        path.display(),
                        join_err
                    );
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_document_error(&path, &e.to_string());
                    }
                    None
                }
            }
        }
    }))
    .buffer_unordered(workers)
    .filter_map(|record| async move { record })
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::engine::EngineOutput;
    use crate::error::EngineError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;

    /// Panics on documents whose name contains "boom".
    struct PanickyEngine;

    #[async_trait]
    impl ConversionEngine for PanickyEngine {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn convert(
            &self,
            path: &Path,
            _settings: &EngineSettings,
        ) -> Result<EngineOutput, EngineError> {
            if path.to_string_lossy().contains("boom") {
                panic!("engine blew up");
            }
            Ok(EngineOutput {
                text: "# ok".into(),
                images: Vec::new(),
                metadata: json!({}),
            })
        }
    }

    #[tokio::test]
    async fn panicking_unit_is_isolated() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["a/fine.pdf", "a/boom.pdf", "b/also-fine.pdf"] {
            let p = corpus.path().join(name);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, b"%PDF").unwrap();
        }
        let config = BatchConfig::builder()
            .input_root(corpus.path())
            .output_root(out.path())
            .manifest_path(out.path().join("result.json"))
            .build()
            .unwrap();

        let summary = run_batch(Arc::new(PanickyEngine), &config).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert!(summary
            .records
            .iter()
            .all(|r| !r.source_path.to_string_lossy().contains("boom")));
    }

    #[derive(Clone, Default)]
    struct LogSink(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn scheduling_failure_has_its_own_diagnostic() {
        let sink = LogSink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(corpus.path().join("a")).unwrap();
        std::fs::write(corpus.path().join("a/boom.pdf"), b"%PDF").unwrap();
        let config = BatchConfig::builder()
            .input_root(corpus.path())
            .output_root(out.path())
            .manifest_path(out.path().join("result.json"))
            .build()
            .unwrap();

        run_batch(Arc::new(PanickyEngine), &config).await.unwrap();

        let logs = String::from_utf8_lossy(&sink.0.lock().unwrap()).into_owned();
        let errors: Vec<&str> = logs.lines().filter(|l| l.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1, "logs:\n{logs}");
        assert!(errors[0].contains("Conversion task for"), "logs:\n{logs}");
        assert!(errors[0].contains("boom.pdf"), "logs:\n{logs}");
        assert!(errors[0].contains("class=scheduling"), "logs:\n{logs}");
        assert!(!errors[0].contains("Error processing"), "logs:\n{logs}");
    }

    #[tokio::test]
    async fn missing_corpus_writes_no_manifest() {
        let out = tempfile::tempdir().unwrap();
        let manifest = out.path().join("result.json");
        let config = BatchConfig::builder()
            .input_root(out.path().join("nope"))
            .manifest_path(&manifest)
            .build()
            .unwrap();
        let err = run_batch(Arc::new(PanickyEngine), &config).await.unwrap_err();
        assert!(matches!(err, BatchError::CorpusUnreadable { .. }));
        assert!(!manifest.exists());
    }
}
