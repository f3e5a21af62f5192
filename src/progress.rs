//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the dispatcher works through the corpus. The CLI uses it to drive a
//! terminal progress bar; a service could forward events to a channel.
//!
//! # Example
//!
//! ```rust
//! use edgequake_corpus2md::{BatchConfig, BatchProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, path: &Path, record_count: usize) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{done} {} ({record_count} records)", path.display());
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { finished: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the dispatcher as documents move through the pipeline.
///
/// Implementations must be `Send + Sync`: with more than one worker,
/// `on_document_*` methods are called concurrently from different tasks.
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before any document is dispatched.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a worker picks up a document.
    fn on_document_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called when a document converted and its artifacts are on disk.
    fn on_document_complete(&self, path: &Path, record_count: usize) {
        let _ = (path, record_count);
    }

    /// Called when a document failed, for any reason.
    fn on_document_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Called once after every dispatched document has finished, before the
    /// manifest is written.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started_total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        failed_paths: Mutex<Vec<String>>,
        success_total: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_documents: usize) {
            self.started_total.store(total_documents, Ordering::SeqCst);
        }

        fn on_document_start(&self, _path: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _path: &Path, _record_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, path: &Path, _error: &str) {
            self.failed_paths
                .lock()
                .unwrap()
                .push(path.display().to_string());
        }

        fn on_batch_complete(&self, _total_documents: usize, success_count: usize) {
            self.success_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_document_start(Path::new("a.pdf"));
        cb.on_document_complete(Path::new("a.pdf"), 12);
        cb.on_document_error(Path::new("b.pdf"), "engine failed");
        cb.on_batch_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(2);
        tracker.on_document_start(Path::new("x/a.pdf"));
        tracker.on_document_complete(Path::new("x/a.pdf"), 4);
        tracker.on_document_start(Path::new("x/b.pdf"));
        tracker.on_document_error(Path::new("x/b.pdf"), "malformed engine output");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.failed_paths.lock().unwrap(), vec!["x/b.pdf"]);
        assert_eq!(tracker.success_total.load(Ordering::SeqCst), 1);
    }
}
