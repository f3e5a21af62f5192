//! Corpus discovery: `<root>/*/*.<extension>`.
//!
//! Exactly one level of subdirectories is searched. Files directly under the
//! root, deeper files, and entries whose name starts with `.` are ignored
//! without comment, the same set a shell glob of that pattern would match.
//! The extension comparison is case-sensitive.

use crate::error::BatchError;
use crate::output::DocumentTask;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Find every input document under `root`, sorted by path.
///
/// # Errors
/// [`BatchError::CorpusUnreadable`] if `root` itself cannot be listed. An
/// unreadable subdirectory is skipped with a warning.
pub async fn discover_documents(
    root: &Path,
    extension: &str,
) -> Result<Vec<DocumentTask>, BatchError> {
    let unreadable = |e: std::io::Error| BatchError::CorpusUnreadable {
        path: root.to_path_buf(),
        source: e,
    };

    let mut subdirs = Vec::new();
    let mut entries = ReadDirStream::new(tokio::fs::read_dir(root).await.map_err(unreadable)?);
    while let Some(entry) = entries.next().await {
        let entry = entry.map_err(unreadable)?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        // Follows symlinks, like a glob would.
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_dir() => subdirs.push(entry.path()),
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    let mut documents = Vec::new();
    for dir in subdirs {
        match documents_in(&dir, extension).await {
            Ok(found) => documents.extend(found),
            Err(e) => warn!("Skipping unreadable directory {}: {}", dir.display(), e),
        }
    }

    documents.sort();
    debug!(
        "Discovered {} document(s) under {}",
        documents.len(),
        root.display()
    );
    Ok(documents.into_iter().map(DocumentTask::new).collect())
}

async fn documents_in(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = ReadDirStream::new(tokio::fs::read_dir(dir).await?);
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        let path = entry.path();
        if is_hidden(&entry.file_name()) || path.extension() != Some(OsStr::new(extension)) {
            continue;
        }
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            found.push(path);
        }
    }
    Ok(found)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"%PDF-1.7").unwrap();
    }

    #[tokio::test]
    async fn finds_one_level_deep_only() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        touch(&r.join("finance/q1.pdf"));
        touch(&r.join("finance/q2.pdf"));
        touch(&r.join("legal/contract.pdf"));
        touch(&r.join("top-level.pdf"));
        touch(&r.join("finance/archive/old.pdf"));
        touch(&r.join("legal/notes.txt"));
        touch(&r.join("legal/UPPER.PDF"));
        touch(&r.join("legal/.hidden.pdf"));
        touch(&r.join(".cache/cached.pdf"));

        let docs = discover_documents(r, "pdf").await.unwrap();
        let rel: Vec<_> = docs
            .iter()
            .map(|d| d.path().strip_prefix(r).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("finance/q1.pdf"),
                PathBuf::from("finance/q2.pdf"),
                PathBuf::from("legal/contract.pdf"),
            ]
        );
    }

    #[tokio::test]
    async fn directory_named_like_a_document_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a/fake.pdf")).unwrap();
        assert!(discover_documents(root.path(), "pdf").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_corpus() {
        let root = tempfile::tempdir().unwrap();
        assert!(discover_documents(root.path(), "pdf").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_extension() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("x/a.epub"));
        touch(&root.path().join("x/b.pdf"));
        let docs = discover_documents(root.path(), "epub").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].base_name(), "a");
    }

    #[tokio::test]
    async fn missing_root_is_fatal() {
        let err = discover_documents(Path::new("/definitely/not/a/corpus"), "pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::CorpusUnreadable { .. }));
    }
}
