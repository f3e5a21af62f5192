//! Result aggregation: write the run's manifest exactly once.
//!
//! The manifest is a JSON array of [`ConversionRecord`]s in collection
//! (completion) order, 4-space indented, with non-ASCII text unescaped.
//! It is written via a temporary file in the target directory followed by a
//! rename, so readers never observe a half-written manifest.

use super::to_pretty_json;
use crate::error::BatchError;
use crate::output::ConversionRecord;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Serialise `records` to `path`. An empty slice writes `[]`.
pub fn write_manifest(path: &Path, records: &[ConversionRecord]) -> Result<(), BatchError> {
    let bytes = to_pretty_json(records)?;

    let write_err = |e: std::io::Error| BatchError::ManifestWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    // Same mode a plain create would get (0666 minus umask), not 0600.
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(parent).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    info!(
        "Manifest written: {} ({} record(s))",
        path.display(),
        records.len()
    );
    Ok(())
}

/// Read a manifest back.
pub fn read_manifest(path: &Path) -> Result<Vec<ConversionRecord>, BatchError> {
    let bytes = std::fs::read(path).map_err(|e| BatchError::ManifestRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}
