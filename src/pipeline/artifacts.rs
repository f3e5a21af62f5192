//! Artifact writer: persist one document's text, images, and metadata.
//!
//! Layout for a document with base name `X`:
//!
//! ```text
//! <output_root>/X/X.md
//! <output_root>/X/image_0.png, image_1.png, …   (engine mapping order)
//! <output_root>/X/X_meta.json
//! ```
//!
//! Writes are plain overwrites: converting the same document twice replaces
//! the previous artifacts. A failure part-way leaves whatever was already
//! written; the document is then missing from the manifest, which is what
//! consumers go by.
//!
//! Everything here is blocking (filesystem + PNG encoding); the adapter runs
//! it on `spawn_blocking`.

use super::to_pretty_json;
use crate::engine::ImagePayload;
use crate::error::ConversionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The per-document output directory: `<output_root>/<base_name>`.
pub fn document_dir(output_root: &Path, base_name: &str) -> PathBuf {
    output_root.join(base_name)
}

/// Write all artifacts for one document and return the path of the
/// Markdown file.
///
/// `source` is the input document; it only labels errors.
pub fn write_artifacts(
    source: &Path,
    output_root: &Path,
    base_name: &str,
    text: &str,
    images: &[(String, ImagePayload)],
    metadata: &Value,
) -> Result<PathBuf, ConversionError> {
    let dir = document_dir(output_root, base_name);
    std::fs::create_dir_all(&dir).map_err(|e| ConversionError::ArtifactWrite {
        path: dir.clone(),
        source: e,
    })?;

    let markdown_path = dir.join(format!("{base_name}.md"));
    std::fs::write(&markdown_path, text).map_err(|e| ConversionError::ArtifactWrite {
        path: markdown_path.clone(),
        source: e,
    })?;

    for (index, (image_id, payload)) in images.iter().enumerate() {
        let image_path = dir.join(format!("image_{index}.png"));
        write_image(source, &image_path, image_id, payload)?;
    }

    let meta_path = dir.join(format!("{base_name}_meta.json"));
    let meta_bytes = to_pretty_json(metadata).map_err(|e| ConversionError::ArtifactWrite {
        path: meta_path.clone(),
        source: e.into(),
    })?;
    std::fs::write(&meta_path, meta_bytes).map_err(|e| ConversionError::ArtifactWrite {
        path: meta_path.clone(),
        source: e,
    })?;

    debug!(
        "Wrote {} + {} image(s) + metadata to {}",
        markdown_path.display(),
        images.len(),
        dir.display()
    );
    Ok(markdown_path)
}

fn write_image(
    source: &Path,
    image_path: &Path,
    image_id: &str,
    payload: &ImagePayload,
) -> Result<(), ConversionError> {
    match payload {
        ImagePayload::Decoded(img) => img
            .save_with_format(image_path, image::ImageFormat::Png)
            .map_err(|e| ConversionError::ImageEncode {
                path: image_path.to_path_buf(),
                source: e,
            }),
        ImagePayload::Base64(encoded) => {
            let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                ConversionError::InvalidBase64Payload {
                    path: source.to_path_buf(),
                    image_id: image_id.to_string(),
                    source: e,
                }
            })?;
            std::fs::write(image_path, bytes).map_err(|e| ConversionError::ArtifactWrite {
                path: image_path.to_path_buf(),
                source: e,
            })
        }
        ImagePayload::Unsupported { kind } => Err(ConversionError::UnsupportedImagePayload {
            path: source.to_path_buf(),
            image_id: image_id.to_string(),
            kind: kind.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])))
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn writes_full_layout() {
        let out = tempfile::tempdir().unwrap();
        let raw = png_bytes(&red_square());
        let images = vec![
            ("fig_a".to_string(), ImagePayload::Decoded(red_square())),
            ("fig_b".to_string(), ImagePayload::Base64(STANDARD.encode(&raw))),
        ];

        let md = write_artifacts(
            Path::new("in/a/report.pdf"),
            out.path(),
            "report",
            "# Report\nbody",
            &images,
            &json!({"title": "Report"}),
        )
        .unwrap();

        let dir = out.path().join("report");
        assert_eq!(md, dir.join("report.md"));
        assert_eq!(std::fs::read_to_string(&md).unwrap(), "# Report\nbody");

        let decoded = image::open(dir.join("image_0.png")).unwrap();
        assert_eq!(decoded.width(), 4);
        // base64 payloads land byte-identical
        assert_eq!(std::fs::read(dir.join("image_1.png")).unwrap(), raw);

        let meta: Value =
            serde_json::from_slice(&std::fs::read(dir.join("report_meta.json")).unwrap()).unwrap();
        assert_eq!(meta, json!({"title": "Report"}));
    }

    #[test]
    fn metadata_is_indented_and_keeps_unicode() {
        let out = tempfile::tempdir().unwrap();
        write_artifacts(
            Path::new("x.pdf"),
            out.path(),
            "doc",
            "",
            &[],
            &json!({"title": "年度报告"}),
        )
        .unwrap();
        let raw = std::fs::read_to_string(out.path().join("doc/doc_meta.json")).unwrap();
        assert_eq!(raw, "{\n    \"title\": \"年度报告\"\n}");
    }

    #[test]
    fn rerun_overwrites() {
        let out = tempfile::tempdir().unwrap();
        let meta = json!({});
        write_artifacts(Path::new("d.pdf"), out.path(), "d", "first version", &[], &meta).unwrap();
        let md =
            write_artifacts(Path::new("d.pdf"), out.path(), "d", "second", &[], &meta).unwrap();
        assert_eq!(std::fs::read_to_string(md).unwrap(), "second");

        let names: Vec<_> = std::fs::read_dir(out.path().join("d"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2, "got: {names:?}");
    }

    #[test]
    fn unsupported_payload_rejected() {
        let out = tempfile::tempdir().unwrap();
        let images = vec![(
            "chart".to_string(),
            ImagePayload::Unsupported {
                kind: "JSON array".into(),
            },
        )];
        let err = write_artifacts(
            Path::new("in/c.pdf"),
            out.path(),
            "c",
            "text",
            &images,
            &json!({}),
        )
        .unwrap_err();
        match err {
            ConversionError::UnsupportedImagePayload { path, image_id, kind } => {
                assert_eq!(path, PathBuf::from("in/c.pdf"));
                assert_eq!(image_id, "chart");
                assert_eq!(kind, "JSON array");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_base64_rejected() {
        let out = tempfile::tempdir().unwrap();
        let images = vec![("p".to_string(), ImagePayload::Base64("not base64!".into()))];
        let err = write_artifacts(Path::new("e.pdf"), out.path(), "e", "", &images, &json!({}))
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidBase64Payload { .. }));
    }

    #[test]
    fn unwritable_root_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let err = write_artifacts(Path::new("f.pdf"), &blocker, "f", "", &[], &json!({}))
            .unwrap_err();
        assert!(matches!(err, ConversionError::ArtifactWrite { .. }));
    }
}
