use crate::{
    error::{GenError, Result},
    models::{GenerationResult, ImageKind},
};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_BASE_NAME: &str = "image";

/// Per-image entry of the metadata record.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub index: usize,
    pub path: PathBuf,
    pub format: ImageKind,
    pub size_bytes: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Contents of `<base>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataRecord {
    pub request_id: Uuid,
    pub model: String,
    pub prompt: String,
    pub enhanced_prompt: String,
    pub style: Option<String>,
    pub style_reference: Option<PathBuf>,
    pub resolution: String,
    pub num_images_requested: u32,
    pub num_images_generated: usize,
    pub images: Vec<ImageRecord>,
    pub text_response: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub provider_response: Value,
}

#[derive(Debug)]
pub struct FailedWrite {
    pub path: PathBuf,
    pub error: GenError,
}

#[derive(Debug, Default)]
pub struct PersistReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<FailedWrite>,
}

impl PersistReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Hex digits of the request id appended to the default run directory.
const RUN_SUFFIX_LEN: usize = 8;

/// `<output_root>/<YYYYmmdd_HHMMSS>_<id prefix>/image`, one directory per run
/// even within the same second.
pub fn default_base_path(output_root: &Path, now: DateTime<Local>, request_id: Uuid) -> PathBuf {
    let id = request_id.simple().to_string();
    output_root
        .join(format!(
            "{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            &id[..RUN_SUFFIX_LEN]
        ))
        .join(DEFAULT_BASE_NAME)
}

/// Writes `<base>_<n>.<ext>` for every image (n from 1) and then `<base>.json`.
///
/// A failed file is recorded in the report and the remaining files are still
/// attempted. Only an empty result or an uncreatable parent directory fail
/// the whole call.
pub fn persist(result: &GenerationResult, base_path: &Path) -> Result<PersistReport> {
    if result.images.is_empty() {
        return Err(GenError::Validation(
            "result holds no images; nothing to persist".into(),
        ));
    }

    let base = strip_known_extension(base_path);
    if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            GenError::Io(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let mut report = PersistReport::default();
    let mut records = Vec::with_capacity(result.images.len());

    for (i, image) in result.images.iter().enumerate() {
        let index = i + 1;
        let path = sibling(&base, &format!("_{}.{}", index, image.kind.extension()));
        match fs::write(&path, &image.bytes) {
            Ok(()) => {
                log::info!("💾 Image saved to: {}", path.display());
                records.push(ImageRecord {
                    index,
                    path: path.clone(),
                    format: image.kind,
                    size_bytes: image.bytes.len(),
                    width: image.dimensions.map(|(w, _)| w),
                    height: image.dimensions.map(|(_, h)| h),
                });
                report.written.push(path);
            }
            Err(e) => {
                log::error!("❌ Failed to save {}: {}", path.display(), e);
                report.failed.push(FailedWrite {
                    error: GenError::Io(format!("cannot write {}: {}", path.display(), e)),
                    path,
                });
            }
        }
    }

    let metadata = metadata_record(result, records, &report);
    let json_path = metadata_path(&base);
    match write_metadata(&json_path, &metadata) {
        Ok(()) => {
            log::info!("📄 Metadata saved to: {}", json_path.display());
            report.written.push(json_path);
        }
        Err(error) => {
            log::error!("❌ Failed to save {}: {}", json_path.display(), error);
            report.failed.push(FailedWrite {
                path: json_path,
                error,
            });
        }
    }

    Ok(report)
}

fn metadata_record(
    result: &GenerationResult,
    images: Vec<ImageRecord>,
    report: &PersistReport,
) -> MetadataRecord {
    let error_message = if report.failed.is_empty() {
        result.error_message.clone()
    } else {
        let failed: Vec<String> = report
            .failed
            .iter()
            .map(|f| f.path.display().to_string())
            .collect();
        Some(format!("failed to write: {}", failed.join(", ")))
    };

    let mut provider_response = result.raw_metadata.clone();
    redact_inline_data(&mut provider_response);

    MetadataRecord {
        request_id: result.request_id,
        model: result.model.clone(),
        prompt: result.request.prompt().to_string(),
        enhanced_prompt: result.enhanced_prompt.clone(),
        style: result.request.style().map(str::to_string),
        style_reference: result.style_reference.clone(),
        resolution: result.request.resolution().to_string(),
        num_images_requested: result.request.num_images(),
        num_images_generated: result.images.len(),
        images,
        text_response: result.text.clone(),
        timestamp: result.created_at,
        success: result.success && report.failed.is_empty(),
        error_message,
        provider_response,
    }
}

fn write_metadata(path: &Path, metadata: &MetadataRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(path, json)
        .map_err(|e| GenError::Io(format!("cannot write {}: {}", path.display(), e)))
}

/// Replaces base64 image payloads with a size marker.
pub fn redact_inline_data(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "inlineData" || key == "inline_data" {
                    if let Some(Value::String(data)) = child.get_mut("data") {
                        *data = format!("<{} base64 chars omitted>", data.len());
                    }
                }
                redact_inline_data(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_inline_data),
        _ => {}
    }
}

/// Where [`persist`] puts the metadata record for `base_path`.
pub fn metadata_path(base_path: &Path) -> PathBuf {
    sibling(&strip_known_extension(base_path), ".json")
}

fn strip_known_extension(path: &Path) -> PathBuf {
    let known = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json") || ImageKind::from_extension(e).is_some())
        .unwrap_or(false);
    if known {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

fn sibling(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DEFAULT_BASE_NAME.into());
    name.push(suffix);
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeneratedImage, GenerationRequest};
    use crate::test_support::{png_base64, PNG_1X1};
    use chrono::TimeZone;
    use serde_json::json;

    fn result_with(images: usize) -> GenerationResult {
        GenerationResult {
            request_id: Uuid::new_v4(),
            model: "gemini-test".to_string(),
            request: GenerationRequest::builder("a red bicycle")
                .resolution("512x512")
                .num_images(2)
                .build()
                .unwrap(),
            enhanced_prompt: "a red bicycle, high quality, 512x512 resolution".to_string(),
            style_reference: None,
            images: (0..images)
                .map(|_| GeneratedImage::from_bytes(PNG_1X1.to_vec(), Some("image/png")))
                .collect(),
            text: Some("enjoy".to_string()),
            raw_metadata: json!({
                "candidates": [{"content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": png_base64()}}
                ]}}]
            }),
            success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_persist_writes_images_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run").join("bike");

        let report = persist(&result_with(2), &base).unwrap();
        assert!(report.is_complete());
        assert_eq!(
            report.written,
            vec![
                dir.path().join("run/bike_1.png"),
                dir.path().join("run/bike_2.png"),
                dir.path().join("run/bike.json"),
            ]
        );

        let files = fs::read_dir(dir.path().join("run")).unwrap().count();
        assert_eq!(files, 3);

        let metadata: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("run/bike.json")).unwrap())
                .unwrap();
        assert_eq!(metadata["prompt"], json!("a red bicycle"));
        assert_eq!(metadata["resolution"], json!("512x512"));
        assert_eq!(metadata["num_images_generated"], json!(2));
        assert_eq!(metadata["images"][0]["width"], json!(1));
        assert_eq!(metadata["success"], json!(true));
        let data = metadata["provider_response"]["candidates"][0]["content"]["parts"][0]
            ["inlineData"]["data"]
            .as_str()
            .unwrap();
        assert!(data.contains("omitted"));
    }

    #[test]
    fn test_persist_strips_image_extension_from_base() {
        let dir = tempfile::tempdir().unwrap();
        let report = persist(&result_with(1), &dir.path().join("out.png")).unwrap();
        assert_eq!(
            report.written,
            vec![dir.path().join("out_1.png"), dir.path().join("out.json")]
        );
    }

    #[test]
    fn test_one_failed_write_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the first image's path makes that write fail.
        fs::create_dir(dir.path().join("bike_1.png")).unwrap();

        let report = persist(&result_with(2), &dir.path().join("bike")).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, dir.path().join("bike_1.png"));
        assert!(matches!(report.failed[0].error, GenError::Io(_)));
        assert_eq!(
            report.written,
            vec![dir.path().join("bike_2.png"), dir.path().join("bike.json")]
        );

        let metadata: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("bike.json")).unwrap())
                .unwrap();
        assert_eq!(metadata["success"], json!(false));
        assert!(metadata["error_message"].as_str().unwrap().contains("bike_1.png"));
    }

    #[test]
    fn test_empty_result_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = persist(&result_with(0), &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, GenError::Validation(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_default_base_path() {
        let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();
        let id = Uuid::parse_str("0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d").unwrap();
        assert_eq!(
            default_base_path(Path::new("generated_images"), now, id),
            PathBuf::from("generated_images/20261017_090503_0a1b2c3d/image")
        );
    }

    #[test]
    fn test_runs_in_same_second_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();

        let first = result_with(1);
        let second = result_with(1);
        let first_base = default_base_path(dir.path(), now, first.request_id);
        let second_base = default_base_path(dir.path(), now, second.request_id);
        assert_ne!(first_base, second_base);

        persist(&first, &first_base).unwrap();
        persist(&second, &second_base).unwrap();
        assert!(sibling(&first_base, "_1.png").is_file());
        assert!(sibling(&second_base, "_1.png").is_file());
        assert!(sibling(&first_base, ".json").is_file());
        assert!(sibling(&second_base, ".json").is_file());
    }
}
