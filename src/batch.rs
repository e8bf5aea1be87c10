//! Many generations in one run: a prompts file, or one prompt across every style.
//!
//! Each entry writes to `<output_dir>/<name>` through [`persist`]. An entry
//! whose `<name>.json` already exists is skipped, so an interrupted batch can
//! be re-run and picks up where it stopped.

use crate::{
    error::{GenError, Result},
    gemini::ImageClient,
    models::GenerationRequest,
    persist::{metadata_path, persist},
    styles::{list_styles, normalize_name},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUMMARY_FILE: &str = "batch_results.json";

/// One line of work. Missing fields fall back to [`BatchOptions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub name: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_images: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub styles_dir: PathBuf,
    pub resolution: String,
    pub num_images: u32,
    /// Pause between two provider calls. Skipped entries do not wait.
    pub delay: Duration,
    /// Regenerate entries that already have a metadata record.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Generated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub name: String,
    pub status: BatchStatus,
    pub files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn count(&self, status: BatchStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn is_complete(&self) -> bool {
        self.count(BatchStatus::Failed) == 0
    }

    /// Writes the report as pretty JSON and returns where it went.
    pub fn write_summary(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        log::info!("📄 Batch summary saved to: {}", path.display());
        Ok(path)
    }
}

/// Reads a JSON array of entries and checks every name up front.
pub fn load_entries(path: &Path) -> Result<Vec<BatchEntry>> {
    let raw = fs::read_to_string(path).map_err(|e| {
        GenError::Io(format!("cannot read batch file {}: {}", path.display(), e))
    })?;
    let entries: Vec<BatchEntry> = serde_json::from_str(&raw).map_err(|e| {
        GenError::Validation(format!("batch file {} is malformed: {}", path.display(), e))
    })?;
    validate_names(&entries)?;
    Ok(entries)
}

/// One entry per style reference in `styles_dir`, all with the same prompt.
pub fn entries_for_all_styles(prompt: &str, styles_dir: &Path) -> Result<Vec<BatchEntry>> {
    let styles = list_styles(styles_dir)?;
    if styles.is_empty() {
        return Err(GenError::NotFound(format!(
            "no style references in {}",
            styles_dir.display()
        )));
    }

    let mut seen = HashSet::new();
    Ok(styles
        .into_iter()
        .filter(|style| seen.insert(style.name.clone()))
        .map(|style| BatchEntry {
            name: style.name.clone(),
            prompt: prompt.to_string(),
            style: Some(style.name),
            resolution: None,
            num_images: None,
        })
        .collect())
}

/// Names end up as file stems, so they must be unique and path-free.
fn validate_names(entries: &[BatchEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        let name = entry.name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(GenError::Validation(format!(
                "batch entry name '{}' is not a usable file name",
                entry.name
            )));
        }
        if !seen.insert(name) {
            return Err(GenError::Validation(format!(
                "batch entry name '{}' appears more than once",
                name
            )));
        }
    }
    Ok(())
}

/// Runs every entry in order. Per-entry failures are recorded, not returned.
pub async fn run_batch(
    client: &ImageClient,
    entries: &[BatchEntry],
    options: &BatchOptions,
) -> Result<BatchReport> {
    validate_names(entries)?;
    fs::create_dir_all(&options.output_dir).map_err(|e| {
        GenError::Io(format!(
            "cannot create {}: {}",
            options.output_dir.display(),
            e
        ))
    })?;

    log::info!(
        "🚀 Batch of {} entr{} into {}",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        options.output_dir.display()
    );

    let mut report = BatchReport::default();
    let mut called_provider = false;

    for (i, entry) in entries.iter().enumerate() {
        let name = entry.name.trim();
        let base = options.output_dir.join(name);

        if !options.force && metadata_path(&base).is_file() {
            log::info!("⏭️  [{}/{}] {} already generated", i + 1, entries.len(), name);
            report.outcomes.push(BatchOutcome {
                name: name.to_string(),
                status: BatchStatus::Skipped,
                files: Vec::new(),
                error: None,
            });
            continue;
        }

        let request = match build_request(entry, options) {
            Ok(request) => request,
            Err(e) => {
                log::error!("❌ [{}/{}] {}: {}", i + 1, entries.len(), name, e);
                report.outcomes.push(failed(name, &e));
                continue;
            }
        };

        if called_provider && !options.delay.is_zero() {
            log::info!("⏳ Waiting {:?} before the next request", options.delay);
            tokio::time::sleep(options.delay).await;
        }
        called_provider = true;

        log::info!("🎨 [{}/{}] {}", i + 1, entries.len(), name);
        let outcome = match generate_one(client, &request, options, &base).await {
            Ok(files) => BatchOutcome {
                name: name.to_string(),
                status: BatchStatus::Generated,
                files,
                error: None,
            },
            Err(e) => {
                log::error!("❌ [{}/{}] {}: {}", i + 1, entries.len(), name, e);
                failed(name, &e)
            }
        };
        report.outcomes.push(outcome);
    }

    log::info!(
        "📊 Batch done: {} generated, {} skipped, {} failed",
        report.count(BatchStatus::Generated),
        report.count(BatchStatus::Skipped),
        report.count(BatchStatus::Failed)
    );
    Ok(report)
}

fn build_request(entry: &BatchEntry, options: &BatchOptions) -> Result<GenerationRequest> {
    GenerationRequest::builder(entry.prompt.clone())
        .resolution(
            entry
                .resolution
                .clone()
                .unwrap_or_else(|| options.resolution.clone()),
        )
        .num_images(entry.num_images.unwrap_or(options.num_images))
        .maybe_style(entry.style.as_deref().map(normalize_name))
        .build()
}

async fn generate_one(
    client: &ImageClient,
    request: &GenerationRequest,
    options: &BatchOptions,
    base: &Path,
) -> Result<Vec<PathBuf>> {
    let result = match request.style() {
        Some(style) => {
            client
                .generate_with_style_reference(request, style, &options.styles_dir)
                .await?
        }
        None => client.generate(request).await?,
    };

    let written = persist(&result, base)?;
    match written.failed.into_iter().next() {
        None => Ok(written.written),
        Some(first) => Err(first.error),
    }
}

fn failed(name: &str, error: &GenError) -> BatchOutcome {
    BatchOutcome {
        name: name.to_string(),
        status: BatchStatus::Failed,
        files: Vec::new(),
        error: Some(error.to_string()),
    }
}
