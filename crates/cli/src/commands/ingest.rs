//! Ingest command handler.

use super::print_json;
use clap::Args;
use docqa_core::{AppError, AppResult};
use docqa_knowledge::parser::ContentType;
use docqa_knowledge::{IngestReport, RetrievalPipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Add documents to the index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest (directories are walked for .txt/.md)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct IngestFailure {
    path: PathBuf,
    error: String,
}

#[derive(Debug, Serialize)]
struct IngestSummary {
    ingested: Vec<IngestReport>,
    failed: Vec<IngestFailure>,
}

impl IngestCommand {
    pub async fn execute(&self, pipeline: &RetrievalPipeline) -> AppResult<()> {
        let files = collect_sources(&self.paths);
        tracing::info!("Ingesting {} files", files.len());

        if files.is_empty() {
            return Err(AppError::InvalidRequest(
                "No ingestible files found (expected .txt or .md)".to_string(),
            ));
        }

        let mut summary = IngestSummary {
            ingested: Vec::new(),
            failed: Vec::new(),
        };

        // Sequential on purpose: chunks of one file are embedded as one batch.
        for path in files {
            match pipeline.ingest_file(&path).await {
                Ok(report) => summary.ingested.push(report),
                Err(e) => {
                    tracing::error!("Failed to ingest {:?}: {}", path, e);
                    summary.failed.push(IngestFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.json {
            print_json(&summary)?;
        } else {
            for report in &summary.ingested {
                println!(
                    "Ingested {} -> {} ({} chunks, dim {}, slots {}..={}, via {}{})",
                    report.source,
                    report.doc_id,
                    report.total_chunks,
                    report.embedding_dim,
                    report.slots.first().copied().unwrap_or(0),
                    report.slots.last().copied().unwrap_or(0),
                    report.provider,
                    if report.degraded { ", degraded" } else { "" }
                );
            }
            for failure in &summary.failed {
                println!("Failed {}: {}", failure.path.display(), failure.error);
            }
        }

        if summary.failed.is_empty() {
            Ok(())
        } else {
            Err(AppError::Knowledge(format!(
                "{} of {} files failed to ingest",
                summary.failed.len(),
                summary.failed.len() + summary.ingested.len()
            )))
        }
    }
}

/// Expand directories into their ingestible files, in a stable order.
///
/// Explicit file arguments are kept regardless of extension so the parser can
/// report why they were rejected.
pub(crate) fn collect_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_ingestible(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
}

fn is_ingestible(path: &Path) -> bool {
    ContentType::from_path(path).is_ingestible()
}
