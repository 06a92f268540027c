//! Documents command handler.

use super::print_json;
use clap::{Args, Subcommand};
use docqa_core::{AppError, AppResult};
use docqa_knowledge::{DeleteOutcome, RetrievalPipeline};

/// Manage ingested documents
#[derive(Args, Debug)]
pub struct DocumentsCommand {
    #[command(subcommand)]
    pub action: DocumentsAction,
}

#[derive(Subcommand, Debug)]
pub enum DocumentsAction {
    /// List documents in insertion order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a document and rebuild the index
    Delete {
        /// Document id as printed by `ingest` or `documents list`
        doc_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl DocumentsCommand {
    pub async fn execute(&self, pipeline: &RetrievalPipeline) -> AppResult<()> {
        match &self.action {
            DocumentsAction::List { json } => {
                let documents = pipeline.list_documents().await;
                if *json {
                    print_json(&documents)?;
                } else if documents.is_empty() {
                    println!("No documents indexed");
                } else {
                    for doc in &documents {
                        println!("{}  {} ({} chunks)", doc.doc_id, doc.source, doc.chunk_count);
                    }
                }
            }
            DocumentsAction::Delete { doc_id, json } => {
                tracing::info!("Deleting document {}", doc_id);
                let outcome = pipeline.delete_document(doc_id).await?;
                if *json {
                    print_json(&outcome)?;
                } else if let DeleteOutcome::Deleted { removed, remaining } = outcome {
                    println!(
                        "Deleted {} ({} chunks removed, {} remaining)",
                        doc_id, removed, remaining
                    );
                }
                outcome_status(doc_id, &outcome)?;
            }
        }

        Ok(())
    }
}

/// A delete that matched nothing still fails the command, with its own status.
fn outcome_status(doc_id: &str, outcome: &DeleteOutcome) -> AppResult<()> {
    match outcome {
        DeleteOutcome::Deleted { .. } => Ok(()),
        DeleteOutcome::NotFound => Err(AppError::NotFound(format!(
            "No document found with id {}",
            doc_id
        ))),
    }
}
