//! Query command handler.

use super::print_json;
use clap::Args;
use docqa_core::AppResult;
use docqa_knowledge::RetrievalPipeline;

/// Ask a question about the ingested documents
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Question text
    pub question: String,

    /// Number of chunks to retrieve (default: retrieval.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, pipeline: &RetrievalPipeline) -> AppResult<()> {
        tracing::info!("Executing query command");

        let answer = pipeline.query(&self.question, self.top_k).await?;

        tracing::debug!("Retrieved {} chunks", answer.retrieved_chunks);

        if self.json {
            print_json(&answer)?;
        } else {
            println!("Answer:");
            println!("{}", answer.answer);
            println!();
            println!("Sources:");
            for hit in &answer.results {
                println!(
                    "- [{}] {} #{} (distance {:.4})",
                    hit.slot, hit.record.source, hit.record.chunk_index, hit.distance
                );
            }
        }

        Ok(())
    }
}
