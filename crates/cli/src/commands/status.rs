//! Status command handler.

use super::print_json;
use clap::Args;
use docqa_core::AppResult;
use docqa_knowledge::RetrievalPipeline;

/// Show index size and dimension
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, pipeline: &RetrievalPipeline) -> AppResult<()> {
        let status = pipeline.status().await;

        if self.json {
            print_json(&status)?;
        } else {
            println!("Vectors:   {}", status.count);
            println!("Documents: {}", status.documents);
            match status.dim {
                Some(dim) => println!("Dimension: {}", dim),
                None => println!("Dimension: (unset, index empty)"),
            }
        }

        Ok(())
    }
}
