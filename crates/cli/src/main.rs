//! docqa CLI
//!
//! Main entry point for the docqa command-line tool.
//! Ingests documents into a local vector index and answers questions about them.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{DocumentsCommand, IngestCommand, QueryCommand, StatusCommand};
use docqa_core::{config::AppConfig, logging, AppError, LogFormat};
use docqa_knowledge::RetrievalPipeline;
use std::path::PathBuf;
use std::process::ExitCode;

/// docqa - question answering over your own documents
#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(about = "Question answering over local documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DOCQA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add files or directories to the index
    Ingest(IngestCommand),

    /// Ask a question about the indexed documents
    Query(QueryCommand),

    /// List or delete indexed documents
    Documents(DocumentsCommand),

    /// Show index status
    Status(StatusCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest(_) => "ingest",
            Commands::Query(_) => "query",
            Commands::Documents(_) => "documents",
            Commands::Status(_) => "status",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Workspace and config file must be known before the file layer is read.
    let workspace = cli.workspace.clone();
    let config_file = cli.config.clone();
    let config = AppConfig::load_with(|key| match key {
        "DOCQA_WORKSPACE" => workspace.as_ref().map(|p| p.display().to_string()),
        "DOCQA_CONFIG" => config_file.as_ref().map(|p| p.display().to_string()),
        _ => std::env::var(key).ok(),
    })?;

    let config = config.with_overrides(
        None,
        cli.index_dir,
        None,
        cli.log_level,
        cli.log_json,
        cli.verbose,
        cli.no_color,
    );
    config.validate()?;

    let format = if config.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("docqa CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Index directory: {:?}", config.index_dir());

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let index_dir = config.ensure_index_dir()?;
    let pipeline = RetrievalPipeline::from_config(&config)
        .map_err(AppError::from)
        .with_context(|| format!("Failed to open index at {:?}", index_dir))?;

    let result = match &cli.command {
        Commands::Ingest(cmd) => cmd.execute(&pipeline).await,
        Commands::Query(cmd) => cmd.execute(&pipeline).await,
        Commands::Documents(cmd) => cmd.execute(&pipeline).await,
        Commands::Status(cmd) => cmd.execute(&pipeline).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}

/// Distinct exit status per error kind.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AppError>() {
        Some(AppError::Config(_)) => 2,
        Some(AppError::Knowledge(_)) => 3,
        Some(AppError::Io(_)) => 4,
        Some(AppError::Llm(_)) => 5,
        Some(AppError::InvalidRequest(_)) => 6,
        Some(AppError::NotFound(_)) => 7,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_documents_delete() {
        let cli = Cli::try_parse_from(["docqa", "documents", "delete", "abc", "--json"]).unwrap();
        match cli.command {
            Commands::Documents(cmd) => match cmd.action {
                commands::documents::DocumentsAction::Delete { doc_id, json } => {
                    assert_eq!(doc_id, "abc");
                    assert!(json);
                }
                other => panic!("unexpected action: {:?}", other),
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_top_k() {
        let cli = Cli::try_parse_from(["docqa", "query", "what is a slot?", "-k", "2"]).unwrap();
        match cli.command {
            Commands::Query(cmd) => {
                assert_eq!(cmd.question, "what is a slot?");
                assert_eq!(cmd.top_k, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ingest_requires_paths() {
        assert!(Cli::try_parse_from(["docqa", "ingest"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let err = anyhow::Error::from(AppError::Config("bad".to_string()));
        assert_eq!(exit_code(&err), 2);
        let err = anyhow::Error::from(AppError::Knowledge("empty".to_string()));
        assert_eq!(exit_code(&err), 3);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_not_found_and_caller_errors_have_own_codes() {
        let err = anyhow::Error::from(AppError::NotFound("document abc".to_string()));
        assert_eq!(exit_code(&err), 7);

        let caller: AppError = docqa_knowledge::KnowledgeError::EmptyIndex.into();
        assert_eq!(exit_code(&anyhow::Error::from(caller)), 6);

        let system: AppError =
            docqa_knowledge::KnowledgeError::CorruptIndex("bad header".to_string()).into();
        assert_eq!(exit_code(&anyhow::Error::from(system)), 3);
    }
}
