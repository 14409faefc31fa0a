//! CLI command definitions for estate-forge.
//!
//! Runs property batches from a file of listing URLs, queries stored batches
//! and scores quality rubrics.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use uuid::Uuid;

use crate::llm::ChatClient;
use crate::pipeline::{
    BatchCoordinator, BatchRequest, BatchSummary, CoordinatorConfig, ItemRef, ItemType,
    ItemTypeSelector,
};
use crate::providers::{HttpListingFetcher, LlmAnalysisProvider, LlmReviewProvider};
use crate::quality::{ScoringCriteria, ScoringEngine};
use crate::storage::{BatchStore, SqliteBatchStore};

/// Batch property analysis with quality-gated scoring.
#[derive(Parser)]
#[command(name = "estate-forge")]
#[command(about = "Analyze batches of property listings with reviewed, quality-scored verdicts")]
#[command(version)]
#[command(
    long_about = "estate-forge drives property listings through acquisition, primary analysis, quality review and final validation.\n\nExample usage:\n  estate-forge run --owner me --type both --input listings.txt"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Analyze every listing in a file as one batch.
    Run(RunArgs),
    /// Show the status of a stored batch.
    Status(BatchArgs),
    /// Show the per-item results of a stored batch.
    Results(BatchArgs),
    /// Score a quality rubric.
    Score(ScoreArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Owner the batch is recorded under.
    #[arg(long)]
    pub owner: String,

    /// Item types the batch accepts (primary, rental, both).
    #[arg(short = 't', long = "type", default_value = "primary")]
    pub item_types: String,

    /// File with one listing per line, optionally followed by `,primary` or `,rental`.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Database URL; overrides ESTATE_DATABASE_URL.
    #[arg(long)]
    pub database: Option<String>,

    /// Chat API key; overrides ESTATE_LLM_API_KEY.
    #[arg(long, env = "ESTATE_LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for commands that address one stored batch.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Batch id.
    pub batch_id: Uuid,

    /// Database URL; overrides ESTATE_DATABASE_URL.
    #[arg(long)]
    pub database: Option<String>,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for the score command.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// Data accuracy (0-100).
    #[arg(allow_negative_numbers = true)]
    pub data_accuracy: f64,
    /// Logical consistency (0-100).
    #[arg(allow_negative_numbers = true)]
    pub logical_consistency: f64,
    /// Actionability (0-100).
    #[arg(allow_negative_numbers = true)]
    pub actionability: f64,
    /// Analysis completeness (0-100).
    #[arg(allow_negative_numbers = true)]
    pub analysis_completeness: f64,
    /// Presentation (0-100).
    #[arg(allow_negative_numbers = true)]
    pub presentation: f64,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to read the log level before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses the arguments and runs the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the command described by `cli`.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_batch_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
        Commands::Results(args) => run_results_command(args).await,
        Commands::Score(args) => run_score_command(args),
    }
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_batch_command(args: RunArgs) -> anyhow::Result<()> {
    let selector = ItemTypeSelector::from_str(&args.item_types).map_err(anyhow::Error::msg)?;
    let contents = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let items = parse_item_file(&contents, selector).map_err(anyhow::Error::msg)?;

    let mut config = load_config(args.database)?;
    if let Some(key) = args.api_key {
        config = config.with_llm_api_key(key);
    }

    let store: Arc<dyn BatchStore> = Arc::new(SqliteBatchStore::connect(&config.database_url).await?);
    let client = Arc::new(ChatClient::from_config(&config)?);
    let fetcher = Arc::new(HttpListingFetcher::new(config.http_timeout)?);
    let analyst = Arc::new(LlmAnalysisProvider::from_config(client.clone(), &config));
    let reviewer = Arc::new(LlmReviewProvider::from_config(client, &config));

    let coordinator = BatchCoordinator::new(store, fetcher, analyst, reviewer, config)?;

    info!(items = items.len(), item_types = %selector, "Starting batch");
    let summary = coordinator
        .run_batch(BatchRequest {
            owner_id: args.owner,
            item_types: selector,
            items,
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn run_status_command(args: BatchArgs) -> anyhow::Result<()> {
    let config = load_config(args.database)?;
    let store = SqliteBatchStore::connect(&config.database_url).await?;
    let batch = store
        .get_batch(args.batch_id)
        .await?
        .with_context(|| format!("batch {} not found", args.batch_id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        println!("Batch:      {}", batch.id);
        println!("Owner:      {}", batch.owner_id);
        println!("Types:      {}", batch.item_types);
        println!("Status:     {}", batch.status);
        println!("Completed:  {}/{}", batch.completed_items, batch.total_items);
        println!("Updated:    {}", batch.updated_at.to_rfc3339());
    }
    Ok(())
}

async fn run_results_command(args: BatchArgs) -> anyhow::Result<()> {
    let config = load_config(args.database)?;
    let store = SqliteBatchStore::connect(&config.database_url).await?;
    let batch = store
        .get_batch(args.batch_id)
        .await?
        .with_context(|| format!("batch {} not found", args.batch_id))?;
    let items = store.get_items(args.batch_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    print_summary(&BatchSummary::from_items(&batch, &items));
    println!();
    for item in &items {
        let verdict = match (item.final_score, item.recommendation) {
            (Some(score), Some(recommendation)) => format!("{:>5.1}  {}", score, recommendation),
            _ => item
                .error_message
                .clone()
                .unwrap_or_else(|| item.stage.to_string()),
        };
        println!("  [{}] {}  {}", item.item_type, item.label(), verdict);
    }
    Ok(())
}

fn run_score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let criteria = ScoringCriteria::new(
        args.data_accuracy,
        args.logical_consistency,
        args.actionability,
        args.analysis_completeness,
        args.presentation,
    );
    let result = ScoringEngine::new().calculate_score(&criteria)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Score:      {:.1}", result.score);
        println!("Stars:      {}", "⭐".repeat(result.stars as usize));
        println!("Quality:    {}", result.quality_level);
        println!("Threshold:  {}", if result.meets_threshold { "met" } else { "not met" });
    }
    Ok(())
}

fn load_config(database: Option<String>) -> anyhow::Result<CoordinatorConfig> {
    let mut config = CoordinatorConfig::from_env()?;
    if let Some(url) = database {
        config = config.with_database_url(url);
    }
    Ok(config)
}

fn print_summary(summary: &BatchSummary) {
    println!("\n=== Batch {} ===", summary.batch_id);
    println!("Status:         {}", summary.status);
    println!("Analyzed:       {}/{}", summary.total_analyzed, summary.total_items);
    println!("Failed:         {}", summary.failed);
    println!("Average score:  {:.1}", summary.average_score);
    println!(
        "Verdicts:       {} proceed, {} caution, {} reject",
        summary.recommendations.proceed, summary.recommendations.caution, summary.recommendations.reject
    );
    println!("Primary:        {} (avg {:.1})", summary.primary.count, summary.primary.average_score);
    println!("Rental:         {} (avg {:.1})", summary.rental.count, summary.rental.average_score);
}

/// Parses a listing file: one source per line, `#` comments and blank lines
/// skipped. A trailing `,primary` or `,rental` sets the item type; otherwise
/// the selector's default applies.
pub fn parse_item_file(contents: &str, selector: ItemTypeSelector) -> Result<Vec<ItemRef>, String> {
    let mut items = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let item = match line.rsplit_once(',') {
            Some((source, kind)) => {
                let item_type = ItemType::from_str(kind.trim())
                    .map_err(|e| format!("line {}: {}", index + 1, e))?;
                ItemRef::new(source.trim(), item_type)
            }
            None => ItemRef::new(line, selector.default_item_type()),
        };
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["estate-forge", "run", "--owner", "me", "--input", "urls.txt"])
            .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.owner, "me");
                assert_eq!(args.item_types, "primary");
                assert_eq!(args.input, PathBuf::from("urls.txt"));
                assert!(args.database.is_none());
                assert!(!args.json);
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_status_requires_uuid() {
        assert!(Cli::try_parse_from(["estate-forge", "status", "not-a-uuid"]).is_err());

        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["estate-forge", "status", &id, "--json"]).expect("should parse");
        match cli.command {
            Commands::Status(args) => {
                assert_eq!(args.batch_id.to_string(), id);
                assert!(args.json);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_score_command_accepts_negative_values() {
        let cli = Cli::try_parse_from(["estate-forge", "score", "95", "90", "85", "92", "-1"])
            .expect("should parse");
        match cli.command {
            Commands::Score(args) => {
                assert_eq!(args.data_accuracy, 95.0);
                assert_eq!(args.presentation, -1.0);
                assert!(run_score_command(args).is_err());
            }
            _ => panic!("Expected Score command"),
        }
    }

    #[tokio::test]
    async fn test_run_command_reports_missing_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("missing.txt");
        let cli = Cli::try_parse_from([
            "estate-forge",
            "run",
            "--owner",
            "me",
            "--input",
            input.to_str().unwrap(),
        ])
        .expect("should parse");

        let err = run_with_cli(cli).await.unwrap_err();
        assert!(err.to_string().contains("failed to read"), "{}", err);
    }

    #[test]
    fn test_parse_item_file() {
        let contents = "# listings\nhttps://a.test/1_zpid/\n\nhttps://b.test/2_zpid/, rental\n";
        let items = parse_item_file(contents, ItemTypeSelector::Both).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_ref, "https://a.test/1_zpid/");
        assert_eq!(items[0].item_type, ItemTypeSelector::Both.default_item_type());
        assert_eq!(items[1].source_ref, "https://b.test/2_zpid/");
        assert_eq!(items[1].item_type, ItemType::Rental);
    }

    #[test]
    fn test_parse_item_file_rejects_unknown_type() {
        let err = parse_item_file("https://a.test/1,condo", ItemTypeSelector::Primary).unwrap_err();
        assert!(err.starts_with("line 1:"));
    }
}
