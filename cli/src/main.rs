//! threatscore CLI: runs the threat-score pipeline against Elasticsearch
//!
//! Each pipeline step is its own subcommand; `run` chains all of them.

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::path::PathBuf;
use threatscore::{
    Assessment, ElasticsearchStore, GenerateOutcome, PipelineConfig, SchemaStatus,
    ThreatScorePipeline, Weighting,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "threatscore", version, about = "Department threat-score pipeline")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "THREATSCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Elasticsearch base URL
    #[arg(long, global = true, env = "THREATSCORE_URL")]
    url: Option<String>,

    /// Index name
    #[arg(long, global = true, env = "THREATSCORE_INDEX")]
    index: Option<String>,

    /// Intermediate dataset file
    #[arg(long, global = true, env = "THREATSCORE_DATASET")]
    dataset: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum WeightingArg {
    Unweighted,
    BySize,
}

impl From<WeightingArg> for Weighting {
    fn from(arg: WeightingArg) -> Self {
        match arg {
            WeightingArg::Unweighted => Weighting::Unweighted,
            WeightingArg::BySize => Weighting::BySize,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index if it does not exist
    Schema,
    /// Write the synthetic dataset file
    Generate {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Bulk-load the dataset file into the index
    Ingest,
    /// Compute the aggregated threat score
    Score {
        /// How departments are combined
        #[arg(long)]
        weighting: Option<WeightingArg>,
    },
    /// Schema, generate, ingest, then score
    Run,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(url) = &cli.url {
        config.store.url = url.clone();
    }
    if let Some(index) = &cli.index {
        config.store.index = index.clone();
    }
    if let Some(dataset) = &cli.dataset {
        config.dataset.path = dataset.clone();
    }
    if let Commands::Score { weighting: Some(weighting) } = &cli.command {
        config.aggregation.weighting = (*weighting).into();
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    tracing::debug!(
        "Using index '{}' at {} with dataset {:?}",
        config.store.index,
        config.store.url,
        config.dataset.path
    );
    let pipeline = ThreatScorePipeline::elasticsearch(config)?;

    match cli.command {
        Commands::Schema => run_schema(&pipeline).await,
        Commands::Generate { force } => run_generate(&pipeline, force),
        Commands::Ingest => run_ingest(&pipeline).await,
        Commands::Score { .. } => run_score(&pipeline, &cli.format).await,
        Commands::Run => {
            run_schema(&pipeline).await?;
            run_generate(&pipeline, false)?;
            run_ingest(&pipeline).await?;
            run_score(&pipeline, &cli.format).await
        }
    }
}

async fn run_schema(
    pipeline: &ThreatScorePipeline<ElasticsearchStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = pipeline.store().index();
    match pipeline.ensure_schema().await? {
        SchemaStatus::Created => println!("Index '{}' created.", index),
        SchemaStatus::AlreadyExists => println!("Index '{}' already exists.", index),
    }
    Ok(())
}

fn run_generate(
    pipeline: &ThreatScorePipeline<ElasticsearchStore>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = if force {
        pipeline.regenerate()?
    } else {
        pipeline.generate()?
    };

    let path = &pipeline.config().dataset.path;
    match outcome {
        GenerateOutcome::Written { records } => {
            println!("Saved {} records to {}.", records, path.display())
        }
        GenerateOutcome::Skipped => println!("{} already exists.", path.display()),
    }
    Ok(())
}

async fn run_ingest(
    pipeline: &ThreatScorePipeline<ElasticsearchStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = pipeline.ingest().await?;

    println!("Rows:     {}", report.rows);
    println!("Skipped:  {}", report.skipped);
    println!("Indexed:  {}", report.bulk.indexed);
    println!("Failed:   {}", report.bulk.failed);
    for failure in &report.bulk.failures {
        println!("  - {}", failure);
    }
    Ok(())
}

async fn run_score(
    pipeline: &ThreatScorePipeline<ElasticsearchStore>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let assessment = pipeline.assess().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
        OutputFormat::Table => {
            println!("{}", department_table(&assessment));
            println!("Aggregated threat score: {}", assessment.score);
        }
    }
    Ok(())
}

fn department_table(assessment: &Assessment) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["department", "users", "mean", "variance", "score"]);

    for (department, stats) in &assessment.departments {
        table.add_row(vec![
            department.clone(),
            stats.users.to_string(),
            format!("{:.2}", stats.mean),
            format!("{:.2}", stats.variance),
            format!("{:.2}", stats.score()),
        ]);
    }
    table
}
