//! forgemill CLI - schema-driven layered backend code generation.
//!
//! Reads a YAML run configuration, introspects the source schema, and
//! generates every layer for every selected table through the synthesis
//! oracle.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use forgemill::config::GenerationConfig;
use forgemill::oracle::{HttpOracleClient, RetryPolicy, SynthesisClient};
use forgemill::pipeline::{GenerationReport, Orchestrator, TaskOutcome};
use forgemill::schema::SchemaIntrospector;

#[derive(Parser)]
#[command(name = "forgemill")]
#[command(version, about = "Schema-driven layered backend code generation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate all layers for the selected tables
    Generate {
        /// Path to the run configuration file
        #[arg(short, long, default_value = "forgemill.yaml")]
        config: PathBuf,
    },

    /// List the tables the current selection policy would cover
    ListTables {
        /// Path to the run configuration file
        #[arg(short, long, default_value = "forgemill.yaml")]
        config: PathBuf,
    },

    /// Validate the run configuration without generating code
    Validate {
        /// Path to the run configuration file
        #[arg(short, long, default_value = "forgemill.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate { config } => run_generate(config).await,
        Commands::ListTables { config } => run_list_tables(config).await,
        Commands::Validate { config } => run_validate(config),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: &PathBuf) -> Result<GenerationConfig, String> {
    println!("📋 Loading configuration from {}...", path.display());
    let config = GenerationConfig::load_from_file(path)?;
    println!("  ✓ Configuration loaded: module '{}'", config.module_name);
    Ok(config)
}

async fn run_generate(path: PathBuf) -> Result<(), String> {
    let config = load_config(&path)?;
    let database_url = config.database_url()?;

    let introspector = SchemaIntrospector::connect(&database_url)
        .await
        .map_err(|e| e.to_string())?;

    let oracle = HttpOracleClient::from_config(&config.oracle)?;
    let policy = RetryPolicy::from_config(&config.oracle);
    let client = SynthesisClient::new(oracle, policy);

    let orchestrator = Orchestrator::new(config, client);
    let report = orchestrator
        .run(&introspector)
        .await
        .map_err(|e| e.to_string())?;

    print_report(&report);

    if report.is_success() {
        println!("\n✨ Generation complete!");
        Ok(())
    } else {
        // already-written files are kept; partial success is a valid state
        Err(format!("{} task(s) failed", report.failure_count()))
    }
}

async fn run_list_tables(path: PathBuf) -> Result<(), String> {
    let config = load_config(&path)?;
    let database_url = config.database_url()?;

    let introspector = SchemaIntrospector::connect(&database_url)
        .await
        .map_err(|e| e.to_string())?;

    let selection = config.selection();
    let tables: Vec<String> = introspector
        .list_tables()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|t| selection.matches(t))
        .collect();

    if tables.is_empty() {
        println!("No tables match the current selection policy.");
        return Ok(());
    }
    println!("Selected tables ({}):", tables.len());
    for table in tables {
        println!("  - {}", table);
    }
    Ok(())
}

fn run_validate(path: PathBuf) -> Result<(), String> {
    let config = load_config(&path)?;
    println!("  ✓ base package: {}", config.base_package);
    println!("  ✓ project root: {}", config.project_root.display());
    println!("  ✓ oracle model: {}", config.oracle.model);
    println!("  ✓ worker pool:  {}", config.max_concurrent_tasks);
    println!("\n✨ Configuration is valid!");
    Ok(())
}

fn print_report(report: &GenerationReport) {
    println!();
    for (table, layers) in &report.tables {
        println!("📦 {}", table);
        for (layer, outcome) in layers {
            let mark = match outcome {
                TaskOutcome::Generated => "✓",
                TaskOutcome::SkippedPreserved => "↷",
                TaskOutcome::Failed(_) => "✗",
            };
            println!("  {} {:<18} {}", mark, layer.label(), outcome);
        }
    }
    println!(
        "\n{} generated, {} preserved, {} failed across {} task(s)",
        report.generated_count(),
        report.preserved_count(),
        report.failure_count(),
        report.task_count()
    );
}
