use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use waypoint::config::{load_config, AppConfig, LogFormat, LoggingConfig};
use waypoint::ingest::{demo_histories, ingest_into_surreal, Curriculum};
use waypoint::model::{HistoryEntry, KpId};
use waypoint::server::handlers::PathResponse;
use waypoint::server::{run_http_server, AppState};
use waypoint::service::{PathRequest, ServiceContext};
use waypoint::store::SurrealKnowledgeGraph;

/// Waypoint: personalized learning paths over a prerequisite graph
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(
    about = "Predicts a student's weakest knowledge point and builds a learning path around it."
)]
#[command(version)]
struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long, global = true, env = "WAYPOINT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Generate one learning path and print it as JSON
    Generate {
        /// Student identifier echoed in the response
        #[arg(short, long, default_value = "cli")]
        student: String,
        /// JSON file holding an array of history entries
        #[arg(long)]
        history: Option<PathBuf>,
        /// Build the path for this knowledge point, skipping prediction
        #[arg(short, long)]
        force_kp: Option<KpId>,
    },
    /// Load a curriculum document into the configured SurrealDB
    Seed {
        /// Curriculum JSON file; the built-in demo curriculum when omitted
        #[arg(short, long)]
        curriculum: Option<PathBuf>,
    },
    /// Walk through the built-in demo students
    Demo,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);

    let result = match cli.command {
        Commands::Serve => run_serve(&config).await,
        Commands::Generate {
            student,
            history,
            force_kp,
        } => run_generate(&config, student, history.as_deref(), force_kp).await,
        Commands::Seed { curriculum } => run_seed(&config, curriculum.as_deref()).await,
        Commands::Demo => run_demo(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run_serve(config: &AppConfig) -> anyhow::Result<()> {
    let context = ServiceContext::initialize(config)
        .await
        .context("failed to initialize service")?;
    let state = AppState::new(context.service(), config.auth.api_token.as_deref());

    let served = run_http_server(&config.server, state).await;
    context.shutdown();
    served.context("HTTP server stopped with an error")
}

async fn run_generate(
    config: &AppConfig,
    student_id: String,
    history_path: Option<&Path>,
    force_kp_id: Option<KpId>,
) -> anyhow::Result<()> {
    let history = match history_path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let entries: Vec<HistoryEntry> =
                serde_json::from_str(&raw).context("history file is not a JSON array of entries")?;
            Some(entries)
        }
        None => None,
    };

    let context = ServiceContext::initialize(config).await?;
    let generated = context
        .service()
        .generate(PathRequest {
            student_id,
            history,
            force_kp_id,
        })
        .await;
    context.shutdown();

    let response = PathResponse::from(generated?);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_seed(config: &AppConfig, curriculum_path: Option<&Path>) -> anyhow::Result<()> {
    let curriculum = match curriculum_path.or(config.graph.curriculum_path.as_deref()) {
        Some(path) => Curriculum::from_path(path)
            .await
            .with_context(|| format!("failed to load curriculum from {}", path.display()))?,
        None => Curriculum::demo(),
    };

    let db = config.graph.database_config().connect_with_retry().await?;
    let graph = SurrealKnowledgeGraph::new(db.clone());
    let report = ingest_into_surreal(&graph, &curriculum).await?;
    db.close();

    println!(
        "Seeded {} knowledge points and {} prerequisite edges ({} rejected).",
        report.knowledge_points, report.prerequisites, report.rejected
    );
    Ok(())
}

async fn run_demo(config: &AppConfig) -> anyhow::Result<()> {
    let context = ServiceContext::initialize(config).await?;
    let service = context.service();

    println!("=== Waypoint demo ===\n");
    for (student_id, history) in demo_histories() {
        let generated = service
            .generate(PathRequest {
                student_id: student_id.to_string(),
                history: Some(history),
                force_kp_id: None,
            })
            .await?;

        println!("Student: {}", generated.student_id);
        println!("  {}", generated.message);
        for module in &generated.path.modules {
            let titles: Vec<&str> = module
                .content
                .iter()
                .map(|c| c.title.as_str())
                .collect();
            println!(
                "  [{:?}] {} (difficulty {}){}: {}",
                module.stage,
                module.kp.name,
                module.kp.difficulty,
                if module.synthesized { " *" } else { "" },
                titles.join(", ")
            );
        }
        println!("  Total: {} minutes\n", generated.path.total_minutes);
    }
    println!("* placeholder content");

    context.shutdown();
    Ok(())
}
