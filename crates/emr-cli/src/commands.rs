//! CLI commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use emr_core::EngineConfig;
use emr_embedding::{EmbeddingClient, VectorIndexer, VectorStore};
use emr_graph::{initialize_schema, GraphClient};
use emr_retrieval::{ChatClient, GraphPlanner, HybridRetriever};
use emr_sync::{run_periodic, Syncer};
use emr_web::AppState;

#[derive(Parser)]
#[command(name = "emr", about = "EMR GraphRAG engine", version)]
pub struct Cli {
    /// Path to the engine config file (defaults to ./emr.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server with periodic ingestion.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one ingestion pass and exit.
    Sync,
    /// Vector index maintenance.
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
    /// Ask a question against the ingested records.
    Query {
        question: String,
        #[arg(long, value_enum, default_value = "hybrid")]
        mode: QueryModeArg,
        /// Restrict retrieval to these patient identifiers.
        #[arg(long = "patient")]
        patients: Vec<String>,
    },
    /// Show graph and vector store counts.
    Status,
}

#[derive(Subcommand)]
pub enum IndexCommands {
    /// Re-embed every eligible fact from the graph store.
    Rebuild,
    /// Re-index the given patients only.
    Upsert { patients: Vec<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QueryModeArg {
    Hybrid,
    Graph,
}

/// Connected engine components, built once per invocation.
struct Engine {
    config: EngineConfig,
    graph: GraphClient,
    indexer: Arc<VectorIndexer>,
    retriever: Arc<HybridRetriever>,
    planner: Arc<GraphPlanner>,
    syncer: Arc<Syncer>,
}

async fn bootstrap(config_path: Option<&std::path::Path>) -> Result<Engine> {
    let config = EngineConfig::load(config_path)?;

    let graph = GraphClient::connect(&config.graph).await?;
    initialize_schema(&graph).await?;

    let embedder = EmbeddingClient::new(&config.llm);
    let store = VectorStore::new(&config.vector)?;
    let chat = ChatClient::new(&config.llm);

    let indexer = Arc::new(VectorIndexer::new(
        graph.clone(),
        embedder.clone(),
        store.clone(),
        &config,
    ));
    let retriever = Arc::new(HybridRetriever::new(
        graph.clone(),
        embedder,
        store,
        chat.clone(),
        config.patient_salt.clone(),
    ));
    let planner = Arc::new(GraphPlanner::new(graph.clone(), chat));
    let syncer = Arc::new(Syncer::new(
        graph.clone(),
        indexer.clone(),
        config.sync.document_dir.clone(),
    ));

    Ok(Engine {
        config,
        graph,
        indexer,
        retriever,
        planner,
        syncer,
    })
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let engine = bootstrap(self.config.as_deref()).await?;

        match self.command {
            Commands::Serve { port } => {
                let interval = Duration::from_secs(engine.config.sync.interval_secs);
                tokio::spawn(run_periodic(engine.syncer.clone(), interval));

                let state = AppState::new(
                    engine.graph,
                    engine.indexer,
                    engine.retriever,
                    engine.planner,
                    engine.syncer,
                );
                emr_web::run_server(state, port).await?;
            }
            Commands::Sync => {
                let report = engine.syncer.run_once().await?;
                println!(
                    "{} scanned={} ingested={} skipped={} failed={}",
                    "Sync pass complete:".green().bold(),
                    report.scanned,
                    report.ingested,
                    report.skipped,
                    report.failed
                );
            }
            Commands::Index { command } => {
                let report = match command {
                    IndexCommands::Rebuild => engine.indexer.rebuild_all().await?,
                    IndexCommands::Upsert { patients } => {
                        engine.indexer.upsert_patients(&patients).await?
                    }
                };
                println!(
                    "{} collection={} upserted={}",
                    "Index updated:".green().bold(),
                    report.collection,
                    report.upserted
                );
            }
            Commands::Query {
                question,
                mode,
                patients,
            } => {
                let patient_filter = (!patients.is_empty()).then_some(patients.as_slice());

                match mode {
                    QueryModeArg::Hybrid => {
                        let result = engine
                            .retriever
                            .answer(&question, patient_filter, None)
                            .await?;
                        println!("{}", "Answer".bold());
                        println!("{}\n", result.answer);
                        println!("{} {}", "Evidence:".dimmed(), result.evidence.join(", "));
                    }
                    QueryModeArg::Graph => {
                        let result = engine.planner.answer(&question, patient_filter).await?;
                        println!("{}", "Answer".bold());
                        println!("{}\n", result.answer);
                        for step in &result.trace {
                            println!("{} {}", "Statement:".dimmed(), step.statement);
                            println!("{} {}", "Rows:".dimmed(), step.result_rows);
                        }
                    }
                }
            }
            Commands::Status => {
                let counts = engine.graph.counts().await?;
                let vectors = engine.indexer.vector_count().await?;
                println!("{}", "Engine status".bold());
                println!("  graph nodes:         {}", counts.nodes);
                println!("  graph relationships: {}", counts.relationships);
                println!("  indexed vectors:     {}", vectors);
            }
        }

        Ok(())
    }
}
