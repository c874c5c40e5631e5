//! tome application binary - composition root.
//!
//! Ties the crates together into an interactive chat session:
//! 1. Load configuration from TOML
//! 2. Open the knowledge base (SQLite + in-memory cosine index)
//! 3. Build the completion services (fast model with powerful fallback;
//!    synthesis runs without fallback on the configured tier)
//! 4. Run a REPL that drives `start_turn`/`resume_turn`
//!
//! REPL commands:
//! - `/create <files...>` — flush the knowledge base and ingest the files
//! - `/update <files...>` — append the files to the knowledge base
//! - `/quit` — exit
//! - anything else — a chat turn

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tome_core::{KbCommand, LlmTier, TomeConfig};
use tome_index::{DynEmbeddingService, HashEmbedding, KnowledgeBase};
use tome_llm::{FallbackCompletion, HttpCompletion, SharedCompletion};
use tome_pipeline::{
    DocumentUpload, EngineServices, HumanDecision, TomeEngine, TurnOutcome, TurnRequest,
};

mod cli;

use cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config = TomeConfig::load_or_default(&args.resolve_config_path());

    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if let Err(e) = run(args, config).await {
        eprintln!("tome: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: CliArgs, config: TomeConfig) -> Result<(), String> {
    let api_key = std::env::var("TOME_API_KEY")
        .map_err(|_| "TOME_API_KEY is not set; export your API key first".to_string())?;

    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join(&config.knowledge_base.db_file);
    let kb_name = args.resolve_kb_name(&config.knowledge_base.name);

    let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::default());
    let kb = Arc::new(
        KnowledgeBase::open(&db_path, kb_name, embedder).map_err(|e| e.to_string())?,
    );
    info!(fragments = kb.len(), "Knowledge base ready");

    let fast: SharedCompletion = Arc::new(HttpCompletion::new(
        &config.llm.api_base,
        &api_key,
        &config.llm.fast_model,
    ));
    let powerful: SharedCompletion = Arc::new(HttpCompletion::new(
        &config.llm.api_base,
        &api_key,
        &config.llm.powerful_model,
    ));
    let general: SharedCompletion = Arc::new(FallbackCompletion::new(fast, powerful));
    let synthesis: SharedCompletion = match config.pipeline.llm_model {
        LlmTier::Fast => Arc::new(HttpCompletion::new(
            &config.llm.api_base,
            &api_key,
            &config.llm.fast_model,
        )),
        LlmTier::Powerful => Arc::new(HttpCompletion::new(
            &config.llm.api_base,
            &api_key,
            &config.llm.powerful_model,
        )),
    };

    let engine = TomeEngine::new(kb, EngineServices { general, synthesis }, &config);

    println!(
        "tome ready ({} fragments). /create <files>, /update <files>, /quit.",
        engine.knowledge_base().len()
    );

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        engine.expire_pending();
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match parse_line(line) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };

        match engine.start_turn(request).await {
            Ok(TurnOutcome::Completed(output)) => print_output(&output.text, output.failed_clusters),
            Ok(TurnOutcome::Suspended { handle, subqueries }) => {
                resolve_suspension(&engine, handle, subqueries, &mut lines).await;
            }
            Err(e) => println!("turn failed ({}): {}", e.kind(), e),
        }
    }

    Ok(())
}

/// Parse one REPL line. `Ok(None)` means quit.
fn parse_line(line: &str) -> Result<Option<TurnRequest>, String> {
    if let Some(rest) = line.strip_prefix("/create") {
        return Ok(Some(TurnRequest::command(
            KbCommand::Create,
            load_documents(rest)?,
        )));
    }
    if let Some(rest) = line.strip_prefix("/update") {
        return Ok(Some(TurnRequest::command(
            KbCommand::Update,
            load_documents(rest)?,
        )));
    }
    if line == "/quit" || line == "/exit" {
        return Ok(None);
    }
    if line.starts_with('/') {
        return Err(format!("unknown command: {}", line));
    }
    Ok(Some(TurnRequest::message(line)))
}

/// Read the files named after a /create or /update command.
fn load_documents(rest: &str) -> Result<Vec<DocumentUpload>, String> {
    let paths: Vec<&str> = rest.split_whitespace().collect();
    if paths.is_empty() {
        return Err("no files given; usage: /create <files...>".to_string());
    }
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes =
            std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path, e))?;
        let filename = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        documents.push(DocumentUpload::new(filename, bytes));
    }
    Ok(documents)
}

/// Present the sub-queries and drive the turn to completion.
async fn resolve_suspension(
    engine: &TomeEngine,
    handle: uuid::Uuid,
    subqueries: Vec<String>,
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
) {
    println!("Retrieval will run these sub-queries:");
    for (i, q) in subqueries.iter().enumerate() {
        println!("  {}. {}", i + 1, q);
    }
    println!("Press enter (or type 'approve') to continue, or type revised sub-queries separated by ';'.");
    print!("? ");
    std::io::stdout().flush().ok();

    let answer = match lines.next() {
        Some(Ok(line)) => line,
        _ => {
            engine.abandon_turn(handle);
            return;
        }
    };
    let answer = answer.trim();

    let decision = if answer.is_empty() || answer.eq_ignore_ascii_case("approve") {
        HumanDecision::Approve
    } else {
        HumanDecision::Revise(answer.split(';').map(|s| s.trim().to_string()).collect())
    };

    match engine.resume_turn(handle, decision).await {
        Ok(TurnOutcome::Completed(output)) => print_output(&output.text, output.failed_clusters),
        Ok(TurnOutcome::Suspended { .. }) => println!("turn is still suspended"),
        Err(e) => println!("turn failed ({}): {}", e.kind(), e),
    }
}

fn print_output(text: &str, failed_clusters: usize) {
    println!("{}", text);
    if failed_clusters > 0 {
        println!("(note: {} cluster summaries failed and were skipped)", failed_clusters);
    }
}
