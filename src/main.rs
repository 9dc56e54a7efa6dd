use std::error::Error;
use std::sync::Arc;

use model_host::{HttpModelHost, ModelHost, ModelHostConfig};
use rag_memory::{RagMemory, RagMemoryConfig, telemetry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Line-oriented retrieval probe: one query per stdin line, fused knowledge
/// context (and memory history when `MEMORY_COLLECTION` is set) on stdout.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // .env is optional here; real environment wins.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(telemetry::env_filter_with_level("warn", Level::INFO))
        .with(telemetry::layer())
        .init();

    let host_cfg = ModelHostConfig::from_env()?;
    let rag_cfg = RagMemoryConfig::from_env()?;
    let knowledge = std::env::var("KNOWLEDGE_COLLECTION").unwrap_or_else(|_| "knowledge".into());
    let memory = std::env::var("MEMORY_COLLECTION").ok();

    // the blocking client must be built and dropped off the async workers
    let host: Arc<dyn ModelHost> =
        Arc::new(tokio::task::spawn_blocking(move || HttpModelHost::new(host_cfg)).await??);

    let rag = RagMemory::new(rag_cfg)?;
    rag.load_models(host)?;
    info!(target: "chat_memory_backend", %knowledge, memory = ?memory, "retrieval probe ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        match rag.retrieve_context(query, &knowledge).await {
            Ok(ctx) if !ctx.is_empty() => println!("{}", ctx.render()),
            Ok(_) => println!("(no context)"),
            Err(err) => {
                warn!(target: "chat_memory_backend", error = %err, "retrieval failed");
                println!("(no context)");
            }
        }

        if let Some(collection) = &memory {
            let history = rag.recent(collection, rag.config().memory_window).await;
            println!("\n== history ==\n{}", history.render());
        }
        println!();
    }

    if let Some(host) = rag.release_models() {
        tokio::task::spawn_blocking(move || drop(host)).await?;
    }
    Ok(())
}
