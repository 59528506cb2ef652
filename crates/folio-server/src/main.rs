//! Folio: portfolio chat backend.

use std::path::PathBuf;
use std::sync::Arc;

use folio_core::FolioConfig;
use folio_server::{build_router, setup, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("FOLIO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_usage() {
    println!("Folio: portfolio chat backend");
    println!();
    println!("Usage: folio [command]");
    println!();
    println!("Commands:");
    println!("  (none)                      Start the server");
    println!("  setup-vectors [data-dir]    Build the retrieval index (needs OPENAI_API_KEY)");
    println!("  help                        Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the process environment still applies.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = &dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "setup-vectors" => {
                let data_dir = args
                    .get(2)
                    .map(PathBuf::from)
                    .unwrap_or_else(resolve_data_dir);
                let config = FolioConfig::from_env(&data_dir);
                match setup::setup_vectors(&data_dir, &config.keys).await {
                    Ok(path) => {
                        println!("Retrieval index written to {}", path.display());
                        return Ok(());
                    }
                    Err(e) => {
                        eprintln!("Error setting up vectors: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            "--help" | "-h" | "help" => {
                print_usage();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'folio help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = FolioConfig::from_env(&data_dir);
    let port = config.port;
    if !config.keys.any() {
        warn!("No chat provider API key configured; /chat will answer 503 until one is set");
    }

    let state = Arc::new(AppState::new(config));
    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Folio server listening on {}", addr);

    // Warm up so the first chat usually finds the provider and index ready.
    tokio::spawn(async move {
        match state.chat_service().await {
            Ok(service) => info!("Chat service ready ({})", service.provider_kind()),
            Err(e) => warn!("Chat service not ready: {}", e),
        }
    });

    axum::serve(listener, app).await?;

    Ok(())
}
