// Apartment Locator - Reference Extraction Server
// POST a base64 document, get back the apartment references it mentions

use anyhow::{Context, Result};
use apartment_locator::{server, Config, ExtractionService};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🌐 Apartment Locator - Extraction Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::load_default()?;
    let extraction = config.extraction;

    if std::env::var(&extraction.api_key_env).is_err() {
        eprintln!("⚠️  {} is not set: requests will fail until it is", extraction.api_key_env);
    }

    let service = Arc::new(ExtractionService::from_config(&extraction));
    let app = server::router(service);

    let listener = tokio::net::TcpListener::bind(&extraction.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", extraction.bind))?;

    println!("\n🚀 Server running on http://{}", extraction.bind);
    println!("   API:   POST {}", server::EXTRACT_PATH);
    println!("   Model: {}", extraction.model);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
