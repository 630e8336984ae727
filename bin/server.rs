// Split Ledger - Web Server
// JSON API over the configured worksheet

use anyhow::{Context, Result};
use split_ledger::api::{router, AppState};
use split_ledger::{init_logging, Ledger, LedgerConfig};

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    println!("🌐 Split Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = LedgerConfig::load(None)?;

    let sheet = config
        .open_sheet(false)
        .with_context(|| format!("Failed to open worksheet {:?}", config.sheet.path))?;
    println!("✓ Worksheet opened: {:?} ({:?})", config.sheet.path, config.sheet.backend);

    let app = router(AppState::new(Ledger::new(sheet)));

    // Start server
    let addr = config.server.bind.as_str();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/participants", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
