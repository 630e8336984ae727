// Split Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod items;     // Item list normalization (pure)
pub mod sheet;     // Worksheet backends: memory, CSV, SQLite
pub mod ledger;    // Balance + item read-modify-write with reconnect-once retry
pub mod config;    // TOML config + environment overrides
pub mod command;   // Chat command parsing and dispatch

// Only compile the HTTP front end when the server feature is enabled
#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use items::{merge_items, normalize, parse_items, render_items, ItemEntry, CONNECTOR_WORDS};
pub use sheet::{CsvSheet, MemorySheet, SqliteSheet, StoreError, StoreResult, Worksheet};
pub use ledger::{
    parse_balance, with_reconnect,
    CreateOutcome, DeltaOutcome, Ledger, NewParticipant, ParticipantRecord,
};
pub use config::{Backend, LedgerConfig};
pub use command::{dispatch, handle_message, parse_message, Command, CommandError, Reply};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by both binaries (`RUST_LOG` aware)
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("split_ledger=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
