use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use split_ledger::command::{format_splits, store_failure_text};
use split_ledger::{
    handle_message, init_logging, normalize, Backend, CreateOutcome, Ledger, LedgerConfig,
    NewParticipant, ParticipantRecord, StoreError, Worksheet,
};

#[derive(Parser)]
#[command(name = "split-ledger", version, about = "Split balances and item lists per participant")]
struct Cli {
    /// Config file (default: split-ledger.toml if present)
    #[arg(long, global = true, env = "SPLIT_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Worksheet path, overrides the config file
    #[arg(long, global = true)]
    sheet: Option<PathBuf>,

    /// Worksheet backend, overrides the config file
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create an empty worksheet at the configured path
    Init,
    /// List every participant
    List,
    /// Show one participant (exact name)
    Check { name: String },
    /// Add a delta to a balance, optionally merging new items
    Update {
        name: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        #[arg(long)]
        items: Option<String>,
    },
    /// Create a participant
    Add {
        name: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        splits: i64,
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        items: String,
    },
    /// Normalize an item list without touching the sheet
    Normalize { items: String },
    /// Run a chat message such as "!update Ghost, 500, whip"
    Chat {
        message: String,
        /// Treat the sender as holding the admin role
        #[arg(long)]
        admin: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = LedgerConfig::load(cli.config.as_deref())?;
    if let Some(sheet) = &cli.sheet {
        config.sheet.path = sheet.clone();
    }
    if let Some(backend) = cli.backend {
        config.sheet.backend = backend;
    }

    run(&cli, &config).map_err(user_facing)
}

/// Store failures read as the chat-facing message, with the cause below it
fn user_facing(e: anyhow::Error) -> anyhow::Error {
    match e.downcast_ref::<StoreError>().map(store_failure_text) {
        Some(text) => e.context(text),
        None => e,
    }
}

fn open_ledger(config: &LedgerConfig, create: bool) -> Result<Ledger<Box<dyn Worksheet + Send>>> {
    let sheet = config
        .open_sheet(create)
        .with_context(|| format!("Failed to open worksheet {:?}", config.sheet.path))?;
    Ok(Ledger::new(sheet))
}

fn run(cli: &Cli, config: &LedgerConfig) -> Result<()> {
    match &cli.command {
        Cmd::Init => {
            open_ledger(config, true)?;
            println!("✓ Worksheet ready: {:?}", config.sheet.path);
            Ok(())
        }
        // Pure command: no sheet needed
        Cmd::Normalize { items } => emit(cli.json, &normalize(items), |s| println!("{}", s)),
        Cmd::List => {
            let roster = open_ledger(config, false)?.roster()?;
            emit(cli.json, &roster, |records| {
                println!("📊 {} participants", records.len());
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                for r in records {
                    println!("{:>4}  {:<20} {:>12}  {}", r.row_index, r.name, format_splits(r.balance), r.item_text);
                }
            })
        }
        Cmd::Check { name } => match open_ledger(config, false)?.lookup(name)? {
            Some(record) => emit(cli.json, &record, print_record),
            None => not_found(cli.json, name),
        },
        Cmd::Update { name, delta, items } => {
            match open_ledger(config, false)?.apply_delta(name, *delta, items.as_deref())? {
                Some(outcome) => emit(cli.json, &outcome, |o| {
                    println!("✓ Updated {}", name);
                    println!("  Splits: {} → {}", format_splits(o.prev_balance), format_splits(o.new_balance));
                    if items.is_some() {
                        println!("  Items:  {:?} → {:?}", o.prev_items, o.new_items);
                    }
                }),
                None => not_found(cli.json, name),
            }
        }
        Cmd::Add { name, splits, date, items } => {
            let mut new = NewParticipant::new(name.as_str())
                .with_balance(*splits)
                .with_items(items.as_str());
            new.date = date.clone();

            match open_ledger(config, false)?.create_participant(&new)? {
                CreateOutcome::Created(record) => emit(cli.json, &record, |r| {
                    println!("✓ Added {} at row {}", r.name, r.row_index);
                    print_record(r);
                }),
                CreateOutcome::AlreadyExists => {
                    emit(cli.json, &serde_json::json!({ "already_exists": name }), |_| {
                        println!("⚠️  {} already exists", name);
                    })
                }
            }
        }
        Cmd::Chat { message, admin } => {
            let mut ledger = open_ledger(config, false)?;
            let reply = handle_message(&mut ledger, message, &config.bot.prefix, *admin, &config.bot.admin_role)?;
            match reply {
                Some(reply) => emit(cli.json, &reply, |r| println!("{}", r.render(&config.bot.prefix))),
                None => {
                    println!("(not a command)");
                    Ok(())
                }
            }
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn not_found(json: bool, name: &str) -> Result<()> {
    emit(json, &serde_json::json!({ "not_found": name }), |_| {
        println!("❌ Can't find \"{}\" on the sheet", name);
    })
}

fn print_record(r: &ParticipantRecord) {
    println!("👤 {} (row {})", r.name, r.row_index);
    println!("   Splits: {}", format_splits(r.balance));
    println!("   Items:  {}", r.item_text);
    println!("   Rank:   {}", r.rank);
    println!("   Days:   {}", r.tenure);
}

#[cfg(test)]
mod tests {
    use super::*;
    use split_ledger::command::STORE_FAILURE_TEXT;

    #[test]
    fn test_store_failure_reported_once() {
        let err = user_facing(StoreError::Transient("rate limited".to_string()).into());
        assert_eq!(err.to_string(), STORE_FAILURE_TEXT);

        let chain: Vec<String> = err.chain().map(|c| c.to_string()).collect();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].contains("rate limited"));

        let other = user_facing(anyhow::anyhow!("bad flag"));
        assert_eq!(other.to_string(), "bad flag");
    }

    #[test]
    fn test_normalize_needs_no_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LedgerConfig::default();
        config.sheet.path = dir.path().join("missing.csv");

        let cli = Cli::parse_from(["split-ledger", "normalize", "whip, whip"]);
        assert!(run(&cli, &config).is_ok());

        let cli = Cli::parse_from(["split-ledger", "list"]);
        assert!(run(&cli, &config).is_err());
    }
}
