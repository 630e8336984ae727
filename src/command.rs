// 💬 Chat Commands - parse, validate, dispatch
//
// Text commands as typed into a chat channel:
//   !check <name>
//   !update <name>, <delta>[, items...]          (admin)
//   !add <name>[, <splits>][, <date>][, items...] (admin)
//   !splits_help
//
// Replies are structured; `Reply::render` gives plain text.

use crate::ledger::{CreateOutcome, DeltaOutcome, Ledger, NewParticipant, ParticipantRecord};
use crate::sheet::{StoreError, StoreResult, Worksheet};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Shown when the store is still failing after the reconnect retry
pub const STORE_FAILURE_TEXT: &str = "API Error, either there's been too many inputs in too short \
of a period or there's been another issue. Please try again in two minutes.";

// ============================================================================
// COMMANDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Check {
        name: String,
    },
    Update {
        name: String,
        delta: i64,
        items: Option<String>,
    },
    Add {
        name: String,
        splits: i64,
        date: Option<String>,
        items: String,
    },
    Help,
}

impl Command {
    pub fn requires_admin(&self) -> bool {
        matches!(self, Command::Update { .. } | Command::Add { .. })
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Check { .. } => "check",
            Command::Update { .. } => "update",
            Command::Add { .. } => "add",
            Command::Help => "splits_help",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum CommandError {
    #[error("Incorrect format")]
    BadDelta,

    #[error("I need a name")]
    MissingName,

    #[error("Incorrect splits format")]
    BadSplits,

    #[error("Incorrect date format")]
    BadDate,
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a chat message.
///
/// `None` means the message is not a command for us (no prefix, or an
/// unknown verb) and should be ignored.
pub fn parse_message(text: &str, prefix: &str) -> Option<Result<Command, CommandError>> {
    let rest = text.strip_prefix(prefix)?;
    let verb_len = rest
        .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
        .unwrap_or(rest.len());
    if verb_len == 0 {
        return None;
    }

    let (verb, args) = rest.split_at(verb_len);
    let args = args.trim();

    match verb {
        "check" => Some(Ok(Command::Check {
            name: args.to_string(),
        })),
        "update" => Some(parse_update(args)),
        "add" => Some(parse_add(args)),
        "splits_help" => Some(Ok(Command::Help)),
        _ => None,
    }
}

fn parse_update(args: &str) -> Result<Command, CommandError> {
    let inputs: Vec<&str> = args.split(',').collect();

    let name = inputs[0].trim().to_string();
    let delta = inputs
        .get(1)
        .and_then(|d| d.trim().parse::<i64>().ok())
        .ok_or(CommandError::BadDelta)?;
    let items = (inputs.len() > 2).then(|| inputs[2..].join(", ").trim().to_string());

    Ok(Command::Update { name, delta, items })
}

fn parse_add(args: &str) -> Result<Command, CommandError> {
    let inputs: Vec<&str> = args.split(',').collect();

    let name = inputs[0].trim().to_string();
    if name.is_empty() {
        return Err(CommandError::MissingName);
    }

    let splits = match inputs.get(1) {
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| CommandError::BadSplits)?,
        None => 0,
    };

    let date = match inputs.get(2) {
        Some(raw) => Some(validate_date(raw.trim()).ok_or(CommandError::BadDate)?),
        None => None,
    };

    let items = inputs.get(3..).unwrap_or(&[]).join(", ").trim().to_string();

    Ok(Command::Add {
        name,
        splits,
        date,
        items,
    })
}

/// Accept `M/D/20YY` (one or two digit month and day) naming a real date.
///
/// The date is returned exactly as typed.
pub fn validate_date(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [month, day, year] = parts[..] else {
        return None;
    };

    let short_number = |s: &str, max_lead: char| {
        let digits_ok = !s.is_empty() && s.len() <= 2 && s.chars().all(|c| c.is_ascii_digit());
        let lead_ok = s.len() < 2 || s.starts_with(|c: char| c <= max_lead);
        digits_ok && lead_ok
    };
    if !short_number(month, '1') || !short_number(day, '3') {
        return None;
    }
    if year.len() != 4 || !year.starts_with("20") || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?);
    date.map(|_| raw.to_string())
}

// ============================================================================
// DISPATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Stats {
        record: ParticipantRecord,
    },
    Updated {
        name: String,
        delta: i64,
        outcome: DeltaOutcome,
    },
    NotFound {
        name: String,
    },
    AlreadyExists {
        name: String,
    },
    PermissionDenied {
        verb: String,
        admin_role: String,
    },
    Invalid {
        error: CommandError,
    },
    Help {
        admin_role: String,
    },
}

/// Run a parsed command against the ledger
pub fn dispatch<S: Worksheet>(
    ledger: &mut Ledger<S>,
    command: &Command,
    is_admin: bool,
    admin_role: &str,
) -> StoreResult<Reply> {
    if command.requires_admin() && !is_admin {
        return Ok(Reply::PermissionDenied {
            verb: command.verb().to_string(),
            admin_role: admin_role.to_string(),
        });
    }

    let reply = match command {
        Command::Check { name } => match ledger.lookup(name)? {
            Some(record) => Reply::Stats { record },
            None => Reply::NotFound { name: name.clone() },
        },
        Command::Update { name, delta, items } => {
            match ledger.apply_delta(name, *delta, items.as_deref())? {
                Some(outcome) => Reply::Updated {
                    name: name.clone(),
                    delta: *delta,
                    outcome,
                },
                None => Reply::NotFound { name: name.clone() },
            }
        }
        Command::Add {
            name,
            splits,
            date,
            items,
        } => {
            let mut new = NewParticipant::new(name.as_str())
                .with_balance(*splits)
                .with_items(items.as_str());
            new.date = date.clone();

            match ledger.create_participant(&new)? {
                CreateOutcome::Created(record) => Reply::Stats { record },
                CreateOutcome::AlreadyExists => Reply::AlreadyExists { name: name.clone() },
            }
        }
        Command::Help => Reply::Help {
            admin_role: admin_role.to_string(),
        },
    };

    Ok(reply)
}

/// Parse and dispatch one chat message; `None` when it is not a command
pub fn handle_message<S: Worksheet>(
    ledger: &mut Ledger<S>,
    text: &str,
    prefix: &str,
    is_admin: bool,
    admin_role: &str,
) -> StoreResult<Option<Reply>> {
    let Some(parsed) = parse_message(text, prefix) else {
        return Ok(None);
    };

    let reply = match parsed {
        Ok(command) => {
            info!(verb = command.verb(), is_admin, "handling command");
            dispatch(ledger, &command, is_admin, admin_role)?
        }
        Err(error) => Reply::Invalid { error },
    };

    Ok(Some(reply))
}

/// User-facing text for a store error that survived the retry
pub fn store_failure_text(err: &StoreError) -> String {
    if err.is_transient() {
        STORE_FAILURE_TEXT.to_string()
    } else {
        format!("Store error: {}", err)
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// 1234567 → "1,234,567"
pub fn format_splits(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

impl Reply {
    /// Plain-text rendering; `prefix` is the command prefix used in hints
    pub fn render(&self, prefix: &str) -> String {
        match self {
            Reply::Stats { record } => format!(
                "{}'s stats:\nSplit Value: {}\nCurrent Rank: {}\nDays in Clan: {} days",
                record.name,
                format_splits(record.balance),
                record.rank,
                record.tenure
            ),
            Reply::Updated {
                name,
                delta,
                outcome,
            } => format!(
                "Updating {}'s stats\nSplits increased by {}!\nOld Splits: {}\nNew Splits: {}\nOld Items: {}\nNew Items: {}",
                name,
                format_splits(*delta),
                format_splits(outcome.prev_balance),
                format_splits(outcome.new_balance),
                outcome.prev_items,
                outcome.new_items
            ),
            Reply::NotFound { name } => format!("Can't find \"{}\" on the sheet", name),
            Reply::AlreadyExists { name } => format!("User {} already exists!", name),
            Reply::PermissionDenied { verb, admin_role } => {
                format!("{}{} requires the {} role", prefix, verb, admin_role)
            }
            Reply::Invalid { error } => format!("{} (see {}splits_help)", error, prefix),
            Reply::Help { admin_role } => help_text(prefix, admin_role),
        }
    }
}

fn help_text(prefix: &str, admin_role: &str) -> String {
    [
        "**Split Bot Commands**".to_string(),
        "Please make sure:".to_string(),
        "Names match exactly for what you are searching (case sensitive)".to_string(),
        "Numbers don't have any symbols (no commas or $)".to_string(),
        "Dates are in the number form MM/DD/YYYY".to_string(),
        "Items are comma separated with the proper notation for multiple items (\" x2\" or \" x4\" at the end).".to_string(),
        String::new(),
        format!("{}check <RSN>", prefix),
        "  Shows stats for the player matching the given RSN.".to_string(),
        format!("{}update <RSN>, <splits>, <items>", prefix),
        format!(
            "  Adds the split given to the player with the matching RSN. Items are optional but should be added as a comma separated list at the end. Requires the {} role.",
            admin_role
        ),
        format!("{}add <RSN>, <splits>, <date>, <items>", prefix),
        format!(
            "  Creates a new player entry with the given RSN, splits, date, and items. The last three are optional but must be added in that order (so to add a date without adding a split value, use 0. e.g. {}add Player, 0, 6/12/2019). Requires the {} role.",
            prefix, admin_role
        ),
    ]
    .join("\n")
}

// ============================================================================
// TESTS
// ============================================================================
