// 📒 Ledger Store - Split balances and item lists per participant
//
// Read-modify-write over a worksheet with fixed column positions:
//   1 Name | 2 Balance | 3 Items | 4 Date | 5 Rank | 6 (unused) | 7 Tenure
//
// Every public operation reads the whole sheet, then writes individual
// cells by row index. Nothing guards the gap between the read and the
// write: another writer inserting or deleting rows in between can make the
// row index stale. Callers are expected to serialize commands.

use crate::items;
use crate::sheet::{StoreError, StoreResult, Worksheet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const NAME_COL: usize = 1;
pub const BALANCE_COL: usize = 2;
pub const ITEMS_COL: usize = 3;
pub const DATE_COL: usize = 4;
pub const RANK_COL: usize = 5;
pub const TENURE_COL: usize = 7;

// ============================================================================
// RECORDS AND OUTCOMES
// ============================================================================

/// One row of the ledger as seen by the most recent read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub name: String,

    /// 1-based row; only valid until the table's shape changes
    pub row_index: usize,

    pub balance: i64,

    /// Canonical item list
    pub item_text: String,

    /// Display only, never written by the ledger
    pub tenure: String,
    pub rank: String,
}

/// Before/after values of a balance update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaOutcome {
    pub prev_balance: i64,
    pub new_balance: i64,
    pub prev_items: String,
    pub new_items: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOutcome {
    Created(ParticipantRecord),
    AlreadyExists,
}

/// Input for `Ledger::create_participant`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParticipant {
    pub name: String,
    #[serde(default)]
    pub balance: i64,
    /// Written verbatim; `None` keeps whatever the cell already holds
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub items: String,
}

impl NewParticipant {
    pub fn new(name: impl Into<String>) -> Self {
        NewParticipant {
            name: name.into(),
            balance: 0,
            date: None,
            items: String::new(),
        }
    }

    /// Builder pattern: starting balance
    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    /// Builder pattern: join date
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Builder pattern: raw item blob
    pub fn with_items(mut self, items: impl Into<String>) -> Self {
        self.items = items.into();
        self
    }
}

/// Parse a balance cell: "$1,200" → 1200, "N/A" → None
pub fn parse_balance(cell: &str) -> Option<i64> {
    cell.trim()
        .replace([',', '$'], "")
        .parse::<i64>()
        .ok()
}

// ============================================================================
// RECONNECT POLICY
// ============================================================================

/// Run `op` against the sheet; on a transient failure reconnect once and
/// run it exactly once more. Any second failure goes to the caller.
pub fn with_reconnect<S, T, F>(sheet: &mut S, operation: &str, mut op: F) -> StoreResult<T>
where
    S: Worksheet,
    F: FnMut(&mut S) -> StoreResult<T>,
{
    match op(sheet) {
        Err(e) if e.is_transient() => {
            warn!(operation, error = %e, "transient store failure, reconnecting");
            sheet.reconnect()?;
            op(sheet)
        }
        other => other,
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// Ledger over an owned worksheet handle
pub struct Ledger<S: Worksheet> {
    sheet: S,
}

/// Balance update computed from one read, replayed as-is on retry
#[derive(Debug, Clone)]
struct DeltaPlan {
    row: usize,
    write_items: bool,
    outcome: DeltaOutcome,
}

impl<S: Worksheet> Ledger<S> {
    pub fn new(sheet: S) -> Self {
        Ledger { sheet }
    }

    pub fn sheet(&self) -> &S {
        &self.sheet
    }

    pub fn into_inner(self) -> S {
        self.sheet
    }

    /// All participants with a parseable balance, keyed by exact name
    pub fn lookup_all(&mut self) -> StoreResult<HashMap<String, ParticipantRecord>> {
        with_reconnect(&mut self.sheet, "lookup_all", |sheet| read_roster(sheet))
    }

    /// All participants ordered by row
    pub fn roster(&mut self) -> StoreResult<Vec<ParticipantRecord>> {
        let mut records: Vec<_> = self.lookup_all()?.into_values().collect();
        records.sort_by_key(|r| r.row_index);
        Ok(records)
    }

    /// Exact, case-sensitive lookup
    pub fn lookup(&mut self, name: &str) -> StoreResult<Option<ParticipantRecord>> {
        with_reconnect(&mut self.sheet, "lookup", |sheet| {
            Ok(read_roster(sheet)?.remove(name))
        })
    }

    /// Add `delta` to a participant's balance and optionally merge new items.
    ///
    /// Returns `None` when the name is not in the table. No business bounds
    /// are enforced on the resulting balance; a sum outside `i64` is
    /// rejected with `InvalidInput` before anything is written.
    pub fn apply_delta(
        &mut self,
        name: &str,
        delta: i64,
        items: Option<&str>,
    ) -> StoreResult<Option<DeltaOutcome>> {
        let mut plan: Option<DeltaPlan> = None;

        with_reconnect(&mut self.sheet, "apply_delta", |sheet| {
            // A retry after a partial write must not add the delta twice
            if plan.is_none() {
                plan = plan_delta(sheet, name, delta, items)?;
            }
            let Some(planned) = plan.clone() else {
                return Ok(None);
            };

            sheet.update_cell(
                planned.row,
                BALANCE_COL,
                &planned.outcome.new_balance.to_string(),
            )?;
            if planned.write_items {
                sheet.update_cell(planned.row, ITEMS_COL, &planned.outcome.new_items)?;
            }

            info!(
                name,
                delta,
                prev = planned.outcome.prev_balance,
                new = planned.outcome.new_balance,
                "balance updated"
            );
            Ok(Some(planned.outcome))
        })
    }

    /// Append a new participant below the last populated name cell.
    ///
    /// Existing names are never overwritten. The created row is re-read
    /// and returned.
    pub fn create_participant(&mut self, new: &NewParticipant) -> StoreResult<CreateOutcome> {
        if new.name.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "participant name must not be empty".to_string(),
            ));
        }

        let formatted_items = items::normalize(&new.items);
        let mut target_row: Option<usize> = None;

        with_reconnect(&mut self.sheet, "create_participant", |sheet| {
            // Once a row is chosen, a retry rewrites the same cells
            let row = match target_row {
                Some(row) => row,
                None => {
                    if read_roster(sheet)?.contains_key(&new.name) {
                        debug!(name = %new.name, "participant already exists");
                        return Ok(CreateOutcome::AlreadyExists);
                    }
                    let row = sheet.col_values(NAME_COL)?.len() + 1;
                    target_row = Some(row);
                    row
                }
            };

            sheet.update_cell(row, NAME_COL, &new.name)?;
            sheet.update_cell(row, BALANCE_COL, &new.balance.to_string())?;
            sheet.update_cell(row, ITEMS_COL, &formatted_items)?;
            if let Some(date) = &new.date {
                sheet.update_cell(row, DATE_COL, date)?;
            }

            info!(name = %new.name, row, balance = new.balance, "participant created");

            match read_roster(sheet)?.remove(&new.name) {
                Some(record) => Ok(CreateOutcome::Created(record)),
                None => Err(StoreError::Inconsistent(format!(
                    "{} not visible after writing row {}",
                    new.name, row
                ))),
            }
        })
    }
}

// ============================================================================
// SHEET ACCESS (unwrapped; callers apply the reconnect policy)
// ============================================================================

fn read_roster<S: Worksheet>(sheet: &S) -> StoreResult<HashMap<String, ParticipantRecord>> {
    let rows = sheet.get_all_values()?;
    let mut roster = HashMap::new();
    let mut skipped = 0;

    for (i, row) in rows.iter().enumerate() {
        let cell = |col: usize| row.get(col - 1).map(String::as_str).unwrap_or("");

        let name = cell(NAME_COL);
        if name.is_empty() {
            continue;
        }

        let Some(balance) = parse_balance(cell(BALANCE_COL)) else {
            if is_out_of_range(cell(BALANCE_COL)) {
                warn!(name, row = i + 1, balance = cell(BALANCE_COL), "balance out of range, row skipped");
            }
            skipped += 1;
            continue;
        };

        // Later duplicates replace earlier ones
        roster.insert(
            name.to_string(),
            ParticipantRecord {
                name: name.to_string(),
                row_index: i + 1,
                balance,
                item_text: cell(ITEMS_COL).to_string(),
                tenure: cell(TENURE_COL).to_string(),
                rank: cell(RANK_COL).to_string(),
            },
        );
    }

    debug!(rows = rows.len(), participants = roster.len(), skipped, "roster read");
    Ok(roster)
}

/// A whole number too large for a balance, as opposed to text like "N/A"
fn is_out_of_range(cell: &str) -> bool {
    let digits = cell.trim().replace([',', '$'], "");
    let digits = digits.strip_prefix('-').unwrap_or(&digits);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn plan_delta<S: Worksheet>(
    sheet: &S,
    name: &str,
    delta: i64,
    fragment: Option<&str>,
) -> StoreResult<Option<DeltaPlan>> {
    let Some(record) = read_roster(sheet)?.remove(name) else {
        return Ok(None);
    };

    let Some(new_balance) = record.balance.checked_add(delta) else {
        return Err(StoreError::InvalidInput(format!(
            "{} + {} overflows the balance of {}",
            record.balance, delta, name
        )));
    };
    let new_items = match fragment {
        Some(fragment) => items::merge_items(&record.item_text, fragment),
        None => record.item_text.clone(),
    };

    Ok(Some(DeltaPlan {
        row: record.row_index,
        write_items: fragment.is_some(),
        outcome: DeltaOutcome {
            prev_balance: record.balance,
            new_balance,
            prev_items: record.item_text,
            new_items,
        },
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::MemorySheet;
    use std::cell::Cell;

    /// MemorySheet that fails chosen calls with a transient error
    struct FlakySheet {
        inner: MemorySheet,
        read_faults: Cell<usize>,
        failing_writes: Vec<usize>,
        write_attempts: usize,
        writes: usize,
        reconnects: usize,
    }

    impl FlakySheet {
        fn new(inner: MemorySheet) -> Self {
            FlakySheet {
                inner,
                read_faults: Cell::new(0),
                failing_writes: Vec::new(),
                write_attempts: 0,
                writes: 0,
                reconnects: 0,
            }
        }

        /// Fail the next `n` reads
        fn fail_reads(self, n: usize) -> Self {
            self.read_faults.set(n);
            self
        }

        /// Fail the given write attempts (1-based)
        fn fail_writes(mut self, attempts: &[usize]) -> Self {
            self.failing_writes = attempts.to_vec();
            self
        }
    }

    impl Worksheet for FlakySheet {
        fn reconnect(&mut self) -> StoreResult<()> {
            self.reconnects += 1;
            Ok(())
        }

        fn get_all_values(&self) -> StoreResult<Vec<Vec<String>>> {
            let remaining = self.read_faults.get();
            if remaining > 0 {
                self.read_faults.set(remaining - 1);
                return Err(StoreError::Transient("rate limited".to_string()));
            }
            self.inner.get_all_values()
        }

        fn update_cell(&mut self, row: usize, col: usize, value: &str) -> StoreResult<()> {
            self.write_attempts += 1;
            if self.failing_writes.contains(&self.write_attempts) {
                return Err(StoreError::Transient("connection reset".to_string()));
            }
            self.writes += 1;
            self.inner.update_cell(row, col, value)
        }
    }

    fn sample_sheet() -> MemorySheet {
        MemorySheet::from_rows(&[
            &["Name", "Splits", "Items", "Joined", "Rank", "", "Days"],
            &["Ghost", "1000", "Abyssal Whip", "01/02/2020", "General", "", "900"],
            &["Zezima", "N/A", "", "", "Owner", "", "5000"],
            &["Lynx Titan", "$1,200", "Zenyte x2", "", "Captain", "", "300"],
            &["", "50", "", "", "", "", ""],
        ])
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance("1000"), Some(1000));
        assert_eq!(parse_balance("$1,200"), Some(1200));
        assert_eq!(parse_balance(" -3,500 "), Some(-3500));
        assert_eq!(parse_balance("N/A"), None);
        assert_eq!(parse_balance(""), None);
        assert_eq!(parse_balance("12.5"), None);
    }

    #[test]
    fn test_lookup_all_skips_malformed_balances() {
        let mut ledger = Ledger::new(sample_sheet());
        let all = ledger.lookup_all().unwrap();

        // Header row has "Splits" as balance, so it is excluded too
        assert_eq!(all.len(), 2);
        assert!(!all.contains_key("Zezima"));

        let lynx = &all["Lynx Titan"];
        assert_eq!(lynx.balance, 1200);
        assert_eq!(lynx.row_index, 4);
        assert_eq!(lynx.item_text, "Zenyte x2");
        assert_eq!(lynx.rank, "Captain");
        assert_eq!(lynx.tenure, "300");
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut ledger = Ledger::new(sample_sheet());

        assert_eq!(ledger.lookup("Ghost").unwrap().unwrap().row_index, 2);
        assert!(ledger.lookup("ghost").unwrap().is_none());
        assert!(ledger.lookup("Ghos").unwrap().is_none());
        assert!(ledger.lookup("Zezima").unwrap().is_none());
    }

    #[test]
    fn test_short_rows_read_as_empty_cells() {
        let mut ledger = Ledger::new(MemorySheet::from_rows(&[&["Ghost", "10"]]));
        let ghost = ledger.lookup("Ghost").unwrap().unwrap();
        assert_eq!(ghost.item_text, "");
        assert_eq!(ghost.tenure, "");
    }

    #[test]
    fn test_duplicate_names_last_row_wins() {
        let mut ledger = Ledger::new(MemorySheet::from_rows(&[
            &["Ghost", "10"],
            &["Ghost", "20"],
        ]));
        let ghost = ledger.lookup("Ghost").unwrap().unwrap();
        assert_eq!(ghost.balance, 20);
        assert_eq!(ghost.row_index, 2);
    }

    #[test]
    fn test_roster_ordered_by_row() {
        let mut ledger = Ledger::new(sample_sheet());
        let names: Vec<_> = ledger.roster().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Ghost", "Lynx Titan"]);
    }

    #[test]
    fn test_apply_delta_without_items() {
        let mut ledger = Ledger::new(sample_sheet());
        let outcome = ledger.apply_delta("Ghost", 500, None).unwrap().unwrap();

        assert_eq!(outcome.prev_balance, 1000);
        assert_eq!(outcome.new_balance, 1500);
        assert_eq!(outcome.prev_items, "Abyssal Whip");
        assert_eq!(outcome.new_items, "Abyssal Whip");

        let sheet = ledger.into_inner();
        assert_eq!(sheet.cell(2, BALANCE_COL).unwrap(), "1500");
        assert_eq!(sheet.cell(2, ITEMS_COL).unwrap(), "Abyssal Whip");
    }

    #[test]
    fn test_apply_delta_merges_items() {
        let mut ledger = Ledger::new(sample_sheet());
        let outcome = ledger
            .apply_delta("Lynx Titan", -200, Some("zenyte, dragon claws"))
            .unwrap()
            .unwrap();

        assert_eq!(outcome.prev_balance, 1200);
        assert_eq!(outcome.new_balance, 1000);
        assert_eq!(outcome.prev_items, "Zenyte x2");
        assert_eq!(outcome.new_items, "Zenyte x3, Dragon Claws");
        assert_eq!(
            ledger.sheet().cell(4, ITEMS_COL).unwrap(),
            "Zenyte x3, Dragon Claws"
        );
    }

    #[test]
    fn test_apply_delta_allows_negative_balance() {
        let mut ledger = Ledger::new(sample_sheet());
        let outcome = ledger.apply_delta("Ghost", -5000, None).unwrap().unwrap();
        assert_eq!(outcome.new_balance, -4000);
        assert_eq!(ledger.lookup("Ghost").unwrap().unwrap().balance, -4000);
    }

    #[test]
    fn test_apply_delta_overflow_is_rejected() {
        let max = i64::MAX.to_string();
        let mut ledger = Ledger::new(FlakySheet::new(MemorySheet::from_rows(&[&["Ghost", max.as_str()]])));

        let result = ledger.apply_delta("Ghost", 1, Some("whip"));
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
        assert_eq!(ledger.sheet().writes, 0);
        assert_eq!(ledger.sheet().reconnects, 0);
        assert_eq!(ledger.lookup("Ghost").unwrap().unwrap().balance, i64::MAX);
    }

    #[test]
    fn test_out_of_range_balance_is_skipped() {
        let mut ledger = Ledger::new(MemorySheet::from_rows(&[
            &["Whale", "99999999999999999999"],
            &["Ghost", "10"],
        ]));
        assert!(is_out_of_range("99,999,999,999,999,999,999"));
        assert!(!is_out_of_range("N/A"));

        let all = ledger.lookup_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("Ghost"));
    }

    #[test]
    fn test_apply_delta_unknown_name() {
        let mut ledger = Ledger::new(FlakySheet::new(sample_sheet()));
        assert!(ledger.apply_delta("NoSuchName", 100, None).unwrap().is_none());
        assert_eq!(ledger.sheet().writes, 0);
    }

    #[test]
    fn test_create_existing_name_writes_nothing() {
        let mut ledger = Ledger::new(FlakySheet::new(sample_sheet()));
        let outcome = ledger
            .create_participant(&NewParticipant::new("Ghost").with_balance(10))
            .unwrap();

        assert_eq!(outcome, CreateOutcome::AlreadyExists);
        assert_eq!(ledger.sheet().writes, 0);
    }

    #[test]
    fn test_create_appends_after_last_name() {
        let mut ledger = Ledger::new(sample_sheet());
        let new = NewParticipant::new("Woox")
            .with_balance(250)
            .with_date("6/12/2019")
            .with_items("twisted bow, Twisted Bow");

        let CreateOutcome::Created(record) = ledger.create_participant(&new).unwrap() else {
            panic!("expected Created");
        };

        // Row 5 has a balance but no name, so the new row lands there
        assert_eq!(record.row_index, 5);
        assert_eq!(record.balance, 250);
        assert_eq!(record.item_text, "Twisted Bow x2");
        assert_eq!(ledger.sheet().cell(5, DATE_COL).unwrap(), "6/12/2019");
    }

    #[test]
    fn test_create_without_date_keeps_resident_value() {
        let mut ledger = Ledger::new(MemorySheet::from_rows(&[
            &["Ghost", "10", "", "01/01/2020"],
            &["", "", "", "10/16/2026"],
        ]));

        let outcome = ledger.create_participant(&NewParticipant::new("Woox")).unwrap();
        let CreateOutcome::Created(record) = outcome else {
            panic!("expected Created");
        };

        assert_eq!(record.row_index, 2);
        assert_eq!(record.balance, 0);
        assert_eq!(record.item_text, "");
        assert_eq!(ledger.sheet().cell(2, DATE_COL).unwrap(), "10/16/2026");
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let mut ledger = Ledger::new(FlakySheet::new(sample_sheet()));
        let result = ledger.create_participant(&NewParticipant::new("  "));
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
        assert_eq!(ledger.sheet().writes, 0);
    }

    #[test]
    fn test_single_transient_failure_recovers() {
        let mut ledger = Ledger::new(FlakySheet::new(sample_sheet()).fail_reads(1));
        let outcome = ledger.apply_delta("Ghost", 500, None).unwrap().unwrap();

        assert_eq!(outcome.new_balance, 1500);
        assert_eq!(ledger.sheet().reconnects, 1);
    }

    #[test]
    fn test_two_consecutive_failures_propagate() {
        let mut ledger = Ledger::new(FlakySheet::new(sample_sheet()).fail_reads(2));
        let result = ledger.lookup("Ghost");

        assert!(matches!(result, Err(StoreError::Transient(_))));
        assert_eq!(ledger.sheet().reconnects, 1);
    }

    #[test]
    fn test_retry_after_partial_write_does_not_double_apply() {
        // Balance write succeeds, item write fails once
        let sheet = FlakySheet::new(sample_sheet()).fail_writes(&[2]);
        let mut ledger = Ledger::new(sheet);

        let outcome = ledger
            .apply_delta("Ghost", 500, Some("whip"))
            .unwrap()
            .unwrap();

        assert_eq!(outcome.new_balance, 1500);
        assert_eq!(outcome.new_items, "Abyssal Whip, Whip");
        assert_eq!(ledger.sheet().reconnects, 1);

        let ghost = ledger.lookup("Ghost").unwrap().unwrap();
        assert_eq!(ghost.balance, 1500);
        assert_eq!(ghost.item_text, "Abyssal Whip, Whip");
    }

    #[test]
    fn test_create_retry_reuses_row() {
        // Name is written, then the balance write fails once
        let sheet = FlakySheet::new(sample_sheet()).fail_writes(&[2]);
        let mut ledger = Ledger::new(sheet);

        let outcome = ledger
            .create_participant(&NewParticipant::new("Woox").with_balance(7))
            .unwrap();

        let CreateOutcome::Created(record) = outcome else {
            panic!("retry must not report AlreadyExists");
        };
        assert_eq!(record.row_index, 5);
        assert_eq!(record.balance, 7);
        assert_eq!(ledger.sheet().reconnects, 1);
    }

    #[test]
    fn test_non_transient_errors_are_not_retried() {
        let mut sheet = sample_sheet();
        let result: StoreResult<()> = with_reconnect(&mut sheet, "test", |_| {
            Err(StoreError::Inconsistent("boom".to_string()))
        });
        assert!(matches!(result, Err(StoreError::Inconsistent(_))));
    }
}
