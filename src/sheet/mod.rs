// Worksheet backends - the tabular store behind the ledger
//
// Each backend exposes the same cell-level primitives a spreadsheet API
// would: read everything, read a column, read a cell, write a cell.
// Rows and columns are 1-based.

pub mod csv;
pub mod sqlite;

pub use self::csv::CsvSheet;
pub use self::sqlite::SqliteSheet;

use thiserror::Error;

// ============================================================================
// STORE ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or rate-limit failure; worth one reconnect-and-retry
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The table did not contain what a just-completed write should have left
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),
}

impl StoreError {
    /// Whether the reconnect-and-retry policy applies to this failure
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Io(e) => is_transient_io(e.kind()),
            StoreError::Csv(e) => match e.kind() {
                ::csv::ErrorKind::Io(io) => is_transient_io(io.kind()),
                _ => false,
            },
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

fn is_transient_io(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
    )
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// WORKSHEET TRAIT
// ============================================================================

/// Cell-level access to one worksheet (tab) of a tabular store.
pub trait Worksheet {
    /// Re-establish the connection after a transient failure
    fn reconnect(&mut self) -> StoreResult<()>;

    /// Every row; row `i` (1-based) is at index `i - 1`
    fn get_all_values(&self) -> StoreResult<Vec<Vec<String>>>;

    /// One column, with trailing empty cells trimmed
    fn col_values(&self, col: usize) -> StoreResult<Vec<String>> {
        let mut values: Vec<String> = self
            .get_all_values()?
            .into_iter()
            .map(|row| row.get(col - 1).cloned().unwrap_or_default())
            .collect();
        while values.last().map_or(false, |v| v.is_empty()) {
            values.pop();
        }
        Ok(values)
    }

    /// One cell; cells outside the grid read as ""
    fn cell(&self, row: usize, col: usize) -> StoreResult<String> {
        Ok(self
            .get_all_values()?
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .cloned()
            .unwrap_or_default())
    }

    /// Write one cell, growing the grid as needed
    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> StoreResult<()>;
}

impl<W: Worksheet + ?Sized> Worksheet for Box<W> {
    fn reconnect(&mut self) -> StoreResult<()> {
        (**self).reconnect()
    }

    fn get_all_values(&self) -> StoreResult<Vec<Vec<String>>> {
        (**self).get_all_values()
    }

    fn col_values(&self, col: usize) -> StoreResult<Vec<String>> {
        (**self).col_values(col)
    }

    fn cell(&self, row: usize, col: usize) -> StoreResult<String> {
        (**self).cell(row, col)
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> StoreResult<()> {
        (**self).update_cell(row, col, value)
    }
}

/// Set a cell in an in-memory grid, padding rows and columns with ""
pub(crate) fn set_grid_cell(grid: &mut Vec<Vec<String>>, row: usize, col: usize, value: &str) {
    if grid.len() < row {
        grid.resize_with(row, Vec::new);
    }
    let cells = &mut grid[row - 1];
    if cells.len() < col {
        cells.resize(col, String::new());
    }
    cells[col - 1] = value.to_string();
}

// ============================================================================
// MEMORY SHEET
// ============================================================================

/// In-memory worksheet for tests and demos
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    rows: Vec<Vec<String>>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from literal rows: `MemorySheet::from_rows(&[&["Ghost", "1000"]])`
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        MemorySheet {
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }
}

impl Worksheet for MemorySheet {
    fn reconnect(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn get_all_values(&self) -> StoreResult<Vec<Vec<String>>> {
        Ok(self.rows.clone())
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> StoreResult<()> {
        set_grid_cell(&mut self.rows, row, col, value);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
