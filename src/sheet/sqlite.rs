// 🗄️ SQLite worksheet - cell table keyed by (worksheet, row, col)

use super::{set_grid_cell, StoreError, StoreResult, Worksheet};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Worksheet stored as sparse cells in a SQLite database.
///
/// Several worksheets can share one database file; each is addressed by name.
pub struct SqliteSheet {
    path: PathBuf,
    worksheet: String,
    conn: Option<Connection>,
}

impl SqliteSheet {
    /// Open (or create) the database and select a worksheet
    pub fn open<P: AsRef<Path>>(path: P, worksheet: &str) -> StoreResult<Self> {
        let mut sheet = SqliteSheet {
            path: path.as_ref().to_path_buf(),
            worksheet: worksheet.to_string(),
            conn: None,
        };
        sheet.reconnect()?;
        Ok(sheet)
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::Transient("not connected".to_string()))
    }
}

/// Create the cell table (idempotent)
pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cells (
            worksheet TEXT NOT NULL,
            row INTEGER NOT NULL,
            col INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (worksheet, row, col)
        )",
        [],
    )?;

    Ok(())
}

impl Worksheet for SqliteSheet {
    fn reconnect(&mut self) -> StoreResult<()> {
        // Drop the old handle before opening a new one
        self.conn = None;

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        setup_database(&conn)?;

        self.conn = Some(conn);
        Ok(())
    }

    fn get_all_values(&self) -> StoreResult<Vec<Vec<String>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT row, col, value FROM cells
             WHERE worksheet = ?1
             ORDER BY row, col",
        )?;

        let cells = stmt
            .query_map(params![self.worksheet], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut grid = Vec::new();
        for (row, col, value) in cells {
            if row < 1 || col < 1 {
                continue;
            }
            set_grid_cell(&mut grid, row as usize, col as usize, &value);
        }
        Ok(grid)
    }

    fn cell(&self, row: usize, col: usize) -> StoreResult<String> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM cells WHERE worksheet = ?1 AND row = ?2 AND col = ?3",
                params![self.worksheet, row as i64, col as i64],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.unwrap_or_default())
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO cells (worksheet, row, col, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (worksheet, row, col) DO UPDATE SET value = excluded.value",
            params![self.worksheet, row as i64, col as i64, value],
        )?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
