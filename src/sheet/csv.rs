// 📄 CSV worksheet - one file, no header row, fixed column positions

use super::{set_grid_cell, StoreError, StoreResult, Worksheet};
use std::fs;
use std::path::{Path, PathBuf};

/// Worksheet stored as a headerless CSV file.
///
/// The file is re-read on every call and rewritten on every cell write,
/// so edits made by other tools between calls are picked up.
#[derive(Debug, Clone)]
pub struct CsvSheet {
    path: PathBuf,
}

impl CsvSheet {
    /// Open an existing CSV file
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut sheet = CsvSheet {
            path: path.as_ref().to_path_buf(),
        };
        sheet.reconnect()?;
        Ok(sheet)
    }

    /// Open a CSV file, creating an empty one if it does not exist
    pub fn create<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            fs::write(path, "")?;
        }
        Self::open(path)
    }

    fn write_all(&self, rows: &[Vec<String>]) -> StoreResult<()> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = ::csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&tmp)?;
            for row in rows {
                // A bare newline would be skipped on read and shift every row below it
                if row.is_empty() {
                    writer.write_record([""])?;
                } else {
                    writer.write_record(row)?;
                }
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Worksheet for CsvSheet {
    fn reconnect(&mut self) -> StoreResult<()> {
        let meta = fs::metadata(&self.path)?;
        if !meta.is_file() {
            return Err(StoreError::Config(format!(
                "{:?} is not a regular file",
                self.path
            )));
        }
        Ok(())
    }

    fn get_all_values(&self) -> StoreResult<Vec<Vec<String>>> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(rows)
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> StoreResult<()> {
        let mut rows = self.get_all_values()?;
        set_grid_cell(&mut rows, row, col, value);
        self.write_all(&rows)
    }
}

// ============================================================================
// TESTS
// ============================================================================
