//! CSV workbook model
//!
//! A [`Sheet`] is the in-memory image of one ledger file: a header row plus
//! data rows, addressed by 0-based data index and column index. Cells outside
//! the stored grid read as empty and are padded on write, so callers never
//! deal with ragged rows.

use crate::ledger::LedgerError;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const SAVE_ATTEMPTS: usize = 10;

#[derive(Debug)]
pub struct Sheet {
	path: PathBuf,
	headers: Vec<String>,
	rows: Vec<Vec<String>>,
}

impl Sheet {
	/// Load a ledger file. Fails if the file is missing; an empty file yields
	/// a sheet with no headers and no rows.
	pub fn load(path: &Path) -> Result<Self, LedgerError> {
		if !path.exists() {
			return Err(LedgerError::NotFound(path.to_path_buf()));
		}
		let mut reader = csv::ReaderBuilder::new()
			.has_headers(false)
			.flexible(true)
			.from_path(path)?;

		let mut records = reader.records();
		let headers = match records.next() {
			Some(record) => record?.iter().map(|c| c.to_string()).collect(),
			None => Vec::new(),
		};
		let mut rows = Vec::new();
		for record in records {
			rows.push(record?.iter().map(|c| c.to_string()).collect());
		}
		Ok(Self {
			path: path.to_path_buf(),
			headers,
			rows,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn row_count(&self) -> usize {
		self.rows.len()
	}

	pub fn column_count(&self) -> usize {
		self.headers.len()
	}

	pub fn header(&self, col: usize) -> &str {
		self.headers.get(col).map(String::as_str).unwrap_or("")
	}

	pub fn set_header(&mut self, col: usize, value: &str) {
		if col >= self.headers.len() {
			self.headers.resize(col + 1, String::new());
		}
		self.headers[col] = value.to_string();
	}

	/// First column whose header matches the predicate.
	pub fn find_column<F>(&self, pred: F) -> Option<usize>
	where
		F: Fn(&str) -> bool,
	{
		self.headers.iter().position(|h| pred(h.trim()))
	}

	/// Append a new column with the given header, returning its index.
	pub fn push_column(&mut self, header: &str) -> usize {
		self.headers.push(header.to_string());
		self.headers.len() - 1
	}

	/// Cell content by 0-based data row and column; empty when out of range.
	pub fn cell(&self, row: usize, col: usize) -> &str {
		self.rows
			.get(row)
			.and_then(|r| r.get(col))
			.map(String::as_str)
			.unwrap_or("")
	}

	pub fn set_cell(&mut self, row: usize, col: usize, value: &str) {
		if row >= self.rows.len() {
			self.rows.resize_with(row + 1, Vec::new);
		}
		let cells = &mut self.rows[row];
		if col >= cells.len() {
			cells.resize(col + 1, String::new());
		}
		cells[col] = value.to_string();
	}

	/// Write the sheet back to its file, padding every row to the header
	/// width.
	pub fn save(&self) -> Result<(), LedgerError> {
		let mut writer = csv::WriterBuilder::new()
			.flexible(true)
			.from_path(&self.path)?;
		writer.write_record(&self.headers)?;
		let width = self.headers.len();
		for row in &self.rows {
			if row.len() >= width {
				writer.write_record(row)?;
			} else {
				let padded = row
					.iter()
					.map(String::as_str)
					.chain(std::iter::repeat("").take(width - row.len()));
				writer.write_record(padded)?;
			}
		}
		writer.flush()?;
		Ok(())
	}

	/// Save, retrying transient permission errors with a short random pause.
	/// Another process holding the file open (the ledger is hand-edited in
	/// practice) releases it within a few seconds or not at all.
	pub async fn save_with_retry(&self) -> Result<(), LedgerError> {
		let mut attempt = 0;
		loop {
			match self.save() {
				Ok(()) => return Ok(()),
				Err(e) if e.is_transient() && attempt + 1 < SAVE_ATTEMPTS => {
					let pause = rand::thread_rng().gen_range(0.5..2.0);
					warn!(
						path = %self.path.display(),
						attempt = attempt + 1,
						"ledger busy, retrying save in {:.2}s",
						pause
					);
					tokio::time::sleep(Duration::from_secs_f64(pause)).await;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::io::Write;

	fn sheet_from(content: &str) -> (tempfile::TempDir, Sheet) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("ledger.csv");
		let mut file = std::fs::File::create(&path).unwrap();
		file.write_all(content.as_bytes()).unwrap();
		drop(file);
		let sheet = Sheet::load(&path).unwrap();
		(dir, sheet)
	}

	#[test]
	fn load_splits_header_and_rows() {
		let (_dir, sheet) = sheet_from("Email,Password,Status\na@x.com,pw1,USED\nb@x.com,pw2,\n");
		assert_eq!(sheet.column_count(), 3);
		assert_eq!(sheet.row_count(), 2);
		assert_eq!(sheet.cell(0, 0), "a@x.com");
		assert_eq!(sheet.cell(0, 2), "USED");
		assert_eq!(sheet.cell(1, 2), "");
	}

	#[test]
	fn out_of_range_cells_read_empty() {
		let (_dir, sheet) = sheet_from("Email\na@x.com\n");
		assert_eq!(sheet.cell(0, 5), "");
		assert_eq!(sheet.cell(9, 0), "");
	}

	#[test]
	fn set_cell_pads_ragged_rows() {
		let (_dir, mut sheet) = sheet_from("Email,Status\na@x.com\n");
		sheet.set_cell(0, 1, "PENDING");
		assert_eq!(sheet.cell(0, 1), "PENDING");
		sheet.set_cell(2, 1, "USED");
		assert_eq!(sheet.row_count(), 3);
		assert_eq!(sheet.cell(2, 0), "");
	}

	#[test]
	fn push_column_extends_header() {
		let (_dir, mut sheet) = sheet_from("Email\na@x.com\n");
		let col = sheet.push_column("16-01");
		assert_eq!(col, 1);
		assert_eq!(sheet.header(1), "16-01");
	}

	#[test]
	fn find_column_trims_headers() {
		let (_dir, sheet) = sheet_from(" Email , Password \na@x.com,pw\n");
		assert_eq!(
			sheet.find_column(|h| h.eq_ignore_ascii_case("password")),
			Some(1)
		);
	}

	#[test]
	fn save_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("ledger.csv");
		std::fs::write(&path, "Email,Status\na@x.com,USED\n").unwrap();

		let mut sheet = Sheet::load(&path).unwrap();
		sheet.set_cell(0, 1, "PENDING:3");
		sheet.save().unwrap();

		let reloaded = Sheet::load(&path).unwrap();
		assert_eq!(reloaded.cell(0, 1), "PENDING:3");
	}

	#[test]
	fn missing_file_is_an_error() {
		let err = Sheet::load(Path::new("/nonexistent/ledger.csv")).unwrap_err();
		assert!(matches!(err, LedgerError::NotFound(_)));
	}
}
