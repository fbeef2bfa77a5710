//! CSV boundary: the input row source (header validated up front) and the
//! correction file that receives unresolved rows.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::date::file_stamp;
use crate::error::IngestError;
use crate::model::Item;
use crate::parser::{extra_tag_columns, item_to_row};
use crate::schema::{validate_header, EXPECTED_HEADERS};
use crate::util::{create_new_with_backoff, open_with_backoff, remove_with_backoff};

/// A data row the reader could not take as-is. `cells` holds whatever could
/// be recovered (bytes that are not UTF-8 are replaced with U+FFFD) so the row
/// can still be reported.
#[derive(Debug)]
pub struct RejectedRow {
    pub cells: Vec<String>,
    pub error: IngestError,
}

/// Streams data rows of an input file in order. Yields `(line, cells)` with
/// lines counted from 2 (line 1 is the header).
pub struct CsvRowSource {
    reader: csv::Reader<File>,
    header: Vec<String>,
    record: csv::ByteRecord,
    next_line: usize,
    done: bool,
}

impl CsvRowSource {
    /// Open `path` and validate its header. Any failure here is fatal for the run.
    pub fn open(path: &Path, read_buf_bytes: usize) -> Result<Self, IngestError> {
        let file = open_with_backoff(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(read_buf_bytes.max(8 * 1024))
            .from_reader(file);

        let mut raw = csv::StringRecord::new();
        if !reader.read_record(&mut raw)? {
            return Err(IngestError::MissingColumns { expected: EXPECTED_HEADERS.len(), found: 0 });
        }
        let raw: Vec<String> = raw.iter().map(str::to_string).collect();
        let header = validate_header(&raw)?;

        Ok(Self { reader, header, record: csv::ByteRecord::new(), next_line: 2, done: false })
    }

    /// Normalised header (BOM stripped), including any ad-hoc tag columns.
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

/// Decode every cell of `record`. On the first cell that is not valid UTF-8
/// the whole row is rejected, keeping a lossy copy of its cells.
fn decode_record(record: &csv::ByteRecord, line: usize) -> Result<Vec<String>, RejectedRow> {
    let mut cells = Vec::with_capacity(record.len());
    for (i, raw) in record.iter().enumerate() {
        match std::str::from_utf8(raw) {
            Ok(cell) => cells.push(cell.to_string()),
            Err(e) => {
                let cells = record.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect();
                let reason = format!("column {} is not valid UTF-8: {e}", i + 1);
                return Err(RejectedRow { cells, error: IngestError::RowParse { line, reason } });
            }
        }
    }
    Ok(cells)
}

impl Iterator for CsvRowSource {
    type Item = (usize, Result<Vec<String>, RejectedRow>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let line = self.next_line;
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                self.next_line += 1;
                Some((line, decode_record(&self.record, line)))
            }
            Err(e) => {
                self.next_line += 1;
                // An I/O failure leaves the reader in an unknown position; stop here.
                if e.is_io_error() {
                    self.done = true;
                }
                let error = IngestError::RowParse { line, reason: e.to_string() };
                Some((line, Err(RejectedRow { cells: Vec::new(), error })))
            }
        }
    }
}

/// Number of data rows in `path` (header excluded). Used to size progress bars.
pub fn count_data_rows(path: &Path) -> Result<u64> {
    let file = open_with_backoff(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);
    let mut record = csv::ByteRecord::new();
    let mut n = 0u64;
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("count rows in {}", path.display()))?
    {
        n += 1;
    }
    Ok(n)
}

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Output file for rows the operator has to correct and re-submit.
/// Allocated before any registry call so an unwritable output directory
/// aborts the run early; removed again when nothing is unresolved.
pub struct CorrectionFile {
    path: PathBuf,
    file: File,
}

impl CorrectionFile {
    /// Create `<dir>/<prefix>_<YYYYMMDDHHMMSS>.csv`. An existing file is never
    /// reused; later allocations in the same second get a `_<n>` suffix.
    pub fn allocate(dir: &Path, prefix: &str, now: OffsetDateTime) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let stamp = file_stamp(now);
        for n in 0..MAX_NAME_ATTEMPTS {
            let name = match n {
                0 => format!("{prefix}_{stamp}.csv"),
                n => format!("{prefix}_{stamp}_{n}.csv"),
            };
            let path = dir.join(name);
            match create_new_with_backoff(&path) {
                Ok(file) => return Ok(Self { path, file }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e).with_context(|| format!("create {}", path.display())),
            }
        }
        bail!("no free correction file name for {prefix}_{stamp} in {}", dir.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header and one row per item, then close the file.
    pub fn write(self, items: &[Item], write_buf_bytes: usize) -> Result<PathBuf> {
        let CorrectionFile { path, file } = self;
        let extra = extra_tag_columns(items);

        let buffered = BufWriter::with_capacity(write_buf_bytes.max(8 * 1024), file);
        let mut w = csv::WriterBuilder::new().flexible(false).from_writer(buffered);

        let header: Vec<&str> =
            EXPECTED_HEADERS.iter().copied().chain(extra.iter().map(String::as_str)).collect();
        w.write_record(&header).with_context(|| format!("write header to {}", path.display()))?;
        for item in items {
            w.write_record(item_to_row(item, &extra))
                .with_context(|| format!("write row for sensor '{}' to {}", item.sensor_id, path.display()))?;
        }
        let mut inner = w.into_inner().map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", path.display()))?;
        inner.flush().with_context(|| format!("flush {}", path.display()))?;
        Ok(path)
    }

    /// Close and delete the pre-allocated file.
    pub fn discard(self) -> Result<()> {
        let CorrectionFile { path, file } = self;
        drop(file);
        remove_with_backoff(&path)
    }
}
