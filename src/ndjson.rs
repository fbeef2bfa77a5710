use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffered NDJSON reader that decodes one document per line.
/// Blank lines are skipped.
pub struct NdjsonReader {
    rdr: BufReader<File>,
    buf: String,
    line: usize,
}

impl NdjsonReader {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path)?;
        Ok(Self { rdr: BufReader::with_capacity(buf_bytes.max(8 * 1024), f), buf: String::new(), line: 0 })
    }

    /// Next decoded document, `None` on EOF. Errors carry the 1-based line.
    pub fn next_document<T: DeserializeOwned>(&mut self) -> io::Result<Option<T>> {
        loop {
            self.buf.clear();
            if self.rdr.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let trimmed = self.buf.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed).map(Some).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("line {}: {e}", self.line))
            });
        }
    }
}

/// Read every document in `path`. A missing file is an empty collection.
pub fn read_documents<T: DeserializeOwned>(path: &Path, buf_bytes: usize) -> io::Result<Vec<T>> {
    let mut rdr = match NdjsonReader::open(path, buf_bytes) {
        Ok(r) => r,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut out = Vec::new();
    while let Some(doc) = rdr.next_document()? {
        out.push(doc);
    }
    Ok(out)
}

/// Buffered NDJSON writer; one serialized document per line.
pub struct NdjsonWriter {
    path: PathBuf,
    w: Option<BufWriter<File>>,
}

impl NdjsonWriter {
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path)?;
        Ok(Self { path: path.to_path_buf(), w: Some(BufWriter::with_capacity(buf_bytes.max(8 * 1024), f)) })
    }

    pub fn write_document<T: Serialize>(&mut self, doc: &T) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            serde_json::to_writer(&mut *w, doc)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flushes and atomically promotes the temp file to `final_path`.
    pub fn finish_atomic(mut self, final_path: &Path) -> Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush().with_context(|| format!("flush {}", self.path.display()))?;
        }
        replace_file_atomic_backoff(&self.path, final_path)
    }
}
