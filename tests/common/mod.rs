#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use stream_ingest::{parse_row, AuditStamp, Stream, EXPECTED_HEADERS};

/// Header line of a valid input file.
pub fn header_line() -> String {
    EXPECTED_HEADERS.join(",")
}

/// One data row with sensible tag columns filled in:
/// SiteShortCode=BH, System=Pumping, EquipmentMeasurement=Flow, no multi-valued tags.
pub fn basic_row(site: &str, sensor: &str, min: &str) -> String {
    format!("{site},{sensor},Flow {sensor},MN,{min},100,m3/h,BH,Pumping,P-01,,,Flow,,")
}

/// Write `header` + `rows` to `<dir>/<name>` and return the path.
pub fn write_csv_with_header(dir: &Path, name: &str, header: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::from(header);
    body.push('\n');
    for r in rows {
        body.push_str(r);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

pub fn write_csv(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
    write_csv_with_header(dir, name, &header_line(), rows)
}

pub fn header_cells() -> Vec<String> {
    EXPECTED_HEADERS.iter().map(|h| h.to_string()).collect()
}

/// Split a helper row into cells (helper rows never contain quoted commas).
pub fn cells(row: &str) -> Vec<String> {
    row.split(',').map(str::to_string).collect()
}

pub const SEED_TS: &str = "2024-01-01T00:00:00.000000Z";

/// A registry record equal to what `row` parses into, stamped by a seed user
/// at `SEED_TS`.
pub fn stored_from_row(row: &str) -> Stream {
    let stamp = AuditStamp::now("seed");
    let mut s = parse_row(&header_cells(), &cells(row), 2, &stamp).unwrap();
    s.created_by = "seed".into();
    s.updated_by = "seed".into();
    s.created_utc = SEED_TS.into();
    s.updated_utc = SEED_TS.into();
    s
}

/// Read a CSV file into rows of cells (header included).
pub fn read_csv_rows(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_path(path).unwrap();
    rdr.records().map(|r| r.unwrap().iter().map(str::to_string).collect()).collect()
}

/// Correction files (`import-result_*.csv`) directly inside `dir`.
pub fn correction_files(dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.starts_with("import-result_") && name.ends_with(".csv")
        })
        .collect();
    out.sort();
    out
}
