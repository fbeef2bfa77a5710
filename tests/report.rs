#[path = "common/mod.rs"]
mod common;

use common::*;
use stream_ingest::{
    finish_report, stream_to_item, CorrectionFile, IngestError, LogEntry, LogLevel, Tag, UnresolvedRecord, VecSink,
};
use time::macros::datetime;

/// Demonstrates the clean path: nothing unresolved.
/// Outcome: every log entry reaches the sink and the pre-allocated file is deleted.
#[test]
fn nothing_unresolved_deletes_the_correction_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = CorrectionFile::allocate(dir.path(), "import-result", datetime!(2024-03-01 10:22:33 UTC)).unwrap();
    let path = file.path().to_path_buf();
    assert!(path.exists());
    assert!(path.ends_with("import-result_20240301102233.csv"));

    let log = vec![LogEntry::info(Some(2), "update sensor 'T-1'"), LogEntry::warn(Some(3), "duplicate")];
    let mut sink = VecSink::default();
    let written = finish_report(&log, &[], file, &mut sink, 64 * 1024).unwrap();

    assert!(written.is_none());
    assert!(!path.exists());
    assert_eq!(sink.entries, log);
}

/// Demonstrates the correction rows: tags named after schema columns are only
/// written positionally, other tags get one trailing column each, multi-values
/// are re-joined with commas.
/// Outcome: header of 15 + 2 columns; the row carries the expected cells.
#[test]
fn unresolved_records_keep_schema_and_extra_tags() {
    let dir = tempfile::tempdir().unwrap();
    let file = CorrectionFile::allocate(dir.path(), "import-result", datetime!(2024-03-01 10:22:33 UTC)).unwrap();

    let mut stream = stored_from_row(&basic_row("S1", "T-1", "5"));
    stream.tags.retain(|t| t.name != "Subunit");
    stream.tags.push(Tag::new("Subunit", "A"));
    stream.tags.push(Tag::new("Subunit", "B"));
    stream.tags.push(Tag::new("Area", "North"));
    stream.tags.push(Tag::new("Area", "South"));
    stream.tags.push(Tag::new("Owner", "ops"));
    let unresolved = vec![UnresolvedRecord {
        line: Some(2),
        item: stream_to_item(&stream),
        cause: IngestError::RowParse { line: 2, reason: "test".into() },
    }];
    let mut sink = VecSink::default();

    let path = finish_report(&[], &unresolved, file, &mut sink, 64 * 1024).unwrap().unwrap();
    let rows = read_csv_rows(&path);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 17);
    assert_eq!(&rows[0][15..], &["Area".to_string(), "Owner".to_string()]);
    let row = &rows[1];
    assert_eq!(row[1], "T-1");
    assert_eq!(row[4], "5");
    assert_eq!(row[10], "A,B");
    assert_eq!(row[12], "Flow");
    assert_eq!(row[15], "North,South");
    assert_eq!(row[16], "ops");
    assert!(sink.entries.iter().any(|e| e.level == LogLevel::Warn && e.message.contains("1 unresolved")));
}

/// Demonstrates two runs allocating their correction file in the same second.
/// Outcome: the second run gets a suffixed name and discarding it leaves the
/// first run's corrections intact.
#[test]
fn same_second_allocations_do_not_clobber() {
    let dir = tempfile::tempdir().unwrap();
    let now = datetime!(2024-03-01 10:22:33 UTC);
    let first = CorrectionFile::allocate(dir.path(), "import-result", now).unwrap();
    let item = stream_to_item(&stored_from_row(&basic_row("S1", "T-1", "5")));
    let written = first.write(&[item], 64 * 1024).unwrap();

    let second = CorrectionFile::allocate(dir.path(), "import-result", now).unwrap();
    assert_ne!(second.path(), written.as_path());
    assert!(second.path().ends_with("import-result_20240301102233_1.csv"));
    second.discard().unwrap();

    assert_eq!(correction_files(dir.path()), vec![written.clone()]);
    let rows = read_csv_rows(&written);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], "T-1");
}
