#[path = "common/mod.rs"]
mod common;

use common::*;
use stream_ingest::{
    extra_tag_columns, item_to_row, parse_item, parse_row, stream_to_item, tags_match, validate_header,
    AuditStamp, CsvRowSource, IngestError, Tag, TagMatch,
};

/// Demonstrates header validation:
/// - a UTF-8 BOM on the first cell is ignored,
/// - a renamed column is reported with its 1-based position,
/// - a short header is rejected outright.
/// Outcome: only the exact schema (plus trailing tag columns) is accepted.
#[test]
fn header_validation_strips_bom_and_reports_mismatch() {
    let mut raw = header_cells();
    raw[0] = format!("\u{feff}{}", raw[0]);
    raw.push("Area".into());
    let header = validate_header(&raw).unwrap();
    assert_eq!(header[0], "SiteCode");
    assert_eq!(header.len(), 16);

    let mut bad = header_cells();
    bad[4] = "Minimum".into();
    match validate_header(&bad) {
        Err(IngestError::SchemaMismatch { column, expected, found }) => {
            assert_eq!(column, 5);
            assert_eq!(expected, "MinValue");
            assert_eq!(found, "Minimum");
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }

    let short = header_cells()[..10].to_vec();
    assert!(matches!(validate_header(&short), Err(IngestError::MissingColumns { found: 10, .. })));
}

/// Demonstrates how columns turn into tags:
/// - SiteShortCode/System/EquipmentMeasurement/SAP Equipment ID give one tag each,
/// - Subunit/EquipmentComponent/UDE and extra columns split on commas,
/// - pieces are kept verbatim: no trimming, empty pieces and empty
///   single-valued cells still give a tag,
/// - empty MinValue defaults to "0".
/// Outcome: the item carries exactly the expected tag multiset.
#[test]
fn parse_item_maps_fields_and_tags() {
    let mut header = header_cells();
    header.push("Area".into());
    let row: Vec<String> = [
        "S1", "T-100", "Flow T-100", "MN", "", "50", "m3/h", "BH", "Pumping", "P-01", "A, B,,", "Motor", "",
        "u1,u2", "9000123", "North,South",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let item = parse_item(&header, &row, 2).unwrap();
    assert_eq!(item.site_code, "S1");
    assert_eq!(item.min_value, "0");
    assert_eq!(item.equipment_unit, "P-01");

    let expected = vec![
        Tag::new("SiteShortCode", "BH"),
        Tag::new("System", "Pumping"),
        Tag::new("Subunit", "A"),
        Tag::new("Subunit", " B"),
        Tag::new("Subunit", ""),
        Tag::new("Subunit", ""),
        Tag::new("EquipmentComponent", "Motor"),
        Tag::new("EquipmentMeasurement", ""),
        Tag::new("UDE", "u1"),
        Tag::new("UDE", "u2"),
        Tag::new("SAP Equipment ID", "9000123"),
        Tag::new("Area", "North"),
        Tag::new("Area", "South"),
    ];
    assert!(tags_match(&item.tags, &expected, TagMatch::Strict), "tags: {:?}", item.tags);
    assert_eq!(item.tags.len(), expected.len());
}

/// Demonstrates row-level failures:
/// - a row shorter than the header is a RowParse error,
/// - a non-integer MinValue fails that row only, keeping the cells for reporting.
/// Outcome: errors carry the line number and the salvaged item keeps its SensorID.
#[test]
fn malformed_rows_fail_individually() {
    let header = header_cells();
    let stamp = AuditStamp::now("tester");

    let short = cells("S1,T-1,Name");
    let failure = parse_row(&header, &short, 7, &stamp).unwrap_err();
    assert!(matches!(failure.error, IngestError::RowParse { line: 7, .. }));
    assert_eq!(failure.item.sensor_id, "T-1");

    let bad_min = cells(&basic_row("S1", "T-2", "abc"));
    let failure = parse_row(&header, &bad_min, 3, &stamp).unwrap_err();
    assert_eq!(failure.error.line(), Some(3));
    assert_eq!(failure.item.sensor_id, "T-2");
    assert_eq!(failure.item.min_value, "abc");

    let ok = parse_row(&header, &cells(&basic_row("S1", "T-3", " 12 ")), 4, &stamp).unwrap();
    assert_eq!(ok.min_value, 12);
}

/// Demonstrates fresh-record defaults: registry type, index, step, status,
/// version, and audit fields stamped with the operator.
/// Outcome: each parsed row becomes a new record with its own UUID.
#[test]
fn parsed_rows_get_fresh_identity() {
    let header = header_cells();
    let stamp = AuditStamp::now("alice");
    let a = parse_row(&header, &cells(&basic_row("S1", "T-1", "1")), 2, &stamp).unwrap();
    let b = parse_row(&header, &cells(&basic_row("S1", "T-2", "1")), 3, &stamp).unwrap();

    assert_ne!(a.id, b.id);
    assert!(uuid::Uuid::parse_str(&a.id).is_ok());
    assert_eq!(a.registry_type, "stream");
    assert_eq!(a.index, 1);
    assert!(a.step);
    assert_eq!(a.status, "active");
    assert_eq!(a.version, 1);
    assert_eq!((a.lo_lo, a.lo, a.hi, a.hi_hi), (0, 0, 0, 0));
    assert_eq!(a.created_by, "alice");
    assert_eq!(a.updated_by, "alice");
    assert!(a.created_utc.ends_with('Z'));
    assert_eq!(a.created_utc.len(), "2024-03-01T10:22:33.000123Z".len());
}

/// Demonstrates the round trip record → CSV row → record:
/// - positional columns are rebuilt from same-named tags,
/// - extra tags get their own trailing columns,
/// - re-parsing yields the same named fields and the same tag set.
/// Outcome: nothing but identity and timestamps differ.
#[test]
fn record_round_trips_through_csv_projection() {
    let mut header = header_cells();
    header.push("Area".into());
    let row: Vec<String> = [
        "S9", "T-9", "Level T-9", "ENV", "-5", "250", "m", "BH", "Tailings", "TK-2", "A,B", "Pump", "Level", "u1",
        "9000", "North",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let stamp = AuditStamp::now("tester");
    let original = parse_row(&header, &row, 2, &stamp).unwrap();

    let item = stream_to_item(&original);
    let extra = extra_tag_columns([&item]);
    assert_eq!(extra, vec!["Area".to_string()]);
    let out_row = item_to_row(&item, &extra);

    let mut out_header = header_cells();
    out_header.extend(extra.iter().cloned());
    let again = parse_row(&out_header, &out_row, 2, &stamp).unwrap();

    assert!(original.field_diff(&again).is_empty());
    assert_eq!(original.sensor_id, again.sensor_id);
    assert_eq!(original.site_code, again.site_code);
    assert!(tags_match(&original.tags, &again.tags, TagMatch::Strict));
}

/// Demonstrates the CSV row source over a real file:
/// - a quoted cell with commas stays one cell,
/// - line numbers start at 2,
/// - a malformed (short) row surfaces as a per-row item, not a fatal error.
/// Outcome: three rows are yielded with lines 2, 3, 4.
#[test]
fn row_source_numbers_lines_from_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "in.csv",
        &[
            basic_row("S1", "T-1", "1"),
            "S1,T-2,Flow,MN,1,2,m,BH,Sys,U,\"A,B\",,,,".to_string(),
            "S1,T-3".to_string(),
        ],
    );
    let source = CsvRowSource::open(&path, 64 * 1024).unwrap();
    assert_eq!(source.header().len(), 15);

    let rows: Vec<_> = source.collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().map(|(l, _)| *l).collect::<Vec<_>>(), vec![2, 3, 4]);
    let second = rows[1].1.as_ref().unwrap();
    assert_eq!(second[10], "A,B");
    assert_eq!(rows[2].1.as_ref().unwrap().len(), 2);
}

/// Demonstrates that a file with a wrong header is fatal before any row is read.
/// Outcome: opening the source fails with SchemaMismatch.
#[test]
fn row_source_rejects_wrong_header() {
    let dir = tempfile::tempdir().unwrap();
    let header = header_line().replace("Uom", "Unit");
    let path = write_csv_with_header(dir.path(), "in.csv", &header, &[basic_row("S1", "T-1", "1")]);
    match CsvRowSource::open(&path, 64 * 1024) {
        Err(IngestError::SchemaMismatch { column: 7, .. }) => {}
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("header should have been rejected"),
    }
}
