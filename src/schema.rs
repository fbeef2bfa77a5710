//! Fixed CSV schema shared by the input reader and the correction writer.

use crate::error::IngestError;

/// Expected leading header cells, in order.
pub const EXPECTED_HEADERS: [&str; 15] = [
    "SiteCode",
    "SensorID",
    "Name",
    "Process",
    "MinValue",
    "MaxValue",
    "Uom",
    "SiteShortCode",
    "System",
    "EquipmentUnit",
    "Subunit",
    "EquipmentComponent",
    "EquipmentMeasurement",
    "UDE",
    "SAP Equipment ID",
];

/// How a schema column feeds the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnRole {
    /// Named field only.
    Field,
    /// Named field, plus one tag named after the column.
    FieldAndTag,
    /// Named field, plus one tag per comma-separated piece.
    MultiTag,
}

/// Role of column `idx`. Anything past the fixed schema is a multi-valued
/// ad-hoc tag column.
pub fn column_role(idx: usize) -> ColumnRole {
    match EXPECTED_HEADERS.get(idx).copied() {
        Some("SiteShortCode" | "System" | "EquipmentMeasurement" | "SAP Equipment ID") => {
            ColumnRole::FieldAndTag
        }
        Some("Subunit" | "EquipmentComponent" | "UDE") => ColumnRole::MultiTag,
        Some(_) => ColumnRole::Field,
        None => ColumnRole::MultiTag,
    }
}

/// True when `name` is one of the fixed schema columns.
pub fn is_schema_column(name: &str) -> bool {
    EXPECTED_HEADERS.contains(&name)
}

/// Process codes the registry knows about. Unknown codes are accepted but
/// flagged by `verify`.
pub const KNOWN_PROCESS_CODES: &[&str] = &[
    "CNC", "ENV", "GDE", "FTC", "FNL", "GEN", "HAU", "HM", "LEA", "MN", "MO", "MIS", "REF", "ROD",
    "SML", "TCLW", "GMX",
];

pub fn is_known_process(code: &str) -> bool {
    KNOWN_PROCESS_CODES.contains(&code)
}

const BOM: char = '\u{feff}';

/// Strip a UTF-8 byte-order mark from the first header cell.
pub fn strip_bom(cell: &str) -> &str {
    cell.strip_prefix(BOM).unwrap_or(cell)
}

/// Check the header row against `EXPECTED_HEADERS` and return it normalised
/// (BOM removed). Extra trailing columns are kept as ad-hoc tag names.
pub fn validate_header(raw: &[String]) -> Result<Vec<String>, IngestError> {
    if raw.len() < EXPECTED_HEADERS.len() {
        return Err(IngestError::MissingColumns { expected: EXPECTED_HEADERS.len(), found: raw.len() });
    }
    let header: Vec<String> = raw
        .iter()
        .enumerate()
        .map(|(i, h)| if i == 0 { strip_bom(h).to_string() } else { h.clone() })
        .collect();

    for (i, expected) in EXPECTED_HEADERS.iter().enumerate() {
        if header[i] != *expected {
            return Err(IngestError::SchemaMismatch {
                column: i + 1,
                expected: expected.to_string(),
                found: header[i].clone(),
            });
        }
    }
    Ok(header)
}
