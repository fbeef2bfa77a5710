//! Row parser: CSV cells → `Item` → `Stream`, and the reverse projection used
//! when unresolved records are written back out.

use crate::error::IngestError;
use crate::model::{AuditStamp, Item, Stream, Tag};
use crate::schema::{column_role, is_schema_column, ColumnRole, EXPECTED_HEADERS};

/// A row that could not become a `Stream`. `item` holds whatever the cells
/// said so the row can still be written to the correction file.
#[derive(Debug)]
pub struct RowFailure {
    pub item: Item,
    pub error: IngestError,
}

/// Split a multi-valued cell into one tag per `,`-piece. Pieces are kept
/// verbatim, empty ones included, so rows match registry records written
/// from the same cells.
fn split_tags(name: &str, cell: &str, out: &mut Vec<Tag>) {
    out.extend(cell.split(',').map(|piece| Tag::new(name, piece)));
}

fn fill_item(header: &[String], row: &[String]) -> Item {
    let mut item = Item::default();
    let mut tags = Vec::new();

    for (i, name) in header.iter().enumerate() {
        let Some(cell) = row.get(i) else { break };
        match i {
            0 => item.site_code = cell.clone(),
            1 => item.sensor_id = cell.clone(),
            2 => item.name = cell.clone(),
            3 => item.process = cell.clone(),
            4 => item.min_value = default_numeric(cell),
            5 => item.max_value = default_numeric(cell),
            6 => item.uom = cell.clone(),
            7 => item.site_short_code = cell.clone(),
            8 => item.system = cell.clone(),
            9 => item.equipment_unit = cell.clone(),
            10 => item.subunit = cell.clone(),
            11 => item.equipment_component = cell.clone(),
            12 => item.equipment_measurement = cell.clone(),
            13 => item.ude = cell.clone(),
            14 => item.sap_equipment_id = cell.clone(),
            _ => {}
        }
        match column_role(i) {
            ColumnRole::Field => {}
            ColumnRole::FieldAndTag => tags.push(Tag::new(name.as_str(), cell.as_str())),
            ColumnRole::MultiTag => split_tags(name, cell, &mut tags),
        }
    }
    item.tags = tags;
    item
}

fn default_numeric(cell: &str) -> String {
    if cell.trim().is_empty() { "0".to_string() } else { cell.to_string() }
}

/// Stage 1: map one row onto the header. The row must have at least as many
/// cells as the header.
pub fn parse_item(header: &[String], row: &[String], line: usize) -> Result<Item, IngestError> {
    if row.len() < header.len() {
        return Err(IngestError::RowParse {
            line,
            reason: format!("row has {} columns, header has {}", row.len(), header.len()),
        });
    }
    Ok(fill_item(header, row))
}

/// Best-effort projection of a malformed row, used only for reporting.
pub fn salvage_item(header: &[String], row: &[String]) -> Item {
    let mut padded = row.to_vec();
    if padded.len() < header.len() {
        padded.resize(header.len(), String::new());
    }
    fill_item(header, &padded)
}

fn parse_int(field: &str, value: &str, line: usize) -> Result<i64, IngestError> {
    value.trim().parse::<i64>().map_err(|e| IngestError::RowParse {
        line,
        reason: format!("{field} '{value}' is not an integer: {e}"),
    })
}

/// Stage 2: build a fresh registry record from an item.
pub fn item_to_stream(item: &Item, stamp: &AuditStamp, line: usize) -> Result<Stream, IngestError> {
    let mut stream = Stream::new(stamp);
    stream.site_code = item.site_code.clone();
    stream.sensor_id = item.sensor_id.clone();
    stream.stream_name = item.name.clone();
    stream.process = item.process.clone();
    stream.unit_of_measure = item.uom.clone();
    stream.min_value = parse_int("MinValue", &item.min_value, line)?;
    stream.max_value = parse_int("MaxValue", &item.max_value, line)?;
    stream.tags = item.tags.clone();
    Ok(stream)
}

/// Both stages for one row.
pub fn parse_row(
    header: &[String],
    row: &[String],
    line: usize,
    stamp: &AuditStamp,
) -> Result<Stream, RowFailure> {
    let item = match parse_item(header, row, line) {
        Ok(item) => item,
        Err(error) => return Err(RowFailure { item: salvage_item(header, row), error }),
    };
    item_to_stream(&item, stamp, line).map_err(|error| RowFailure { item, error })
}

fn joined(stream: &Stream, name: &str) -> String {
    stream.tag_values(name).collect::<Vec<_>>().join(",")
}

/// Reverse projection: rebuild the positional columns from the record's
/// fields and same-named tags.
pub fn stream_to_item(stream: &Stream) -> Item {
    Item {
        site_code: stream.site_code.clone(),
        sensor_id: stream.sensor_id.clone(),
        name: stream.stream_name.clone(),
        process: stream.process.clone(),
        min_value: stream.min_value.to_string(),
        max_value: stream.max_value.to_string(),
        uom: stream.unit_of_measure.clone(),
        site_short_code: joined(stream, "SiteShortCode"),
        system: joined(stream, "System"),
        // the column itself is never tagged; registry records carry EquipmentType
        equipment_unit: joined(stream, "EquipmentType"),
        subunit: joined(stream, "Subunit"),
        equipment_component: joined(stream, "EquipmentComponent"),
        equipment_measurement: joined(stream, "EquipmentMeasurement"),
        ude: joined(stream, "UDE"),
        sap_equipment_id: joined(stream, "SAP Equipment ID"),
        tags: stream.tags.clone(),
    }
}

/// Tag names that need their own trailing column, in first-seen order.
/// Tags named after a schema column are already represented positionally.
pub fn extra_tag_columns<'a>(items: impl IntoIterator<Item = &'a Item>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for item in items {
        for tag in &item.tags {
            if !is_schema_column(&tag.name) && !names.iter().any(|n| n == &tag.name) {
                names.push(tag.name.clone());
            }
        }
    }
    names
}

/// Flatten an item into output cells: the fixed schema, then one cell per
/// entry of `extra_columns` holding that tag's values joined by `,`.
pub fn item_to_row(item: &Item, extra_columns: &[String]) -> Vec<String> {
    let mut row = Vec::with_capacity(EXPECTED_HEADERS.len() + extra_columns.len());
    row.extend([
        item.site_code.clone(),
        item.sensor_id.clone(),
        item.name.clone(),
        item.process.clone(),
        item.min_value.clone(),
        item.max_value.clone(),
        item.uom.clone(),
        item.site_short_code.clone(),
        item.system.clone(),
        item.equipment_unit.clone(),
        item.subunit.clone(),
        item.equipment_component.clone(),
        item.equipment_measurement.clone(),
        item.ude.clone(),
        item.sap_equipment_id.clone(),
    ]);
    for col in extra_columns {
        let values: Vec<&str> =
            item.tags.iter().filter(|t| &t.name == col).map(|t| t.value.as_str()).collect();
        row.push(values.join(","));
    }
    row
}
