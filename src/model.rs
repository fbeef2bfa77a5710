//! Record model: the registry `Stream` document, its `Tag`s, and the flat
//! `Item` projection used at the CSV boundary.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::date::{format_utc, stamp_after};

/// Name/value annotation attached to a stream. Equality is structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Registry document for one sensor stream. Field names follow the
/// registry's JSON layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    #[serde(default)]
    pub registry_type: String,
    #[serde(default)]
    pub index: i64,
    pub site_code: String,
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub stream_name: String,
    pub sensor_id: String,
    #[serde(rename = "uom", default)]
    pub unit_of_measure: String,
    #[serde(default)]
    pub scale_factor: i64,
    #[serde(default)]
    pub precision: i64,
    #[serde(default)]
    pub min_value: i64,
    #[serde(default)]
    pub max_value: i64,
    #[serde(default)]
    pub lo_lo: i64,
    #[serde(default)]
    pub lo: i64,
    #[serde(default)]
    pub hi: i64,
    #[serde(default)]
    pub hi_hi: i64,
    #[serde(default)]
    pub step: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default)]
    pub created_utc: String,
    #[serde(default)]
    pub updated_utc: String,
}

/// Fields compared when deciding whether a registry record needs an update.
/// Identity (`sensorId`, `siteCode`) already matched through the lookup.
/// `registryType` and `index` are intentionally not compared: this list is
/// exactly what a full update overwrites, so an updated record compares equal
/// on the next run.
pub const COMPARABLE_FIELDS: &[&str] = &[
    "process",
    "streamName",
    "uom",
    "scaleFactor",
    "precision",
    "minValue",
    "maxValue",
    "loLo",
    "lo",
    "hi",
    "hiHi",
];

/// Fields an update never writes, whatever the policy.
pub const PRESERVED_ON_UPDATE: &[&str] = &["id", "sensorId", "siteCode", "createdBy", "createdUtc"];

/// Who performed a mutation, and when.
#[derive(Clone, Debug)]
pub struct AuditStamp {
    pub user: String,
    pub at: OffsetDateTime,
}

impl AuditStamp {
    pub fn now(user: impl Into<String>) -> Self {
        Self { user: user.into(), at: OffsetDateTime::now_utc() }
    }
}

/// How much of a registry record an update may overwrite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Only the tag union and the update audit stamp change.
    #[default]
    TagsOnly,
    /// Every comparable field is overwritten, tags are unioned.
    FullFieldUpdate,
}

/// Tag-set comparison mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TagMatch {
    /// Both sides hold exactly the same set of tags.
    Strict,
    /// Every incoming tag is already present on the registry record.
    #[default]
    Covers,
}

impl Stream {
    /// A fresh record with a new identity and the registry defaults.
    pub fn new(stamp: &AuditStamp) -> Self {
        let now = format_utc(stamp.at);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            registry_type: "stream".to_string(),
            index: 1,
            site_code: String::new(),
            process: String::new(),
            stream_name: String::new(),
            sensor_id: String::new(),
            unit_of_measure: String::new(),
            scale_factor: 0,
            precision: 0,
            min_value: 0,
            max_value: 0,
            lo_lo: 0,
            lo: 0,
            hi: 0,
            hi_hi: 0,
            step: true,
            tags: Vec::new(),
            status: "active".to_string(),
            version: 1,
            created_by: stamp.user.clone(),
            updated_by: stamp.user.clone(),
            created_utc: now.clone(),
            updated_utc: now,
        }
    }

    /// Names of comparable fields whose values differ, in `COMPARABLE_FIELDS` order.
    pub fn field_diff(&self, other: &Stream) -> Vec<&'static str> {
        let checks = [
            self.process == other.process,
            self.stream_name == other.stream_name,
            self.unit_of_measure == other.unit_of_measure,
            self.scale_factor == other.scale_factor,
            self.precision == other.precision,
            self.min_value == other.min_value,
            self.max_value == other.max_value,
            self.lo_lo == other.lo_lo,
            self.lo == other.lo,
            self.hi == other.hi,
            self.hi_hi == other.hi_hi,
        ];
        COMPARABLE_FIELDS
            .iter()
            .zip(checks)
            .filter(|(_, same)| !same)
            .map(|(name, _)| *name)
            .collect()
    }

    /// True when `incoming` carries nothing this registry record lacks.
    pub fn matches(&self, incoming: &Stream, mode: TagMatch) -> bool {
        self.field_diff(incoming).is_empty() && tags_match(&self.tags, &incoming.tags, mode)
    }

    /// Merge `incoming` into this registry record under `policy`, then stamp
    /// the update. Identity and creation audit are left untouched.
    pub fn merge_from(&mut self, incoming: &Stream, policy: UpdatePolicy, stamp: &AuditStamp) {
        if policy == UpdatePolicy::FullFieldUpdate {
            self.process = incoming.process.clone();
            self.stream_name = incoming.stream_name.clone();
            self.unit_of_measure = incoming.unit_of_measure.clone();
            self.scale_factor = incoming.scale_factor;
            self.precision = incoming.precision;
            self.min_value = incoming.min_value;
            self.max_value = incoming.max_value;
            self.lo_lo = incoming.lo_lo;
            self.lo = incoming.lo;
            self.hi = incoming.hi;
            self.hi_hi = incoming.hi_hi;
        }
        union_tags(&mut self.tags, &incoming.tags);
        self.touch(stamp);
    }

    /// Refresh the update audit fields.
    pub fn touch(&mut self, stamp: &AuditStamp) {
        self.updated_by = stamp.user.clone();
        self.updated_utc = stamp_after(&self.updated_utc, stamp.at);
    }

    /// `(field, value)` pairs for `PRESERVED_ON_UPDATE`, in that order.
    pub fn preserved_values(&self) -> Vec<(&'static str, &str)> {
        let values = [
            self.id.as_str(),
            self.sensor_id.as_str(),
            self.site_code.as_str(),
            self.created_by.as_str(),
            self.created_utc.as_str(),
        ];
        PRESERVED_ON_UPDATE.iter().copied().zip(values).collect()
    }

    /// Values of every tag named `name`, in record order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter(move |t| t.name == name).map(|t| t.value.as_str())
    }
}

/// Compare two tag collections, ignoring order and duplicate entries.
/// In `Covers` mode, `stored` must contain every tag of `incoming`.
pub fn tags_match(stored: &[Tag], incoming: &[Tag], mode: TagMatch) -> bool {
    let stored_set: AHashSet<&Tag> = stored.iter().collect();
    let incoming_set: AHashSet<&Tag> = incoming.iter().collect();
    match mode {
        TagMatch::Strict => stored_set == incoming_set,
        TagMatch::Covers => incoming_set.is_subset(&stored_set),
    }
}

/// Append every tag of `extra` not already present by name+value. Existing
/// duplicates in `into` are collapsed as well.
pub fn union_tags(into: &mut Vec<Tag>, extra: &[Tag]) {
    let mut seen: AHashSet<Tag> = AHashSet::with_capacity(into.len() + extra.len());
    into.retain(|t| seen.insert(t.clone()));
    for t in extra {
        if seen.insert(t.clone()) {
            into.push(t.clone());
        }
    }
}

/// Flat CSV projection of a stream: one string per schema column plus every
/// tag the row carried.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Item {
    pub site_code: String,
    pub sensor_id: String,
    pub name: String,
    pub process: String,
    pub min_value: String,
    pub max_value: String,
    pub uom: String,
    pub site_short_code: String,
    pub system: String,
    pub equipment_unit: String,
    pub subunit: String,
    pub equipment_component: String,
    pub equipment_measurement: String,
    pub ude: String,
    pub sap_equipment_id: String,
    pub tags: Vec<Tag>,
}
