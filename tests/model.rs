#[path = "common/mod.rs"]
mod common;

use common::*;
use stream_ingest::{
    format_utc, parse_utc, stamp_after, tags_match, union_tags, AuditStamp, Stream, Tag, TagMatch, UpdatePolicy,
    COMPARABLE_FIELDS, PRESERVED_ON_UPDATE,
};
use time::macros::datetime;

/// Demonstrates the audit timestamp format and the monotonic update stamp.
/// Outcome: fixed microsecond precision with `Z`; a stamp never goes backwards.
#[test]
fn audit_timestamps_are_fixed_precision_and_monotonic() {
    let t = datetime!(2024-03-01 10:22:33.000123 UTC);
    assert_eq!(format_utc(t), "2024-03-01T10:22:33.000123Z");
    assert_eq!(parse_utc("2024-03-01T10:22:33.000123Z"), Some(t));
    assert_eq!(parse_utc("2024-03-01 10:22:33"), None);

    assert_eq!(stamp_after("2024-01-01T00:00:00.000000Z", t), "2024-03-01T10:22:33.000123Z");
    assert_eq!(stamp_after("2024-03-01T10:22:33.000123Z", t), "2024-03-01T10:22:33.000124Z");
    assert_eq!(stamp_after("garbage", t), "2024-03-01T10:22:33.000123Z");
}

/// Demonstrates tag-set semantics: order and duplicates do not matter, Covers
/// only asks that the stored side holds every incoming tag.
/// Outcome: Strict and Covers answer as documented; union de-duplicates.
#[test]
fn tag_sets_ignore_order_and_duplicates() {
    let a = vec![Tag::new("UDE", "1"), Tag::new("UDE", "2"), Tag::new("System", "X")];
    let b = vec![Tag::new("System", "X"), Tag::new("UDE", "2"), Tag::new("UDE", "1"), Tag::new("UDE", "1")];
    assert!(tags_match(&a, &b, TagMatch::Strict));

    let wider = vec![Tag::new("System", "X"), Tag::new("UDE", "1"), Tag::new("UDE", "2"), Tag::new("Area", "N")];
    assert!(tags_match(&wider, &a, TagMatch::Covers));
    assert!(!tags_match(&a, &wider, TagMatch::Covers));
    assert!(!tags_match(&wider, &a, TagMatch::Strict));

    let mut merged = b.clone();
    union_tags(&mut merged, &wider);
    assert_eq!(
        merged,
        vec![Tag::new("System", "X"), Tag::new("UDE", "2"), Tag::new("UDE", "1"), Tag::new("Area", "N")]
    );
}

/// Demonstrates that no update policy touches identity or creation audit, and
/// that only the full policy copies comparable fields.
/// Outcome: preserved fields identical; field diff empty only after a full merge.
#[test]
fn merge_preserves_identity_under_both_policies() {
    let stored = stored_from_row(&basic_row("S1", "T-1", "10"));
    let mut incoming = Stream::new(&AuditStamp::now("bob"));
    incoming.sensor_id = "T-1".into();
    incoming.site_code = "S1".into();
    incoming.process = "REF".into();
    incoming.min_value = -3;
    incoming.hi_hi = 900;
    incoming.tags = vec![Tag::new("Area", "N")];

    for policy in [UpdatePolicy::TagsOnly, UpdatePolicy::FullFieldUpdate] {
        let mut merged = stored.clone();
        merged.merge_from(&incoming, policy, &AuditStamp::now("bob"));

        assert_eq!(merged.preserved_values(), stored.preserved_values());
        assert_eq!(merged.updated_by, "bob");
        assert!(merged.tags.contains(&Tag::new("Area", "N")));
        assert!(merged.tags.contains(&Tag::new("SiteShortCode", "BH")));
        match policy {
            UpdatePolicy::TagsOnly => assert_eq!(merged.field_diff(&stored), Vec::<&str>::new()),
            UpdatePolicy::FullFieldUpdate => assert!(merged.field_diff(&incoming).is_empty()),
        }
    }
    assert_eq!(PRESERVED_ON_UPDATE.len(), 5);
    assert_eq!(stored.field_diff(&incoming), vec!["process", "streamName", "uom", "minValue", "maxValue", "hiHi"]);
    assert_eq!(COMPARABLE_FIELDS.len(), 11);
}

/// Demonstrates the registry JSON layout.
/// Outcome: camelCase names with `uom`, and documents missing optional fields
/// still decode.
#[test]
fn stream_json_uses_registry_field_names() {
    let s = stored_from_row(&basic_row("S1", "T-1", "10"));
    let v = serde_json::to_value(&s).unwrap();
    for key in ["id", "registryType", "siteCode", "streamName", "sensorId", "uom", "minValue", "hiHi", "createdUtc"] {
        assert!(v.get(key).is_some(), "missing {key}");
    }

    let sparse: Stream = serde_json::from_str(r#"{"id":"x","siteCode":"S1","sensorId":"T-1"}"#).unwrap();
    assert_eq!(sparse.sensor_id, "T-1");
    assert!(sparse.tags.is_empty());
}
