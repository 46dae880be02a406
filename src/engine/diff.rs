//! Change detection between a fresh preview and the last import.
//!
//! Both passes only read history. [`annotate_updates`] is a timestamp
//! heuristic: a missing or unparseable timestamp on either side means "not
//! updated". [`diff_fields`] compares the canonical field list and wins over
//! the heuristic whenever it finds a difference.

use crate::models::{ChangedField, DiffField, FieldSnapshot, HistoryEntry, PreviewRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

pub const UPDATED_MESSAGE: &str = "Data updated after last import";
pub const FIELDS_CHANGED_MESSAGE: &str = "Fields changed since last import";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

/// Parse a feed timestamp, normalised to UTC when it carries an offset
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    ["%Y-%m-%d", "%d-%m-%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn is_newer(current: &str, previous: &str) -> bool {
    match (parse_timestamp(current), parse_timestamp(previous)) {
        (Some(current), Some(previous)) => current > previous,
        _ => false,
    }
}

/// Flag records whose modification time is later than the last import.
///
/// With no history at all the records are left untouched.
pub fn annotate_updates(records: &mut [PreviewRecord], history: &BTreeMap<String, HistoryEntry>) {
    if history.is_empty() {
        return;
    }

    for record in records.iter_mut() {
        let updated = history
            .get(&record.property_id)
            .map(|entry| is_newer(&record.last_modified, &entry.last_modified))
            .unwrap_or(false);

        record.is_updated = updated;
        record.update_message = updated.then(|| UPDATED_MESSAGE.to_string());
    }
}

/// Compare every diffable field with the last imported snapshot.
///
/// `changed_fields` is rebuilt from scratch, so running this twice gives the
/// same result. Fields empty on both sides never count as changed.
pub fn diff_fields(records: &mut [PreviewRecord], details: &BTreeMap<String, FieldSnapshot>) {
    if details.is_empty() {
        return;
    }

    for record in records.iter_mut() {
        record.changed_fields.clear();

        let Some(previous) = details.get(&record.property_id) else {
            continue;
        };

        record.changed_fields = changed_fields(record, previous);
        if !record.changed_fields.is_empty() {
            debug!(
                "Property {} has {} changed fields",
                record.property_id,
                record.changed_fields.len()
            );
            record.is_updated = true;
            record.update_message = Some(FIELDS_CHANGED_MESSAGE.to_string());
        }
    }
}

fn changed_fields(record: &PreviewRecord, previous: &FieldSnapshot) -> Vec<ChangedField> {
    DiffField::ALL
        .iter()
        .filter_map(|&field| {
            let current = record.field(field);
            let old = previous.get(field);
            if (current.is_empty() && old.is_empty()) || current == old {
                return None;
            }
            Some(ChangedField {
                field_label: field.label().to_string(),
                old_value: old.to_string(),
                new_value: current.to_string(),
            })
        })
        .collect()
}
