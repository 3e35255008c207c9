//! Read-side view of a stream with its compensation records applied.

use chrono::{DateTime, Utc};
use crosstx_core::{Row, StoreError, StoreResult};

use super::{CORRECTED_AT, DELETED_AT, OPERATION_ID, REASON};

/// Project `row` onto `fields`.
pub fn primary_key_of(row: &Row, fields: &[&str]) -> StoreResult<Row> {
    let mut key = Row::new();
    for field in fields {
        let value = row
            .get(*field)
            .ok_or_else(|| StoreError::MissingPrimaryKey {
                field: (*field).to_string(),
            })?;
        key.insert((*field).to_string(), value.clone());
    }
    Ok(key)
}

/// Rows of a stream minus every row whose key appears in `tombstones`.
///
/// Ignores time, so a key that was tombstoned once stays hidden even if it
/// is inserted again later. Streams that reuse primary keys should carry a
/// write timestamp and use [`apply_tombstones_written_at`].
#[must_use]
pub fn apply_tombstones(rows: &[Row], tombstones: &[Row], primary_key_fields: &[&str]) -> Vec<Row> {
    let deleted: Vec<Row> = tombstones
        .iter()
        .filter_map(|t| primary_key_of(t, primary_key_fields).ok())
        .collect();

    rows.iter()
        .filter(|row| match primary_key_of(row, primary_key_fields) {
            Ok(key) => !deleted.contains(&key),
            Err(_) => true,
        })
        .cloned()
        .collect()
}

/// Rows of a stream minus every row tombstoned at or after it was written.
///
/// A row's write time is read from `written_at_field`. Rows without a
/// readable write time, and tombstones without a readable `deleted_at`, fall
/// back to the timeless matching of [`apply_tombstones`].
#[must_use]
pub fn apply_tombstones_written_at(
    rows: &[Row],
    tombstones: &[Row],
    primary_key_fields: &[&str],
    written_at_field: &str,
) -> Vec<Row> {
    let deleted: Vec<(Row, Option<DateTime<Utc>>)> = tombstones
        .iter()
        .filter_map(|t| {
            let key = primary_key_of(t, primary_key_fields).ok()?;
            Some((key, timestamp(t, DELETED_AT)))
        })
        .collect();

    rows.iter()
        .filter(|row| {
            let Ok(key) = primary_key_of(row, primary_key_fields) else {
                return true;
            };
            let written_at = timestamp(row, written_at_field);
            !deleted.iter().any(|(deleted_key, deleted_at)| {
                *deleted_key == key
                    && match (written_at, deleted_at) {
                        (Some(written), Some(deleted)) => *deleted >= written,
                        _ => true,
                    }
            })
        })
        .cloned()
        .collect()
}

/// Rows of a stream with the newest matching correction merged into each.
///
/// Corrections are ranked by `corrected_at`; on a tie the one written later
/// wins.
#[must_use]
pub fn apply_corrections(rows: &[Row], corrections: &[Row], primary_key_fields: &[&str]) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            let Ok(key) = primary_key_of(row, primary_key_fields) else {
                return row.clone();
            };
            let newest = corrections
                .iter()
                .filter(|c| primary_key_of(c, primary_key_fields).is_ok_and(|k| k == key))
                .fold(None::<&Row>, |best, candidate| match best {
                    Some(best) if corrected_at(best) > corrected_at(candidate) => Some(best),
                    _ => Some(candidate),
                });

            let mut corrected = row.clone();
            if let Some(correction) = newest {
                for (field, value) in correction {
                    if !is_marker(field) {
                        corrected.insert(field.clone(), value.clone());
                    }
                }
            }
            corrected
        })
        .collect()
}

fn corrected_at(row: &Row) -> &str {
    row.get(CORRECTED_AT)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
}

fn timestamp(row: &Row, field: &str) -> Option<DateTime<Utc>> {
    let raw = row.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn is_marker(field: &str) -> bool {
    [CORRECTED_AT, DELETED_AT, OPERATION_ID, REASON].contains(&field)
}
