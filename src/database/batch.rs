//! Helpers for building chunked multi-row statements

use std::collections::HashMap;
use std::fmt::Write as _;
use std::hash::Hash;

// PostgreSQL caps a statement at 65535 bind parameters
const MAX_PARAMS: usize = 65000;

/// Rows per statement: the configured chunk size, capped by the parameter limit
pub(crate) fn rows_per_chunk(chunk_size: usize, params_per_row: usize) -> usize {
    chunk_size.clamp(1, MAX_PARAMS / params_per_row.max(1))
}

/// Append `($1, $2, ...), (...)` for `rows` rows of `params_per_row` placeholders
pub(crate) fn push_values(query: &mut String, rows: usize, params_per_row: usize) {
    for row in 0..rows {
        if row > 0 {
            query.push_str(", ");
        }
        query.push('(');
        for col in 0..params_per_row {
            if col > 0 {
                query.push_str(", ");
            }
            let _ = write!(query, "${}", row * params_per_row + col + 1);
        }
        query.push(')');
    }
}

/// Like [`push_values`] but with explicit casts, for `UPDATE ... FROM (VALUES ...)`
pub(crate) fn push_typed_values(query: &mut String, rows: usize, types: &[&str]) {
    for row in 0..rows {
        if row > 0 {
            query.push_str(", ");
        }
        query.push('(');
        for (col, ty) in types.iter().enumerate() {
            if col > 0 {
                query.push_str(", ");
            }
            let _ = write!(query, "${}::{ty}", row * types.len() + col + 1);
        }
        query.push(')');
    }
}

/// Collapse rows sharing a key, keeping the newest by `newer`
///
/// A single statement cannot touch the same conflict key twice.
pub(crate) fn dedup_latest<T, K, F, O>(rows: &[T], key: F, order: O) -> Vec<&T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
    O: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    let mut latest: HashMap<K, &T> = HashMap::with_capacity(rows.len());
    for row in rows {
        latest
            .entry(key(row))
            .and_modify(|current| {
                if order(row) > order(current) {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    let deduped: Vec<&T> = latest.into_values().collect();
    if deduped.len() != rows.len() {
        tracing::debug!(
            "Deduplicated batch: {} -> {} ({} duplicates removed)",
            rows.len(),
            deduped.len(),
            rows.len() - deduped.len()
        );
    }
    deduped
}
