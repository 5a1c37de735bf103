//! Collapsing rows that share a primary key.
//!
//! When several rows share a key, the one from the most recent bronze load
//! wins; ties within a load go to the smallest record id. Rows without an
//! origin lose to rows with one.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::warn;

use crate::models::{KeyPart, PkColumn, SilverRow};

/// Result of [`deduplicate`].
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// One row per distinct key, in first-seen key order.
    pub unique: Vec<SilverRow>,
    /// Every member of every group with more than one row, sorted by all
    /// columns.
    pub duplicates: Vec<SilverRow>,
}

/// Reduce `rows` to one row per `pk` tuple.
pub fn deduplicate(rows: Vec<SilverRow>, pk: &[PkColumn]) -> DedupOutcome {
    let mut groups: HashMap<Vec<KeyPart>, Vec<SilverRow>> = HashMap::new();
    let mut order: Vec<Vec<KeyPart>> = Vec::new();

    for row in rows {
        let key = row.key(pk);
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push(row);
    }

    let mut outcome = DedupOutcome::default();
    for key in order {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        if group.len() > 1 {
            outcome.duplicates.extend(group.iter().cloned());
            group.sort_by(preference);
        }
        if let Some(winner) = group.into_iter().next() {
            outcome.unique.push(winner);
        }
    }

    outcome.duplicates.sort_by(|a, b| a.display_cmp(b));

    if !outcome.duplicates.is_empty() {
        warn!(
            "Deduplicating {} rows into {} distinct keys",
            outcome.duplicates.len(),
            count_keys(&outcome.duplicates, pk)
        );
        for row in &outcome.duplicates {
            warn!("  {}", row);
        }
    }

    outcome
}

fn count_keys(rows: &[SilverRow], pk: &[PkColumn]) -> usize {
    let mut keys: Vec<Vec<KeyPart>> = rows.iter().map(|r| r.key(pk)).collect();
    keys.sort();
    keys.dedup();
    keys.len()
}

/// Orders the preferred row first.
fn preference(a: &SilverRow, b: &SilverRow) -> Ordering {
    match (&a.origin, &b.origin) {
        (Some(x), Some(y)) => y
            .load_id
            .cmp(&x.load_id)
            .then_with(|| x.record_id.cmp(&y.record_id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
