//! Read-only analytics over the accumulated record stream.

use crate::results::Record;
use serde::Serialize;
use std::collections::BTreeMap;

/// A point where the status differs from the previous record's
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    /// 1-based position of the record carrying the new status
    pub position: usize,
    pub previous: String,
    pub current: String,
}

/// Status change points of `records`, in input order
pub fn diff(records: &[Record]) -> Vec<StatusChange> {
    diff_statuses(records.iter().map(Record::status))
}

/// Change points of a status sequence
pub fn diff_statuses<I, S>(statuses: I) -> Vec<StatusChange>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut changes = Vec::new();
    let mut previous: Option<String> = None;

    for (idx, status) in statuses.into_iter().enumerate() {
        let status = status.as_ref();
        if let Some(prev) = &previous {
            if prev != status {
                changes.push(StatusChange {
                    position: idx + 1,
                    previous: prev.clone(),
                    current: status.to_string(),
                });
            }
        }
        previous = Some(status.to_string());
    }

    changes
}

/// Number of records per status
pub fn histogram(records: &[Record]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.status().to_string()).or_insert(0) += 1;
    }
    counts
}
