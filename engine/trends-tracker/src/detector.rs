//! Change detection between a freshly scraped record and the latest stored one
//!
//! Comparison is zero-tolerance: any difference in a monitored
//! percentage, however small, counts as a trend movement worth persisting.
//! A missing value is never compared as zero. A field missing on both sides is
//! unchanged, and a field missing on exactly one side has appeared or
//! disappeared, which is a change.

use serde::Serialize;
use std::fmt;

use crate::types::{PlayerTrendRecord, TrackedField};

/// Old and new value of one field that differs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValues {
    Numeric { old: Option<f64>, new: Option<f64> },
    Text { old: String, new: String },
}

/// One differing field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: TrackedField,
    pub values: FieldValues,
}

/// Result of comparing a new record with its previous version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeDecision {
    /// True when the record should be persisted
    pub changed: bool,
    /// Every monitored field that differs, in `TrackedField` order
    pub diff: Vec<FieldChange>,
    baseline: bool,
}

impl ChangeDecision {
    /// Decision for a player with no stored record for the week
    pub fn baseline() -> Self {
        Self { changed: true, diff: Vec::new(), baseline: true }
    }

    /// True when there was no previous record to compare against
    pub fn is_baseline(&self) -> bool {
        self.baseline
    }

    /// Look up the change for a single field
    pub fn get(&self, field: TrackedField) -> Option<&FieldValues> {
        self.diff.iter().find(|change| change.field == field).map(|change| &change.values)
    }
}

impl fmt::Display for ChangeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.baseline {
            return f.write_str("new baseline");
        }
        if !self.changed {
            return f.write_str("unchanged");
        }

        for (i, change) in self.diff.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &change.values {
                FieldValues::Numeric { old, new } => {
                    write!(f, "{}: {} -> {}", change.field, fmt_metric(*old), fmt_metric(*new))?
                }
                FieldValues::Text { old, new } => {
                    write!(f, "{}: {old:?} -> {new:?}", change.field)?
                }
            }
        }
        Ok(())
    }
}

/// Compare a new record against the latest stored record for the same player and week
pub fn decide(new: &PlayerTrendRecord, previous: Option<&PlayerTrendRecord>) -> ChangeDecision {
    let Some(previous) = previous else {
        return ChangeDecision::baseline();
    };

    let mut diff: Vec<FieldChange> = TrackedField::NUMERIC
        .iter()
        .filter_map(|&field| {
            let old = previous.metric(field);
            let new = new.metric(field);
            metric_changed(old, new)
                .then_some(FieldChange { field, values: FieldValues::Numeric { old, new } })
        })
        .collect();

    if previous.opponent != new.opponent {
        diff.push(FieldChange {
            field: TrackedField::Opponent,
            values: FieldValues::Text { old: previous.opponent.clone(), new: new.opponent.clone() },
        });
    }

    ChangeDecision { changed: !diff.is_empty(), diff, baseline: false }
}

/// Zero-tolerance comparison with missing-value semantics
pub fn metric_changed(old: Option<f64>, new: Option<f64>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(old), Some(new)) => (old - new).abs() > 0.0,
        _ => true,
    }
}

fn fmt_metric(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "missing".to_string())
}
