//! Conflict-safe merge planning.
//!
//! Fetched rows are compared field-by-field against any stored row sharing
//! their primary key, under a fixed 6-decimal rounding. A stored value that
//! diverges from the fetched one fails the entire merge: history is never
//! silently rewritten, not even for the keys that agreed.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use thiserror::Error;

use barvault_store::{BarRow, MoneyflowRow};

/// Rounding precision applied to every numeric field before comparison.
pub const ROUND_DECIMALS: i32 = 6;

fn round_for_compare(value: f64) -> f64 {
    let scale = 10f64.powi(ROUND_DECIMALS);
    (value * scale).round() / scale
}

fn equal_under_rounding(stored: Option<f64>, fetched: Option<f64>) -> bool {
    match (stored, fetched) {
        (None, None) => true,
        (Some(stored), Some(fetched)) => {
            round_for_compare(stored) == round_for_compare(fetched)
        }
        _ => false,
    }
}

/// Row shape the resolver can compare: a (date, instrument) key plus an
/// ordered list of named numeric fields.
pub trait KeyedNumericRow {
    fn key(&self) -> (&str, &str);
    fn numeric_columns(&self) -> Vec<(&'static str, Option<f64>)>;
}

impl KeyedNumericRow for BarRow {
    fn key(&self) -> (&str, &str) {
        (&self.trade_date, &self.instrument_code)
    }

    fn numeric_columns(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("vol", self.vol),
            ("amount", self.amount),
            ("adj_factor", self.adj_factor),
        ]
    }
}

impl KeyedNumericRow for MoneyflowRow {
    fn key(&self) -> (&str, &str) {
        (&self.trade_date, &self.instrument_code)
    }

    fn numeric_columns(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("buy_sm_amount", self.buy_sm_amount),
            ("sell_sm_amount", self.sell_sm_amount),
            ("buy_md_amount", self.buy_md_amount),
            ("sell_md_amount", self.sell_md_amount),
            ("buy_lg_amount", self.buy_lg_amount),
            ("sell_lg_amount", self.sell_lg_amount),
            ("buy_elg_amount", self.buy_elg_amount),
            ("sell_elg_amount", self.sell_elg_amount),
            ("net_mf_amount", self.net_mf_amount),
        ]
    }
}

/// One divergent field between a stored row and a fetched candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub trade_date: String,
    pub instrument_code: String,
    pub column: &'static str,
    pub stored: Option<f64>,
    pub fetched: Option<f64>,
}

impl Display for FieldConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}: stored={:?} fetched={:?}",
            self.trade_date, self.instrument_code, self.column, self.stored, self.fetched
        )
    }
}

/// Stored history and the fetched candidate disagree. The whole merge for the
/// fetch call is refused; nothing from the candidate set is inserted.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct DataConflict {
    pub conflicts: Vec<FieldConflict>,
}

impl Display for DataConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.conflicts.first() {
            Some(first) if self.conflicts.len() == 1 => {
                write!(f, "data conflict: {first}")
            }
            Some(first) => write!(
                f,
                "data conflict: {first} (+{} more)",
                self.conflicts.len() - 1
            ),
            None => f.write_str("data conflict"),
        }
    }
}

/// Outcome of a successful comparison pass: rows to insert, plus how many
/// candidates matched existing rows and need nothing (idempotent re-write).
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan<R> {
    pub to_insert: Vec<R>,
    pub unchanged: usize,
}

/// Plans merges of fetched rows into stored history.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Compare `fetched` candidates against `existing` rows by primary key.
    ///
    /// Every divergence across the whole candidate set is collected before
    /// failing, so the error names each offending (date, instrument, column).
    pub fn plan<R>(existing: &[R], fetched: Vec<R>) -> Result<MergePlan<R>, DataConflict>
    where
        R: KeyedNumericRow,
    {
        let by_key: HashMap<(&str, &str), &R> =
            existing.iter().map(|row| (row.key(), row)).collect();

        let mut to_insert = Vec::new();
        let mut unchanged = 0usize;
        let mut conflicts = Vec::new();

        for candidate in fetched {
            let Some(stored) = by_key.get(&candidate.key()) else {
                to_insert.push(candidate);
                continue;
            };

            let stored_columns = stored.numeric_columns();
            let mut diverged = false;
            for (index, (column, fetched_value)) in
                candidate.numeric_columns().into_iter().enumerate()
            {
                let (_, stored_value) = stored_columns[index];
                if !equal_under_rounding(stored_value, fetched_value) {
                    diverged = true;
                    let (trade_date, instrument_code) = candidate.key();
                    conflicts.push(FieldConflict {
                        trade_date: trade_date.to_owned(),
                        instrument_code: instrument_code.to_owned(),
                        column,
                        stored: stored_value,
                        fetched: fetched_value,
                    });
                }
            }

            if !diverged {
                unchanged += 1;
            }
        }

        if conflicts.is_empty() {
            Ok(MergePlan {
                to_insert,
                unchanged,
            })
        } else {
            Err(DataConflict { conflicts })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> BarRow {
        BarRow {
            trade_date: date.to_string(),
            instrument_code: "600000.SH".to_string(),
            open: Some(10.0),
            high: Some(10.5),
            low: Some(9.8),
            close: Some(close),
            vol: Some(1000.0),
            amount: Some(10_200.0),
            adj_factor: Some(1.0),
        }
    }

    #[test]
    fn new_keys_are_queued_for_insert() {
        let existing = vec![bar("20240102", 10.0)];
        let plan = ConflictResolver::plan(
            &existing,
            vec![bar("20240103", 10.1), bar("20240104", 10.2)],
        )
        .expect("no conflict");
        assert_eq!(plan.to_insert.len(), 2);
        assert_eq!(plan.unchanged, 0);
    }

    #[test]
    fn identical_rows_are_idempotent_noops() {
        let existing = vec![bar("20240102", 10.0)];
        let plan =
            ConflictResolver::plan(&existing, vec![bar("20240102", 10.0)]).expect("no conflict");
        assert!(plan.to_insert.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn equality_is_tolerant_to_sub_rounding_noise() {
        let existing = vec![bar("20240102", 10.0)];
        let plan = ConflictResolver::plan(&existing, vec![bar("20240102", 10.000_000_4)])
            .expect("within rounding tolerance");
        assert!(plan.to_insert.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn divergence_beyond_rounding_fails_the_whole_plan() {
        let existing = vec![bar("20240102", 10.0)];
        let error = ConflictResolver::plan(
            &existing,
            vec![bar("20240102", 10.000_001), bar("20240103", 10.1)],
        )
        .expect_err("must conflict");

        assert_eq!(error.conflicts.len(), 1);
        let conflict = &error.conflicts[0];
        assert_eq!(conflict.column, "close");
        assert_eq!(conflict.trade_date, "20240102");
        // The clean 20240103 candidate is not salvaged; the Err carries no plan.
    }

    #[test]
    fn null_versus_value_is_a_conflict() {
        let mut stored = bar("20240102", 10.0);
        stored.vol = None;
        let error = ConflictResolver::plan(&[stored], vec![bar("20240102", 10.0)])
            .expect_err("must conflict");
        assert_eq!(error.conflicts[0].column, "vol");
    }

    #[test]
    fn conflict_message_names_the_first_divergence() {
        let existing = vec![bar("20240102", 10.0)];
        let error = ConflictResolver::plan(&existing, vec![bar("20240102", 11.0)])
            .expect_err("must conflict");
        let message = error.to_string();
        assert!(message.contains("20240102"));
        assert!(message.contains("close"));
    }
}
