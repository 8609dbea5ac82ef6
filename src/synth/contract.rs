//! The temporal-history contract
//!
//! One dialect-independent description of what a live-row mutation does to
//! the history table. The trigger templates in [`history`](super::history)
//! are rendered from these steps, and [`HistoryLedger`] interprets the same
//! steps in memory so the contract itself can be tested without a database.

use crate::dialect::Dialect;
use std::collections::{BTreeMap, BTreeSet};

/// Live-table operation a trigger reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Insert, Operation::Update, Operation::Delete];

    /// Value stored in the history operation column
    pub fn code(&self) -> char {
        match self {
            Operation::Insert => 'I',
            Operation::Update => 'U',
            Operation::Delete => 'D',
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Row image a step reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowImage {
    Old,
    New,
}

impl RowImage {
    /// How a trigger body refers to a column of this image
    pub fn reference(&self, dialect: Dialect, column: &str) -> String {
        match (dialect, self) {
            (Dialect::Oracle, RowImage::Old) => format!(":old.{}", column),
            (Dialect::Oracle, RowImage::New) => format!(":new.{}", column),
            (Dialect::Postgres, RowImage::Old) => format!("old.{}", column),
            (Dialect::Postgres, RowImage::New) => format!("new.{}", column),
            (Dialect::Hsql, RowImage::Old) => format!("oldrow.{}", column),
            (Dialect::Hsql, RowImage::New) => format!("newrow.{}", column),
        }
    }
}

/// One effect on the history table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStep {
    /// Set `invalidated_at` on the open row of the key taken from `image`
    CloseOpen { image: RowImage },
    /// Append a row copied from `image`; a born-closed row is invalidated at once
    Append {
        operation: Operation,
        image: RowImage,
        born_closed: bool,
    },
}

/// When a transition applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    /// At least one history-relevant column differs, NULL vs NULL reading as unchanged
    RelevantColumnsChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub operation: Operation,
    pub guard: Guard,
    pub steps: &'static [ContractStep],
}

pub const TRANSITIONS: [Transition; 3] = [
    Transition {
        operation: Operation::Insert,
        guard: Guard::Always,
        steps: &[ContractStep::Append {
            operation: Operation::Insert,
            image: RowImage::New,
            born_closed: false,
        }],
    },
    Transition {
        operation: Operation::Update,
        guard: Guard::RelevantColumnsChanged,
        steps: &[
            ContractStep::CloseOpen {
                image: RowImage::Old,
            },
            ContractStep::Append {
                operation: Operation::Update,
                image: RowImage::New,
                born_closed: false,
            },
        ],
    },
    Transition {
        operation: Operation::Delete,
        guard: Guard::Always,
        steps: &[
            ContractStep::CloseOpen {
                image: RowImage::Old,
            },
            ContractStep::Append {
                operation: Operation::Delete,
                image: RowImage::Old,
                born_closed: true,
            },
        ],
    },
];

/// The transition for one operation
pub fn transition(operation: Operation) -> &'static Transition {
    match operation {
        Operation::Insert => &TRANSITIONS[0],
        Operation::Update => &TRANSITIONS[1],
        Operation::Delete => &TRANSITIONS[2],
    }
}

/// A live row: column -> value, `None` being SQL NULL
pub type Row = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub history_id: u64,
    pub key: Vec<Option<String>>,
    pub values: Row,
    pub operation: Operation,
    pub timestamp: u64,
    pub invalidated_at: Option<u64>,
}

/// In-memory interpreter of [`TRANSITIONS`]
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    key_columns: Vec<String>,
    relevant: BTreeSet<String>,
    rows: Vec<HistoryRow>,
    next_id: u64,
}

impl HistoryLedger {
    pub fn new(key_columns: Vec<String>, relevant: impl IntoIterator<Item = String>) -> Self {
        Self {
            key_columns,
            relevant: relevant.into_iter().collect(),
            rows: Vec::new(),
            next_id: 1,
        }
    }

    /// Apply one live-row mutation at transaction time `timestamp`
    pub fn apply(&mut self, operation: Operation, old: Option<&Row>, new: Option<&Row>, timestamp: u64) {
        let transition = transition(operation);
        if transition.guard == Guard::RelevantColumnsChanged && !self.relevant_changed(old, new) {
            return;
        }
        for step in transition.steps {
            match *step {
                ContractStep::CloseOpen { image } => {
                    let key = self.key_of(pick(image, old, new));
                    for row in self.rows.iter_mut() {
                        if row.key == key && row.invalidated_at.is_none() {
                            row.invalidated_at = Some(timestamp);
                        }
                    }
                }
                ContractStep::Append {
                    operation,
                    image,
                    born_closed,
                } => {
                    let values = pick(image, old, new).cloned().unwrap_or_default();
                    let key = self.key_of(Some(&values));
                    self.rows.push(HistoryRow {
                        history_id: self.next_id,
                        key,
                        values,
                        operation,
                        timestamp,
                        invalidated_at: born_closed.then_some(timestamp),
                    });
                    self.next_id += 1;
                }
            }
        }
    }

    pub fn insert(&mut self, row: &Row, timestamp: u64) {
        self.apply(Operation::Insert, None, Some(row), timestamp);
    }

    pub fn update(&mut self, old: &Row, new: &Row, timestamp: u64) {
        self.apply(Operation::Update, Some(old), Some(new), timestamp);
    }

    pub fn delete(&mut self, old: &Row, timestamp: u64) {
        self.apply(Operation::Delete, Some(old), None, timestamp);
    }

    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    /// History rows of one natural key, oldest first
    pub fn rows_for(&self, key: &[Option<String>]) -> Vec<&HistoryRow> {
        self.rows.iter().filter(|r| r.key == key).collect()
    }

    /// Rows of one key that are still open
    pub fn open_rows(&self, key: &[Option<String>]) -> Vec<&HistoryRow> {
        self.rows
            .iter()
            .filter(|r| r.key == key && r.invalidated_at.is_none())
            .collect()
    }

    fn key_of(&self, row: Option<&Row>) -> Vec<Option<String>> {
        self.key_columns
            .iter()
            .map(|c| row.and_then(|r| r.get(c).cloned().flatten()))
            .collect()
    }

    fn relevant_changed(&self, old: Option<&Row>, new: Option<&Row>) -> bool {
        self.relevant.iter().any(|column| {
            let before = old.and_then(|r| r.get(column)).cloned().flatten();
            let after = new.and_then(|r| r.get(column)).cloned().flatten();
            before != after
        })
    }
}

fn pick<'a>(image: RowImage, old: Option<&'a Row>, new: Option<&'a Row>) -> Option<&'a Row> {
    match image {
        RowImage::Old => old,
        RowImage::New => new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Option<&str>)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    fn ledger() -> HistoryLedger {
        HistoryLedger::new(
            vec!["id".to_string()],
            vec!["id".to_string(), "name".to_string()],
        )
    }

    #[test]
    fn test_insert_opens_a_row() {
        let mut ledger = ledger();
        ledger.insert(&row(&[("id", Some("1")), ("name", Some("a"))]), 10);
        let key = vec![Some("1".to_string())];
        assert_eq!(ledger.rows_for(&key).len(), 1);
        assert_eq!(ledger.open_rows(&key)[0].operation, Operation::Insert);
    }

    #[test]
    fn test_null_to_null_is_unchanged() {
        let mut ledger = ledger();
        let before = row(&[("id", Some("1")), ("name", None), ("modified_at", Some("x"))]);
        let after = row(&[("id", Some("1")), ("name", None), ("modified_at", Some("y"))]);
        ledger.insert(&before, 1);
        ledger.update(&before, &after, 2);
        assert_eq!(ledger.rows().len(), 1);
    }

    #[test]
    fn test_delete_is_born_closed() {
        let mut ledger = ledger();
        let r = row(&[("id", Some("1")), ("name", Some("a"))]);
        ledger.insert(&r, 1);
        ledger.delete(&r, 2);
        let key = vec![Some("1".to_string())];
        let rows = ledger.rows_for(&key);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].invalidated_at, Some(2));
        assert_eq!(rows[1].operation, Operation::Delete);
        assert_eq!(rows[1].invalidated_at, Some(2));
        assert!(ledger.open_rows(&key).is_empty());
    }

    #[test]
    fn test_every_transition_appends_once() {
        for t in TRANSITIONS {
            let appends = t
                .steps
                .iter()
                .filter(|s| matches!(s, ContractStep::Append { .. }))
                .count();
            assert_eq!(appends, 1, "{:?}", t.operation);
        }
    }
}
