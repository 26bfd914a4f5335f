//! Parsed datasets handed between fetch, validation and the sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One parsed record: column name to JSON value.
pub type Row = Map<String, Value>;

/// Anything a fetch operation can return. Empty payloads are a successful
/// fetch that still does not win a fallback resolution.
pub trait Payload {
    fn is_empty(&self) -> bool;
}

impl<T> Payload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

/// Ordered collection of parsed rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl Payload for Dataset {
    fn is_empty(&self) -> bool {
        Dataset::is_empty(self)
    }
}

impl FromIterator<Row> for Dataset {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for Dataset {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
