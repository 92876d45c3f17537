//! Output tables handed to the data sink.
//!
//! A table is a fixed header, zero or more data rows, an optional totals row
//! and a status. Fraction columns hold values in `[0, 1]`; rendering them as
//! percentages is the sink's job.

use serde::Serialize;

use super::types::AnalyticsError;

/// How a column's values should be interpreted by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
    Currency,
    Fraction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn opt(value: Option<f64>) -> Self {
        value.map_or(Self::Empty, Self::Number)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Whether the table carries computed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TableStatus {
    Ok,
    /// Input was available but produced no rows.
    NoData,
    /// Input (or a model the table needs) was unavailable.
    Unavailable { reason: String },
}

/// A feature table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Vec<Cell>>,
    pub status: TableStatus,
}

impl Table {
    pub fn new(name: &str, columns: &[Column]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.to_vec(),
            rows: Vec::new(),
            totals: None,
            status: TableStatus::Ok,
        }
    }

    /// Build the marked empty table for a degradation.
    pub fn from_error(err: &AnalyticsError, columns: &[Column]) -> Self {
        let (name, status) = match err {
            AnalyticsError::NoData { table } => (table, TableStatus::NoData),
            AnalyticsError::Unavailable { table, reason } => (
                table,
                TableStatus::Unavailable {
                    reason: reason.clone(),
                },
            ),
        };
        Self {
            status,
            ..Self::new(name, columns)
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width for {}", self.name);
        self.rows.push(row);
    }

    pub fn set_totals(&mut self, totals: Vec<Cell>) {
        debug_assert_eq!(totals.len(), self.columns.len(), "totals width for {}", self.name);
        self.totals = Some(totals);
    }

    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn is_ok(&self) -> bool {
        self.status == TableStatus::Ok
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell of the totals row by column name.
    pub fn total(&self, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.totals.as_ref().and_then(|t| t.get(idx))
    }

    /// Cell of data row `row` by column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[Column] = &[
        Column::new("key", ColumnKind::Text),
        Column::new("cost", ColumnKind::Currency),
    ];

    #[test]
    fn lookup_by_column_name() {
        let mut t = Table::new("demo", COLUMNS);
        t.push_row(vec![Cell::text("a"), Cell::from(2.0)]);
        t.set_totals(vec![Cell::text("Total"), Cell::from(2.0)]);
        assert_eq!(t.header(), vec!["key", "cost"]);
        assert_eq!(t.cell(0, "cost").and_then(Cell::as_number), Some(2.0));
        assert_eq!(t.total("key").and_then(Cell::as_text), Some("Total"));
        assert_eq!(t.cell(1, "cost"), None);
    }

    #[test]
    fn from_error_marks_status() {
        let err = AnalyticsError::Unavailable {
            table: "assets".into(),
            reason: "feed failed".into(),
        };
        let t = Table::from_error(&err, COLUMNS);
        assert_eq!(t.name, "assets");
        assert!(t.rows.is_empty());
        assert_eq!(
            t.status,
            TableStatus::Unavailable {
                reason: "feed failed".into()
            }
        );
        let no_data = Table::from_error(&AnalyticsError::NoData { table: "x".into() }, COLUMNS);
        assert_eq!(no_data.status, TableStatus::NoData);
        assert_eq!(no_data.header().len(), 2);
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let json = serde_json::to_value(TableStatus::Unavailable {
            reason: "r".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "unavailable");
        assert_eq!(json["reason"], "r");
        assert_eq!(serde_json::to_value(Cell::Empty).unwrap(), serde_json::Value::Null);
    }
}
