pub mod io;

use std::{collections::HashSet, fmt, ops::Range};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DataError, TsPrepResult};

// ================================================================================================
// Schema
// ================================================================================================

/// Column roles of a [`TimeSeriesTable`].
///
/// Column order is significant: target columns define the channel order of
/// every value matrix produced downstream, and id columns define the order of
/// the components of a [`GroupKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSchema {
    /// Optional timestamp column (e.g. `"date"`).
    pub timestamp_column: Option<String>,

    /// Group-identifier columns. Empty means the table holds a single series.
    pub id_columns: Vec<String>,

    /// Numeric target columns. Must not be empty.
    pub target_columns: Vec<String>,
}

impl TableSchema {
    pub fn new<S: Into<String>>(target_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            timestamp_column: None,
            id_columns: Vec::new(),
            target_columns: target_columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_timestamp_column(self, column: impl Into<String>) -> Self {
        Self {
            timestamp_column: Some(column.into()),
            ..self
        }
    }

    pub fn with_id_columns<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            id_columns: columns.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    fn validate(&self) -> TsPrepResult<()> {
        if self.target_columns.is_empty() {
            return Err(DataError::NoTargets.into());
        }
        let mut seen = HashSet::new();
        let names = self
            .timestamp_column
            .iter()
            .chain(&self.id_columns)
            .chain(&self.target_columns);
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateColumn(name.clone()).into());
            }
        }
        Ok(())
    }
}

// ================================================================================================
// Group Key
// ================================================================================================

/// Identifies one independent series: the values of the grouping columns of a row.
///
/// The empty key stands for "the whole table is one group".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for GroupKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "<all>")
        } else {
            write!(f, "({})", self.0.join(", "))
        }
    }
}

/// A contiguous block of rows belonging to one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBlock {
    pub key: GroupKey,
    pub rows: Range<usize>,
}

impl GroupBlock {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ================================================================================================
// Table
// ================================================================================================

/// Column-oriented time-series table.
///
/// Holds an optional timestamp column, zero or more string id columns, and one
/// or more `f64` target columns, all of equal height. Missing target values are
/// `NaN`. Rows of one group are expected to be contiguous and in chronological
/// order; this is checked by [`TimeSeriesTable::group_blocks`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    schema: TableSchema,
    timestamps: Option<Vec<DateTime<Utc>>>,
    ids: Vec<Vec<String>>,
    targets: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    /// Builds a table from its columns, in schema order.
    ///
    /// # Errors
    /// - [`DataError::NoTargets`] / [`DataError::DuplicateColumn`] for an invalid schema.
    /// - [`DataError::LengthMismatch`] if the columns differ in height or the number of
    ///   columns does not match the schema.
    /// - [`ConfigError::MissingTimestamp`] if timestamps and schema disagree.
    pub fn new(
        schema: TableSchema,
        timestamps: Option<Vec<DateTime<Utc>>>,
        ids: Vec<Vec<String>>,
        targets: Vec<Vec<f64>>,
    ) -> TsPrepResult<Self> {
        schema.validate()?;

        if schema.timestamp_column.is_some() != timestamps.is_some() {
            return Err(ConfigError::MissingTimestamp.into());
        }
        check_arity("id columns", schema.id_columns.len(), ids.len())?;
        check_arity("target columns", schema.target_columns.len(), targets.len())?;

        let height = targets.first().map_or(0, Vec::len);
        let named = schema
            .timestamp_column
            .iter()
            .zip(timestamps.iter().map(Vec::len))
            .chain(schema.id_columns.iter().zip(ids.iter().map(Vec::len)))
            .chain(schema.target_columns.iter().zip(targets.iter().map(Vec::len)));
        for (column, actual) in named {
            if actual != height {
                return Err(DataError::LengthMismatch {
                    column: column.clone(),
                    expected: height,
                    actual,
                }
                .into());
            }
        }

        Ok(Self {
            schema,
            timestamps,
            ids,
            targets,
        })
    }

    /// Single-series table without timestamps.
    pub fn from_targets<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Vec<f64>)>,
    ) -> TsPrepResult<Self> {
        let (names, targets): (Vec<String>, Vec<Vec<f64>>) = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .unzip();
        Self::new(TableSchema::new(names), None, Vec::new(), targets)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn height(&self) -> usize {
        self.targets.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn n_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    pub fn targets(&self) -> &[Vec<f64>] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&[f64]> {
        self.schema
            .target_columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.targets[i].as_slice())
    }

    pub fn id_column(&self, name: &str) -> Option<&[String]> {
        self.schema
            .id_columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.ids[i].as_slice())
    }

    /// Returns the contiguous row blocks of each group, in table order.
    ///
    /// With no `group_columns` the whole table is a single block with the
    /// global key. An empty table has no blocks.
    ///
    /// # Errors
    /// - [`ConfigError::UnknownColumn`] if a grouping column is not an id column.
    /// - [`DataError::NonContiguousGroup`] if a key reappears after another key.
    pub fn group_blocks(&self, group_columns: &[String]) -> TsPrepResult<Vec<GroupBlock>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }
        if group_columns.is_empty() {
            return Ok(vec![GroupBlock {
                key: GroupKey::default(),
                rows: 0..height,
            }]);
        }

        let columns = group_columns
            .iter()
            .map(|name| {
                self.id_column(name)
                    .ok_or_else(|| ConfigError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key_at = |row: usize| -> Vec<&str> { columns.iter().map(|c| c[row].as_str()).collect() };

        let mut blocks = Vec::new();
        let mut seen = HashSet::new();
        let mut start = 0;
        for (key, run) in &(0..height).chunk_by(|&row| key_at(row)) {
            let len = run.count();
            if !seen.insert(key.clone()) {
                return Err(DataError::NonContiguousGroup {
                    key: GroupKey::from_iter(key).to_string(),
                    row: start,
                }
                .into());
            }
            blocks.push(GroupBlock {
                key: GroupKey::from_iter(key),
                rows: start..start + len,
            });
            start += len;
        }
        Ok(blocks)
    }

    /// Gathers the given row ranges, in order, into a new table with the same schema.
    pub fn take_ranges(&self, ranges: &[Range<usize>]) -> Self {
        fn gather<T: Clone>(column: &[T], ranges: &[Range<usize>]) -> Vec<T> {
            ranges
                .iter()
                .flat_map(|r| column[r.clone()].iter().cloned())
                .collect()
        }

        Self {
            schema: self.schema.clone(),
            timestamps: self.timestamps.as_deref().map(|ts| gather(ts, ranges)),
            ids: self.ids.iter().map(|c| gather(c, ranges)).collect(),
            targets: self.targets.iter().map(|c| gather(c, ranges)).collect(),
        }
    }

    /// Returns a copy of this table with its target columns replaced.
    ///
    /// The replacement must have the same shape as the current targets.
    pub(crate) fn with_targets(&self, targets: Vec<Vec<f64>>) -> TsPrepResult<Self> {
        Self::new(
            self.schema.clone(),
            self.timestamps.clone(),
            self.ids.clone(),
            targets,
        )
    }
}

fn check_arity(what: &str, expected: usize, actual: usize) -> TsPrepResult<()> {
    if expected != actual {
        return Err(DataError::LengthMismatch {
            column: what.to_string(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped_table(ids: &[&str]) -> TimeSeriesTable {
        let schema = TableSchema::new(["v"]).with_id_columns(["id"]);
        let values = (0..ids.len()).map(|i| i as f64).collect();
        TimeSeriesTable::new(
            schema,
            None,
            vec![ids.iter().map(|s| s.to_string()).collect()],
            vec![values],
        )
        .expect("valid table")
    }

    #[test]
    fn group_blocks_follow_table_order() {
        let table = grouped_table(&["b", "b", "a", "a", "a", "c"]);
        let blocks = table
            .group_blocks(&["id".to_string()])
            .expect("contiguous groups");

        let summary: Vec<_> = blocks
            .iter()
            .map(|b| (b.key.to_string(), b.rows.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("(b)".to_string(), 0..2),
                ("(a)".to_string(), 2..5),
                ("(c)".to_string(), 5..6),
            ]
        );
    }

    #[test]
    fn group_blocks_without_columns_is_one_global_block() {
        let table = grouped_table(&["a", "b"]);
        let blocks = table.group_blocks(&[]).expect("global block");

        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].key.is_global());
        assert_eq!(blocks[0].rows, 0..2);
    }

    #[test]
    fn reappearing_group_is_rejected() {
        let table = grouped_table(&["a", "b", "a"]);
        let err = table.group_blocks(&["id".to_string()]).unwrap_err();
        assert!(err.to_string().contains("not contiguous"), "{err}");
    }

    #[test]
    fn unknown_group_column_is_rejected() {
        let table = grouped_table(&["a"]);
        let err = table.group_blocks(&["missing".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TsPrepError::Config(ConfigError::UnknownColumn(_))
        ));
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let schema = TableSchema::new(["a", "b"]);
        let err = TimeSeriesTable::new(schema, None, vec![], vec![vec![1.0, 2.0], vec![1.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::TsPrepError::Data(DataError::LengthMismatch { actual: 1, .. })
        ));
    }

    #[test]
    fn new_rejects_duplicate_names() {
        let schema = TableSchema::new(["a"]).with_id_columns(["a"]);
        let err = TimeSeriesTable::new(schema, None, vec![vec![]], vec![vec![]]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TsPrepError::Data(DataError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn take_ranges_concatenates_in_order() {
        let table = grouped_table(&["a", "a", "b", "b"]);
        let sub = table.take_ranges(&[3..4, 0..2]);

        assert_eq!(sub.target("v"), Some(&[3.0, 0.0, 1.0][..]));
        assert_eq!(
            sub.id_column("id").map(|c| c.to_vec()),
            Some(vec!["b".to_string(), "a".to_string(), "a".to_string()])
        );
    }
}
