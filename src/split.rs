use std::{fmt, ops::Range};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, DataError, TsPrepResult},
    table::TimeSeriesTable,
};

// ================================================================================================
// Index Range
// ================================================================================================

/// A half-open row range relative to the start of each group.
///
/// `start = None` means the first row, `end = None` means the last row of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct IndexRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl IndexRange {
    pub fn new(start: Option<usize>, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// `[start, end)`.
    pub fn between(start: usize, end: usize) -> Self {
        Self::new(Some(start), Some(end))
    }

    /// `[0, end)`.
    pub fn until(end: usize) -> Self {
        Self::new(None, Some(end))
    }

    /// `[start, group end)`.
    pub fn starting_at(start: usize) -> Self {
        Self::new(Some(start), None)
    }

    /// Rejects `end <= start` after resolving a missing start to 0.
    pub fn validate(&self) -> TsPrepResult<()> {
        let start = self.start.unwrap_or(0);
        match self.end {
            Some(end) if end <= start => Err(ConfigError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Resolves this range against a group of `len` rows, clamping to the group.
    fn resolve(&self, len: usize) -> Range<usize> {
        let end = self.end.map_or(len, |e| e.min(len));
        let start = self.start.unwrap_or(0).min(end);
        start..end
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<usize>| b.map_or_else(String::new, |v| v.to_string());
        write!(f, "[{}, {})", bound(self.start), bound(self.end))
    }
}

// ================================================================================================
// Selection
// ================================================================================================

/// Selects rows `[start, end)` by position.
///
/// With empty `group_columns` the whole table is sliced by absolute row
/// position. Otherwise the same relative slice is taken within each group's
/// block; group order and intra-group order are preserved. Groups shorter
/// than `end` are clamped to their last row.
///
/// # Errors
/// - [`ConfigError::InvalidRange`] if `end <= start` (a `None` start counts as 0).
/// - [`ConfigError::UnknownColumn`] if a grouping column is not an id column.
pub fn select_by_index(
    table: &TimeSeriesTable,
    group_columns: &[String],
    start: Option<usize>,
    end: Option<usize>,
) -> TsPrepResult<TimeSeriesTable> {
    let range = IndexRange::new(start, end);
    range.validate()?;

    let ranges = table
        .group_blocks(group_columns)?
        .into_iter()
        .map(|block| {
            let local = range.resolve(block.len());
            block.rows.start + local.start..block.rows.start + local.end
        })
        .collect::<Vec<_>>();

    Ok(table.take_ranges(&ranges))
}

/// Selects the rows whose timestamp lies in `[start, end)`, per group.
///
/// A `None` bound is open. Timestamps must be non-decreasing within each
/// group, so each group contributes one contiguous slice.
///
/// # Errors
/// - [`ConfigError::MissingTimestamp`] if the table has no timestamp column.
/// - [`ConfigError::InvalidRange`] if `end <= start`.
/// - [`DataError::UnsortedTimestamps`] if a group's timestamps go backwards.
pub fn select_by_timestamp(
    table: &TimeSeriesTable,
    group_columns: &[String],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> TsPrepResult<TimeSeriesTable> {
    let timestamps = table.timestamps().ok_or(ConfigError::MissingTimestamp)?;
    if let (Some(s), Some(e)) = (start, end) {
        if e <= s {
            return Err(ConfigError::InvalidRange {
                start: s.to_rfc3339(),
                end: e.to_rfc3339(),
            }
            .into());
        }
    }

    let ranges = table
        .group_blocks(group_columns)?
        .into_iter()
        .map(|block| -> TsPrepResult<Range<usize>> {
            let ts = &timestamps[block.rows.clone()];
            if let Some(i) = ts.windows(2).position(|w| w[1] < w[0]) {
                return Err(DataError::UnsortedTimestamps {
                    key: block.key.to_string(),
                    row: block.rows.start + i + 1,
                }
                .into());
            }
            let lo = start.map_or(0, |s| ts.partition_point(|t| *t < s));
            let hi = end.map_or(ts.len(), |e| ts.partition_point(|t| *t < e));
            Ok(block.rows.start + lo..block.rows.start + hi.max(lo))
        })
        .collect::<TsPrepResult<Vec<_>>>()?;

    Ok(table.take_ranges(&ranges))
}

// ================================================================================================
// Train / Valid / Test Splits
// ================================================================================================

/// How a table is cut into train, validation, and test splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitConfig {
    /// Explicit per-group row ranges, applied as given.
    ///
    /// Overlap between adjacent splits must be encoded in the ranges by the caller
    /// (see [`SplitConfig::shifted_index`]).
    Index {
        train: IndexRange,
        valid: IndexRange,
        test: IndexRange,
    },

    /// Per-group fractions of the rows. The validation split gets the remainder.
    ///
    /// Validation and test start `context_length` rows before the end of the
    /// previous split.
    Fraction { train: f64, test: f64 },
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::Fraction {
            train: 0.7,
            test: 0.2,
        }
    }
}

impl SplitConfig {
    /// Index split from the boundaries `train_end` and `valid_end`, with the
    /// validation and test starts pulled back by `context_length` rows so that
    /// the first evaluation window's context ends where the previous split ends.
    pub fn shifted_index(
        train_end: usize,
        valid_end: usize,
        test_end: usize,
        context_length: usize,
    ) -> Self {
        Self::Index {
            train: IndexRange::until(train_end),
            valid: IndexRange::between(train_end.saturating_sub(context_length), valid_end),
            test: IndexRange::between(valid_end.saturating_sub(context_length), test_end),
        }
    }

    fn validate(&self) -> TsPrepResult<()> {
        match self {
            Self::Index { train, valid, test } => {
                train.validate()?;
                valid.validate()?;
                test.validate()
            }
            Self::Fraction { train, test } => {
                let invalid = |msg: &str| ConfigError::InvalidFraction {
                    train: *train,
                    test: *test,
                    msg: msg.to_string(),
                };
                let in_unit = |f: f64| f > 0.0 && f < 1.0;
                if !in_unit(*train) || !in_unit(*test) {
                    return Err(invalid("fractions must lie in (0, 1)").into());
                }
                if train + test >= 1.0 {
                    return Err(invalid("train + test must leave rows for validation").into());
                }
                Ok(())
            }
        }
    }
}

/// The three sub-tables produced by [`split_dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplits {
    pub train: TimeSeriesTable,
    pub valid: TimeSeriesTable,
    pub test: TimeSeriesTable,
}

/// Cuts `table` into train, validation, and test splits, independently per group.
///
/// For [`SplitConfig::Fraction`], a group of `n` rows is cut as
/// `train = [0, t)`, `valid = [t - ctx, t + v)`, `test = [t + v - ctx, n)` with
/// `t = floor(n * train)`, `v = n - t - floor(n * test)` and `ctx = context_length`.
#[tracing::instrument(skip(table), fields(rows = table.height()))]
pub fn split_dataset(
    table: &TimeSeriesTable,
    config: &SplitConfig,
    context_length: usize,
) -> TsPrepResult<DatasetSplits> {
    config.validate()?;
    let group_columns = &table.schema().id_columns;

    let splits = match config {
        SplitConfig::Index { train, valid, test } => DatasetSplits {
            train: select_by_index(table, group_columns, train.start, train.end)?,
            valid: select_by_index(table, group_columns, valid.start, valid.end)?,
            test: select_by_index(table, group_columns, test.start, test.end)?,
        },
        SplitConfig::Fraction { train, test } => {
            let blocks = table.group_blocks(group_columns)?;
            let mut train_rows = Vec::with_capacity(blocks.len());
            let mut valid_rows = Vec::with_capacity(blocks.len());
            let mut test_rows = Vec::with_capacity(blocks.len());

            for block in &blocks {
                let n = block.len();
                let train_size = (n as f64 * train).floor() as usize;
                let test_size = (n as f64 * test).floor() as usize;
                let valid_end = n - test_size;
                let at = |local: Range<usize>| {
                    block.rows.start + local.start..block.rows.start + local.end
                };

                train_rows.push(at(0..train_size));
                valid_rows.push(at(train_size.saturating_sub(context_length)..valid_end));
                test_rows.push(at(valid_end.saturating_sub(context_length)..n));
            }

            DatasetSplits {
                train: table.take_ranges(&train_rows),
                valid: table.take_ranges(&valid_rows),
                test: table.take_ranges(&test_rows),
            }
        }
    };

    tracing::debug!(
        train = splits.train.height(),
        valid = splits.valid.height(),
        test = splits.test.height(),
        "Split dataset"
    );
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{error::TsPrepError, table::TableSchema};

    fn two_groups(len_a: usize, len_b: usize) -> TimeSeriesTable {
        let schema = TableSchema::new(["v"]).with_id_columns(["id"]);
        let ids = std::iter::repeat_n("a".to_string(), len_a)
            .chain(std::iter::repeat_n("b".to_string(), len_b))
            .collect();
        let values = (0..len_a)
            .map(|i| i as f64)
            .chain((0..len_b).map(|i| 1000.0 + i as f64))
            .collect();
        TimeSeriesTable::new(schema, None, vec![ids], vec![values]).expect("valid table")
    }

    fn id() -> Vec<String> {
        vec!["id".to_string()]
    }

    #[test]
    fn select_without_groups_slices_absolute_rows() {
        let table = TimeSeriesTable::from_targets([("v", (0..10).map(f64::from).collect())])
            .expect("valid table");
        let sub = select_by_index(&table, &[], Some(2), Some(5)).expect("valid range");
        assert_eq!(sub.target("v"), Some(&[2.0, 3.0, 4.0][..]));

        let head = select_by_index(&table, &[], None, Some(2)).expect("valid range");
        assert_eq!(head.target("v"), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn select_applies_relative_slice_per_group() {
        let table = two_groups(6, 8);
        let sub = select_by_index(&table, &id(), Some(1), Some(4)).expect("valid range");

        assert_eq!(
            sub.target("v"),
            Some(&[1.0, 2.0, 3.0, 1001.0, 1002.0, 1003.0][..])
        );
        let blocks = sub.group_blocks(&id()).expect("groups");
        assert!(blocks.iter().all(|b| b.len() == 3));
    }

    #[test]
    fn select_clamps_short_groups() {
        let table = two_groups(3, 8);
        let sub = select_by_index(&table, &id(), Some(2), Some(5)).expect("valid range");
        assert_eq!(sub.target("v"), Some(&[2.0, 1002.0, 1003.0, 1004.0][..]));
    }

    #[test]
    fn select_rejects_empty_or_inverted_range() {
        let table = two_groups(3, 3);
        for (start, end) in [(Some(2), Some(2)), (Some(3), Some(1)), (None, Some(0))] {
            let err = select_by_index(&table, &id(), start, end).unwrap_err();
            assert!(
                matches!(err, TsPrepError::Config(ConfigError::InvalidRange { .. })),
                "{start:?}..{end:?} gave {err}"
            );
        }
    }

    #[test]
    fn select_by_timestamp_uses_half_open_interval() {
        let t0 = Utc.with_ymd_and_hms(2016, 7, 1, 0, 0, 0).unwrap();
        let ts: Vec<_> = (0..5).map(|h| t0 + Duration::hours(h)).collect();
        let schema = TableSchema::new(["v"]).with_timestamp_column("date");
        let table = TimeSeriesTable::new(
            schema,
            Some(ts),
            vec![],
            vec![(0..5).map(f64::from).collect()],
        )
        .expect("valid table");

        let sub = select_by_timestamp(
            &table,
            &[],
            Some(t0 + Duration::hours(1)),
            Some(t0 + Duration::hours(3)),
        )
        .expect("valid interval");
        assert_eq!(sub.target("v"), Some(&[1.0, 2.0][..]));

        let err = select_by_timestamp(&table, &[], Some(t0), Some(t0)).unwrap_err();
        assert!(matches!(err, TsPrepError::Config(ConfigError::InvalidRange { .. })));
    }

    #[test]
    fn select_by_timestamp_rejects_unsorted_group() {
        let t0 = Utc.with_ymd_and_hms(2016, 7, 1, 0, 0, 0).unwrap();
        let ts = [0, 1, 2, 0, 2, 1]
            .into_iter()
            .map(|h| t0 + Duration::hours(h))
            .collect();
        let schema = TableSchema::new(["v"])
            .with_timestamp_column("date")
            .with_id_columns(["id"]);
        let ids = ["a", "a", "a", "b", "b", "b"].map(String::from).to_vec();
        let table = TimeSeriesTable::new(schema, Some(ts), vec![ids], vec![vec![0.0; 6]])
            .expect("valid table");

        let err = select_by_timestamp(&table, &id(), Some(t0), None).unwrap_err();
        assert!(
            matches!(
                err,
                TsPrepError::Data(DataError::UnsortedTimestamps { row: 5, .. })
            ),
            "{err}"
        );

        // as one global series the drop at row 3 is already out of order
        let err = select_by_timestamp(&table, &[], None, None).unwrap_err();
        assert!(matches!(
            err,
            TsPrepError::Data(DataError::UnsortedTimestamps { row: 3, .. })
        ));
    }

    #[test]
    fn select_by_timestamp_requires_timestamps() {
        let table = two_groups(2, 2);
        let err = select_by_timestamp(&table, &id(), None, None).unwrap_err();
        assert!(matches!(err, TsPrepError::Config(ConfigError::MissingTimestamp)));
    }

    #[test]
    fn fraction_split_overlaps_by_context_length() {
        let table = two_groups(100, 50);
        let splits = split_dataset(&table, &SplitConfig::default(), 10).expect("valid split");

        // a: train [0, 70), valid [60, 80), test [70, 100)
        // b: train [0, 35), valid [25, 40), test [30, 50)
        let heights = |t: &TimeSeriesTable| {
            t.group_blocks(&id())
                .expect("groups")
                .iter()
                .map(|b| b.len())
                .collect::<Vec<_>>()
        };
        assert_eq!(heights(&splits.train), vec![70, 35]);
        assert_eq!(heights(&splits.valid), vec![20, 15]);
        assert_eq!(heights(&splits.test), vec![30, 20]);

        let valid = splits.valid.target("v").expect("v");
        assert_eq!(valid[0], 60.0);
        assert_eq!(valid[20], 1025.0);
    }

    #[test]
    fn shifted_index_split_pulls_back_evaluation_starts() {
        let config = SplitConfig::shifted_index(8640, 11520, 14400, 512);
        assert_eq!(
            config,
            SplitConfig::Index {
                train: IndexRange::until(8640),
                valid: IndexRange::between(8128, 11520),
                test: IndexRange::between(11008, 14400),
            }
        );
    }

    #[test]
    fn invalid_fractions_are_rejected() {
        let table = two_groups(10, 10);
        for (train, test) in [(0.0, 0.2), (0.8, 0.2), (0.5, 1.0)] {
            let err = split_dataset(&table, &SplitConfig::Fraction { train, test }, 0)
                .unwrap_err();
            assert!(matches!(
                err,
                TsPrepError::Config(ConfigError::InvalidFraction { .. })
            ));
        }
    }
}
