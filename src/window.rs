pub mod batch;

use std::ops::Range;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, SystemError, TsPrepResult},
    table::{GroupKey, TimeSeriesTable},
};

pub use batch::{BatchConfig, BatchIter, ForecastBatch};

// ================================================================================================
// Window Example
// ================================================================================================

/// One `(context, horizon)` training example drawn from a single group.
///
/// Value matrices are laid out `[time, channel]`, channels in target-column
/// order. Missing values are replaced by the dataset's fill value and marked
/// `false` in the matching observed mask. Group key, offset, and timestamps
/// are bookkeeping only and are not part of the numeric tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowExample {
    pub group: GroupKey,

    /// Start offset of the context, relative to the first row of the group.
    pub offset: usize,

    pub past_values: Array2<f64>,
    pub future_values: Array2<f64>,
    pub past_observed_mask: Array2<bool>,
    pub future_observed_mask: Array2<bool>,

    pub past_timestamps: Option<Vec<DateTime<Utc>>>,
    pub future_timestamps: Option<Vec<DateTime<Utc>>>,
}

// ================================================================================================
// Builder
// ================================================================================================

/// Window geometry: context length, prediction length, stride, and fill value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowedDatasetBuilder {
    context_length: usize,
    prediction_length: usize,
    stride: usize,
    fill_value: f64,
}

impl WindowedDatasetBuilder {
    /// Stride 1, fill value 0.0.
    pub fn new(context_length: usize, prediction_length: usize) -> Self {
        Self {
            context_length,
            prediction_length,
            stride: 1,
            fill_value: 0.0,
        }
    }

    pub fn with_stride(self, stride: usize) -> Self {
        Self { stride, ..self }
    }

    /// Value written in place of missing (`NaN`) targets.
    pub fn with_fill_value(self, fill_value: f64) -> Self {
        Self { fill_value, ..self }
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    pub fn prediction_length(&self) -> usize {
        self.prediction_length
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Plans the windows of every group of `table`.
    ///
    /// A window at group offset `o` exists iff
    /// `o + context_length + prediction_length <= group_length`, for
    /// `o = 0, stride, 2 * stride, ...`. Groups that are too short contribute
    /// no windows. No example is materialised here.
    ///
    /// # Errors
    /// - [`ConfigError::InvalidWindow`] for a zero length or stride.
    /// - Grouping errors from [`TimeSeriesTable::group_blocks`].
    pub fn build(
        &self,
        table: TimeSeriesTable,
        group_columns: &[String],
    ) -> TsPrepResult<WindowedDataset> {
        if self.context_length == 0 || self.prediction_length == 0 || self.stride == 0 {
            return Err(ConfigError::InvalidWindow(format!(
                "context_length ({}), prediction_length ({}) and stride ({}) must be positive",
                self.context_length, self.prediction_length, self.stride
            ))
            .into());
        }

        let span = self.context_length + self.prediction_length;
        let mut groups = Vec::new();
        let mut ends = Vec::new();
        let mut total = 0;
        for block in table.group_blocks(group_columns)? {
            let count = match block.len().checked_sub(span) {
                Some(slack) => slack / self.stride + 1,
                None => {
                    tracing::debug!(
                        group = %block.key,
                        rows = block.len(),
                        span,
                        "Group too short for a single window"
                    );
                    0
                }
            };
            total += count;
            ends.push(total);
            groups.push(GroupWindows {
                key: block.key,
                rows: block.rows,
            });
        }

        Ok(WindowedDataset {
            table,
            geometry: *self,
            groups,
            ends,
        })
    }
}

// ================================================================================================
// Dataset
// ================================================================================================

#[derive(Debug, Clone, PartialEq)]
struct GroupWindows {
    key: GroupKey,
    rows: Range<usize>,
}

/// Finite, deterministically ordered collection of window examples over a
/// (scaled) table.
///
/// Ordered by group (table order), then by increasing offset. Examples are
/// built on access, so iterating never holds more than one example at a time
/// and can be restarted any number of times with identical results.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedDataset {
    table: TimeSeriesTable,
    geometry: WindowedDatasetBuilder,
    groups: Vec<GroupWindows>,
    /// Exclusive cumulative window count at the end of each group.
    ends: Vec<usize>,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table(&self) -> &TimeSeriesTable {
        &self.table
    }

    pub fn geometry(&self) -> &WindowedDatasetBuilder {
        &self.geometry
    }

    pub fn n_channels(&self) -> usize {
        self.table.n_targets()
    }

    /// Number of windows contributed by each group, in dataset order.
    pub fn windows_per_group(&self) -> impl Iterator<Item = (&GroupKey, usize)> {
        let starts = std::iter::once(0).chain(self.ends.iter().copied());
        self.groups
            .iter()
            .zip(starts.zip(self.ends.iter().copied()))
            .map(|(g, (start, end))| (&g.key, end - start))
    }

    /// Materialises the example at global position `index`.
    ///
    /// # Errors
    /// [`SystemError::IndexOutOfBounds`] if `index >= len()`.
    pub fn get(&self, index: usize) -> TsPrepResult<WindowExample> {
        if index >= self.len() {
            return Err(SystemError::IndexOutOfBounds(format!(
                "window {index} of {}",
                self.len()
            ))
            .into());
        }
        let g = self.ends.partition_point(|&end| end <= index);
        let first = if g == 0 { 0 } else { self.ends[g - 1] };
        Ok(self.example(&self.groups[g], (index - first) * self.geometry.stride))
    }

    /// Lazily iterates the examples in dataset order.
    pub fn iter(&self) -> Windows<'_> {
        Windows {
            dataset: self,
            next: 0,
        }
    }

    fn example(&self, group: &GroupWindows, offset: usize) -> WindowExample {
        let ctx = self.geometry.context_length;
        let pred = self.geometry.prediction_length;
        let past = group.rows.start + offset..group.rows.start + offset + ctx;
        let future = past.end..past.end + pred;

        let timestamps = self.table.timestamps();
        WindowExample {
            group: group.key.clone(),
            offset,
            past_values: self.values(past.clone()),
            future_values: self.values(future.clone()),
            past_observed_mask: self.observed(past.clone()),
            future_observed_mask: self.observed(future.clone()),
            past_timestamps: timestamps.map(|ts| ts[past].to_vec()),
            future_timestamps: timestamps.map(|ts| ts[future].to_vec()),
        }
    }

    fn values(&self, rows: Range<usize>) -> Array2<f64> {
        let targets = self.table.targets();
        let fill = self.geometry.fill_value;
        Array2::from_shape_fn((rows.len(), targets.len()), |(t, c)| {
            let v = targets[c][rows.start + t];
            if v.is_nan() { fill } else { v }
        })
    }

    fn observed(&self, rows: Range<usize>) -> Array2<bool> {
        let targets = self.table.targets();
        Array2::from_shape_fn((rows.len(), targets.len()), |(t, c)| {
            !targets[c][rows.start + t].is_nan()
        })
    }
}

impl<'a> IntoIterator for &'a WindowedDataset {
    type Item = WindowExample;
    type IntoIter = Windows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`WindowedDataset`].
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    dataset: &'a WindowedDataset,
    next: usize,
}

impl Iterator for Windows<'_> {
    type Item = WindowExample;

    fn next(&mut self) -> Option<Self::Item> {
        let example = self.dataset.get(self.next).ok()?;
        self.next += 1;
        Some(example)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}
