use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, SystemError, TsPrepResult},
    table::GroupKey,
    window::{WindowExample, WindowedDataset},
};

/// How a [`WindowedDataset`] is cut into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,

    /// Seed for a shuffled visiting order. `None` keeps dataset order.
    pub shuffle_seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            shuffle_seed: None,
        }
    }
}

impl BatchConfig {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle_seed: None,
        }
    }

    pub fn with_shuffle_seed(self, seed: u64) -> Self {
        Self {
            shuffle_seed: Some(seed),
            ..self
        }
    }
}

/// Window examples stacked into `[batch, time, channel]` tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastBatch {
    pub past_values: Array3<f64>,
    pub future_values: Array3<f64>,
    pub past_observed_mask: Array3<bool>,
    pub future_observed_mask: Array3<bool>,
    pub groups: Vec<GroupKey>,
    pub offsets: Vec<usize>,
}

impl ForecastBatch {
    /// Stacks examples of identical shape along a new leading axis.
    ///
    /// # Errors
    /// [`SystemError::InvariantViolation`] for an empty slice or mismatched shapes.
    pub fn from_examples(examples: &[WindowExample]) -> TsPrepResult<Self> {
        if examples.is_empty() {
            return Err(SystemError::InvariantViolation("empty batch".to_string()).into());
        }

        Ok(Self {
            past_values: stack(examples.iter().map(|e| e.past_values.view()))?,
            future_values: stack(examples.iter().map(|e| e.future_values.view()))?,
            past_observed_mask: stack(examples.iter().map(|e| e.past_observed_mask.view()))?,
            future_observed_mask: stack(examples.iter().map(|e| e.future_observed_mask.view()))?,
            groups: examples.iter().map(|e| e.group.clone()).collect(),
            offsets: examples.iter().map(|e| e.offset).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

fn stack<'a, T: Clone + 'a>(
    views: impl Iterator<Item = ArrayView2<'a, T>>,
) -> TsPrepResult<Array3<T>> {
    let views: Vec<_> = views.collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| SystemError::InvariantViolation(format!("cannot stack examples: {e}")).into())
}

// ================================================================================================
// Batch Iterator
// ================================================================================================

impl WindowedDataset {
    /// Iterates the dataset in batches of `config.batch_size`; the last batch may be short.
    ///
    /// # Errors
    /// [`ConfigError::InvalidBatchSize`] for a batch size of zero.
    pub fn batches(&self, config: &BatchConfig) -> TsPrepResult<BatchIter<'_>> {
        if config.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(config.batch_size).into());
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(seed) = config.shuffle_seed {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        Ok(BatchIter {
            dataset: self,
            order,
            cursor: 0,
            batch_size: config.batch_size,
        })
    }
}

/// Iterator over the batches of a [`WindowedDataset`].
#[derive(Debug, Clone)]
pub struct BatchIter<'a> {
    dataset: &'a WindowedDataset,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = TsPrepResult<ForecastBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let examples = indices
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect::<TsPrepResult<Vec<_>>>();
        Some(examples.and_then(|e| ForecastBatch::from_examples(&e)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchIter<'_> {}

/// Stacks a single example, e.g. for inference on the last window of a series.
impl TryFrom<&WindowExample> for ForecastBatch {
    type Error = crate::error::TsPrepError;

    fn try_from(example: &WindowExample) -> Result<Self, Self::Error> {
        Self::from_examples(std::slice::from_ref(example))
    }
}

/// Unstacks the `[batch, time, channel]` forecast of example `index`.
///
/// # Errors
/// [`SystemError::IndexOutOfBounds`] if `index` is not below the batch size.
pub fn example_slice(tensor: &Array3<f64>, index: usize) -> TsPrepResult<Array2<f64>> {
    let batch = tensor.len_of(Axis(0));
    if index >= batch {
        return Err(SystemError::IndexOutOfBounds(format!("example {index} of {batch}")).into());
    }
    Ok(tensor.index_axis(Axis(0), index).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TsPrepError,
        table::TimeSeriesTable,
        window::WindowedDatasetBuilder,
    };

    fn dataset(rows: usize) -> WindowedDataset {
        let table = TimeSeriesTable::from_targets([
            ("a", (0..rows).map(|i| i as f64).collect()),
            ("b", (0..rows).map(|i| -(i as f64)).collect()),
        ])
        .expect("valid table");
        WindowedDatasetBuilder::new(4, 2)
            .build(table, &[])
            .expect("valid geometry")
    }

    #[test]
    fn batches_cover_dataset_in_order() {
        let ds = dataset(15); // 10 windows
        let batches: Vec<_> = ds
            .batches(&BatchConfig::new(4))
            .expect("valid config")
            .collect::<TsPrepResult<_>>()
            .expect("batches");

        assert_eq!(batches.iter().map(ForecastBatch::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(batches[0].past_values.shape(), &[4, 4, 2]);
        assert_eq!(batches[0].future_values.shape(), &[4, 2, 2]);
        assert_eq!(batches[2].offsets, vec![8, 9]);

        let second = example_slice(&batches[1].past_values, 0).expect("in range");
        assert_eq!(second, ds.get(4).expect("window 4").past_values);

        let err = example_slice(&batches[2].past_values, 2).unwrap_err();
        assert!(matches!(err, TsPrepError::System(SystemError::IndexOutOfBounds(_))));
    }

    #[test]
    fn shuffled_order_is_seeded_and_complete() {
        let ds = dataset(30);
        let offsets = |seed| {
            ds.batches(&BatchConfig::new(7).with_shuffle_seed(seed))
                .expect("valid config")
                .flat_map(|b| b.expect("batch").offsets)
                .collect::<Vec<_>>()
        };

        let a = offsets(42);
        assert_eq!(a, offsets(42));

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..ds.len()).collect::<Vec<_>>());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = dataset(10).batches(&BatchConfig::new(0)).unwrap_err();
        assert!(matches!(err, TsPrepError::Config(ConfigError::InvalidBatchSize(0))));
    }

    #[test]
    fn single_example_batch() {
        let ds = dataset(6);
        let example = ds.get(0).expect("one window");
        let batch = ForecastBatch::try_from(&example).expect("stack");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.past_observed_mask.shape(), &[1, 4, 2]);
    }
}
