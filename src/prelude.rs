// 1. Traits
pub use crate::train::ForecastTrainer;

// 2. Tables and Splits
pub use crate::split::{
    DatasetSplits, IndexRange, SplitConfig, select_by_index, select_by_timestamp, split_dataset,
};
pub use crate::table::{GroupKey, TableSchema, TimeSeriesTable};

// 3. Scaling
pub use crate::preprocess::{PREPROCESSOR_CONFIG_FILE, Preprocessor, ScalerState, Scaling};

// 4. Windows and Batches
pub use crate::window::{
    BatchConfig, ForecastBatch, WindowExample, WindowedDataset, WindowedDatasetBuilder,
};

// 5. Configuration and Training
pub use crate::config::{DataConfig, DatasetPreset};
pub use crate::pipeline::{PreparedData, prepare};
pub use crate::train::{EarlyStopping, EpochSummary, StopDecision, evaluate_dataset, train_epoch};

// 6. Errors
pub use crate::error::{TsPrepError, TsPrepResult};
