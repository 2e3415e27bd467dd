use std::path::Path;

use crate::{
    config::DataConfig,
    error::{ConfigError, TsPrepResult},
    preprocess::{Preprocessor, ScalerState},
    split::split_dataset,
    table::TimeSeriesTable,
    window::{WindowedDataset, WindowedDatasetBuilder},
};

/// Output of [`prepare`]: the fitted preprocessing and three window datasets
/// over scaled targets.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub preprocessor: Preprocessor,
    pub state: ScalerState,
    pub train: WindowedDataset,
    pub valid: WindowedDataset,
    pub test: WindowedDataset,
}

impl PreparedData {
    /// Persists the fitted preprocessing so a fine-tuned model can be served
    /// with identical scaling.
    pub fn save_preprocessor(&self, dir: impl AsRef<Path>) -> TsPrepResult<()> {
        self.preprocessor.save_pretrained(dir, &self.state)
    }
}

/// Split, fit the scaler on the train split only, scale every split, and
/// window each of them.
///
/// # Errors
/// - [`ConfigError::SchemaMismatch`] if `table` was loaded with a different schema.
/// - Any split, scaling, or window error of the individual stages.
#[tracing::instrument(skip_all, fields(rows = table.height(), scaling = %config.scaling()))]
pub fn prepare(table: &TimeSeriesTable, config: &DataConfig) -> TsPrepResult<PreparedData> {
    if table.schema() != config.schema() {
        return Err(ConfigError::SchemaMismatch(format!(
            "table columns {:?} differ from configured {:?}",
            table.schema(),
            config.schema()
        ))
        .into());
    }

    let splits = split_dataset(table, config.split(), config.context_length())?;

    let preprocessor = Preprocessor::new(config.schema().clone()).with_scaling(config.scaling());
    let state = preprocessor.fit(&splits.train)?;

    let builder = WindowedDatasetBuilder::new(config.context_length(), config.prediction_length())
        .with_stride(config.stride())
        .with_fill_value(config.fill_value());
    let group_columns = &config.schema().id_columns;
    let window = |split: &TimeSeriesTable| -> TsPrepResult<WindowedDataset> {
        builder.build(preprocessor.transform(split, &state)?, group_columns)
    };

    let train = window(&splits.train)?;
    let valid = window(&splits.valid)?;
    let test = window(&splits.test)?;

    tracing::info!(
        train = train.len(),
        valid = valid.len(),
        test = test.len(),
        "Prepared window datasets"
    );

    Ok(PreparedData {
        preprocessor,
        state,
        train,
        valid,
        test,
    })
}
