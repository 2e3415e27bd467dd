mod scaling;
mod state;

pub use scaling::{GroupScaler, Scaling};
pub use state::ScalerState;

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ConfigError, IoError, TsPrepResult},
    sorted_vec_map::SortedVecMap,
    table::{TableSchema, TimeSeriesTable},
};

use scaling::ColumnStats;

/// File written by [`Preprocessor::save_pretrained`].
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

/// Fits per-group scaling statistics on a training split and applies them to any split.
///
/// Statistics are grouped by the table's id columns by default; use
/// [`Preprocessor::with_global_scaling`] to fit one set of statistics across all groups.
///
/// # Example
///
/// ```rust
/// # use tsprep::{preprocess::{Preprocessor, Scaling}, table::{TableSchema, TimeSeriesTable}};
/// # fn main() -> tsprep::error::TsPrepResult<()> {
/// let train = TimeSeriesTable::from_targets([("v", vec![1.0, 2.0, 3.0])])?;
/// let pre = Preprocessor::new(train.schema().clone()).with_scaling(Scaling::Std);
///
/// let state = pre.fit(&train)?;
/// let scaled = pre.transform(&train, &state)?;
/// assert!((scaled.target("v").unwrap()[1]).abs() < 1e-12);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: TableSchema,
    scaling: Scaling,
    group_columns: Vec<String>,
}

impl Preprocessor {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            group_columns: schema.id_columns.clone(),
            schema,
            scaling: Scaling::default(),
        }
    }

    pub fn with_scaling(self, scaling: Scaling) -> Self {
        Self { scaling, ..self }
    }

    /// Fits a single set of statistics over all rows, ignoring group boundaries.
    pub fn with_global_scaling(self) -> Self {
        Self {
            group_columns: Vec::new(),
            ..self
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    /// Learns per-group, per-column statistics from `train`.
    ///
    /// A column whose divisor is zero (constant column for `std` / `minmax`,
    /// all-zero column for `mean`) is left unscaled for that group and logged.
    ///
    /// # Errors
    /// - [`ConfigError::SchemaMismatch`] if `train` has different target columns.
    /// - Grouping errors from [`TimeSeriesTable::group_blocks`].
    #[tracing::instrument(skip_all, fields(scaling = %self.scaling, rows = train.height()))]
    pub fn fit(&self, train: &TimeSeriesTable) -> TsPrepResult<ScalerState> {
        self.check_targets(train)?;

        let mut groups = SortedVecMap::new();
        for block in train.group_blocks(&self.group_columns)? {
            let n = self.schema.target_columns.len();
            let mut scaler = GroupScaler {
                sample_count: block.len(),
                mean: Vec::with_capacity(n),
                std: Vec::with_capacity(n),
                min: Vec::with_capacity(n),
                max: Vec::with_capacity(n),
                offset: Vec::with_capacity(n),
                scale: Vec::with_capacity(n),
            };

            for (name, values) in self.schema.target_columns.iter().zip(train.targets()) {
                let stats = ColumnStats::compute(&values[block.rows.clone()]);
                let (offset, scale) = stats.affine(self.scaling);
                let scale = scale.unwrap_or_else(|| {
                    warn!(
                        group = %block.key,
                        column = %name,
                        samples = stats.count,
                        "Degenerate deviation; column left unscaled"
                    );
                    1.0
                });

                scaler.mean.push(stats.mean);
                scaler.std.push(stats.std);
                scaler.min.push(stats.min);
                scaler.max.push(stats.max);
                scaler.offset.push(offset);
                scaler.scale.push(scale);
            }
            groups.insert(block.key, scaler);
        }

        tracing::debug!(groups = groups.len(), "Fitted scaler");
        Ok(ScalerState::new(
            self.scaling,
            self.group_columns.clone(),
            self.schema.target_columns.clone(),
            groups,
        ))
    }

    /// Applies a fitted state to any split.
    ///
    /// # Errors
    /// - [`ConfigError::SchemaMismatch`] if the state was fitted for other columns.
    /// - [`ConfigError::UnknownGroup`] for groups not seen during fit.
    pub fn transform(
        &self,
        table: &TimeSeriesTable,
        state: &ScalerState,
    ) -> TsPrepResult<TimeSeriesTable> {
        self.check_targets(table)?;
        state.transform(table)
    }

    /// Maps scaled target columns back to original units.
    pub fn inverse_transform(
        &self,
        table: &TimeSeriesTable,
        state: &ScalerState,
    ) -> TsPrepResult<TimeSeriesTable> {
        self.check_targets(table)?;
        state.inverse_transform(table)
    }

    fn check_targets(&self, table: &TimeSeriesTable) -> TsPrepResult<()> {
        if table.schema().target_columns != self.schema.target_columns {
            return Err(ConfigError::SchemaMismatch(format!(
                "preprocessor expects targets {:?}, table has {:?}",
                self.schema.target_columns,
                table.schema().target_columns
            ))
            .into());
        }
        Ok(())
    }

    // ============================================================================================
    // Persistence
    // ============================================================================================

    /// Stores this configuration and `state` as `preprocessor_config.json` in `dir`.
    pub fn save_pretrained(&self, dir: impl AsRef<Path>, state: &ScalerState) -> TsPrepResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            IoError::FileSystem(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let doc = PretrainedDocument {
            preprocessor: self.clone(),
            scaler_state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&doc).map_err(IoError::Json)?;
        fs::write(dir.join(PREPROCESSOR_CONFIG_FILE), json).map_err(IoError::Io)?;
        Ok(())
    }

    /// Loads a preprocessor and its fitted state saved by [`Preprocessor::save_pretrained`].
    pub fn from_pretrained(dir: impl AsRef<Path>) -> TsPrepResult<(Self, ScalerState)> {
        let path = dir.as_ref().join(PREPROCESSOR_CONFIG_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            IoError::ReadFailed(format!("{}: {e}", path.display()))
        })?;
        let doc: PretrainedDocument = serde_json::from_str(&json).map_err(IoError::Json)?;
        doc.scaler_state.validate()?;
        if doc.scaler_state.target_columns() != doc.preprocessor.schema.target_columns {
            return Err(ConfigError::SchemaMismatch(format!(
                "{} stores a state for {:?}, preprocessor targets {:?}",
                path.display(),
                doc.scaler_state.target_columns(),
                doc.preprocessor.schema.target_columns
            ))
            .into());
        }
        Ok((doc.preprocessor, doc.scaler_state))
    }
}

#[derive(Serialize, Deserialize)]
struct PretrainedDocument {
    preprocessor: Preprocessor,
    scaler_state: ScalerState,
}
