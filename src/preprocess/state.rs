use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, IoError, TsPrepResult},
    preprocess::scaling::{GroupScaler, Scaling},
    sorted_vec_map::SortedVecMap,
    table::{GroupKey, TimeSeriesTable},
};

/// Fitted scaling statistics, keyed by group.
///
/// Created once by [`Preprocessor::fit`](crate::preprocess::Preprocessor::fit)
/// and immutable afterward. The same state is applied to the train, validation,
/// and test splits, and can be persisted next to a trained model so inference
/// applies identical scaling without re-fitting.
///
/// # JSON layout
///
/// ```json
/// {
///   "scaling": "std",
///   "group_columns": ["client"],
///   "target_columns": ["load"],
///   "groups": [[["MT_001"], { "sample_count": 100, "mean": [..], "std": [..], ... }]]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    scaling: Scaling,
    group_columns: Vec<String>,
    target_columns: Vec<String>,
    groups: SortedVecMap<GroupKey, GroupScaler>,
}

impl ScalerState {
    pub(crate) fn new(
        scaling: Scaling,
        group_columns: Vec<String>,
        target_columns: Vec<String>,
        groups: SortedVecMap<GroupKey, GroupScaler>,
    ) -> Self {
        Self {
            scaling,
            group_columns,
            target_columns,
            groups,
        }
    }

    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    pub fn group_columns(&self) -> &[String] {
        &self.group_columns
    }

    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    pub fn group(&self, key: &GroupKey) -> Option<&GroupScaler> {
        self.groups.get(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &GroupScaler)> {
        self.groups.iter()
    }

    /// Scales the target columns of `table`: `(x - offset) / scale` per group and column.
    ///
    /// # Errors
    /// - [`ConfigError::SchemaMismatch`] if the table's target columns differ from the fitted ones.
    /// - [`ConfigError::UnknownGroup`] if a group was not seen during fit.
    pub fn transform(&self, table: &TimeSeriesTable) -> TsPrepResult<TimeSeriesTable> {
        self.apply(table, GroupScaler::transform_value)
    }

    /// Maps scaled target columns back to original units.
    pub fn inverse_transform(&self, table: &TimeSeriesTable) -> TsPrepResult<TimeSeriesTable> {
        self.apply(table, GroupScaler::inverse_value)
    }

    fn apply(
        &self,
        table: &TimeSeriesTable,
        f: fn(&GroupScaler, usize, f64) -> f64,
    ) -> TsPrepResult<TimeSeriesTable> {
        if table.schema().target_columns != self.target_columns {
            return Err(ConfigError::SchemaMismatch(format!(
                "scaler fitted on {:?}, table has {:?}",
                self.target_columns,
                table.schema().target_columns
            ))
            .into());
        }

        let mut targets = table.targets().to_vec();
        for block in table.group_blocks(&self.group_columns)? {
            let scaler = self
                .groups
                .get(&block.key)
                .ok_or_else(|| ConfigError::UnknownGroup(block.key.to_string()))?;
            for (column, values) in targets.iter_mut().enumerate() {
                for v in &mut values[block.rows.clone()] {
                    *v = f(scaler, column, *v);
                }
            }
        }
        table.with_targets(targets)
    }

    // ============================================================================================
    // Persistence
    // ============================================================================================

    pub fn to_json(&self) -> TsPrepResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| IoError::Json(e).into())
    }

    /// Parses and validates a state written by [`ScalerState::to_json`].
    ///
    /// # Errors
    /// - [`IoError::Json`] for malformed JSON.
    /// - [`ConfigError::SchemaMismatch`] if a group's statistics do not match
    ///   the target columns or a scale is zero or non-finite.
    pub fn from_json(json: &str) -> TsPrepResult<Self> {
        let state: Self = serde_json::from_str(json).map_err(IoError::Json)?;
        state.validate()?;
        Ok(state)
    }

    pub(crate) fn validate(&self) -> TsPrepResult<()> {
        let features = self.target_columns.len();
        for (key, scaler) in self.groups.iter() {
            scaler
                .check(features)
                .map_err(|msg| ConfigError::SchemaMismatch(format!("group {key}: {msg}")))?;
        }
        Ok(())
    }

    /// Writes the state as pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> TsPrepResult<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                IoError::FileSystem(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        fs::write(path, self.to_json()?).map_err(IoError::Io)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> TsPrepResult<Self> {
        let json = fs::read_to_string(path.as_ref()).map_err(IoError::Io)?;
        Self::from_json(&json)
    }
}
