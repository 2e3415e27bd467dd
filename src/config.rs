use std::{fs, path::Path};

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{IoError, TsPrepResult},
    preprocess::Scaling,
    split::SplitConfig,
    table::TableSchema,
};

// ================================================================================================
// Preset Data Configurations
// ================================================================================================

/// Hourly rows per 30-day month, the unit of the ETT benchmark split.
const HOURS_PER_MONTH: usize = 30 * 24;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
    EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum DatasetPreset {
    /// **ETTh1 Electricity Transformer Temperature (hourly)**
    ///
    /// # Configuration Details
    /// * **Columns:** timestamp `date`, seven targets `HUFL HULL MUFL MULL LUFL LULL OT`.
    /// * **Split:** 12 / 4 / 4 months of rows; validation and test start one
    ///   context length early.
    /// * **Window:** context 512, horizon 96.
    /// * **Scaling:** standard.
    Etth1,

    /// **Electricity load, one series per client (long format)**
    ///
    /// # Configuration Details
    /// * **Columns:** timestamp `date`, id `series_id`, target `target`.
    /// * **Split:** 70% / 10% / 20% of each client's rows.
    /// * **Window:** context 512, horizon 96.
    /// * **Scaling:** standard, per client.
    Electricity,
}

impl From<DatasetPreset> for DataConfig {
    fn from(preset: DatasetPreset) -> Self {
        match preset {
            DatasetPreset::Etth1 => {
                let schema = TableSchema::new(["HUFL", "HULL", "MUFL", "MULL", "LUFL", "LULL", "OT"])
                    .with_timestamp_column("date");
                let context_length = 512;
                DataConfig::new(schema)
                    .with_context_length(context_length)
                    .with_prediction_length(96)
                    .with_scaling(Scaling::Std)
                    .with_split(SplitConfig::shifted_index(
                        12 * HOURS_PER_MONTH,
                        16 * HOURS_PER_MONTH,
                        20 * HOURS_PER_MONTH,
                        context_length,
                    ))
            }
            DatasetPreset::Electricity => {
                let schema = TableSchema::new(["target"])
                    .with_timestamp_column("date")
                    .with_id_columns(["series_id"]);
                DataConfig::new(schema)
                    .with_context_length(512)
                    .with_prediction_length(96)
                    .with_scaling(Scaling::Std)
                    .with_split(SplitConfig::Fraction {
                        train: 0.7,
                        test: 0.2,
                    })
            }
        }
    }
}

// ================================================================================================
// Data Configuration
// ================================================================================================

/// Everything needed to turn a raw table into train / valid / test window datasets.
///
/// # Example
///
/// ```rust
/// # use tsprep::{config::{DataConfig, DatasetPreset}, preprocess::Scaling};
/// let cfg = DataConfig::from(DatasetPreset::Etth1)
///     .with_context_length(336)
///     .with_scaling(Scaling::Mean);
/// assert_eq!(cfg.prediction_length(), 96);
///
/// let json = cfg.to_json().unwrap();
/// assert_eq!(DataConfig::from_json(&json).unwrap(), cfg);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Column roles of the input table.
    schema: TableSchema,

    /// Number of historical steps fed to the model.
    context_length: usize,

    /// Number of future steps the model predicts.
    prediction_length: usize,

    /// Distance between consecutive window offsets. Defaults to 1.
    #[serde(default = "default_stride")]
    stride: usize,

    /// Target normalization. Absent or `null` means no scaling.
    #[serde(default, deserialize_with = "null_as_default")]
    scaling: Scaling,

    /// Train / validation / test split.
    #[serde(default)]
    split: SplitConfig,

    /// Replacement for missing target values inside windows.
    #[serde(default)]
    fill_value: f64,
}

fn default_stride() -> usize {
    1
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DataConfig {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            context_length: 512,
            prediction_length: 96,
            stride: default_stride(),
            scaling: Scaling::default(),
            split: SplitConfig::default(),
            fill_value: 0.0,
        }
    }

    pub fn from_json(json: &str) -> TsPrepResult<Self> {
        serde_json::from_str(json).map_err(|e| IoError::Json(e).into())
    }

    pub fn to_json(&self) -> TsPrepResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| IoError::Json(e).into())
    }

    pub fn load(path: impl AsRef<Path>) -> TsPrepResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl DataConfig {
    pub fn with_schema(self, schema: TableSchema) -> Self {
        Self { schema, ..self }
    }

    pub fn with_context_length(self, context_length: usize) -> Self {
        Self {
            context_length,
            ..self
        }
    }

    pub fn with_prediction_length(self, prediction_length: usize) -> Self {
        Self {
            prediction_length,
            ..self
        }
    }

    pub fn with_stride(self, stride: usize) -> Self {
        Self { stride, ..self }
    }

    pub fn with_scaling(self, scaling: Scaling) -> Self {
        Self { scaling, ..self }
    }

    pub fn with_split(self, split: SplitConfig) -> Self {
        Self { split, ..self }
    }

    pub fn with_fill_value(self, fill_value: f64) -> Self {
        Self { fill_value, ..self }
    }
}

// ================================================================================================
// Accessor Methods
// ================================================================================================

impl DataConfig {
    pub fn schema(&self) -> &TableSchema {
        &self.schema
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

    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    pub fn split(&self) -> &SplitConfig {
        &self.split
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::split::IndexRange;

    #[test]
    fn etth1_preset_uses_shifted_month_split() {
        let cfg = DataConfig::from(DatasetPreset::Etth1);
        assert_eq!(cfg.schema().target_columns.len(), 7);
        assert_eq!(
            cfg.split(),
            &SplitConfig::Index {
                train: IndexRange::until(8640),
                valid: IndexRange::between(8640 - 512, 11520),
                test: IndexRange::between(11520 - 512, 14400),
            }
        );
    }

    #[test]
    fn presets_parse_from_lowercase_names() {
        for preset in DatasetPreset::iter() {
            assert_eq!(preset.to_string().parse::<DatasetPreset>().ok(), Some(preset));
        }
        assert_eq!("etth1".parse::<DatasetPreset>().ok(), Some(DatasetPreset::Etth1));
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let json = r#"{
            "schema": { "timestamp_column": null, "id_columns": [], "target_columns": ["v"] },
            "context_length": 10,
            "prediction_length": 5
        }"#;
        let cfg = DataConfig::from_json(json).expect("valid config");

        assert_eq!(cfg.stride(), 1);
        assert_eq!(cfg.scaling(), Scaling::None);
        assert_eq!(cfg.split(), &SplitConfig::default());
        assert_eq!(cfg.fill_value(), 0.0);
    }

    #[test]
    fn null_scaling_means_none() {
        let json = r#"{
            "schema": { "timestamp_column": null, "id_columns": [], "target_columns": ["v"] },
            "context_length": 10,
            "prediction_length": 5,
            "scaling": null
        }"#;
        let cfg = DataConfig::from_json(json).expect("null scaling");
        assert_eq!(cfg.scaling(), Scaling::None);
    }

    #[test]
    fn scaling_is_read_by_name() {
        let json = r#"{
            "schema": { "timestamp_column": "date", "id_columns": ["id"], "target_columns": ["v"] },
            "context_length": 8,
            "prediction_length": 2,
            "scaling": "mean",
            "split": { "kind": "fraction", "train": 0.6, "test": 0.2 }
        }"#;
        let cfg = DataConfig::from_json(json).expect("valid config");
        assert_eq!(cfg.scaling(), Scaling::Mean);
        assert_eq!(cfg.split(), &SplitConfig::Fraction { train: 0.6, test: 0.2 });
    }
}
