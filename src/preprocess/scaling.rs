use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{ConfigError, TsPrepResult};

// ================================================================================================
// Scaling Mode
// ================================================================================================

/// Normalization applied to the target columns.
///
/// Parsed case-insensitively from its textual name (`"std"`, `"mean"`,
/// `"minmax"`, `"none"`). An absent mode means [`Scaling::None`].
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
    IntoStaticStr,
    EnumIter,
    Default,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    /// Values pass through unchanged.
    #[default]
    None,

    /// Divide by the mean absolute value, without centering.
    ///
    /// Suited to strictly positive magnitude series such as electricity load.
    Mean,

    /// Zero-mean, unit-variance scaling.
    #[strum(to_string = "std", serialize = "standard")]
    Std,

    /// Map the fitted `[min, max]` range onto `[0, 1]`.
    MinMax,
}

impl Scaling {
    /// Parses an optional mode name; `None` disables scaling.
    ///
    /// ```rust
    /// # use tsprep::preprocess::Scaling;
    /// assert_eq!(Scaling::from_name(Some("std")).unwrap(), Scaling::Std);
    /// assert_eq!(Scaling::from_name(Some("MEAN")).unwrap(), Scaling::Mean);
    /// assert_eq!(Scaling::from_name(None).unwrap(), Scaling::None);
    /// assert!(Scaling::from_name(Some("robust")).is_err());
    /// ```
    pub fn from_name(name: Option<&str>) -> TsPrepResult<Self> {
        match name {
            None => Ok(Self::None),
            Some(s) => s.parse().map_err(|e| ConfigError::InvalidScaling(e).into()),
        }
    }
}

// ================================================================================================
// Column Statistics
// ================================================================================================

/// Population statistics of the finite values of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub mean_abs: f64,
}

impl ColumnStats {
    /// Two-pass mean / variance over the finite values. An all-missing column
    /// yields zeros so that the state stays serializable.
    pub fn compute(values: &[f64]) -> Self {
        let finite = || values.iter().copied().filter(|v| v.is_finite());

        let count = finite().count();
        if count == 0 {
            return Self {
                count,
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
                mean_abs: 0.0,
            };
        }

        let n = count as f64;
        let mean = finite().sum::<f64>() / n;
        let var = finite().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            count,
            mean,
            std: var.sqrt(),
            min: finite().fold(f64::INFINITY, f64::min),
            max: finite().fold(f64::NEG_INFINITY, f64::max),
            mean_abs: finite().map(f64::abs).sum::<f64>() / n,
        }
    }

    /// Returns `(offset, scale)` for `mode`, or `None` when the divisor is
    /// degenerate (zero or non-finite); the caller then leaves the column unscaled.
    pub fn affine(&self, mode: Scaling) -> (f64, Option<f64>) {
        let guarded = |d: f64| (d.is_finite() && d > 0.0).then_some(d);
        match mode {
            Scaling::None => (0.0, Some(1.0)),
            Scaling::Std => (self.mean, guarded(self.std)),
            Scaling::Mean => (0.0, guarded(self.mean_abs)),
            Scaling::MinMax => (self.min, guarded(self.max - self.min)),
        }
    }
}

// ================================================================================================
// Group Scaler
// ================================================================================================

/// Frozen per-column statistics of one group, and the affine map derived from them.
///
/// `transform(x) = (x - offset) / scale` per column. `scale` is 1.0 for columns
/// whose divisor was degenerate at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupScaler {
    /// Rows of the group seen while fitting.
    pub sample_count: usize,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub offset: Vec<f64>,
    pub scale: Vec<f64>,
}

impl GroupScaler {
    pub fn feature_count(&self) -> usize {
        self.offset.len()
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        (value - self.offset[column]) / self.scale[column]
    }

    pub fn inverse_value(&self, column: usize, value: f64) -> f64 {
        value * self.scale[column] + self.offset[column]
    }

    /// Checks that every statistic has `features` entries and that every
    /// scale is a finite, non-zero divisor.
    pub(crate) fn check(&self, features: usize) -> Result<(), String> {
        let lengths = [
            ("mean", self.mean.len()),
            ("std", self.std.len()),
            ("min", self.min.len()),
            ("max", self.max.len()),
            ("offset", self.offset.len()),
            ("scale", self.scale.len()),
        ];
        if let Some((name, len)) = lengths.into_iter().find(|&(_, len)| len != features) {
            return Err(format!("'{name}' has {len} entries, expected {features}"));
        }
        if let Some((column, s)) = self
            .scale
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s == 0.0)
        {
            return Err(format!("scale {s} of column {column} is not a usable divisor"));
        }
        Ok(())
    }

    /// Maps a `[time, channel]` matrix of scaled values (e.g. a model forecast)
    /// back to original units.
    ///
    /// # Errors
    /// [`ConfigError::SchemaMismatch`] if the channel count differs from the feature count.
    pub fn inverse_values(&self, values: ArrayView2<'_, f64>) -> TsPrepResult<Array2<f64>> {
        if values.ncols() != self.feature_count() {
            return Err(ConfigError::SchemaMismatch(format!(
                "expected {} channels, got {}",
                self.feature_count(),
                values.ncols()
            ))
            .into());
        }
        self.check(values.ncols()).map_err(ConfigError::SchemaMismatch)?;

        let mut out = values.to_owned();
        for (column, mut lane) in out.axis_iter_mut(Axis(1)).enumerate() {
            lane.mapv_inplace(|v| self.inverse_value(column, v));
        }
        Ok(out)
    }
}
