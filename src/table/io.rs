use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::{
    Column, DataFrame, DataType, LazyCsvReader, LazyFileListReader, PlPath, TimeUnit,
};

use crate::{
    error::{DataError, IoError, TsPrepResult},
    table::{TableSchema, TimeSeriesTable},
};

// ================================================================================================
// Polars Interop
// ================================================================================================

impl TimeSeriesTable {
    /// Reads a delimited file with a header row into a table.
    ///
    /// Date-like columns are parsed while reading; only the columns named in
    /// `schema` are kept.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn read_csv(path: impl AsRef<Path>, schema: &TableSchema) -> TsPrepResult<Self> {
        let path = path.as_ref();
        let uri = path.to_str().ok_or_else(|| {
            IoError::FileSystem(format!(
                "Path contains invalid UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let df = LazyCsvReader::new(PlPath::new(uri))
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;

        let table = Self::from_data_frame(&df, schema)?;
        tracing::debug!(rows = table.height(), "Loaded table");
        Ok(table)
    }

    /// Converts the schema's columns of a data frame into a table.
    ///
    /// Targets are cast to `f64` (nulls become `NaN`), id columns to strings,
    /// and the timestamp column to a UTC datetime.
    ///
    /// # Errors
    /// - [`DataError::DataFrame`] for missing columns or failed casts.
    /// - [`DataError::NullValue`] for a null id or timestamp.
    pub fn from_data_frame(df: &DataFrame, schema: &TableSchema) -> TsPrepResult<Self> {
        let timestamps = schema
            .timestamp_column
            .as_deref()
            .map(|name| read_timestamps(df, name))
            .transpose()?;

        let ids = schema
            .id_columns
            .iter()
            .map(|name| read_ids(df, name))
            .collect::<TsPrepResult<Vec<_>>>()?;

        let targets = schema
            .target_columns
            .iter()
            .map(|name| read_targets(df, name))
            .collect::<TsPrepResult<Vec<_>>>()?;

        Self::new(schema.clone(), timestamps, ids, targets)
    }

    /// Converts the table back into a data frame, columns in schema order.
    pub fn to_data_frame(&self) -> TsPrepResult<DataFrame> {
        let mut columns = Vec::with_capacity(1 + self.ids.len() + self.targets.len());

        if let (Some(name), Some(ts)) = (&self.schema.timestamp_column, &self.timestamps) {
            let millis: Vec<i64> = ts.iter().map(DateTime::timestamp_millis).collect();
            let column = Column::new(name.as_str().into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| DataError::DataFrame(e.to_string()))?;
            columns.push(column);
        }
        for (name, values) in self.schema.id_columns.iter().zip(&self.ids) {
            columns.push(Column::new(name.as_str().into(), values.as_slice()));
        }
        for (name, values) in self.schema.target_columns.iter().zip(&self.targets) {
            columns.push(Column::new(name.as_str().into(), values.as_slice()));
        }

        DataFrame::new(columns).map_err(|e| DataError::DataFrame(e.to_string()).into())
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn column<'a>(df: &'a DataFrame, name: &str) -> TsPrepResult<&'a Column> {
    df.column(name)
        .map_err(|e| DataError::DataFrame(format!("Missing column '{name}': {e}")).into())
}

fn read_targets(df: &DataFrame, name: &str) -> TsPrepResult<Vec<f64>> {
    let cast = column(df, name)?
        .cast(&DataType::Float64)
        .map_err(|e| DataError::DataFrame(format!("Column '{name}' is not numeric: {e}")))?;
    let ca = cast
        .f64()
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn read_ids(df: &DataFrame, name: &str) -> TsPrepResult<Vec<String>> {
    let cast = column(df, name)?
        .cast(&DataType::String)
        .map_err(|e| DataError::DataFrame(format!("Column '{name}' is not castable to string: {e}")))?;
    let ca = cast.str().map_err(|e| DataError::DataFrame(e.to_string()))?;
    ca.into_iter()
        .enumerate()
        .map(|(row, v)| -> TsPrepResult<String> {
            v.map(str::to_string).ok_or_else(|| {
                DataError::NullValue {
                    column: name.to_string(),
                    row,
                }
                .into()
            })
        })
        .collect()
}

fn read_timestamps(df: &DataFrame, name: &str) -> TsPrepResult<Vec<DateTime<Utc>>> {
    let raw = column(df, name)?;
    let cast = match raw.dtype() {
        DataType::Datetime(_, _) => raw.clone(),
        _ => raw
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| DataError::TimestampConversion(format!("Column '{name}': {e}")))?,
    };
    let ca = cast
        .datetime()
        .map_err(|e| DataError::TimestampConversion(e.to_string()))?;
    let unit = ca.time_unit();

    ca.physical()
        .into_iter()
        .enumerate()
        .map(|(row, v)| -> TsPrepResult<DateTime<Utc>> {
            let v = v.ok_or_else(|| DataError::NullValue {
                column: name.to_string(),
                row,
            })?;
            let ts = match unit {
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(v)),
            };
            ts.ok_or_else(|| {
                DataError::TimestampConversion(format!("Out of range value {v} at row {row}"))
                    .into()
            })
        })
        .collect()
}
