#![allow(dead_code)]

use std::path::PathBuf;

use tsprep::{
    config::{DataConfig, DatasetPreset},
    split::SplitConfig,
    table::{TableSchema, TimeSeriesTable},
};

/// Two days of hourly ETTh1-shaped rows.
pub const ETTH1_SMALL: &str = "etth1_small.csv";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// A fresh, empty directory below the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tsprep_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// The ETTh1 preset shrunk to the 48-row fixture: 24 / 12 / 12 rows, context 8, horizon 4.
pub fn etth1_small_config() -> DataConfig {
    let context_length = 8;
    DataConfig::from(DatasetPreset::Etth1)
        .with_context_length(context_length)
        .with_prediction_length(4)
        .with_split(SplitConfig::shifted_index(24, 36, 48, context_length))
}

pub fn load_etth1_small() -> TimeSeriesTable {
    TimeSeriesTable::read_csv(
        fixture_path(ETTH1_SMALL),
        etth1_small_config().schema(),
    )
    .expect("fixture should load")
}

/// Long-format table with one target per client, clients of unequal length.
pub fn clients_table(lengths: &[(&str, usize)]) -> TimeSeriesTable {
    let schema = TableSchema::new(["target"]).with_id_columns(["series_id"]);
    let mut ids = Vec::new();
    let mut values = Vec::new();
    for (c, &(name, len)) in lengths.iter().enumerate() {
        ids.extend(std::iter::repeat_n(name.to_string(), len));
        values.extend((0..len).map(|i| (c * 1000 + i) as f64));
    }
    TimeSeriesTable::new(schema, None, vec![ids], vec![values]).expect("valid table")
}
