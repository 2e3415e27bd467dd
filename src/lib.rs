//! Turn tabular time series into `(context, horizon)` training examples.
//!
//! The pipeline is: read a table, [`split`](split::split_dataset) it
//! chronologically per series, [`fit`](preprocess::Preprocessor::fit) a scaler
//! on the train split, apply it everywhere, and cut each split into a lazily
//! materialised [`WindowedDataset`](window::WindowedDataset). [`pipeline::prepare`]
//! runs all of it from a [`DataConfig`](config::DataConfig).

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod preprocess;
pub mod sorted_vec_map;
pub mod split;
pub mod table;
pub mod train;
pub mod window;

pub use pipeline::prepare;
