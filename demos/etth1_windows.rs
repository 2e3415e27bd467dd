use std::{env, fs, path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use time::macros::format_description;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tsprep::prelude::*;

/// Prepares ETTh1 for fine-tuning.
///
/// Usage: `cargo run --example etth1_windows -- [path/to/ETTh1.csv] [output_dir]`.
/// Without arguments the bundled two-day fixture is used with a shrunken geometry.
fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let mut args = env::args().skip(1);
    let (csv, cfg) = match args.next() {
        Some(path) => (PathBuf::from(path), DataConfig::from(DatasetPreset::Etth1)),
        None => (
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/etth1_small.csv"),
            DataConfig::from(DatasetPreset::Etth1)
                .with_context_length(8)
                .with_prediction_length(4)
                .with_split(SplitConfig::shifted_index(24, 36, 48, 8)),
        ),
    };
    let out_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("tsprep-etth1"));

    println!("Preparing {} ...", csv.display());

    let start = Instant::now();
    let table = TimeSeriesTable::read_csv(&csv, cfg.schema())
        .with_context(|| format!("Failed to read {}", csv.display()))?;
    let load_time = start.elapsed();

    let start = Instant::now();
    let prepared = prepare(&table, &cfg).context("Failed to prepare windows")?;
    let prepare_time = start.elapsed();

    prepared
        .save_preprocessor(&out_dir)
        .context("Failed to save preprocessor")?;

    let batch = prepared
        .train
        .batches(&BatchConfig::new(32).with_shuffle_seed(42))?
        .next()
        .transpose()?;

    println!("\n--- Window Datasets ---");
    println!("train windows:  {}", prepared.train.len());
    println!("valid windows:  {}", prepared.valid.len());
    println!("test windows:   {}", prepared.test.len());
    if let Some(batch) = batch {
        println!("first batch:    past {:?}, future {:?}", batch.past_values.shape(), batch.future_values.shape());
    }
    println!("preprocessor:   {}", out_dir.join(PREPROCESSOR_CONFIG_FILE).display());

    println!("\n--- Timings ---");
    println!("1. Load:     {load_time:?}");
    println!("2. Prepare:  {prepare_time:?}");

    drop(_guard);
    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let app_name = "tsprep";

    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!("Logging to stdout (container mode)");
        return Ok(None);
    }

    let log_dir = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .unwrap_or_else(env::temp_dir)
        .join(app_name)
        .join("logs");
    fs::create_dir_all(&log_dir)?;

    let timestamp = time::OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .context("Failed to format timestamp")?;
    let file_name = format!("{app_name}-{timestamp}.log");

    let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_current_span(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(log_file = %log_dir.join(&file_name).display(), "Logging to file (local mode)");
    Ok(Some(guard))
}
