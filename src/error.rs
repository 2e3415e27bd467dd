use thiserror::Error;

pub type TsPrepResult<T> = Result<T, TsPrepError>;

#[derive(Debug, Error)]
pub enum TsPrepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Caller-correctable configuration errors.
///
/// These are raised immediately and never retried: every operation in this
/// crate is a pure, deterministic transformation of its inputs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid split range (start: {start}, end: {end}): end must be greater than start")]
    InvalidRange { start: String, end: String },

    #[error("Invalid split fractions (train: {train}, test: {test}): {msg}")]
    InvalidFraction { train: f64, test: f64, msg: String },

    #[error("Invalid window configuration: {0}")]
    InvalidWindow(String),

    #[error("Unknown column: '{0}'")]
    UnknownColumn(String),

    #[error("Table has no timestamp column")]
    MissingTimestamp,

    #[error("Group {0} was not seen while fitting the scaler")]
    UnknownGroup(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid scaling mode: {0}")]
    InvalidScaling(#[from] strum::ParseError),

    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(usize),
}

/// Errors related to table contents and conversion from data frames.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Table schema has no target columns")]
    NoTargets,

    #[error("Duplicate column name: '{0}'")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Group {key} is not contiguous: it reappears at row {row}")]
    NonContiguousGroup { key: String, row: usize },

    #[error("Null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Timestamps of group {key} decrease at row {row}")]
    UnsortedTimestamps { key: String, row: usize },

    #[error("Failed timestamp conversion: {0}")]
    TimestampConversion(String),

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),
}

/// Errors reported across the training-loop boundary.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Non-finite loss {loss} at batch {batch}")]
    NonFiniteLoss { loss: f64, batch: usize },

    #[error("Trainer failure: {0}")]
    Trainer(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

/// Errors related to internal invariants.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
