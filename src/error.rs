use thiserror::Error;

/// Errors produced while configuring or running affinity propagation.
#[derive(Debug, Error)]
pub enum Error {
    /// Damping must stay within `[0, 1)` for the message updates to settle.
    #[error("damping factor {0} outside [0, 1)")]
    InvalidDamping(f64),

    /// At least one group (worker thread) is required.
    #[error("group count must be positive")]
    InvalidGroupCount,

    /// Dense similarity input must be square.
    #[error("similarity matrix must be square, got {rows} x {cols}")]
    NonSquareMatrix {
        /// Row count of the offending matrix.
        rows: usize,
        /// Column count of the offending matrix.
        cols: usize,
    },

    /// Per-item preference vector does not match the item count.
    #[error("preference vector length {found} does not match item count {expected}")]
    PreferenceLength {
        /// Number of items in the dataset.
        expected: usize,
        /// Length of the provided preference vector.
        found: usize,
    },

    /// Sparse entry referenced a row or column outside `[0, n)`.
    #[error("similarity entry ({row}, {col}) outside matrix of size {size}")]
    EntryOutOfBounds {
        /// Row index of the offending entry.
        row: usize,
        /// Column index of the offending entry.
        col: usize,
        /// Matrix dimension.
        size: usize,
    },

    /// Hierarchical runs need at least one subset and one worker.
    #[error("invalid hierarchy configuration: {0}")]
    InvalidHierarchy(&'static str),

    /// A group worker panicked during a phase; reported through the barrier
    /// so the orchestrator fails fast instead of hanging.
    #[error("worker for group {0} failed during a phase")]
    WorkerFailed(usize),

    /// A worker channel closed before the phase completed.
    #[error("a group worker terminated unexpectedly")]
    WorkerLost,

    /// Input file could not be parsed.
    #[error("load error: {0}")]
    Load(String),

    /// Underlying I/O failure while loading input data.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
