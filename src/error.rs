use thiserror::Error;

// ---------------------------------------------------------------------------
// Unit algebra errors
// ---------------------------------------------------------------------------

/// Failures of the unit algebra and of explicit conversions.
///
/// These never abort an ingestion on their own: the loader catches them and
/// degrades to a default or an unconverted unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("cannot convert '{from}' to '{to}': incompatible dimensions")]
    Incompatible { from: String, to: String },

    #[error("cannot parse unit expression '{expr}': {reason}")]
    Parse { expr: String, reason: String },

    #[error("equivalency needs {expected} spectral points, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("'{0}' is not a spectral unit (length, frequency, energy or wavenumber)")]
    NotSpectral(String),
}

// ---------------------------------------------------------------------------
// Ingestion errors
// ---------------------------------------------------------------------------

/// Fatal ingestion failures.  No partial record is ever returned with these.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no data rows detected in {origin}")]
    EmptyInput { origin: String },

    #[error("no numeric columns found in {origin}")]
    NoNumericColumns { origin: String },

    #[error("spectral axis is not strictly increasing at index {index}")]
    NonMonotonicAxis { index: usize },

    #[error("spectral axis has {axis} points but flux has {flux}")]
    LengthMismatch { axis: usize, flux: usize },

    #[error("unsupported spectrum format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Unit(#[from] UnitError),
}

// ---------------------------------------------------------------------------
// Analysis errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("flux in '{second}' cannot be expressed in '{first}'")]
    IncompatibleFlux { first: String, second: String },

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}
