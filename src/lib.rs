//! Streaming ingestion of one-dimensional spectra.
//!
//! Text tables and Parquet files of any size are read in bounded chunks,
//! their wavelength and flux columns recognised from the headers, and turned
//! into a [`SpectrumRecord`] with the axis in nanometres and the flux in
//! Jansky whenever the source unit allows it.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod session;
pub mod units;

pub use config::IngestOptions;
pub use data::loader::{load_multiple, load_spectrum, LoaderRegistry, SpectrumLoader};
pub use data::model::{DownsampleTier, Spectrum, SpectrumMetadata, SpectrumRecord};
pub use error::{AnalysisError, IngestError, UnitError};
pub use session::Session;
