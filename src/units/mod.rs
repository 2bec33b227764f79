//! Unit layer: a small explicit unit algebra plus the conversions the
//! ingestion pipeline needs.
//!
//! ```text
//!   column label ──► resolve::infer_unit ──► Unit (scale, dimension)
//!                                              │
//!   Vec<f64> + Unit = Quantity ◄───────────────┘
//!        │
//!        ▼
//!   convert:  direct ─► spectral / spectral-density equivalency ─► as-is
//! ```

pub mod convert;
pub mod quantity;
pub mod resolve;
pub mod unit;

pub use convert::{
    convert_axis, convert_flux, convert_round_trip, convert_with, is_spectral, ConversionMethod,
    Equivalency, FluxConversion,
};
pub use quantity::Quantity;
pub use resolve::infer_unit;
pub use resolve::infer_unit as infer_unit_from_label;
pub use unit::{Dimension, Unit};

/// Every spectral axis is normalised to nanometres.
pub fn canonical_wavelength_unit() -> Unit {
    Unit::nanometer()
}

/// Flux is normalised to Jansky whenever the source unit allows it.
pub fn canonical_flux_unit() -> Unit {
    Unit::jansky()
}
