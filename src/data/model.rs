use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::units::{ConversionMethod, Quantity};

use super::normalize::{canonicalize, canonicalize_preview};

// ---------------------------------------------------------------------------
// Well-known metadata keys
// ---------------------------------------------------------------------------

/// Keys the loaders write into [`SpectrumMetadata::extra`].  Other keys are
/// allowed and preserved.
pub mod keys {
    pub const WAVE_COLUMN: &str = "wave_column";
    pub const FLUX_COLUMN: &str = "flux_column";
    pub const WAVELENGTH_UNIT: &str = "wavelength_unit";
    pub const FLUX_UNIT: &str = "flux_unit";
    pub const ROW_COUNT: &str = "row_count";
    pub const COLUMN_STATISTICS: &str = "column_statistics";
    pub const DOWNSAMPLE_TIERS: &str = "downsample_tiers";
    pub const SOURCE_WAVELENGTH_UNIT: &str = "source_wavelength_unit";
    pub const SOURCE_FLUX_UNIT: &str = "source_flux_unit";
    pub const FLUX_CONVERSION: &str = "flux_conversion";
    pub const SKIPPED_COLUMNS: &str = "skipped_columns";
}

// ---------------------------------------------------------------------------
// DownsampleTier – small preview of a large spectrum
// ---------------------------------------------------------------------------

/// Parallel wavelength / flux preview arrays of one reservoir tier.
#[derive(Debug, Clone, PartialEq)]
pub struct DownsampleTier {
    wavelength: Quantity,
    flux: Quantity,
}

impl DownsampleTier {
    pub fn new(wavelength: Quantity, flux: Quantity) -> Result<Self, IngestError> {
        if wavelength.len() != flux.len() {
            return Err(IngestError::LengthMismatch {
                axis: wavelength.len(),
                flux: flux.len(),
            });
        }
        Ok(Self { wavelength, flux })
    }

    pub fn wavelength(&self) -> &Quantity {
        &self.wavelength
    }

    pub fn flux(&self) -> &Quantity {
        &self.flux
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Axis in nm and sorted, flux converted with this tier's own wavelengths.
    pub fn to_canonical_units(&self) -> Result<(DownsampleTier, ConversionMethod), IngestError> {
        let (wavelength, conversion) = canonicalize_preview(&self.wavelength, &self.flux)?;
        let tier = DownsampleTier::new(wavelength, conversion.flux)?;
        Ok((tier, conversion.method))
    }
}

// ---------------------------------------------------------------------------
// Spectrum – immutable axis / flux pair
// ---------------------------------------------------------------------------

/// A one-dimensional spectrum.
///
/// Both arrays always carry units, have the same length, and the axis is
/// strictly increasing.  Downsampled previews ride along keyed by tier size.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    spectral_axis: Quantity,
    flux: Quantity,
    downsampled: BTreeMap<usize, DownsampleTier>,
}

impl Spectrum {
    pub fn new(spectral_axis: Quantity, flux: Quantity) -> Result<Self, IngestError> {
        if spectral_axis.len() != flux.len() {
            return Err(IngestError::LengthMismatch {
                axis: spectral_axis.len(),
                flux: flux.len(),
            });
        }
        if let Some(index) = spectral_axis
            .values()
            .windows(2)
            .position(|pair| !(pair[1] > pair[0]))
        {
            return Err(IngestError::NonMonotonicAxis { index: index + 1 });
        }
        Ok(Self {
            spectral_axis,
            flux,
            downsampled: BTreeMap::new(),
        })
    }

    pub fn with_downsampled(mut self, tiers: BTreeMap<usize, DownsampleTier>) -> Self {
        self.downsampled = tiers;
        self
    }

    pub fn spectral_axis(&self) -> &Quantity {
        &self.spectral_axis
    }

    pub fn flux(&self) -> &Quantity {
        &self.flux
    }

    /// Tier capacity → preview.
    pub fn downsampled(&self) -> &BTreeMap<usize, DownsampleTier> {
        &self.downsampled
    }

    pub fn len(&self) -> usize {
        self.spectral_axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectral_axis.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpectrumMetadata – provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumMetadata {
    /// File name, or "in-memory" for streams.
    pub source: String,
    pub target: Option<String>,
    pub instrument: Option<String>,
    pub observation_date: Option<String>,
    pub description: Option<String>,
    /// See [`keys`] for the entries written by the loaders.
    pub extra: BTreeMap<String, String>,
}

impl SpectrumMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// SpectrumRecord – the unit handed to analysis, plotting and export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRecord {
    pub identifier: String,
    pub spectrum: Spectrum,
    pub metadata: SpectrumMetadata,
}

impl SpectrumRecord {
    pub fn new(identifier: impl Into<String>, spectrum: Spectrum, metadata: SpectrumMetadata) -> Self {
        Self {
            identifier: identifier.into(),
            spectrum,
            metadata,
        }
    }

    /// A copy with the axis in nm and flux in Jy when the flux unit allows
    /// it.  Otherwise the flux keeps its unit; either way the resulting flux
    /// unit is written to `extra["flux_unit"]`.
    pub fn to_canonical_units(&self) -> Result<SpectrumRecord, IngestError> {
        let (axis, conversion) = canonicalize(self.spectrum.spectral_axis(), self.spectrum.flux())?;

        let mut metadata = self.metadata.clone();
        metadata
            .extra
            .insert(keys::WAVELENGTH_UNIT.to_string(), axis.unit().to_string());
        metadata
            .extra
            .insert(keys::FLUX_UNIT.to_string(), conversion.flux.unit().to_string());
        if conversion.method == ConversionMethod::Unconverted {
            metadata.extra.insert(
                keys::FLUX_CONVERSION.to_string(),
                conversion.method.to_string(),
            );
        }

        let mut tiers = BTreeMap::new();
        for (&size, tier) in self.spectrum.downsampled() {
            let (tier, _) = tier.to_canonical_units()?;
            tiers.insert(size, tier);
        }

        let spectrum = Spectrum::new(axis, conversion.flux)?.with_downsampled(tiers);
        Ok(SpectrumRecord::new(self.identifier.clone(), spectrum, metadata))
    }
}
