use log::debug;

use crate::error::IngestError;
use crate::units::{
    canonical_flux_unit, canonical_wavelength_unit, convert_axis, convert_flux, FluxConversion,
    Quantity, Unit,
};

// ---------------------------------------------------------------------------
// SpectralAxisNormalizer
// ---------------------------------------------------------------------------

/// Puts a raw (wavelength, flux) pair into canonical order:
/// converted axis, ascending, duplicates merged, strictly increasing.
#[derive(Debug, Clone)]
pub struct SpectralAxisNormalizer {
    target: Unit,
}

impl Default for SpectralAxisNormalizer {
    fn default() -> Self {
        Self::new(canonical_wavelength_unit())
    }
}

impl SpectralAxisNormalizer {
    pub fn new(target: Unit) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Unit {
        &self.target
    }

    /// Convert, sort, merge exact duplicates (averaging their flux) and check
    /// strict monotonicity.  The flux keeps its unit.
    pub fn normalize(
        &self,
        wavelength: &Quantity,
        flux: &Quantity,
    ) -> Result<(Quantity, Quantity), IngestError> {
        if wavelength.len() != flux.len() {
            return Err(IngestError::LengthMismatch {
                axis: wavelength.len(),
                flux: flux.len(),
            });
        }

        let axis = convert_axis(wavelength, &self.target)?;
        let (axis, flux) = sort_by_axis(&axis, flux);
        let (axis_values, axis_unit) = axis.into_parts();
        let (flux_values, flux_unit) = flux.into_parts();

        let mut merged_axis = Vec::with_capacity(axis_values.len());
        let mut merged_flux = Vec::with_capacity(flux_values.len());
        let mut start = 0;
        while start < axis_values.len() {
            let value = axis_values[start];
            let mut end = start + 1;
            while end < axis_values.len() && axis_values[end] == value {
                end += 1;
            }
            let sum: f64 = flux_values[start..end].iter().sum();
            merged_axis.push(value);
            merged_flux.push(sum / (end - start) as f64);
            start = end;
        }
        if merged_axis.len() < axis_values.len() {
            debug!(
                "merged {} duplicate spectral points",
                axis_values.len() - merged_axis.len()
            );
        }

        if let Some(index) = merged_axis
            .windows(2)
            .position(|pair| !(pair[1] - pair[0] > 0.0))
        {
            return Err(IngestError::NonMonotonicAxis { index: index + 1 });
        }

        Ok((
            Quantity::new(merged_axis, axis_unit),
            Quantity::new(merged_flux, flux_unit),
        ))
    }
}

/// Reorder both arrays by ascending axis value (stable, NaN last).
pub fn sort_by_axis(axis: &Quantity, flux: &Quantity) -> (Quantity, Quantity) {
    if axis.len() <= 1 {
        return (axis.clone(), flux.clone());
    }
    let values = axis.values();
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    (axis.select(&order), flux.select(&order))
}

/// The full canonicalisation chain shared by the loaders and
/// `SpectrumRecord::to_canonical_units`: normalised nm axis plus flux pushed
/// through the direct → spectral-density → as-is fallback.
pub fn canonicalize(
    wavelength: &Quantity,
    flux: &Quantity,
) -> Result<(Quantity, FluxConversion), IngestError> {
    let (axis, flux) = SpectralAxisNormalizer::default().normalize(wavelength, flux)?;
    let converted = convert_flux(&flux, &axis, &canonical_flux_unit());
    Ok((axis, converted))
}

/// Canonicalise a preview sample: axis to nm and sorted, flux through the
/// fallback chain.  Previews are not deduplicated.
pub fn canonicalize_preview(
    wavelength: &Quantity,
    flux: &Quantity,
) -> Result<(Quantity, FluxConversion), IngestError> {
    let axis = convert_axis(wavelength, &canonical_wavelength_unit())?;
    let (axis, flux) = sort_by_axis(&axis, flux);
    let converted = convert_flux(&flux, &axis, &canonical_flux_unit());
    Ok((axis, converted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::ConversionMethod;

    fn nm(values: &[f64]) -> Quantity {
        Quantity::new(values.to_vec(), Unit::nanometer())
    }

    fn jy(values: &[f64]) -> Quantity {
        Quantity::new(values.to_vec(), Unit::jansky())
    }

    #[test]
    fn unsorted_input_is_sorted_with_its_flux() {
        let (axis, flux) = SpectralAxisNormalizer::default()
            .normalize(&nm(&[520.0, 500.0, 510.0]), &jy(&[3.0, 1.0, 2.0]))
            .unwrap();
        assert_eq!(axis.values(), &[500.0, 510.0, 520.0]);
        assert_eq!(flux.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn duplicate_wavelengths_collapse_to_the_mean_flux() {
        let (axis, flux) = SpectralAxisNormalizer::default()
            .normalize(&nm(&[500.0, 510.0, 500.0]), &jy(&[1.0, 5.0, 2.0]))
            .unwrap();
        assert_eq!(axis.values(), &[500.0, 510.0]);
        assert_eq!(flux.values(), &[1.5, 5.0]);
    }

    #[test]
    fn duplicates_are_detected_after_unit_conversion() {
        let wavelength = Quantity::new(vec![5000.0, 500.0], Unit::angstrom());
        let (axis, flux) = SpectralAxisNormalizer::new(Unit::angstrom())
            .normalize(&wavelength, &jy(&[2.0, 4.0]))
            .unwrap();
        assert_eq!(axis.values(), &[500.0, 5000.0]);
        assert_eq!(flux.values(), &[4.0, 2.0]);
    }

    #[test]
    fn nan_wavelengths_are_rejected() {
        let err = SpectralAxisNormalizer::default()
            .normalize(&nm(&[500.0, f64::NAN, f64::NAN]), &jy(&[1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(err, IngestError::NonMonotonicAxis { index: 1 }));
    }

    #[test]
    fn frequency_axis_is_reversed_into_wavelength_order() {
        let hz = Quantity::new(vec![6e14, 5e14], Unit::hertz());
        let (axis, flux) = SpectralAxisNormalizer::default()
            .normalize(&hz, &jy(&[6.0, 5.0]))
            .unwrap();
        assert!(axis.values()[0] < axis.values()[1]);
        assert_eq!(flux.values(), &[6.0, 5.0]);
    }

    #[test]
    fn canonicalize_converts_irradiance_through_spectral_density() {
        let irradiance = Unit::parse("W/(nm m2)").unwrap();
        let flux = Quantity::new(vec![1.0, 2.0, 3.0], irradiance);
        let (axis, converted) = canonicalize(&nm(&[700.0, 400.0, 550.0]), &flux).unwrap();
        assert_eq!(axis.values(), &[400.0, 550.0, 700.0]);
        assert_eq!(converted.method, ConversionMethod::SpectralDensity);
        assert_eq!(converted.flux.unit(), &Unit::jansky());
        assert!(converted.flux.values().iter().all(|v| v.is_finite() && *v > 0.0));
    }
}
