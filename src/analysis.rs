use std::collections::BTreeMap;

use crate::data::model::{Spectrum, SpectrumMetadata, SpectrumRecord};
use crate::data::normalize::sort_by_axis;
use crate::error::AnalysisError;
use crate::units::{
    canonical_flux_unit, canonical_wavelength_unit, convert_axis, convert_flux, ConversionMethod,
    Quantity, Unit,
};

/// Denominators smaller than this (in absolute value) are clamped in ratios.
pub const DEFAULT_RATIO_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Resampling
// ---------------------------------------------------------------------------

/// Linear interpolation of `(xs, ys)` at `targets`; NaN outside `xs`.
///
/// `xs` must be strictly increasing.
pub fn interpolate_linear(xs: &[f64], ys: &[f64], targets: &[f64]) -> Vec<f64> {
    let (Some(&lo), Some(&hi)) = (xs.first(), xs.last()) else {
        return vec![f64::NAN; targets.len()];
    };
    targets
        .iter()
        .map(|&x| {
            if !(lo..=hi).contains(&x) {
                return f64::NAN;
            }
            let upper = xs.partition_point(|&v| v < x);
            if xs[upper] == x {
                return ys[upper];
            }
            let (x0, x1) = (xs[upper - 1], xs[upper]);
            let (y0, y1) = (ys[upper - 1], ys[upper]);
            y0 + (y1 - y0) * (x - x0) / (x1 - x0)
        })
        .collect()
}

/// `second`'s flux on `first`'s spectral axis, in `first`'s flux unit.
fn resample_onto(first: &Spectrum, second: &Spectrum) -> Result<Quantity, AnalysisError> {
    let axis = first.spectral_axis();
    let second_axis = convert_axis(second.spectral_axis(), axis.unit())?;

    // Conversion to the other axis unit may reverse the order (frequency).
    let (xs, ys): (Vec<f64>, Vec<f64>) = if second_axis.values().first() > second_axis.values().last()
    {
        second_axis
            .values()
            .iter()
            .rev()
            .copied()
            .zip(second.flux().values().iter().rev().copied())
            .unzip()
    } else {
        (second_axis.values().to_vec(), second.flux().values().to_vec())
    };
    let resampled = Quantity::new(
        interpolate_linear(&xs, &ys, axis.values()),
        second.flux().unit().clone(),
    );

    let converted = convert_flux(&resampled, axis, first.flux().unit());
    if converted.method == ConversionMethod::Unconverted {
        return Err(AnalysisError::IncompatibleFlux {
            first: first.flux().unit().to_string(),
            second: second.flux().unit().to_string(),
        });
    }
    Ok(converted.flux)
}

/// Frequency and wavenumber axes come out of the nm conversion reversed.
fn ascending(axis: &Quantity, flux: &Quantity) -> Result<Spectrum, AnalysisError> {
    let (axis, flux) = sort_by_axis(axis, flux);
    Ok(Spectrum::new(axis, flux)?)
}

fn combine_metadata(
    operation: &str,
    first: &SpectrumMetadata,
    second: &SpectrumMetadata,
) -> SpectrumMetadata {
    let description = format!("{operation} of {} and {}", first.source, second.source);
    let mut extra = BTreeMap::new();
    extra.insert("operation".to_string(), operation.to_string());
    extra.insert("primary_source".to_string(), first.source.clone());
    extra.insert("secondary_source".to_string(), second.source.clone());
    for (key, value) in &first.extra {
        extra.insert(format!("primary_{key}"), value.clone());
    }
    for (key, value) in &second.extra {
        extra.insert(format!("secondary_{key}"), value.clone());
    }
    SpectrumMetadata {
        source: description.clone(),
        description: Some(description),
        extra,
        ..SpectrumMetadata::default()
    }
}

// ---------------------------------------------------------------------------
// Difference / ratio
// ---------------------------------------------------------------------------

/// `first - second`, with `second` resampled onto `first`'s axis.
///
/// The result is expressed in nm / Jy when the flux unit allows it.
pub fn compute_difference(
    first: &SpectrumRecord,
    second: &SpectrumRecord,
    identifier: Option<&str>,
) -> Result<SpectrumRecord, AnalysisError> {
    let resampled = resample_onto(&first.spectrum, &second.spectrum)?;
    let values = first
        .spectrum
        .flux()
        .values()
        .iter()
        .zip(resampled.values())
        .map(|(a, b)| a - b)
        .collect();
    let difference = Quantity::new(values, first.spectrum.flux().unit().clone());

    let axis = convert_axis(first.spectrum.spectral_axis(), &canonical_wavelength_unit())?;
    let flux = convert_flux(&difference, &axis, &canonical_flux_unit()).flux;
    let spectrum = ascending(&axis, &flux)?;

    let metadata = combine_metadata("difference", &first.metadata, &second.metadata);
    let identifier = identifier
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-minus-{}", first.identifier, second.identifier));
    Ok(SpectrumRecord::new(identifier, spectrum, metadata))
}

/// `first / second` with near-zero denominators clamped to `epsilon`.
///
/// The flux unit is decomposed, so matching units give a dimensionless ratio.
pub fn compute_ratio(
    first: &SpectrumRecord,
    second: &SpectrumRecord,
    identifier: Option<&str>,
    epsilon: f64,
) -> Result<SpectrumRecord, AnalysisError> {
    let resampled = resample_onto(&first.spectrum, &second.spectrum)?;
    let unit = first.spectrum.flux().unit().try_div(resampled.unit())?.decompose();
    let (scale, unit) = if unit.dimension().is_dimensionless() {
        (unit.scale(), Unit::dimensionless())
    } else {
        (1.0, unit)
    };
    let values = first
        .spectrum
        .flux()
        .values()
        .iter()
        .zip(resampled.values())
        .map(|(a, b)| {
            let denominator = if b.abs() < epsilon { epsilon } else { *b };
            a / denominator * scale
        })
        .collect();

    let axis = convert_axis(first.spectrum.spectral_axis(), &canonical_wavelength_unit())?;
    let spectrum = ascending(&axis, &Quantity::new(values, unit))?;

    let metadata = combine_metadata("ratio", &first.metadata, &second.metadata);
    let identifier = identifier
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-over-{}", first.identifier, second.identifier));
    Ok(SpectrumRecord::new(identifier, spectrum, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identifier: &str, axis: &[f64], flux: &[f64], flux_unit: Unit) -> SpectrumRecord {
        let spectrum = Spectrum::new(
            Quantity::new(axis.to_vec(), Unit::nanometer()),
            Quantity::new(flux.to_vec(), flux_unit),
        )
        .unwrap();
        let metadata = SpectrumMetadata::new(identifier)
            .with_description("test")
            .with_extra("row_count", "3");
        SpectrumRecord::new(identifier, spectrum, metadata)
    }

    #[test]
    fn interpolation_is_linear_and_nan_outside() {
        let ys = interpolate_linear(&[1.0, 3.0], &[10.0, 30.0], &[0.5, 1.0, 2.0, 3.0, 3.5]);
        assert!(ys[0].is_nan());
        assert_eq!(&ys[1..4], &[10.0, 20.0, 30.0]);
        assert!(ys[4].is_nan());
    }

    #[test]
    fn difference_subtracts_point_by_point() {
        let first = record("A", &[500.0, 510.0, 520.0], &[2.0, 4.0, 6.0], Unit::jansky());
        let second = record("B", &[500.0, 510.0, 520.0], &[1.0, 1.0, 1.0], Unit::jansky());
        let result = compute_difference(&first, &second, None).unwrap();

        assert_eq!(result.identifier, "A-minus-B");
        assert_eq!(result.spectrum.flux().values(), &[1.0, 3.0, 5.0]);
        assert_eq!(result.metadata.extra["operation"], "difference");
        assert_eq!(result.metadata.extra["primary_source"], "A");
        assert_eq!(result.metadata.extra["secondary_row_count"], "3");
    }

    #[test]
    fn difference_resamples_and_converts_the_second_spectrum() {
        let first = record("A", &[500.0, 510.0, 520.0], &[2.0, 2.0, 2.0], Unit::jansky());
        let mjy = Unit::parse("mJy").unwrap();
        let second = record("B", &[505.0, 525.0], &[1000.0, 3000.0], mjy);
        let result = compute_difference(&first, &second, Some("diff")).unwrap();

        let flux = result.spectrum.flux().values();
        assert_eq!(result.identifier, "diff");
        assert!(flux[0].is_nan());
        assert!((flux[1] - 0.5).abs() < 1e-12);
        assert!((flux[2] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn ratio_clamps_zero_denominators() {
        let first = record("A", &[500.0, 510.0, 520.0], &[2.0, 4.0, 6.0], Unit::jansky());
        let second = record("B", &[500.0, 510.0, 520.0], &[0.0, 1.0, 2.0], Unit::jansky());
        let result = compute_ratio(&first, &second, None, DEFAULT_RATIO_EPSILON).unwrap();

        let flux = result.spectrum.flux().values();
        assert_eq!(result.identifier, "A-over-B");
        assert!(flux[0] > 0.0);
        assert!((flux[1] - 4.0).abs() < 1e-12);
        assert!(result.spectrum.flux().unit().dimension().is_dimensionless());
        assert_eq!(result.metadata.extra["operation"], "ratio");
    }

    #[test]
    fn incompatible_flux_units_are_rejected() {
        let first = record("A", &[500.0, 510.0], &[1.0, 1.0], Unit::jansky());
        let second = record("B", &[500.0, 510.0], &[1.0, 1.0], Unit::second());
        let err = compute_difference(&first, &second, None).unwrap_err();
        assert!(matches!(err, AnalysisError::IncompatibleFlux { .. }));
    }

    fn frequency_record(identifier: &str, flux: &[f64]) -> SpectrumRecord {
        let spectrum = Spectrum::new(
            Quantity::new(vec![400.0, 500.0, 600.0], Unit::parse("THz").unwrap()),
            Quantity::new(flux.to_vec(), Unit::jansky()),
        )
        .unwrap();
        SpectrumRecord::new(identifier, spectrum, SpectrumMetadata::new(identifier))
    }

    #[test]
    fn frequency_axes_are_reordered_after_conversion() {
        let first = frequency_record("A", &[1.0, 2.0, 3.0]);
        let second = frequency_record("B", &[0.5, 0.5, 0.5]);

        let difference = compute_difference(&first, &second, None).unwrap();
        let axis = difference.spectrum.spectral_axis();
        assert_eq!(axis.unit(), &Unit::nanometer());
        assert!(axis.values().windows(2).all(|w| w[1] > w[0]));
        let flux = difference.spectrum.flux().values();
        assert!((flux[0] - 2.5).abs() < 1e-12);
        assert!((flux[2] - 0.5).abs() < 1e-12);

        let ratio = compute_ratio(&first, &second, None, DEFAULT_RATIO_EPSILON).unwrap();
        let flux = ratio.spectrum.flux().values();
        assert!((flux[0] - 6.0).abs() < 1e-12);
        assert!((flux[2] - 2.0).abs() < 1e-12);
    }
}
