use std::fmt;

use log::debug;

use crate::error::UnitError;

use super::quantity::Quantity;
use super::unit::{Dimension, Unit};

/// Speed of light in vacuum, m s⁻¹.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Planck constant, J s.
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Tolerances used when verifying that a conversion is reversible.
pub const ROUND_TRIP_ATOL: f64 = 1e-12;
pub const ROUND_TRIP_RTOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Equivalencies – explicit, separately invocable conversion strategies
// ---------------------------------------------------------------------------

/// A physical reinterpretation used when direct conversion is impossible.
#[derive(Debug, Clone, Copy)]
pub enum Equivalency<'a> {
    /// Wavelength ↔ frequency ↔ photon energy ↔ wavenumber.
    Spectral,
    /// F_ν ↔ F_λ ↔ νF_ν, evaluated point by point at the given spectral axis.
    SpectralDensity(&'a Quantity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpectralClass {
    Length,
    Frequency,
    Energy,
    Wavenumber,
}

impl SpectralClass {
    fn of(unit: &Unit) -> Option<Self> {
        match unit.dimension() {
            Dimension::LENGTH => Some(Self::Length),
            Dimension::FREQUENCY => Some(Self::Frequency),
            Dimension::ENERGY => Some(Self::Energy),
            Dimension::WAVENUMBER => Some(Self::Wavenumber),
            _ => None,
        }
    }

    /// SI value of this class ↔ wavelength in metres.  The mapping is its own
    /// inverse, so the same function serves both directions.
    fn swap_with_meters(self, value: f64) -> f64 {
        match self {
            Self::Length => value,
            Self::Frequency => SPEED_OF_LIGHT / value,
            Self::Energy => PLANCK * SPEED_OF_LIGHT / value,
            Self::Wavenumber => 1.0 / value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DensityClass {
    PerFrequency,
    PerWavelength,
    Integrated,
}

impl DensityClass {
    fn of(unit: &Unit) -> Option<Self> {
        match unit.dimension() {
            Dimension::FLUX_PER_FREQUENCY => Some(Self::PerFrequency),
            Dimension::FLUX_PER_WAVELENGTH => Some(Self::PerWavelength),
            Dimension::FLUX_INTEGRATED => Some(Self::Integrated),
            _ => None,
        }
    }

    /// SI value of this class → SI F_ν at wavelength `lambda` (m).
    fn to_per_frequency(self, value: f64, lambda: f64) -> f64 {
        match self {
            Self::PerFrequency => value,
            Self::PerWavelength => value * lambda * lambda / SPEED_OF_LIGHT,
            Self::Integrated => value * lambda / SPEED_OF_LIGHT,
        }
    }

    fn from_per_frequency(self, fnu: f64, lambda: f64) -> f64 {
        match self {
            Self::PerFrequency => fnu,
            Self::PerWavelength => fnu * SPEED_OF_LIGHT / (lambda * lambda),
            Self::Integrated => fnu * SPEED_OF_LIGHT / lambda,
        }
    }
}

/// Whether `unit` is a length, frequency, photon energy or wavenumber.
pub fn is_spectral(unit: &Unit) -> bool {
    SpectralClass::of(unit).is_some()
}

/// Convert a spectral coordinate between length, frequency, energy and
/// wavenumber units.
pub fn spectral(q: &Quantity, target: &Unit) -> Result<Quantity, UnitError> {
    let from = SpectralClass::of(q.unit())
        .ok_or_else(|| UnitError::NotSpectral(q.unit().symbol().to_string()))?;
    let to = SpectralClass::of(target)
        .ok_or_else(|| UnitError::NotSpectral(target.symbol().to_string()))?;
    if from == to {
        return q.to(target);
    }
    let (scale, target_scale) = (q.unit().scale(), target.scale());
    let values = q
        .values()
        .iter()
        .map(|&v| to.swap_with_meters(from.swap_with_meters(v * scale)) / target_scale)
        .collect();
    Ok(Quantity::new(values, target.clone()))
}

/// Convert flux densities between the per-frequency, per-wavelength and
/// band-integrated conventions using the wavelength of every point.
pub fn spectral_density(
    flux: &Quantity,
    wavelength: &Quantity,
    target: &Unit,
) -> Result<Quantity, UnitError> {
    if flux.len() != wavelength.len() {
        return Err(UnitError::LengthMismatch {
            expected: flux.len(),
            found: wavelength.len(),
        });
    }
    let incompatible = || UnitError::Incompatible {
        from: flux.unit().symbol().to_string(),
        to: target.symbol().to_string(),
    };
    let from = DensityClass::of(flux.unit()).ok_or_else(incompatible)?;
    let to = DensityClass::of(target).ok_or_else(incompatible)?;

    let lambdas = spectral(wavelength, &Unit::meter())?;
    let (scale, target_scale) = (flux.unit().scale(), target.scale());
    let values = flux
        .values()
        .iter()
        .zip(lambdas.values())
        .map(|(&v, &lambda)| {
            let fnu = from.to_per_frequency(v * scale, lambda);
            to.from_per_frequency(fnu, lambda) / target_scale
        })
        .collect();
    Ok(Quantity::new(values, target.clone()))
}

/// Direct conversion first, then the given equivalency.
pub fn convert_with(
    q: &Quantity,
    target: &Unit,
    equivalency: Option<Equivalency<'_>>,
) -> Result<Quantity, UnitError> {
    match (q.to(target), equivalency) {
        (Ok(converted), _) => Ok(converted),
        (Err(err), None) => Err(err),
        (Err(_), Some(Equivalency::Spectral)) => spectral(q, target),
        (Err(_), Some(Equivalency::SpectralDensity(wavelength))) => {
            spectral_density(q, wavelength, target)
        }
    }
}

/// Spectral-axis conversion: direct, else through the spectral equivalency.
pub fn convert_axis(axis: &Quantity, target: &Unit) -> Result<Quantity, UnitError> {
    convert_with(axis, target, Some(Equivalency::Spectral))
}

// ---------------------------------------------------------------------------
// Flux conversion with graceful fallback
// ---------------------------------------------------------------------------

/// Which step of the fallback chain produced the flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMethod {
    Direct,
    SpectralDensity,
    Unconverted,
}

impl ConversionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionMethod::Direct => "direct",
            ConversionMethod::SpectralDensity => "spectral_density",
            ConversionMethod::Unconverted => "unconverted",
        }
    }
}

impl fmt::Display for ConversionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FluxConversion {
    pub flux: Quantity,
    pub method: ConversionMethod,
}

/// Convert `flux` to `target`, never failing.
///
/// Direct conversion is tried first, then the spectral-density equivalency at
/// `wavelength`.  If both fail the flux is returned untouched with
/// [`ConversionMethod::Unconverted`] so the caller can flag the unit.
pub fn convert_flux(flux: &Quantity, wavelength: &Quantity, target: &Unit) -> FluxConversion {
    if let Ok(converted) = flux.to(target) {
        return FluxConversion {
            flux: converted,
            method: ConversionMethod::Direct,
        };
    }
    match spectral_density(flux, wavelength, target) {
        Ok(converted) => FluxConversion {
            flux: converted,
            method: ConversionMethod::SpectralDensity,
        },
        Err(err) => {
            debug!("keeping flux in '{}': {err}", flux.unit());
            FluxConversion {
                flux: flux.clone(),
                method: ConversionMethod::Unconverted,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Round-trip verification
// ---------------------------------------------------------------------------

/// `|a - b| <= atol + rtol * |b|` element-wise; NaNs compare equal to NaNs.
pub fn all_close(a: &[f64], b: &[f64], atol: f64, rtol: f64) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(&x, &y)| {
            if x.is_nan() || y.is_nan() {
                return x.is_nan() && y.is_nan();
            }
            x == y || (x - y).abs() <= atol + rtol * y.abs()
        })
}

/// Convert to `target` and back again, reporting whether the original values
/// survive within [`ROUND_TRIP_ATOL`] / [`ROUND_TRIP_RTOL`].
pub fn convert_round_trip(
    q: &Quantity,
    target: &Unit,
    equivalency: Option<Equivalency<'_>>,
) -> Result<(Quantity, bool), UnitError> {
    let converted = convert_with(q, target, equivalency)?;
    let back = convert_with(&converted, q.unit(), equivalency)?;
    let verified = all_close(back.values(), q.values(), ROUND_TRIP_ATOL, ROUND_TRIP_RTOL);
    Ok((converted, verified))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn irradiance() -> Unit {
        Unit::parse("W/(nm m2)").unwrap()
    }

    fn cgs_flambda() -> Unit {
        Unit::parse("erg / (cm2 s AA)").unwrap()
    }

    #[test]
    fn frequency_axis_becomes_wavelength() {
        let axis = Quantity::new(vec![SPEED_OF_LIGHT / 500e-9], Unit::hertz());
        let nm = convert_axis(&axis, &Unit::nanometer()).unwrap();
        assert!((nm.values()[0] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn flux_axis_is_not_spectral() {
        let axis = Quantity::new(vec![1.0], Unit::jansky());
        let err = convert_axis(&axis, &Unit::nanometer()).unwrap_err();
        assert!(matches!(err, UnitError::NotSpectral(_)));
    }

    #[test]
    fn per_wavelength_flux_reaches_jansky() {
        let wavelength = Quantity::new(vec![400.0, 500.0, 600.0], Unit::nanometer());
        let flux = Quantity::new(vec![1.0, 1.0, 1.0], irradiance());

        let converted = convert_flux(&flux, &wavelength, &Unit::jansky());

        assert_eq!(converted.method, ConversionMethod::SpectralDensity);
        assert_eq!(converted.flux.unit(), &Unit::jansky());
        for (&jy, &nm) in converted.flux.values().iter().zip(wavelength.values()) {
            let lambda = nm * 1e-9;
            // 1 W m-2 nm-1 = 1e9 W m-3; F_nu = F_lambda * lambda^2 / c
            let expected = 1e9 * lambda * lambda / SPEED_OF_LIGHT / 1e-26;
            assert!((jy - expected).abs() <= 1e-9 * expected);
        }
    }

    #[test]
    fn impossible_flux_conversion_keeps_the_unit() {
        let wavelength = Quantity::new(vec![500.0], Unit::nanometer());
        let flux = Quantity::new(vec![3.0], Unit::second());

        let converted = convert_flux(&flux, &wavelength, &Unit::jansky());

        assert_eq!(converted.method, ConversionMethod::Unconverted);
        assert_eq!(converted.flux.unit(), &Unit::second());
        assert_eq!(converted.flux.values(), &[3.0]);
    }

    #[test]
    fn spectral_density_needs_matching_lengths() {
        let wavelength = Quantity::new(vec![500.0], Unit::nanometer());
        let flux = Quantity::new(vec![1.0, 2.0], irradiance());
        let err = spectral_density(&flux, &wavelength, &Unit::jansky()).unwrap_err();
        assert_eq!(
            err,
            UnitError::LengthMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn jansky_to_cgs_round_trips() {
        let wavelength = Quantity::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], Unit::micron());
        let flux = Quantity::new(vec![3.0; 5], Unit::jansky());

        let (converted, verified) = convert_round_trip(
            &flux,
            &cgs_flambda(),
            Some(Equivalency::SpectralDensity(&wavelength)),
        )
        .unwrap();

        assert!(converted.unit().is_equivalent(&cgs_flambda()));
        assert!(verified);
    }

    #[test]
    fn direct_round_trip_holds_for_canonical_flux() {
        let flux = Quantity::new(vec![0.0, 1.5, -2.25, 1e-30, 7e12], Unit::jansky());
        let (_, verified) =
            convert_round_trip(&flux, &Unit::parse("mJy").unwrap(), None).unwrap();
        assert!(verified);
    }

    #[test]
    fn all_close_uses_numpy_tolerances() {
        assert!(all_close(&[1.0 + 1e-10], &[1.0], 1e-12, 1e-9));
        assert!(!all_close(&[1.0 + 1e-8], &[1.0], 1e-12, 1e-9));
        assert!(all_close(&[f64::NAN], &[f64::NAN], 1e-12, 1e-9));
        assert!(!all_close(&[1.0], &[1.0, 2.0], 1e-12, 1e-9));
    }
}
