use once_cell::sync::Lazy;
use regex::Regex;

use super::unit::Unit;

// ---------------------------------------------------------------------------
// Unit inference from free-text column labels
// ---------------------------------------------------------------------------

static UNIT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?P<paren>[^)]+)\)|\[(?P<bracket>[^\]]+)\]").unwrap());

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Words that may sit between unit tokens without meaning anything.
const FILLER_WORDS: &[&str] = &["per", "of", "to", "in", "at"];

/// Lowercase token → unit.
///
/// With `compound == false` this is the keyword table used for whole-label
/// matches, where a bare `erg` conventionally means erg s⁻¹ cm⁻².  Inside a
/// compound label the same token is only the energy unit.
fn token_unit(token: &str, compound: bool) -> Option<Unit> {
    let unit = match token {
        "angstrom" | "angstroms" | "ang" | "aa" => Unit::angstrom(),
        "nm" | "nanometer" | "nanometers" => Unit::nanometer(),
        "micron" | "microns" | "um" => Unit::micron(),
        "hz" => Unit::hertz(),
        "jy" => Unit::jansky(),
        "erg" if compound => Unit::erg(),
        "erg" => Unit::erg()
            .try_div(&Unit::second().try_mul(&Unit::centimeter().powi(2).ok()?).ok()?)
            .ok()?,
        "w" | "watt" | "watts" => Unit::watt(),
        "s" | "sec" | "second" | "seconds" => Unit::second(),
        "m" => Unit::meter(),
        "m2" => Unit::meter().powi(2).ok()?,
        "m3" => Unit::meter().powi(3).ok()?,
        "cm" => Unit::centimeter(),
        "cm2" => Unit::centimeter().powi(2).ok()?,
        "cm3" => Unit::centimeter().powi(3).ok()?,
        _ => return None,
    };
    Some(unit)
}

fn is_known(token: &str) -> bool {
    token_unit(token, true).is_some()
}

/// Lowercase alphanumeric tokens, with adjacent pieces such as `m`, `2`
/// merged into `m2` when the concatenation is a known unit.
fn extract_tokens(text: &str) -> Vec<String> {
    let lowered = normalize_symbols(&text.to_lowercase());
    let raw: Vec<&str> = TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .collect();

    let mut merged = Vec::with_capacity(raw.len());
    let mut idx = 0;
    while idx < raw.len() {
        if let Some(next) = raw.get(idx + 1) {
            let combined = format!("{}{}", raw[idx], next);
            if is_known(&combined) {
                merged.push(combined);
                idx += 2;
                continue;
            }
        }
        merged.push(raw[idx].to_string());
        idx += 1;
    }
    merged
}

/// Map non-ASCII unit glyphs onto the spellings the tables know.
fn normalize_symbols(text: &str) -> String {
    text.replace(['Å', 'å', '\u{212B}'], " angstrom ")
        .replace(['µ', 'μ'], "u")
}

fn composite_unit(tokens: &[String]) -> Option<Unit> {
    let mut units = tokens
        .iter()
        .filter(|t| !FILLER_WORDS.contains(&t.as_str()))
        .filter_map(|t| token_unit(t, true));

    let mut composite = units.next()?;
    let mut count = 1;
    for unit in units {
        composite = composite.try_div(&unit).ok()?;
        count += 1;
    }
    (count >= 2).then_some(composite)
}

/// Infer a physical unit from a column label such as `"flux (Jy)"`,
/// `"wavelength [Angstrom]"` or `"irradiance_w_m2_nm"`.
///
/// Resolution order: whole-label keyword, compound built by sequential
/// division, any single keyword, and finally a direct parse of the label
/// text.  Returns `None` when nothing matches; callers apply their default.
pub fn infer_unit(label: &str) -> Option<Unit> {
    let candidate = UNIT_PATTERN
        .captures(label)
        .and_then(|caps| caps.name("paren").or_else(|| caps.name("bracket")))
        .map(|m| m.as_str())
        .unwrap_or(label);
    let cleaned = candidate.trim();

    let tokens = extract_tokens(cleaned);
    if tokens.is_empty() {
        return None;
    }

    let normalized = tokens.concat();
    if let Some(unit) = token_unit(&normalized, false) {
        return Some(unit);
    }

    if let Some(unit) = composite_unit(&tokens) {
        return Some(unit);
    }

    if let Some(unit) = tokens.iter().find_map(|t| token_unit(t, false)) {
        return Some(unit);
    }

    let expression = cleaned
        .replace(['Å', '\u{212B}'], "Angstrom")
        .replace(['µ', 'μ'], "u");
    Unit::parse(&expression).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::unit::Dimension;

    #[test]
    fn parenthesised_angstrom_is_a_tenth_of_a_nanometer() {
        let unit = infer_unit("wavelength (Angstrom)").unwrap();
        let factor = unit.conversion_factor(&Unit::nanometer()).unwrap();
        assert!((factor - 0.1).abs() < 1e-15);
    }

    #[test]
    fn irradiance_label_builds_compound_flux_density() {
        let unit = infer_unit("irradiance_w_m2_nm").unwrap();
        let expected = Unit::parse("W / m2 / nm").unwrap();
        assert!(unit.is_equivalent(&expected));
        assert_eq!(unit, expected);
        assert!(!unit.is_equivalent(&Unit::nanometer()));
    }

    #[test]
    fn plain_wavelength_label_maps_to_nanometers() {
        assert_eq!(infer_unit("wavelength_nm"), Some(Unit::nanometer()));
        assert_eq!(infer_unit("lambda [um]"), Some(Unit::micron()));
        assert_eq!(infer_unit("λ (µm)"), Some(Unit::micron()));
        assert_eq!(infer_unit("wave (Å)"), Some(Unit::angstrom()));
    }

    #[test]
    fn bracketed_cgs_flux_is_per_wavelength() {
        let unit = infer_unit("flux [erg/s/cm2/AA]").unwrap();
        assert_eq!(unit.dimension(), Dimension::FLUX_PER_WAVELENGTH);
    }

    #[test]
    fn per_frequency_label_ignores_stray_exponents() {
        let unit = infer_unit("F (W m^-2 Hz^-1)").unwrap();
        assert_eq!(unit.dimension(), Dimension::FLUX_PER_FREQUENCY);
    }

    #[test]
    fn bare_erg_keyword_is_an_integrated_flux() {
        let unit = infer_unit("erg").unwrap();
        assert_eq!(unit.dimension(), Dimension::FLUX_INTEGRATED);
    }

    #[test]
    fn jansky_label() {
        assert_eq!(infer_unit("flux (Jy)"), Some(Unit::jansky()));
    }

    #[test]
    fn labels_without_units_resolve_to_nothing() {
        assert_eq!(infer_unit("flux"), None);
        assert_eq!(infer_unit("counts"), None);
        assert_eq!(infer_unit("col1"), None);
        assert_eq!(infer_unit(""), None);
    }

    #[test]
    fn direct_expression_is_the_last_resort() {
        let unit = infer_unit("mJy").unwrap();
        assert!(unit.is_equivalent(&Unit::jansky()));
        assert!((unit.scale() - 1e-29).abs() < 1e-40);
    }

    #[test]
    fn oversized_exponents_resolve_to_nothing() {
        assert_eq!(infer_unit("flux (m100 m100)"), None);
        let many = vec!["m3"; 50].join(" ");
        assert!(infer_unit(&format!("flux ({many})")).is_some());
    }
}
