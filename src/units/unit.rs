use std::fmt;

use crate::error::UnitError;

// ---------------------------------------------------------------------------
// Dimension – exponent vector over the base quantities
// ---------------------------------------------------------------------------

/// Integer exponents over (length, mass, time).
///
/// Multiplying units adds exponents, dividing subtracts them.  Two units are
/// convertible by a plain scale factor exactly when their dimensions match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    pub length: i8,
    pub mass: i8,
    pub time: i8,
}

impl Dimension {
    pub const NONE: Dimension = Dimension::new(0, 0, 0);
    pub const LENGTH: Dimension = Dimension::new(1, 0, 0);
    pub const MASS: Dimension = Dimension::new(0, 1, 0);
    pub const TIME: Dimension = Dimension::new(0, 0, 1);
    pub const FREQUENCY: Dimension = Dimension::new(0, 0, -1);
    pub const WAVENUMBER: Dimension = Dimension::new(-1, 0, 0);
    pub const ENERGY: Dimension = Dimension::new(2, 1, -2);
    pub const POWER: Dimension = Dimension::new(2, 1, -3);
    /// Flux density per unit frequency (W m⁻² Hz⁻¹, Jy).
    pub const FLUX_PER_FREQUENCY: Dimension = Dimension::new(0, 1, -2);
    /// Flux density per unit wavelength (W m⁻² nm⁻¹, erg s⁻¹ cm⁻² Å⁻¹).
    pub const FLUX_PER_WAVELENGTH: Dimension = Dimension::new(-1, 1, -3);
    /// Band-integrated flux, i.e. νF_ν or λF_λ (W m⁻²).
    pub const FLUX_INTEGRATED: Dimension = Dimension::new(0, 1, -3);

    pub const fn new(length: i8, mass: i8, time: i8) -> Self {
        Self { length, mass, time }
    }

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::NONE
    }

    /// `None` when an exponent leaves the `i8` range.
    pub fn checked_powi(self, n: i8) -> Option<Self> {
        Some(Self::new(
            self.length.checked_mul(n)?,
            self.mass.checked_mul(n)?,
            self.time.checked_mul(n)?,
        ))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.length.checked_add(other.length)?,
            self.mass.checked_add(other.mass)?,
            self.time.checked_add(other.time)?,
        ))
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.length.checked_sub(other.length)?,
            self.mass.checked_sub(other.mass)?,
            self.time.checked_sub(other.time)?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Unit – scale factor relative to SI plus a dimension vector
// ---------------------------------------------------------------------------

/// A physical unit: `value_in_si = value * scale`.
///
/// The symbol is carried for display and provenance only; equality is decided
/// by dimension and scale, so `W / m2 / nm` equals `W / (m2 nm)`.
#[derive(Debug, Clone)]
pub struct Unit {
    scale: f64,
    dimension: Dimension,
    symbol: String,
}

/// Symbols understood by [`Unit::parse`] and [`Unit::lookup`].
const SYMBOLS: &[(&str, f64, Dimension)] = &[
    ("m", 1.0, Dimension::LENGTH),
    ("km", 1e3, Dimension::LENGTH),
    ("cm", 1e-2, Dimension::LENGTH),
    ("mm", 1e-3, Dimension::LENGTH),
    ("um", 1e-6, Dimension::LENGTH),
    ("micron", 1e-6, Dimension::LENGTH),
    ("nm", 1e-9, Dimension::LENGTH),
    ("Angstrom", 1e-10, Dimension::LENGTH),
    ("angstrom", 1e-10, Dimension::LENGTH),
    ("AA", 1e-10, Dimension::LENGTH),
    ("g", 1e-3, Dimension::MASS),
    ("kg", 1.0, Dimension::MASS),
    ("s", 1.0, Dimension::TIME),
    ("Hz", 1.0, Dimension::FREQUENCY),
    ("kHz", 1e3, Dimension::FREQUENCY),
    ("MHz", 1e6, Dimension::FREQUENCY),
    ("GHz", 1e9, Dimension::FREQUENCY),
    ("THz", 1e12, Dimension::FREQUENCY),
    ("J", 1.0, Dimension::ENERGY),
    ("erg", 1e-7, Dimension::ENERGY),
    ("eV", 1.602_176_634e-19, Dimension::ENERGY),
    ("W", 1.0, Dimension::POWER),
    ("Jy", 1e-26, Dimension::FLUX_PER_FREQUENCY),
    ("mJy", 1e-29, Dimension::FLUX_PER_FREQUENCY),
    ("uJy", 1e-32, Dimension::FLUX_PER_FREQUENCY),
];

impl Unit {
    pub fn new(symbol: impl Into<String>, scale: f64, dimension: Dimension) -> Self {
        Self {
            scale,
            dimension,
            symbol: symbol.into(),
        }
    }

    pub fn dimensionless() -> Self {
        Self::new("", 1.0, Dimension::NONE)
    }

    /// Look up a single symbol (case-sensitive, e.g. `"nm"`, `"Jy"`).
    pub fn lookup(symbol: &str) -> Option<Unit> {
        SYMBOLS
            .iter()
            .find(|(name, _, _)| *name == symbol)
            .map(|&(name, scale, dimension)| Unit::new(name, scale, dimension))
    }

    fn builtin(symbol: &str) -> Unit {
        // Only called with entries of SYMBOLS.
        Self::lookup(symbol).unwrap_or_else(Unit::dimensionless)
    }

    pub fn meter() -> Self {
        Self::builtin("m")
    }

    pub fn centimeter() -> Self {
        Self::builtin("cm")
    }

    pub fn nanometer() -> Self {
        Self::builtin("nm")
    }

    pub fn micron() -> Self {
        Self::builtin("micron")
    }

    pub fn angstrom() -> Self {
        Self::builtin("Angstrom")
    }

    pub fn second() -> Self {
        Self::builtin("s")
    }

    pub fn hertz() -> Self {
        Self::builtin("Hz")
    }

    pub fn erg() -> Self {
        Self::builtin("erg")
    }

    pub fn watt() -> Self {
        Self::builtin("W")
    }

    pub fn jansky() -> Self {
        Self::builtin("Jy")
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Same dimension, i.e. convertible by a pure scale factor.
    pub fn is_equivalent(&self, other: &Unit) -> bool {
        self.dimension == other.dimension
    }

    /// Factor `f` such that `value_in_self * f == value_in_target`.
    pub fn conversion_factor(&self, target: &Unit) -> Result<f64, UnitError> {
        if !self.is_equivalent(target) {
            return Err(UnitError::Incompatible {
                from: self.symbol.clone(),
                to: target.symbol.clone(),
            });
        }
        Ok(self.scale / target.scale)
    }

    pub fn powi(&self, n: i8) -> Result<Unit, UnitError> {
        let dimension = self
            .dimension
            .checked_powi(n)
            .ok_or_else(|| overflow(&format!("({})^{n}", self.symbol)))?;
        let symbol = if n == 1 || self.symbol.is_empty() {
            self.symbol.clone()
        } else if is_atomic(&self.symbol) {
            format!("{}{n}", self.symbol)
        } else {
            format!("({}){n}", self.symbol)
        };
        Ok(Unit::new(symbol, self.scale.powi(n as i32), dimension))
    }

    /// Drop the symbol and express the unit in SI base units.
    ///
    /// Dimensionless results keep their scale so that callers can fold it into
    /// the values (`Jy / mJy` decomposes to a pure factor of 1000).
    pub fn decompose(&self) -> Unit {
        if self.dimension.is_dimensionless() {
            return Unit::new("", self.scale, Dimension::NONE);
        }
        self.clone()
    }

    /// Parse a unit expression such as `"W/(m2 nm)"`, `"erg s^-1 cm**-2 AA-1"`
    /// or `"1e-17 erg/s/cm2/Angstrom"`.
    pub fn parse(expr: &str) -> Result<Unit, UnitError> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Err(parse_error(expr, "empty expression"));
        }
        let mut parser = Parser {
            expr,
            tokens,
            pos: 0,
        };
        let unit = parser.product()?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(expr, "unexpected trailing input"));
        }
        Ok(unit)
    }
}

fn is_atomic(symbol: &str) -> bool {
    symbol.chars().all(|c| c.is_ascii_alphanumeric())
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension
            && (self.scale - other.scale).abs() <= 1e-12 * self.scale.abs().max(other.scale.abs())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

impl Unit {
    /// Product of two units; fails when an exponent overflows.
    pub fn try_mul(&self, rhs: &Unit) -> Result<Unit, UnitError> {
        let dimension = self
            .dimension
            .checked_add(rhs.dimension)
            .ok_or_else(|| overflow(&format!("{} {}", self.symbol, rhs.symbol)))?;
        let symbol = match (self.symbol.is_empty(), rhs.symbol.is_empty()) {
            (true, _) => rhs.symbol.clone(),
            (_, true) => self.symbol.clone(),
            _ => format!("{} {}", self.symbol, rhs.symbol),
        };
        Ok(Unit::new(symbol, self.scale * rhs.scale, dimension))
    }

    /// Quotient of two units; fails when an exponent overflows.
    pub fn try_div(&self, rhs: &Unit) -> Result<Unit, UnitError> {
        let dimension = self
            .dimension
            .checked_sub(rhs.dimension)
            .ok_or_else(|| overflow(&format!("{} / {}", self.symbol, rhs.symbol)))?;
        let numerator = if self.symbol.is_empty() { "1" } else { &self.symbol };
        let symbol = if rhs.symbol.is_empty() {
            self.symbol.clone()
        } else if rhs.symbol.contains(' ') || rhs.symbol.contains('/') {
            format!("{numerator} / ({})", rhs.symbol)
        } else {
            format!("{numerator} / {}", rhs.symbol)
        };
        Ok(Unit::new(symbol, self.scale / rhs.scale, dimension))
    }
}

fn overflow(expr: &str) -> UnitError {
    parse_error(expr, "dimension exponent out of range")
}

// ---------------------------------------------------------------------------
// Expression parser
// ---------------------------------------------------------------------------
//
//   product := factor (('*' | '/' | <juxtaposition>) factor)*
//   factor  := atom (('^' | '**') number)?
//   atom    := symbol[exponent] | number | '(' product ')'

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(String, Option<i8>),
    Number(f64),
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn parse_error(expr: &str, reason: impl Into<String>) -> UnitError {
    UnitError::Parse {
        expr: expr.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, UnitError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let signed_digit = (c == '-' || c == '+')
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        match c {
            _ if c.is_whitespace() => i += 1,
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ if c.is_ascii_digit() || c == '.' || signed_digit => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let n = chars[i];
                    let exponent_sign =
                        (n == '-' || n == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if n.is_ascii_digit() || n == '.' || n == 'e' || n == 'E' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| parse_error(expr, format!("invalid number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            _ if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_alphabetic() {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let exp_start = i;
                if i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || ((chars[i] == '-' || chars[i] == '+')
                            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())))
                {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let exponent = if exp_start < i {
                    let text: String = chars[exp_start..i].iter().collect();
                    Some(
                        text.parse::<i8>()
                            .map_err(|_| parse_error(expr, format!("invalid exponent '{text}'")))?,
                    )
                } else {
                    None
                };
                tokens.push(Token::Symbol(name, exponent));
            }
            other => return Err(parse_error(expr, format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn product(&mut self) -> Result<Unit, UnitError> {
        let mut unit = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    unit = unit.try_mul(&self.factor()?)?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    unit = unit.try_div(&self.factor()?)?;
                }
                Some(Token::Symbol(..)) | Some(Token::Number(_)) | Some(Token::LParen) => {
                    unit = unit.try_mul(&self.factor()?)?;
                }
                _ => return Ok(unit),
            }
        }
    }

    fn factor(&mut self) -> Result<Unit, UnitError> {
        let unit = self.atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            return match self.next() {
                Some(Token::Number(n)) if n.fract() == 0.0 && n.abs() <= i8::MAX as f64 => {
                    unit.powi(n as i8)
                }
                _ => Err(parse_error(self.expr, "expected integer exponent")),
            };
        }
        Ok(unit)
    }

    fn atom(&mut self) -> Result<Unit, UnitError> {
        match self.next() {
            Some(Token::Symbol(name, exponent)) => {
                let unit = Unit::lookup(&name)
                    .ok_or_else(|| parse_error(self.expr, format!("unknown unit '{name}'")))?;
                match exponent {
                    Some(n) => unit.powi(n),
                    None => Ok(unit),
                }
            }
            Some(Token::Number(value)) => {
                let symbol = if value == 1.0 {
                    String::new()
                } else {
                    format!("{value:e}")
                };
                Ok(Unit::new(symbol, value, Dimension::NONE))
            }
            Some(Token::LParen) => {
                let unit = self.product()?;
                match self.next() {
                    Some(Token::RParen) => Ok(unit),
                    _ => Err(parse_error(self.expr, "unbalanced parenthesis")),
                }
            }
            _ => Err(parse_error(self.expr, "expected a unit")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angstrom_is_a_tenth_of_a_nanometer() {
        let factor = Unit::angstrom()
            .conversion_factor(&Unit::nanometer())
            .unwrap();
        assert!((factor - 0.1).abs() < 1e-15);
    }

    #[test]
    fn division_builds_compound_dimensions() {
        let irradiance = Unit::watt()
            .try_div(&Unit::meter().powi(2).unwrap())
            .and_then(|u| u.try_div(&Unit::nanometer()))
            .unwrap();
        assert_eq!(irradiance.dimension(), Dimension::FLUX_PER_WAVELENGTH);
        assert_eq!(irradiance.symbol(), "W / m2 / nm");
        assert!((irradiance.scale() - 1e9).abs() < 1e-3);
    }

    #[test]
    fn incompatible_conversion_is_an_error() {
        let err = Unit::jansky()
            .conversion_factor(&Unit::nanometer())
            .unwrap_err();
        assert!(matches!(err, UnitError::Incompatible { .. }));
    }

    #[test]
    fn parse_handles_grouping_and_exponents() {
        let grouped = Unit::parse("W/(m2 nm)").unwrap();
        let flat = Unit::parse("W m^-2 nm**-1").unwrap();
        let suffixed = Unit::parse("W m-2 nm-1").unwrap();
        assert_eq!(grouped, flat);
        assert_eq!(grouped, suffixed);
        assert_eq!(grouped.dimension(), Dimension::FLUX_PER_WAVELENGTH);
    }

    #[test]
    fn parse_accepts_scale_prefix() {
        let unit = Unit::parse("1e-17 erg/s/cm2/Angstrom").unwrap();
        let base = Unit::parse("erg/s/cm2/Angstrom").unwrap();
        assert!((unit.scale() / base.scale() - 1e-17).abs() < 1e-27);
        assert_eq!(unit.dimension(), base.dimension());
    }

    #[test]
    fn parse_rejects_unknown_symbols() {
        assert!(Unit::parse("flux").is_err());
        assert!(Unit::parse("col0").is_err());
        assert!(Unit::parse("(nm").is_err());
    }

    #[test]
    fn jansky_to_millijansky_decomposes_to_a_factor() {
        let ratio = Unit::jansky().try_div(&Unit::parse("mJy").unwrap()).unwrap();
        let decomposed = ratio.decompose();
        assert!(decomposed.dimension().is_dimensionless());
        assert!((decomposed.scale() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn exponent_overflow_is_a_parse_error() {
        assert!(matches!(
            Unit::parse("m100 m100"),
            Err(UnitError::Parse { .. })
        ));
        assert!(Unit::parse("m100 / m-100").is_err());
        assert!(Unit::parse("(m100)^2").is_err());
        assert!(Dimension::LENGTH.checked_powi(127).is_some());
        assert!(Dimension::new(100, 0, 0)
            .checked_add(Dimension::new(100, 0, 0))
            .is_none());
    }
}
