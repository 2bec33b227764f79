use crate::error::UnitError;

use super::unit::Unit;

// ---------------------------------------------------------------------------
// Quantity – a unit-tagged array
// ---------------------------------------------------------------------------

/// An array of values that always carries its physical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    values: Vec<f64>,
    unit: Unit,
}

impl Quantity {
    pub fn new(values: Vec<f64>, unit: Unit) -> Self {
        Self { values, unit }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_parts(self) -> (Vec<f64>, Unit) {
        (self.values, self.unit)
    }

    /// Direct (dimensional) conversion.  No equivalencies are applied.
    pub fn to(&self, target: &Unit) -> Result<Quantity, UnitError> {
        let factor = self.unit.conversion_factor(target)?;
        let values = if factor == 1.0 {
            self.values.clone()
        } else {
            self.values.iter().map(|v| v * factor).collect()
        };
        Ok(Quantity::new(values, target.clone()))
    }

    /// Values gathered at `indices`, same unit.
    pub fn select(&self, indices: &[usize]) -> Quantity {
        Quantity::new(
            indices.iter().map(|&i| self.values[i]).collect(),
            self.unit.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_conversion_rescales_values() {
        let q = Quantity::new(vec![5000.0, 5100.0], Unit::angstrom());
        let nm = q.to(&Unit::nanometer()).unwrap();
        assert_eq!(nm.unit(), &Unit::nanometer());
        assert!((nm.values()[0] - 500.0).abs() < 1e-9);
        assert!((nm.values()[1] - 510.0).abs() < 1e-9);
    }

    #[test]
    fn direct_conversion_refuses_other_dimensions() {
        let q = Quantity::new(vec![1.0], Unit::jansky());
        assert!(q.to(&Unit::nanometer()).is_err());
    }
}
