//! Resource quantities with a Kubernetes-like mixed-radix unit ladder.
//!
//! A [`Quantity`] is a signed amount paired with a unit drawn from the
//! ladder `m, "", K, M, G, T, P, E`, where `m` scales by 1000 into the
//! unitless step and every step above that scales by 1024. Arithmetic
//! always aligns both operands to the *smaller* unit before combining the
//! raw integers, never the larger one — aligning to the larger unit would
//! silently truncate the smaller operand.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// One step of the unit ladder: its symbol and the multiplier to reach the
/// *next* step up.
const SCALES: &[(&str, i64)] = &[
    ("m", 1000),
    ("", 1024),
    ("K", 1024),
    ("M", 1024),
    ("G", 1024),
    ("T", 1024),
    ("P", 1024),
    ("E", 1024),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("invalid quantity string: {0}")]
    Parse(String),
    #[error("unrecognized unit: {0}")]
    UnknownUnit(String),
    #[error("{from} cannot be converted exactly to {to}")]
    InexactConversion { from: String, to: String },
}

/// A signed amount at a given unit, e.g. `512Mi` in Kubernetes terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    pub amend: i64,
    pub unit: &'static str,
}

impl Quantity {
    pub fn new(amend: i64, unit: &str) -> Result<Self, QuantityError> {
        let resolved = ladder_index(unit).ok_or_else(|| QuantityError::UnknownUnit(unit.to_string()))?;
        Ok(Self { amend, unit: SCALES[resolved].0 })
    }

    pub const fn zero() -> Self {
        Self { amend: 0, unit: "" }
    }

    /// Parses strings like `"512"`, `"1K"`, `"2Gi"` (the trailing `i` is
    /// tolerated but not required — callers that need Kubernetes' binary
    /// suffix style should call [`Quantity::to_k8s_string`] on output).
    pub fn parse(raw: &str) -> Result<Self, QuantityError> {
        if raw.is_empty() {
            return Ok(Self::zero());
        }
        let trimmed = raw.strip_suffix('i').unwrap_or(raw);
        if trimmed.len() == 1 {
            let amend: i64 = trimmed
                .parse()
                .map_err(|_| QuantityError::Parse(raw.to_string()))?;
            return Ok(Self { amend, unit: "" });
        }
        let last = trimmed.chars().last().unwrap();
        if last.is_ascii_digit() {
            let amend: i64 = trimmed
                .parse()
                .map_err(|_| QuantityError::Parse(raw.to_string()))?;
            return Ok(Self { amend, unit: "" });
        }
        let unit_str = last.to_string();
        let idx = ladder_index(&unit_str).ok_or_else(|| QuantityError::Parse(raw.to_string()))?;
        let digits = &trimmed[..trimmed.len() - 1];
        let amend: i64 = digits
            .parse()
            .map_err(|_| QuantityError::Parse(raw.to_string()))?;
        Ok(Self { amend, unit: SCALES[idx].0 })
    }

    pub fn to_string_plain(&self) -> String {
        format!("{}{}", self.amend, self.unit)
    }

    /// Kubernetes-style rendering: binary units above `""` get an `i`
    /// suffix (`K` -> `Ki`, `M` -> `Mi`, ...); `m` and `""` are unchanged.
    pub fn to_k8s_string(&self) -> String {
        match self.unit {
            "" | "m" => self.to_string_plain(),
            u => format!("{}{}i", self.amend, u),
        }
    }

    /// Adds `other`, aligning both operands to whichever unit is smaller.
    pub fn plus(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let (lhs, rhs) = align(*self, *other)?;
        Ok(Quantity { amend: lhs.amend + rhs.amend, unit: lhs.unit })
    }

    /// Subtracts `other`, aligning both operands to whichever unit is smaller.
    pub fn minus(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let (lhs, rhs) = align(*self, *other)?;
        Ok(Quantity { amend: lhs.amend - rhs.amend, unit: lhs.unit })
    }

    pub fn compare(&self, other: &Quantity) -> Result<Ordering, QuantityError> {
        let (lhs, rhs) = align(*self, *other)?;
        Ok(lhs.amend.cmp(&rhs.amend))
    }

    /// Converts to an exact target unit. Moving to a smaller unit always
    /// succeeds (multiplies down the ladder); moving to a larger unit fails
    /// the moment any step divides inexactly.
    pub fn change_unit(&self, target: &str) -> Result<Quantity, QuantityError> {
        let s = ladder_index(self.unit).ok_or_else(|| QuantityError::UnknownUnit(self.unit.to_string()))?;
        let e = ladder_index(target).ok_or_else(|| QuantityError::UnknownUnit(target.to_string()))?;
        if s == e {
            return Ok(*self);
        }
        if s > e {
            let mut amend = self.amend;
            for i in (e..s).rev() {
                amend *= SCALES[i].1;
            }
            return Ok(Quantity { amend, unit: SCALES[e].0 });
        }
        let mut amend = self.amend;
        for i in s..e {
            let factor = SCALES[i].1;
            if amend % factor != 0 {
                return Err(QuantityError::InexactConversion {
                    from: self.to_string_plain(),
                    to: target.to_string(),
                });
            }
            amend /= factor;
        }
        Ok(Quantity { amend, unit: SCALES[e].0 })
    }

    /// Walks the ladder upward from the current unit while the amount
    /// divides evenly, stopping at the first inexact step (or at `E`).
    /// Zero is returned unchanged.
    pub fn optimize(&self) -> Quantity {
        if self.amend == 0 {
            return *self;
        }
        let mut idx = match ladder_index(self.unit) {
            Some(i) => i,
            None => return *self,
        };
        let mut amend = self.amend;
        while idx + 1 < SCALES.len() {
            let factor = SCALES[idx].1;
            if amend % factor != 0 {
                break;
            }
            amend /= factor;
            idx += 1;
        }
        Quantity { amend, unit: SCALES[idx].0 }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_plain())
    }
}

fn ladder_index(unit: &str) -> Option<usize> {
    SCALES.iter().position(|(u, _)| *u == unit)
}

/// Aligns two quantities onto whichever of their two units sits lower on
/// the ladder (the smaller unit), converting the other one down to match.
fn align(lhs: Quantity, rhs: Quantity) -> Result<(Quantity, Quantity), QuantityError> {
    let l = ladder_index(lhs.unit).ok_or_else(|| QuantityError::UnknownUnit(lhs.unit.to_string()))?;
    let r = ladder_index(rhs.unit).ok_or_else(|| QuantityError::UnknownUnit(rhs.unit.to_string()))?;
    if l == r {
        return Ok((lhs, rhs));
    }
    if l < r {
        Ok((lhs, rhs.change_unit(lhs.unit)?))
    } else {
        Ok((lhs.change_unit(rhs.unit)?, rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_is_zero() {
        assert_eq!(Quantity::parse("").unwrap(), Quantity { amend: 0, unit: "" });
    }

    #[test]
    fn parse_single_digit_has_no_unit() {
        assert_eq!(Quantity::parse("5").unwrap(), Quantity { amend: 5, unit: "" });
    }

    #[test]
    fn parse_with_unit_suffix() {
        assert_eq!(Quantity::parse("512K").unwrap(), Quantity { amend: 512, unit: "K" });
        assert_eq!(Quantity::parse("2G").unwrap(), Quantity { amend: 2, unit: "G" });
    }

    #[test]
    fn parse_all_digits_no_unit() {
        assert_eq!(Quantity::parse("1024").unwrap(), Quantity { amend: 1024, unit: "" });
    }

    #[test]
    fn parse_rejects_unknown_unit() {
        assert!(Quantity::parse("10Q").is_err());
    }

    #[test]
    fn plus_aligns_to_smaller_unit() {
        let a = Quantity::new(1, "K").unwrap();
        let b = Quantity::new(512, "").unwrap();
        let sum = a.plus(&b).unwrap();
        assert_eq!(sum, Quantity { amend: 1536, unit: "" });
    }

    #[test]
    fn minus_aligns_to_smaller_unit() {
        let a = Quantity::new(2, "K").unwrap();
        let b = Quantity::new(500, "").unwrap();
        let diff = a.minus(&b).unwrap();
        assert_eq!(diff, Quantity { amend: 1548, unit: "" });
    }

    #[test]
    fn change_unit_down_is_always_exact() {
        let q = Quantity::new(1, "M").unwrap();
        assert_eq!(q.change_unit("K").unwrap(), Quantity { amend: 1024, unit: "K" });
    }

    #[test]
    fn change_unit_up_fails_on_inexact() {
        let q = Quantity::new(1000, "").unwrap();
        assert!(q.change_unit("K").is_err());
        let q2 = Quantity::new(1024, "").unwrap();
        assert_eq!(q2.change_unit("K").unwrap(), Quantity { amend: 1, unit: "K" });
    }

    #[test]
    fn optimize_walks_up_while_exact() {
        let q = Quantity::new(1024 * 1024, "").unwrap();
        assert_eq!(q.optimize(), Quantity { amend: 1, unit: "M" });

        let q2 = Quantity::new(1500, "").unwrap();
        assert_eq!(q2.optimize(), Quantity { amend: 1500, unit: "" });
    }

    #[test]
    fn optimize_zero_is_unchanged() {
        assert_eq!(Quantity::zero().optimize(), Quantity::zero());
    }

    #[test]
    fn compare_orders_across_units() {
        let a = Quantity::new(1, "K").unwrap();
        let b = Quantity::new(1000, "").unwrap();
        assert_eq!(a.compare(&b).unwrap(), Ordering::Greater);
    }

    #[test]
    fn k8s_string_adds_i_suffix_above_base_unit() {
        assert_eq!(Quantity::new(512, "M").unwrap().to_k8s_string(), "512Mi");
        assert_eq!(Quantity::new(5, "m").unwrap().to_k8s_string(), "5m");
        assert_eq!(Quantity::new(5, "").unwrap().to_k8s_string(), "5");
    }
}
