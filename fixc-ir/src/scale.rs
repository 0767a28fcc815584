#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ScaleOverflowError};

/// Signed word width of the generated fixed-point code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum WordLength {
    W8,
    W16,
    W32,
}

impl WordLength {
    pub fn bits(self) -> u32 {
        match self {
            WordLength::W8 => 8,
            WordLength::W16 => 16,
            WordLength::W32 => 32,
        }
    }

    /// Largest representable word, `2^(W-1) - 1`.
    pub fn max(self) -> i64 {
        (1i64 << (self.bits() - 1)) - 1
    }

    pub fn min(self) -> i64 {
        -(1i64 << (self.bits() - 1))
    }

    pub fn wide_bits(self) -> u32 {
        match self {
            WordLength::W8 | WordLength::W16 => 32,
            WordLength::W32 => 64,
        }
    }

    pub fn c_word(self) -> &'static str {
        match self {
            WordLength::W8 => "int8_t",
            WordLength::W16 => "int16_t",
            WordLength::W32 => "int32_t",
        }
    }

    pub fn c_wide(self) -> &'static str {
        match self.wide_bits() {
            32 => "int32_t",
            _ => "int64_t",
        }
    }

    /// Result-cache key for this width.
    pub fn kind_name(self) -> &'static str {
        match self {
            WordLength::W8 => "int8",
            WordLength::W16 => "int16",
            WordLength::W32 => "int32",
        }
    }
}

impl TryFrom<u32> for WordLength {
    type Error = ConfigurationError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(WordLength::W8),
            16 => Ok(WordLength::W16),
            32 => Ok(WordLength::W32),
            other => Err(ConfigurationError {
                message: format!("unsupported word length {other}; expected 8, 16 or 32"),
            }),
        }
    }
}

impl From<WordLength> for u32 {
    fn from(w: WordLength) -> u32 {
        w.bits()
    }
}

/// Exponent for a value whose magnitude never exceeds `observed_max`:
/// `min(floor(log2(wordMax / observed_max)), bound)`.
///
/// A zero (or non-finite) magnitude is unconstrained and takes `bound`.
/// Scales below `-(W-1)` leave no usable bits and are rejected.
pub fn scale_for(
    name: &str,
    observed_max: f64,
    bound: i32,
    word: WordLength,
) -> Result<i32, ScaleOverflowError> {
    let observed_max = observed_max.abs();
    if observed_max == 0.0 || !observed_max.is_finite() {
        return Ok(bound);
    }
    let word_max = word.max() as f64;
    let mut k = (word_max / observed_max).log2().floor();
    // Guard against log2 rounding up across an integer boundary.
    while observed_max * k.exp2() > word_max {
        k -= 1.0;
    }
    let floor_scale = -(word.bits() as i32 - 1);
    if k < floor_scale as f64 {
        return Err(ScaleOverflowError {
            name: name.to_string(),
            message: format!(
                "magnitude {observed_max} needs scale {k}, below the {}-bit minimum {floor_scale}",
                word.bits()
            ),
        });
    }
    Ok((k as i32).min(bound))
}

/// `round(value * 2^scale)`.
pub fn to_fixed(value: f64, scale: i32) -> i64 {
    (value * (scale as f64).exp2()).round() as i64
}

/// Variable name to exponent. Ordered so iteration and emitted code are
/// deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaleMap(BTreeMap<String, i32>);

impl ScaleMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<i32> {
        self.0.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, scale: i32) {
        self.0.insert(name.into(), scale);
    }

    /// Computes and records the scale for an observed magnitude.
    pub fn insert_observed(
        &mut self,
        name: &str,
        observed_max: f64,
        bound: i32,
        word: WordLength,
    ) -> Result<i32, ScaleOverflowError> {
        let k = scale_for(name, observed_max, bound, word)?;
        self.0.insert(name.to_string(), k);
        Ok(k)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i32)> for ScaleMap {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scale_for_picks_largest_exponent_that_fits() {
        // 16-bit: wordMax = 32767; |v| <= 10.0 -> floor(log2(3276.7)) = 11.
        assert_eq!(scale_for("v", 10.0, 15, WordLength::W16), Ok(11));
        assert_eq!(scale_for("v", 10.0, 4, WordLength::W16), Ok(4));
    }

    #[test]
    fn zero_magnitude_takes_the_bound() {
        assert_eq!(scale_for("z", 0.0, 7, WordLength::W8), Ok(7));
    }

    #[test]
    fn huge_magnitude_is_a_scale_overflow() {
        let err = scale_for("big", 1e12, 15, WordLength::W16).unwrap_err();
        assert_eq!(err.name, "big");
    }

    #[test]
    fn word_length_parses_from_bits() {
        assert_eq!(WordLength::try_from(16), Ok(WordLength::W16));
        assert!(WordLength::try_from(12).is_err());
    }

    proptest! {
        #[test]
        fn scaled_magnitude_never_exceeds_word(max in 1e-6f64..1e6, bound in 0i32..32) {
            for word in [WordLength::W8, WordLength::W16, WordLength::W32] {
                if let Ok(k) = scale_for("v", max, bound, word) {
                    prop_assert!(to_fixed(max, k).abs() <= word.max());
                    prop_assert!(to_fixed(-max, k).abs() <= word.max());
                }
            }
        }

        #[test]
        fn larger_magnitude_never_gets_larger_scale(a in 1e-3f64..1e4, b in 1e-3f64..1e4, bound in 0i32..16) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let k_lo = scale_for("v", lo, bound, WordLength::W16).unwrap();
            let k_hi = scale_for("v", hi, bound, WordLength::W16).unwrap();
            prop_assert!(k_hi <= k_lo);
        }

        #[test]
        fn raising_the_bound_never_lowers_the_scale(max in 1e-3f64..1e4, b1 in -8i32..16, step in 1i32..16) {
            let b2 = b1 + step;
            let k1 = scale_for("v", max, b1, WordLength::W16).unwrap();
            let k2 = scale_for("v", max, b2, WordLength::W16).unwrap();
            prop_assert!(k1 <= k2);
            // Clipping below the unbounded exponent lands exactly on the bound.
            let free = scale_for("v", max, i32::MAX, WordLength::W16).unwrap();
            if free > b1 {
                prop_assert_eq!(k1, b1);
            } else {
                prop_assert_eq!(k1, free);
            }
        }
    }
}
