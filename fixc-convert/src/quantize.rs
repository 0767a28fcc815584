#![forbid(unsafe_code)]

use fixc_ir::{to_fixed, ScaleMap, WordLength};

use crate::error::ConvertError;
use crate::model::ModelParams;

/// Rounds every `v * 2^scale` to the nearest integer, rejecting values
/// outside the signed word range.
pub fn quantize(
    name: &str,
    values: &[f64],
    scale: i32,
    word: WordLength,
) -> Result<Vec<i64>, ConvertError> {
    values
        .iter()
        .map(|&v| {
            let q = to_fixed(v, scale);
            if q > word.max() || q < word.min() {
                Err(ConvertError::Overflow {
                    name: name.to_string(),
                    value: v,
                    scale,
                    bits: word.bits(),
                })
            } else {
                Ok(q)
            }
        })
        .collect()
}

/// Per-parameter scales computed from each tensor's largest magnitude with
/// the same formula the search uses for profiled variables.
pub fn initial_scales(
    params: &ModelParams,
    bound: i32,
    word: WordLength,
) -> Result<ScaleMap, ConvertError> {
    let mut scales = ScaleMap::new();
    for (name, p) in params.iter() {
        scales.insert_observed(name, p.max_abs(), bound, word)?;
    }
    Ok(scales)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_rounds_to_nearest() {
        let q = quantize("w", &[0.5, -0.26, 1.0], 2, WordLength::W8).unwrap();
        assert_eq!(q, vec![2, -1, 4]);
    }

    #[test]
    fn quantize_rejects_out_of_range_words() {
        let err = quantize("w", &[1.0], 7, WordLength::W8).unwrap_err();
        assert!(matches!(err, ConvertError::Overflow { bits: 8, scale: 7, .. }));
        // -1.0 at scale 7 is exactly the minimum word.
        assert_eq!(quantize("w", &[-1.0], 7, WordLength::W8).unwrap(), vec![-128]);
    }

    #[test]
    fn initial_scales_use_largest_magnitude() {
        let mut params = ModelParams::new();
        params.insert("Z", vec![2], vec![0.25, -3.0]);
        params.insert("b", vec![1], vec![0.0]);
        let scales = initial_scales(&params, 12, WordLength::W16).unwrap();
        // floor(log2(32767 / 3)) = 13, capped at 12.
        assert_eq!(scales.get("Z"), Some(12));
        assert_eq!(scales.get("b"), Some(12));
        let scales = initial_scales(&params, 15, WordLength::W16).unwrap();
        assert_eq!(scales.get("Z"), Some(13));
    }
}
