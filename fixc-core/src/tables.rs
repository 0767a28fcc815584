#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use fixc_ir::{LookupTable, WordLength};
use tracing::debug;

/// Builds `exp` tables lazily, one per argument scale.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: BTreeMap<i32, LookupTable>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&mut self, key_scale: i32, word: WordLength) -> &LookupTable {
        self.tables
            .entry(key_scale)
            .or_insert_with(|| build_exp_table(key_scale, word))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn into_tables(self) -> BTreeMap<i32, LookupTable> {
        self.tables
    }
}

/// Splits the `W-1` magnitude bits of `-x` into a coarse index (at most 8
/// bits), a fine index and dropped low bits, then samples `exp` at both
/// granularities with `W-2` fractional bits per entry.
pub fn build_exp_table(key_scale: i32, word: WordLength) -> LookupTable {
    let magnitude_bits = word.bits() - 1;
    let hi_bits = magnitude_bits.div_ceil(2).min(8);
    let lo_bits = hi_bits.min(magnitude_bits - hi_bits);
    let drop_bits = magnitude_bits - hi_bits - lo_bits;
    let entry_scale = word.bits() as i32 - 2;
    let one = (entry_scale as f64).exp2();

    let coarse_step = (lo_bits as i32 + drop_bits as i32 - key_scale) as f64;
    let fine_step = (drop_bits as i32 - key_scale) as f64;

    let coarse = (0..=(1u32 << hi_bits))
        .map(|h| ((-(h as f64) * coarse_step.exp2()).exp() * one).round() as i64)
        .collect();
    let fine = (0..(1u32 << lo_bits))
        .map(|l| ((-(l as f64) * fine_step.exp2()).exp() * one).round() as i64)
        .collect();

    debug!(key_scale, hi_bits, lo_bits, drop_bits, "built exp table");
    LookupTable {
        key_scale,
        coarse,
        fine,
        entry_scale,
        lo_bits,
        drop_bits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit_split_uses_every_magnitude_bit() {
        let t = build_exp_table(12, WordLength::W16);
        assert_eq!(t.coarse.len(), 257);
        assert_eq!(t.fine.len(), 128);
        assert_eq!((t.lo_bits, t.drop_bits), (7, 0));
        assert_eq!(t.coarse[0], 1 << 14);
        assert_eq!(t.fine[0], 1 << 14);
    }

    #[test]
    fn thirty_two_bit_split_drops_low_bits() {
        let t = build_exp_table(20, WordLength::W32);
        assert_eq!((t.lo_bits, t.drop_bits), (8, 15));
        assert!(t.coarse.iter().all(|v| *v <= WordLength::W32.max()));
    }

    #[test]
    fn entries_are_non_increasing() {
        let t = build_exp_table(4, WordLength::W8);
        assert!(t.coarse.windows(2).all(|w| w[0] >= w[1]));
        assert!(t.fine.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn registry_builds_each_key_once() {
        let mut reg = TableRegistry::new();
        reg.get_or_build(10, WordLength::W16);
        reg.get_or_build(10, WordLength::W16);
        reg.get_or_build(8, WordLength::W16);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn table_product_approximates_exp() {
        let key = 11;
        let t = build_exp_table(key, WordLength::W16);
        let x = -1.5f64;
        let raw = (-x * (key as f64).exp2()) as i64 >> t.drop_bits;
        let hi = (raw >> t.lo_bits) as usize;
        let lo = (raw & ((1 << t.lo_bits) - 1)) as usize;
        let approx = (t.coarse[hi] * t.fine[lo]) as f64 / (t.result_scale() as f64).exp2();
        assert!((approx - x.exp()).abs() < 1e-3, "approx {approx}");
    }
}
