#![forbid(unsafe_code)]

use std::fmt::Write as _;

use fixc_ir::{ScaleMap, WordLength};

use crate::error::ConvertError;
use crate::model::ModelParams;
use crate::quantize::quantize;

/// Brace initializer body, sixteen items per line.
pub fn format_initializer<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut out = String::from("{\n");
    let mut col = 0;
    for item in items {
        if col == 0 {
            out.push_str("  ");
        }
        let _ = write!(out, "{item}, ");
        col += 1;
        if col == 16 {
            out.push('\n');
            col = 0;
        }
    }
    if col != 0 {
        out.push('\n');
    }
    out.push('}');
    out
}

fn dims(shape: &[usize]) -> String {
    if shape.is_empty() {
        return "[1]".to_string();
    }
    shape.iter().map(|d| format!("[{d}]")).collect()
}

/// Standalone header with every parameter quantized at its scale, for
/// microcontroller builds that embed the model in flash. Parameters without
/// a scale are skipped.
pub fn write_fixed_header(
    params: &ModelParams,
    scales: &ScaleMap,
    word: WordLength,
) -> Result<String, ConvertError> {
    let mut out = String::new();
    out.push_str("// Quantized model parameters generated by fixc.\n");
    out.push_str("#pragma once\n");
    out.push_str("#include <stdint.h>\n\n");
    out.push_str("#ifndef FIXC_ROM\n#define FIXC_ROM const\n#endif\n\n");
    let _ = writeln!(out, "#define FIXC_MODEL_WORD_BITS {}\n", word.bits());

    for (name, p) in params.iter() {
        let Some(scale) = scales.get(name) else {
            continue;
        };
        let q = quantize(name, &p.values, scale, word)?;
        let _ = writeln!(out, "#define FIXC_SCALE_{name} {scale}");
        let _ = writeln!(
            out,
            "static FIXC_ROM {} {name}{} = {};\n",
            word.c_word(),
            dims(&p.shape),
            format_initializer(q)
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_contains_quantized_values_and_scales() {
        let mut params = ModelParams::new();
        params.insert("W", vec![1, 3], vec![0.5, -0.25, 1.0]);
        params.insert("unused", vec![1], vec![2.0]);
        let mut scales = ScaleMap::new();
        scales.insert("W", 4);
        let h = write_fixed_header(&params, &scales, WordLength::W16).unwrap();
        assert!(h.contains("#define FIXC_SCALE_W 4"));
        assert!(h.contains("static FIXC_ROM int16_t W[1][3] = {\n  8, -4, 16, \n};"));
        assert!(!h.contains("unused"));
    }

    #[test]
    fn initializer_wraps_long_rows() {
        let s = format_initializer(0..20);
        assert_eq!(s.lines().count(), 4);
    }
}
