#![forbid(unsafe_code)]

//! Desktop driver: runs the entry function over a binary dataset and
//! reports accuracy, overflow count and (optionally) the profile log.

use std::fmt::Write as _;

use fixc_ir::{CompileConfig, ElemKind, ModuleIR, NumericMode};

use crate::emit::{c_ident, c_type, entry_call};

pub(crate) const BINARY_READERS: &str = r#"static int fixc_read_u32(FILE *f, uint32_t *out) {
  unsigned char b[4];
  if (fread(b, 1, 4, f) != 4) return 0;
  *out = (uint32_t)b[0] | ((uint32_t)b[1] << 8) | ((uint32_t)b[2] << 16) | ((uint32_t)b[3] << 24);
  return 1;
}

static int fixc_read_f32(FILE *f, float *out) {
  uint32_t bits;
  if (!fixc_read_u32(f, &bits)) return 0;
  memcpy(out, &bits, sizeof *out);
  return 1;
}

"#;

/// C expression converting the `float` variable `v` to an input element.
pub(crate) fn input_element(ir: &ModuleIR, v: &str) -> String {
    match ir.mode {
        NumericMode::Real => v.to_string(),
        NumericMode::Fixed => {
            let scale = ir
                .input()
                .and_then(|x| ir.scales.get(&x.name))
                .unwrap_or_default();
            format!("fixc_store((fixc_wide_t)llround(ldexp((double){v}, {scale})))")
        }
    }
}

/// `harness_<mode>.c`. Usage: `harness <dataset.bin> [profile.txt]`.
pub fn emit_harness(ir: &ModuleIR, config: &CompileConfig) -> String {
    let mode = ir.mode;
    let Some(input) = ir.input() else {
        return String::new();
    };
    let elem_ty = c_type(mode, input.elem);
    let x = c_ident(&input.name);
    let cols = input.ty.num_elements();
    let int_result = ir.result_decl().is_some_and(|d| d.elem == ElemKind::Index);

    let mut out = String::new();
    out.push_str("#include <stdio.h>\n#include <stdlib.h>\n#include <string.h>\n");
    out.push_str("#include \"fixc_runtime.h\"\n");
    let _ = writeln!(out, "#include \"vars_{mode}.h\"\n");
    out.push_str(BINARY_READERS);

    let _ = writeln!(
        out,
        "static {elem_ty} {x}{};\n",
        if input.ty.is_tensor() {
            format!("[{cols}]")
        } else {
            String::new()
        }
    );

    out.push_str("int main(int argc, char **argv) {\n");
    out.push_str("  if (argc < 2) {\n");
    out.push_str("    fprintf(stderr, \"usage: %s <dataset.bin> [profile.txt]\\n\", argv[0]);\n");
    out.push_str("    return 2;\n  }\n");
    out.push_str("  FILE *f = fopen(argv[1], \"rb\");\n");
    out.push_str("  if (!f) {\n    perror(argv[1]);\n    return 2;\n  }\n");
    out.push_str("  uint32_t rows, cols;\n");
    out.push_str("  if (!fixc_read_u32(f, &rows) || !fixc_read_u32(f, &cols)) {\n");
    out.push_str("    fprintf(stderr, \"truncated dataset header\\n\");\n    return 2;\n  }\n");
    let _ = writeln!(out, "  if (cols != {cols}u) {{");
    let _ = writeln!(
        out,
        "    fprintf(stderr, \"dataset has %u features, program expects {cols}\\n\", (unsigned)cols);"
    );
    out.push_str("    return 2;\n  }\n\n");

    let _ = writeln!(out, "  fixc_print_enabled = {};", u8::from(!int_result));
    out.push_str("  fixc_profile_reset();\n");
    out.push_str("  unsigned long correct = 0;\n");
    out.push_str("  for (uint32_t r = 0; r < rows; r++) {\n");
    out.push_str("    uint32_t label_bits;\n");
    out.push_str("    if (!fixc_read_u32(f, &label_bits)) {\n");
    out.push_str("      fprintf(stderr, \"truncated dataset at row %u\\n\", (unsigned)r);\n");
    out.push_str("      return 2;\n    }\n");
    out.push_str("    int32_t label = (int32_t)label_bits;\n");
    out.push_str("    for (uint32_t c = 0; c < cols; c++) {\n");
    out.push_str("      float v;\n");
    out.push_str("      if (!fixc_read_f32(f, &v)) {\n");
    out.push_str("        fprintf(stderr, \"truncated dataset at row %u\\n\", (unsigned)r);\n");
    out.push_str("        return 2;\n      }\n");
    let target = if input.ty.is_tensor() {
        format!("{x}[c]")
    } else {
        x.clone()
    };
    let _ = writeln!(out, "      {target} = {};", input_element(ir, "v"));
    out.push_str("    }\n");

    let arg = if input.ty.is_tensor() {
        format!("(void *){x}")
    } else {
        x.clone()
    };
    let _ = writeln!(
        out,
        "    int predicted = {};",
        entry_call(mode, config.workers, &arg)
    );
    out.push_str("    if (predicted == label) correct++;\n");
    out.push_str("  }\n");
    out.push_str("  fclose(f);\n\n");

    out.push_str("  printf(\"accuracy %f\\n\", rows ? 100.0 * (double)correct / (double)rows : 0.0);\n");
    out.push_str("  printf(\"overflows %lu\\n\", fixc_overflows);\n\n");

    out.push_str("  if (argc > 2) {\n");
    out.push_str("    FILE *p = fopen(argv[2], \"w\");\n");
    out.push_str("    if (!p) {\n      perror(argv[2]);\n      return 2;\n    }\n");
    out.push_str("    fprintf(p, \"# fixc profile\\n\");\n");
    out.push_str("    for (int i = 0; i < fixc_profile_count; i++) {\n");
    out.push_str(
        "      fprintf(p, \"%s %.9g %.9g\\n\", fixc_profile_names[i], fixc_profile_lo[i], fixc_profile_hi[i]);\n",
    );
    out.push_str("    }\n");
    out.push_str("    fclose(p);\n");
    out.push_str("  }\n");
    out.push_str("  return 0;\n");
    out.push_str("}\n");
    out
}
