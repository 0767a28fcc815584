#![forbid(unsafe_code)]

use std::fmt::Write as _;

use fixc_ir::{CompileConfig, ElemKind, ModuleIR, NumericMode, StorageClass};

use crate::emit::{c_ident, c_type, entry_call, Names};
use crate::error::CBackendError;
use crate::harness::{input_element, BINARY_READERS};

/// Names of the fixed-mode tensors worth comparing against their real
/// counterparts. Tensors whose shape is all ones carry no spatial
/// information and are left out.
pub fn diff_candidates(real: &ModuleIR, fixed: &ModuleIR) -> Vec<String> {
    fixed
        .decls
        .iter()
        .filter(|d| {
            d.storage == StorageClass::Internal
                && d.is_file_scope()
                && d.elem == ElemKind::Word
                && !d.ty.is_all_ones()
                && fixed.scales.contains(&d.name)
        })
        .filter(|d| {
            real.decl(&d.name)
                .is_some_and(|r| r.is_file_scope() && r.ty == d.ty)
        })
        .map(|d| d.name.clone())
        .collect()
}

/// `debug.c`: runs both modes on the first dataset row and prints the
/// largest absolute error of each intermediate tensor.
pub fn emit_debug_program(
    real: &ModuleIR,
    fixed: &ModuleIR,
    config: &CompileConfig,
) -> Result<String, CBackendError> {
    if real.mode != NumericMode::Real || fixed.mode != NumericMode::Fixed {
        return Err(CBackendError::new(
            "debug program needs one real and one fixed module",
        ));
    }
    let (Some(rx), Some(fx)) = (real.input(), fixed.input()) else {
        return Err(CBackendError::new("module has no input declaration"));
    };
    if rx.ty != fx.ty {
        return Err(CBackendError::new(format!(
            "real input is {} but fixed input is {}",
            rx.ty, fx.ty
        )));
    }
    let cols = fx.ty.num_elements();
    let dims = if fx.ty.is_tensor() {
        format!("[{cols}]")
    } else {
        String::new()
    };
    let x = c_ident(&fx.name);
    let real_names = Names::new(real);
    let fixed_names = Names::new(fixed);

    let mut out = String::new();
    out.push_str("#include <stdio.h>\n#include <string.h>\n");
    out.push_str("#include \"fixc_runtime.h\"\n#include \"vars_real.h\"\n#include \"vars_fixed.h\"\n\n");
    out.push_str(BINARY_READERS);
    out.push_str(
        "static void fixc_diff(const char *name, const fixc_real_t *real, const fixc_word_t *fixed, int scale, int n) {\n",
    );
    out.push_str("  double worst = 0.0;\n");
    out.push_str("  for (int i = 0; i < n; i++) {\n");
    out.push_str("    double d = fabs((double)real[i] - ldexp((double)fixed[i], -scale));\n");
    out.push_str("    if (d > worst) worst = d;\n");
    out.push_str("  }\n");
    out.push_str("  printf(\"%s scale %d max_abs_error %g\\n\", name, scale, worst);\n");
    out.push_str("}\n\n");

    let _ = writeln!(out, "static {} {x}_real{dims};", c_type(NumericMode::Real, rx.elem));
    let _ = writeln!(out, "static {} {x}_fixed{dims};\n", c_type(NumericMode::Fixed, fx.elem));

    out.push_str("int main(int argc, char **argv) {\n");
    out.push_str("  if (argc < 2) {\n");
    out.push_str("    fprintf(stderr, \"usage: %s <dataset.bin>\\n\", argv[0]);\n");
    out.push_str("    return 2;\n  }\n");
    out.push_str("  FILE *f = fopen(argv[1], \"rb\");\n");
    out.push_str("  if (!f) {\n    perror(argv[1]);\n    return 2;\n  }\n");
    out.push_str("  uint32_t rows, cols, label;\n");
    out.push_str("  if (!fixc_read_u32(f, &rows) || !fixc_read_u32(f, &cols) || rows == 0\n");
    let _ = writeln!(out, "      || cols != {cols}u || !fixc_read_u32(f, &label)) {{");
    out.push_str("    fprintf(stderr, \"dataset does not match the program input\\n\");\n");
    out.push_str("    return 2;\n  }\n");
    out.push_str("  for (uint32_t c = 0; c < cols; c++) {\n");
    out.push_str("    float v;\n");
    out.push_str("    if (!fixc_read_f32(f, &v)) return 2;\n");
    let (rt, ft) = if fx.ty.is_tensor() {
        (format!("{x}_real[c]"), format!("{x}_fixed[c]"))
    } else {
        (format!("{x}_real"), format!("{x}_fixed"))
    };
    let _ = writeln!(out, "    {rt} = {};", input_element(real, "v"));
    let _ = writeln!(out, "    {ft} = {};", input_element(fixed, "v"));
    out.push_str("  }\n");
    out.push_str("  fclose(f);\n\n");

    out.push_str("  fixc_print_enabled = 0;\n");
    let (ra, fa) = if fx.ty.is_tensor() {
        (format!("(void *){x}_real"), format!("(void *){x}_fixed"))
    } else {
        (format!("{x}_real"), format!("{x}_fixed"))
    };
    let _ = writeln!(out, "  {};", entry_call(NumericMode::Real, 1, &ra));
    let _ = writeln!(
        out,
        "  {};",
        entry_call(NumericMode::Fixed, config.workers, &fa)
    );

    for name in diff_candidates(real, fixed) {
        let (Some(d), Some(scale)) = (fixed.decl(&name), fixed.scales.get(&name)) else {
            continue;
        };
        let _ = writeln!(
            out,
            "  fixc_diff(\"{name}\", (const fixc_real_t *){}, (const fixc_word_t *){}, {scale}, {});",
            real_names.c(&name),
            fixed_names.c(&name),
            d.ty.num_elements()
        );
    }
    out.push_str("  return 0;\n");
    out.push_str("}\n");
    Ok(out)
}
