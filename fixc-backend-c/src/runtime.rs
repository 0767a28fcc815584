#![forbid(unsafe_code)]

use std::fmt::Write as _;

use fixc_ir::CompileConfig;

use crate::target::TargetStyle;

fn escape_c_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Word typedefs, the narrowing store and the small helper macros the
/// lowered code calls.
pub fn emit_runtime_h(config: &CompileConfig, style: &dyn TargetStyle, profile_slots: usize) -> String {
    let word = config.word_length;
    let mut out = String::new();
    out.push_str("#pragma once\n");
    for inc in style.includes() {
        let _ = writeln!(out, "#include <{inc}>");
    }
    out.push('\n');
    out.push_str(style.runtime_prelude());

    out.push_str("typedef float fixc_real_t;\n");
    let _ = writeln!(out, "typedef {} fixc_word_t;", word.c_word());
    let _ = writeln!(out, "typedef {} fixc_wide_t;\n", word.c_wide());
    let _ = writeln!(out, "#define FIXC_WORD_BITS {}", word.bits());
    let _ = writeln!(out, "#define FIXC_WORD_MAX {}", word.max());
    let _ = writeln!(out, "#define FIXC_WORD_MIN ({} - 1)", -word.max());
    let _ = writeln!(out, "#define FIXC_SATURATE {}", u8::from(config.saturate));
    let _ = writeln!(out, "#define FIXC_PROFILE_SLOTS {}\n", profile_slots.max(1));

    out.push_str("extern unsigned long fixc_overflows;\n");
    out.push_str("extern int fixc_print_enabled;\n");
    out.push_str("extern float fixc_profile_lo[FIXC_PROFILE_SLOTS];\n");
    out.push_str("extern float fixc_profile_hi[FIXC_PROFILE_SLOTS];\n");
    out.push_str("extern const char *const fixc_profile_names[FIXC_PROFILE_SLOTS];\n");
    out.push_str("extern const int fixc_profile_count;\n");
    out.push_str("void fixc_profile_reset(void);\n\n");

    out.push_str("static inline fixc_word_t fixc_store(fixc_wide_t v) {\n");
    out.push_str("  if (v > FIXC_WORD_MAX || v < FIXC_WORD_MIN) {\n");
    out.push_str("    fixc_overflows++;\n");
    out.push_str("#if FIXC_SATURATE\n");
    out.push_str("    return v > 0 ? FIXC_WORD_MAX : FIXC_WORD_MIN;\n");
    out.push_str("#endif\n");
    out.push_str("  }\n");
    out.push_str("  return (fixc_word_t)v;\n");
    out.push_str("}\n\n");

    out.push_str("#define FIXC_STORE(v) fixc_store((fixc_wide_t)(v))\n");
    out.push_str("#define FIXC_MAX(a, b) ((a) > (b) ? (a) : (b))\n");
    out.push_str("#define FIXC_CLAMP(v, lo, hi) ((v) < (lo) ? (lo) : ((v) > (hi) ? (hi) : (v)))\n");
    out.push_str("#define FIXC_SELECT_GT(a, b, then, otherwise) ((a) > (b) ? (then) : (otherwise))\n");
    out.push_str("#define FIXC_EXP_INDEX(x, drop) (FIXC_MAX(-(x), (fixc_wide_t)0) >> (drop))\n");
    out.push_str("#define FIXC_TO_REAL(v, scale) ldexpf((fixc_real_t)(v), -(scale))\n");
    out
}

/// Definitions behind the runtime header's `extern`s. `profiled` names the
/// profile slots in order.
pub fn emit_runtime_c(profiled: &[String]) -> String {
    let mut out = String::new();
    out.push_str("#include \"fixc_runtime.h\"\n\n");
    out.push_str("unsigned long fixc_overflows = 0;\n");
    out.push_str("int fixc_print_enabled = 1;\n");
    out.push_str("float fixc_profile_lo[FIXC_PROFILE_SLOTS];\n");
    out.push_str("float fixc_profile_hi[FIXC_PROFILE_SLOTS];\n");
    let _ = writeln!(out, "const int fixc_profile_count = {};", profiled.len());

    out.push_str("const char *const fixc_profile_names[FIXC_PROFILE_SLOTS] = {");
    if profiled.is_empty() {
        out.push_str("\"\"");
    } else {
        let names: Vec<String> = profiled
            .iter()
            .map(|n| format!("\"{}\"", escape_c_string(n)))
            .collect();
        out.push_str(&names.join(", "));
    }
    out.push_str("};\n\n");

    out.push_str("void fixc_profile_reset(void) {\n");
    out.push_str("  for (int i = 0; i < FIXC_PROFILE_SLOTS; i++) {\n");
    out.push_str("    fixc_profile_lo[i] = INFINITY;\n");
    out.push_str("    fixc_profile_hi[i] = -INFINITY;\n");
    out.push_str("  }\n");
    out.push_str("}\n");
    out
}
