use fixc_backend_c::{emit_debug_program, emit_module, diff_candidates, CArtifacts};
use fixc_convert::ModelParams;
use fixc_core::lower_program;
use fixc_ir::{CompileConfig, ModuleIR, NumericMode, ScaleMap, Target};

const LINEAR: &str = "input X[16][1]; param Z[4][16]; param W[2][4];\n\
                      let xp = Z * X; let s = W * xp; return argmax(s);";

fn linear_params() -> ModelParams {
    let mut params = ModelParams::new();
    params.insert("Z", vec![4, 16], vec![0.5; 64]);
    params.insert("W", vec![2, 4], vec![-0.25; 8]);
    params
}

fn uniform_scales(names: &[&str], scale: i32) -> ScaleMap {
    names.iter().map(|n| (n.to_string(), scale)).collect()
}

fn lower(src: &str, config: &CompileConfig, scales: ScaleMap) -> ModuleIR {
    let program = fixc_parse::parse_source(src).expect("parse");
    lower_program(&program, config, scales, 15).expect("lower")
}

fn fixed_linear(config: &CompileConfig) -> CArtifacts {
    let ir = lower(LINEAR, config, uniform_scales(&["X", "Z", "W", "xp", "s"], 11));
    emit_module(&ir, config, &linear_params()).expect("emit")
}

#[test]
fn fixed_module_renormalizes_products() {
    let out = fixed_linear(&CompileConfig::default());
    let module = out.module_c();
    assert!(module.contains(">> 11"), "{module}");
    assert!(module.contains("int fixc_fixed(const fixc_word_t X[16][1]) {"));
    assert!(module.contains("fixc_fixed_xp[4][1]"));
    assert!(!module.contains("return 0;"));
    assert!(out.vars_h.contains("extern fixc_word_t fixc_fixed_xp[4][1];"));
}

#[test]
fn parameters_are_quantized_into_the_model_unit() {
    let out = fixed_linear(&CompileConfig::default());
    // 0.5 * 2^11 and -0.25 * 2^11
    assert!(out.model_c.contains("const fixc_word_t fixc_fixed_Z[4][16] = {"));
    assert!(out.model_c.contains("1024, "));
    assert!(out.model_c.contains("-512, "));
    assert!(out.model_h.contains("extern const fixc_word_t fixc_fixed_W[2][4];"));
}

#[test]
fn missing_parameter_is_rejected() {
    let config = CompileConfig::default();
    let ir = lower(LINEAR, &config, uniform_scales(&["X", "Z", "W", "xp", "s"], 11));
    let mut params = ModelParams::new();
    params.insert("Z", vec![4, 16], vec![0.5; 64]);
    let err = emit_module(&ir, &config, &params).expect_err("W missing");
    assert!(err.message.contains("'W'"), "{}", err.message);
}

#[test]
fn mode_mismatch_is_rejected() {
    let fixed = CompileConfig::default();
    let ir = lower(LINEAR, &fixed, uniform_scales(&["X", "Z", "W", "xp", "s"], 11));
    let real = CompileConfig {
        mode: NumericMode::Real,
        ..CompileConfig::default()
    };
    assert!(emit_module(&ir, &real, &linear_params()).is_err());
}

#[test]
fn desktop_build_has_a_harness() {
    let out = fixed_linear(&CompileConfig::default());
    let harness = out.harness_c.expect("desktop harness");
    assert!(harness.contains("fixc_fixed((void *)X)"));
    assert!(harness.contains("ldexp((double)v, 11)"));
    assert!(harness.contains("fixc_print_enabled = 0;"));
    assert!(harness.contains("printf(\"accuracy %f\\n\""));
}

#[test]
fn fpga_variants_share_a_dispatcher() {
    let config = CompileConfig {
        target: Target::Fpga,
        workers: 3,
        ..CompileConfig::default()
    };
    let out = fixed_linear(&config);
    assert_eq!(out.module_parts.len(), 5);
    let module = out.module_c();
    for v in 0..3 {
        assert!(module.contains(&format!("int fixc_fixed{v}(const fixc_word_t X[16][1]) {{")));
        assert!(module.contains(&format!("case {v}: return fixc_fixed{v}(X);")));
    }
    assert!(module.contains("default: return -1;"));
    assert!(module.contains("#pragma HLS UNROLL factor=3"));
    assert!(out.harness_c.is_none());
    assert!(out.vars_h.contains("int fixc_fixed_switch(const fixc_word_t X[16][1], int i);"));
}

#[test]
fn microcontroller_constants_live_in_rom() {
    let config = CompileConfig {
        target: Target::Microcontroller,
        ..CompileConfig::default()
    };
    let src = "input X[2]; param b[2]; return X + b;";
    let ir = lower(src, &config, uniform_scales(&["X", "b", "tmp1"], 9));
    let mut params = ModelParams::new();
    params.insert("b", vec![2], vec![0.1, 0.2]);
    let out = emit_module(&ir, &config, &params).expect("emit");
    assert!(out.model_c.contains("FIXC_ROM fixc_word_t fixc_fixed_b[2]"));
    assert!(out.runtime_h.contains("#define FIXC_ROM const"));
    assert!(out.module_c().contains("fixc_mcu_print_real(ldexp((double)"));
    assert!(out.module_c().contains("return 0;"));
}

#[test]
fn real_module_prints_floats() {
    let config = CompileConfig {
        mode: NumericMode::Real,
        ..CompileConfig::default()
    };
    let src = "input X[2]; param b[2]; return tanh(X + b);";
    let ir = lower(src, &config, ScaleMap::new());
    let mut params = ModelParams::new();
    params.insert("b", vec![2], vec![0.1, -2.0]);
    let out = emit_module(&ir, &config, &params).expect("emit");
    assert!(out.model_c.contains("0.1f, (-2.0f), "));
    let module = out.module_c();
    assert!(module.contains("int fixc_real(const fixc_real_t X[2]) {"));
    assert!(module.contains("tanhf("));
    assert!(module.contains("printf(\"%f\\n\", (double)"));
}

#[test]
fn debug_program_skips_single_element_tensors() {
    let src = "input X[2][1]; param W[1][2]; param Z[3][2];\n\
               let y = W * X; let h = Z * X; return argmax(h);";
    let real_config = CompileConfig {
        mode: NumericMode::Real,
        ..CompileConfig::default()
    };
    let fixed_config = CompileConfig::default();
    let real = lower(src, &real_config, ScaleMap::new());
    let fixed = lower(src, &fixed_config, uniform_scales(&["X", "W", "Z", "y", "h"], 10));

    assert_eq!(diff_candidates(&real, &fixed), vec!["h".to_string()]);
    let program = emit_debug_program(&real, &fixed, &fixed_config).expect("debug");
    assert!(program.contains("fixc_diff(\"h\", (const fixc_real_t *)fixc_real_h, (const fixc_word_t *)fixc_fixed_h, 10, 3);"));
    assert!(!program.contains("fixc_diff(\"y\""));
}

#[test]
fn runtime_counts_profile_slots() {
    let config = CompileConfig {
        mode: NumericMode::Real,
        profile: true,
        ..CompileConfig::default()
    };
    let ir = lower(LINEAR, &config, ScaleMap::new());
    let out = emit_module(&ir, &config, &linear_params()).expect("emit");
    assert!(out.runtime_h.contains("#define FIXC_PROFILE_SLOTS 3"));
    assert!(out.runtime_c.contains("{\"X\", \"xp\", \"s\"}"));
}
