#![forbid(unsafe_code)]

//! Per-target rendering decisions. Everything that differs between the
//! desktop, microcontroller and FPGA flavours of the generated C lives here.

use fixc_ir::Target;

pub trait TargetStyle: Send + Sync {
    fn target(&self) -> Target;

    /// System headers the runtime header pulls in.
    fn includes(&self) -> &'static [&'static str];

    /// Qualifier on model constants and lookup tables.
    fn rom_qualifier(&self) -> &'static str;

    /// Runtime declarations specific to this target.
    fn runtime_prelude(&self) -> &'static str {
        ""
    }

    /// A complete statement printing the `double` expression `value`.
    fn print_real(&self, value: &str, indent: &str) -> String;

    /// Lines placed at the top of a loop body.
    fn loop_pragmas(&self, _innermost: bool, _variant: Option<usize>) -> Vec<String> {
        Vec::new()
    }
}

pub struct DesktopStyle;

impl TargetStyle for DesktopStyle {
    fn target(&self) -> Target {
        Target::Desktop
    }

    fn includes(&self) -> &'static [&'static str] {
        &["stdint.h", "stdio.h", "math.h"]
    }

    fn rom_qualifier(&self) -> &'static str {
        "const"
    }

    fn print_real(&self, value: &str, indent: &str) -> String {
        format!("{indent}if (fixc_print_enabled) printf(\"%f\\n\", {value});\n")
    }
}

pub struct MicrocontrollerStyle;

impl TargetStyle for MicrocontrollerStyle {
    fn target(&self) -> Target {
        Target::Microcontroller
    }

    fn includes(&self) -> &'static [&'static str] {
        &["stdint.h", "math.h"]
    }

    fn rom_qualifier(&self) -> &'static str {
        "FIXC_ROM"
    }

    fn runtime_prelude(&self) -> &'static str {
        "// Board support: place constants in flash by defining FIXC_ROM.\n\
         #ifndef FIXC_ROM\n#define FIXC_ROM const\n#endif\n\
         void fixc_mcu_print_real(double value);\n\n"
    }

    fn print_real(&self, value: &str, indent: &str) -> String {
        format!("{indent}if (fixc_print_enabled) fixc_mcu_print_real({value});\n")
    }
}

pub struct FpgaStyle;

impl TargetStyle for FpgaStyle {
    fn target(&self) -> Target {
        Target::Fpga
    }

    fn includes(&self) -> &'static [&'static str] {
        &["stdint.h", "stdio.h", "math.h"]
    }

    fn rom_qualifier(&self) -> &'static str {
        "const"
    }

    fn print_real(&self, value: &str, indent: &str) -> String {
        format!(
            "#ifndef __SYNTHESIS__\n{indent}if (fixc_print_enabled) printf(\"%f\\n\", {value});\n#endif\n"
        )
    }

    fn loop_pragmas(&self, innermost: bool, variant: Option<usize>) -> Vec<String> {
        if !innermost {
            return Vec::new();
        }
        match variant {
            Some(v) => vec![format!("#pragma HLS UNROLL factor={}", v + 1)],
            None => vec!["#pragma HLS PIPELINE II=1".to_string()],
        }
    }
}

pub fn create_style(target: Target) -> Box<dyn TargetStyle> {
    match target {
        Target::Desktop => Box::new(DesktopStyle),
        Target::Microcontroller => Box::new(MicrocontrollerStyle),
        Target::Fpga => Box::new(FpgaStyle),
    }
}
