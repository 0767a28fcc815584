#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use fixc_convert::{format_initializer, quantize, ModelParams};
use fixc_ir::{
    CompileConfig, Decl, ElemKind, Expr, ModuleIR, NumericMode, StorageClass, Stmt, Target,
    UnaryOp,
};
use rayon::prelude::*;
use tracing::debug;

use crate::error::CBackendError;
use crate::harness::emit_harness;
use crate::runtime::{emit_runtime_c, emit_runtime_h};
use crate::target::{create_style, TargetStyle};

/// Generated sources for one numeric mode.
#[derive(Clone, Debug)]
pub struct CArtifacts {
    pub mode: NumericMode,
    pub runtime_h: String,
    pub runtime_c: String,
    pub vars_h: String,
    pub model_h: String,
    pub model_c: String,
    /// The module translation unit in output order: prologue, one part per
    /// variant, then the dispatcher when there are several variants.
    pub module_parts: Vec<String>,
    /// Desktop builds only.
    pub harness_c: Option<String>,
}

impl CArtifacts {
    pub fn module_c(&self) -> String {
        self.module_parts.concat()
    }

    pub fn module_file_name(&self) -> String {
        format!("module_{}.c", self.mode)
    }

    /// `(file name, contents)` for everything except the module unit, which
    /// callers write through the output queue.
    pub fn support_files(&self) -> Vec<(String, String)> {
        let mode = self.mode;
        let mut files = vec![
            ("fixc_runtime.h".to_string(), self.runtime_h.clone()),
            ("fixc_runtime.c".to_string(), self.runtime_c.clone()),
            (format!("vars_{mode}.h"), self.vars_h.clone()),
            (format!("model_{mode}.h"), self.model_h.clone()),
            (format!("model_{mode}.c"), self.model_c.clone()),
        ];
        if let Some(h) = &self.harness_c {
            files.push((format!("harness_{mode}.c"), h.clone()));
        }
        files
    }

    /// C sources to hand the compiler when building the harness.
    pub fn harness_sources(&self) -> Vec<String> {
        let mode = self.mode;
        vec![
            "fixc_runtime.c".to_string(),
            format!("model_{mode}.c"),
            self.module_file_name(),
            format!("harness_{mode}.c"),
        ]
    }
}

/// `fixc_<mode>` for a single variant, `fixc_<mode><v>` otherwise.
pub fn entry_name(mode: NumericMode, variant: Option<usize>) -> String {
    match variant {
        Some(v) => format!("fixc_{mode}{v}"),
        None => format!("fixc_{mode}"),
    }
}

pub fn dispatcher_name(mode: NumericMode) -> String {
    format!("fixc_{mode}_switch")
}

/// Expression invoking the program on `arg` the way the harness and the
/// debug program do.
pub fn entry_call(mode: NumericMode, workers: usize, arg: &str) -> String {
    if workers > 1 {
        format!("{}({arg}, 0)", dispatcher_name(mode))
    } else {
        format!("{}({arg})", entry_name(mode, None))
    }
}

pub fn c_type(mode: NumericMode, elem: ElemKind) -> &'static str {
    match (mode, elem) {
        (_, ElemKind::Index) => "int",
        (_, ElemKind::Real) | (NumericMode::Real, _) => "fixc_real_t",
        (NumericMode::Fixed, ElemKind::Word) => "fixc_word_t",
        (NumericMode::Fixed, ElemKind::Wide) => "fixc_wide_t",
    }
}

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "main",
];

pub fn c_ident(name: &str) -> String {
    if C_KEYWORDS.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

fn declarator(name: &str, shape: &[usize]) -> String {
    let mut out = name.to_string();
    for d in shape {
        let _ = write!(out, "[{d}]");
    }
    out
}

pub(crate) fn float_literal(v: f64) -> String {
    if v < 0.0 {
        format!("({v:?}f)")
    } else {
        format!("{v:?}f")
    }
}

/// Maps IR names to C names. File-scope declarations carry the mode
/// prefix; anything not declared (loop counters, runtime symbols) passes
/// through unchanged.
pub(crate) struct Names<'a> {
    mode: NumericMode,
    decls: BTreeMap<&'a str, &'a Decl>,
}

impl<'a> Names<'a> {
    pub(crate) fn new(ir: &'a ModuleIR) -> Self {
        Self {
            mode: ir.mode,
            decls: ir.decls.iter().map(|d| (d.name.as_str(), d)).collect(),
        }
    }

    pub(crate) fn c(&self, name: &str) -> String {
        match self.decls.get(name) {
            Some(d) if d.is_file_scope() => format!("fixc_{}_{}", self.mode, name),
            Some(_) => c_ident(name),
            None => name.to_string(),
        }
    }
}

struct Renderer<'a> {
    ir: &'a ModuleIR,
    names: Names<'a>,
    style: &'a dyn TargetStyle,
    variant: Option<usize>,
}

impl Renderer<'_> {
    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Var(n) => self.names.c(n),
            Expr::Int(v) if i32::try_from(*v).is_ok() => v.to_string(),
            Expr::Int(v) => format!("{v}LL"),
            Expr::Float(v) => float_literal(*v),
            Expr::Binary { op, left, right } => {
                format!("({} {} {})", self.expr(left), op.c_symbol(), self.expr(right))
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => format!("(-{})", self.expr(operand)),
                UnaryOp::Widen => format!(
                    "(({}){})",
                    c_type(self.ir.mode, ElemKind::Wide),
                    self.expr(operand)
                ),
            },
            Expr::Index { base, indices } => {
                let mut out = self.names.c(base);
                for i in indices {
                    let _ = write!(out, "[{}]", self.expr(i));
                }
                out
            }
            Expr::Call { func, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("{func}({})", args.join(", "))
            }
        }
    }

    fn stmts(&self, out: &mut String, stmts: &[Stmt], depth: usize) {
        for s in stmts {
            self.stmt(out, s, depth);
        }
    }

    fn stmt(&self, out: &mut String, s: &Stmt, depth: usize) {
        let indent = "  ".repeat(depth);
        match s {
            Stmt::Assign { target, value } => {
                let _ = writeln!(out, "{indent}{} = {};", self.expr(target), self.expr(value));
            }
            Stmt::Loop { var, bound, body } => {
                let _ = writeln!(
                    out,
                    "{indent}for (int {var} = 0; {var} < {bound}; {var}++) {{"
                );
                let innermost = body.iter().all(Stmt::is_loop_free);
                for pragma in self.style.loop_pragmas(innermost, self.variant) {
                    let _ = writeln!(out, "{pragma}");
                }
                self.stmts(out, body, depth + 1);
                let _ = writeln!(out, "{indent}}}");
            }
            Stmt::PrintAsReal { value, scale } => {
                let v = match self.ir.mode {
                    NumericMode::Real => format!("(double){}", self.expr(value)),
                    NumericMode::Fixed => {
                        format!("ldexp((double){}, {})", self.expr(value), -scale)
                    }
                };
                out.push_str(&self.style.print_real(&v, &indent));
            }
            Stmt::Seq(items) => self.stmts(out, items, depth),
        }
    }

    fn input_param(&self) -> String {
        match self.ir.input() {
            Some(x) => format!(
                "{}{} {}",
                if x.ty.is_tensor() { "const " } else { "" },
                c_type(self.ir.mode, x.elem),
                declarator(&c_ident(&x.name), &x.ty.shape)
            ),
            None => "void".to_string(),
        }
    }

    fn signature(&self, name: &str) -> String {
        format!("int {name}({})", self.input_param())
    }

    fn entry(&self) -> String {
        let name = entry_name(self.ir.mode, self.variant);
        let mut out = String::new();
        let _ = writeln!(out, "{} {{", self.signature(&name));
        for d in &self.ir.decls {
            if d.storage == StorageClass::Internal && !d.is_file_scope() {
                let _ = writeln!(out, "  {} {};", c_type(self.ir.mode, d.elem), c_ident(&d.name));
            }
        }
        self.stmts(&mut out, &self.ir.body, 1);
        match self.ir.result_decl() {
            Some(d) if d.elem == ElemKind::Index => {
                let _ = writeln!(out, "  return {};", self.names.c(&d.name));
            }
            _ => out.push_str("  return 0;\n"),
        }
        out.push_str("}\n\n");
        out
    }
}

fn file_scope_internals(ir: &ModuleIR) -> impl Iterator<Item = &Decl> {
    ir.decls
        .iter()
        .filter(|d| d.storage == StorageClass::Internal && d.is_file_scope())
}

fn table_names(ir: &ModuleIR) -> BTreeSet<String> {
    ir.tables
        .values()
        .flat_map(|t| [t.coarse_name(), t.fine_name()])
        .collect()
}

fn emit_model(
    ir: &ModuleIR,
    config: &CompileConfig,
    params: &ModelParams,
    style: &dyn TargetStyle,
) -> Result<(String, String), CBackendError> {
    let mode = ir.mode;
    let names = Names::new(ir);
    let tables = table_names(ir);
    let mut h = String::new();
    let mut c = String::new();
    h.push_str("#pragma once\n#include \"fixc_runtime.h\"\n\n");
    let _ = writeln!(c, "#include \"model_{mode}.h\"\n");

    for d in ir.globals().filter(|d| !tables.contains(&d.name)) {
        let p = params.get(&d.name).ok_or_else(|| {
            CBackendError::new(format!("no trained values for parameter '{}'", d.name))
        })?;
        if p.shape != d.ty.shape && !(p.shape.is_empty() && d.ty.num_elements() == 1) {
            return Err(CBackendError::new(format!(
                "parameter '{}' is declared {} but the model has shape {:?}",
                d.name, d.ty, p.shape
            )));
        }
        let ty = c_type(mode, d.elem);
        let decl = declarator(&names.c(&d.name), &d.ty.shape);
        let _ = writeln!(h, "extern {} {ty} {decl};", style.rom_qualifier());

        let init = match mode {
            NumericMode::Real => {
                if let Some(bad) = p.values.iter().find(|v| !v.is_finite()) {
                    return Err(CBackendError::new(format!(
                        "parameter '{}' contains {bad}",
                        d.name
                    )));
                }
                match (d.ty.is_scalar(), p.values.first()) {
                    (true, Some(v)) => float_literal(*v),
                    _ => format_initializer(p.values.iter().map(|v| float_literal(*v))),
                }
            }
            NumericMode::Fixed => {
                let scale = ir.scales.get(&d.name).ok_or_else(|| {
                    CBackendError::new(format!("no scale factor for parameter '{}'", d.name))
                })?;
                let q = quantize(&d.name, &p.values, scale, config.word_length)
                    .map_err(|e| CBackendError::new(e.to_string()))?;
                match (d.ty.is_scalar(), q.first()) {
                    (true, Some(v)) => v.to_string(),
                    _ => format_initializer(q.iter()),
                }
            }
        };
        let _ = writeln!(c, "{} {ty} {decl} = {init};\n", style.rom_qualifier());
    }
    Ok((h, c))
}

fn emit_vars_h(ir: &ModuleIR, renderer: &Renderer<'_>, workers: usize) -> String {
    let mode = ir.mode;
    let mut out = String::new();
    out.push_str("#pragma once\n#include \"fixc_runtime.h\"\n\n");
    for d in file_scope_internals(ir) {
        let _ = writeln!(
            out,
            "extern {} {};",
            c_type(mode, d.elem),
            declarator(&renderer.names.c(&d.name), &d.ty.shape)
        );
    }
    out.push('\n');
    if workers > 1 {
        for v in 0..workers {
            let _ = writeln!(out, "{};", renderer.signature(&entry_name(mode, Some(v))));
        }
        let _ = writeln!(
            out,
            "int {}({}, int i);",
            dispatcher_name(mode),
            renderer.input_param()
        );
    } else {
        let _ = writeln!(out, "{};", renderer.signature(&entry_name(mode, None)));
    }
    out
}

fn emit_prologue(ir: &ModuleIR, config: &CompileConfig, renderer: &Renderer<'_>) -> String {
    let mode = ir.mode;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// Generated by fixc: {mode} mode, {} target, {}-bit words.",
        config.target,
        config.word_length.bits()
    );
    out.push_str("#include \"fixc_runtime.h\"\n");
    let _ = writeln!(out, "#include \"model_{mode}.h\"");
    let _ = writeln!(out, "#include \"vars_{mode}.h\"\n");

    for table in ir.tables.values() {
        for (name, values) in [
            (table.coarse_name(), &table.coarse),
            (table.fine_name(), &table.fine),
        ] {
            let _ = writeln!(
                out,
                "static {} fixc_word_t {} = {};\n",
                renderer.style.rom_qualifier(),
                declarator(&renderer.names.c(&name), &[values.len()]),
                format_initializer(values.iter())
            );
        }
    }

    for d in file_scope_internals(ir) {
        let _ = writeln!(
            out,
            "{} {};",
            c_type(mode, d.elem),
            declarator(&renderer.names.c(&d.name), &d.ty.shape)
        );
    }
    out.push('\n');
    out
}

fn emit_dispatcher(ir: &ModuleIR, renderer: &Renderer<'_>, workers: usize) -> String {
    let mode = ir.mode;
    let arg = ir.input().map(|x| c_ident(&x.name)).unwrap_or_default();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "int {}({}, int i) {{",
        dispatcher_name(mode),
        renderer.input_param()
    );
    out.push_str("  switch (i) {\n");
    for v in 0..workers {
        let _ = writeln!(
            out,
            "    case {v}: return {}({arg});",
            entry_name(mode, Some(v))
        );
    }
    out.push_str("    default: return -1;\n");
    out.push_str("  }\n");
    out.push_str("}\n");
    out
}

/// Renders every C source for `ir` on `config.target`.
pub fn emit_module(
    ir: &ModuleIR,
    config: &CompileConfig,
    params: &ModelParams,
) -> Result<CArtifacts, CBackendError> {
    if ir.mode != config.mode {
        return Err(CBackendError::new(format!(
            "module was elaborated in {} mode but the configuration asks for {}",
            ir.mode, config.mode
        )));
    }
    config
        .validate()
        .map_err(|e| CBackendError::new(e.message))?;
    if ir.input().is_none() {
        return Err(CBackendError::new("module has no input declaration"));
    }

    let style = create_style(config.target);
    let style: &dyn TargetStyle = style.as_ref();
    let workers = config.workers;

    let runtime_h = emit_runtime_h(config, style, ir.profiled.len());
    let runtime_c = emit_runtime_c(&ir.profiled);
    let (model_h, model_c) = emit_model(ir, config, params, style)?;

    let base = Renderer {
        ir,
        names: Names::new(ir),
        style,
        variant: None,
    };
    let vars_h = emit_vars_h(ir, &base, workers);

    let mut module_parts = vec![emit_prologue(ir, config, &base)];
    if workers > 1 {
        let variants: Vec<String> = (0..workers)
            .into_par_iter()
            .map(|v| {
                Renderer {
                    ir,
                    names: Names::new(ir),
                    style,
                    variant: Some(v),
                }
                .entry()
            })
            .collect();
        module_parts.extend(variants);
        module_parts.push(emit_dispatcher(ir, &base, workers));
    } else {
        module_parts.push(base.entry());
    }

    let harness_c = (config.target == Target::Desktop).then(|| emit_harness(ir, config));

    debug!(
        mode = ir.mode.name(),
        target = config.target.name(),
        parts = module_parts.len(),
        "emitted C module"
    );

    Ok(CArtifacts {
        mode: ir.mode,
        runtime_h,
        runtime_c,
        vars_h,
        model_h,
        model_c,
        module_parts,
        harness_c,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_escaped() {
        assert_eq!(c_ident("int"), "int_");
        assert_eq!(c_ident("weights"), "weights");
    }

    #[test]
    fn float_literals_are_valid_c() {
        assert_eq!(float_literal(1.0), "1.0f");
        assert_eq!(float_literal(-0.5), "(-0.5f)");
        assert_eq!(float_literal(1e-7), "1e-7f");
    }

    #[test]
    fn real_types_ignore_word_kind() {
        assert_eq!(c_type(NumericMode::Real, ElemKind::Wide), "fixc_real_t");
        assert_eq!(c_type(NumericMode::Fixed, ElemKind::Wide), "fixc_wide_t");
        assert_eq!(c_type(NumericMode::Fixed, ElemKind::Index), "int");
    }
}
