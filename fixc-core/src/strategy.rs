#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use fixc_ir::{
    to_fixed, BinOp, Decl, ElemKind, Expr, LookupTable, NumericMode, ScaleMap, ScaleOverflowError,
    StorageClass, Stmt, UnaryOp, WordLength, scale_for,
};

use crate::error::LowerError;
use crate::tables::TableRegistry;

/// One element's worth of arithmetic, with the exponent its integer is
/// held at. Real-mode values always carry scale 0.
///
/// `bits` is the signed width the fixed-point integer may need inside the
/// wide type; 0 when untracked (real mode).
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub expr: Expr,
    pub scale: i32,
    pub bits: u32,
}

impl Value {
    pub fn new(expr: Expr, scale: i32) -> Self {
        Self {
            expr,
            scale,
            bits: 0,
        }
    }

    pub fn with_bits(expr: Expr, scale: i32, bits: u32) -> Self {
        Self { expr, scale, bits }
    }
}

/// What a strategy hands back once elaboration is done.
#[derive(Debug, Default)]
pub struct StrategyOutput {
    pub scales: ScaleMap,
    pub tables: BTreeMap<i32, LookupTable>,
    pub profiled: Vec<String>,
}

/// Arithmetic for one numeric mode. The elaborator walks the program and
/// drives loops; the strategy decides how each element is computed.
pub trait NumericStrategy {
    fn mode(&self) -> NumericMode;

    /// Reads one element of a declared variable.
    fn load(&mut self, name: &str, element: Expr) -> Result<Value, LowerError>;

    fn constant(&mut self, value: f64) -> Result<Value, LowerError>;

    /// `op` is `Add` or `Sub`.
    fn add(&mut self, op: BinOp, a: Value, b: Value) -> Result<Value, LowerError>;

    fn mul(&mut self, a: Value, b: Value) -> Result<Value, LowerError>;

    fn neg(&mut self, a: Value) -> Result<Value, LowerError>;

    /// Brings `v` to the exponent of `target` without narrowing.
    fn rescale(&mut self, v: Value, target: &str) -> Result<Value, LowerError>;

    /// Narrowing conversion of `v` into an element of `target`.
    fn store(&mut self, v: Value, target: &str) -> Result<Expr, LowerError>;

    fn exp(&mut self, v: Value) -> Result<Value, LowerError>;

    fn tanh(&mut self, v: Value) -> Result<Value, LowerError>;

    fn sigmoid(&mut self, v: Value) -> Result<Value, LowerError>;

    fn relu(&mut self, v: Value) -> Result<Value, LowerError>;

    /// Extra declaration that shadows `decl`, if any.
    fn companion(&self, _decl: &Decl) -> Option<Decl> {
        None
    }

    /// Statements appended after each element of `decl` is written.
    fn after_define(&mut self, decl: &Decl, element: &Expr) -> Result<Vec<Stmt>, LowerError>;

    fn finish(&mut self) -> StrategyOutput;
}

fn max_expr(a: Expr, b: Expr) -> Expr {
    Expr::call("FIXC_MAX", vec![a, b])
}

fn clamp_expr(v: Expr, lo: Expr, hi: Expr) -> Expr {
    Expr::call("FIXC_CLAMP", vec![v, lo, hi])
}

/// Native floating point. Optionally records the range of every word
/// variable in the profile arrays.
#[derive(Debug, Default)]
pub struct RealArithmetic {
    profile: bool,
    profiled: Vec<String>,
}

impl RealArithmetic {
    pub fn new(profile: bool) -> Self {
        Self {
            profile,
            profiled: Vec::new(),
        }
    }
}

impl NumericStrategy for RealArithmetic {
    fn mode(&self) -> NumericMode {
        NumericMode::Real
    }

    fn load(&mut self, _name: &str, element: Expr) -> Result<Value, LowerError> {
        Ok(Value::new(element, 0))
    }

    fn constant(&mut self, value: f64) -> Result<Value, LowerError> {
        Ok(Value::new(Expr::Float(value), 0))
    }

    fn add(&mut self, op: BinOp, a: Value, b: Value) -> Result<Value, LowerError> {
        Ok(Value::new(Expr::binary(op, a.expr, b.expr), 0))
    }

    fn mul(&mut self, a: Value, b: Value) -> Result<Value, LowerError> {
        Ok(Value::new(Expr::binary(BinOp::Mul, a.expr, b.expr), 0))
    }

    fn neg(&mut self, a: Value) -> Result<Value, LowerError> {
        Ok(Value::new(Expr::unary(UnaryOp::Neg, a.expr), 0))
    }

    fn rescale(&mut self, v: Value, _target: &str) -> Result<Value, LowerError> {
        Ok(v)
    }

    fn store(&mut self, v: Value, _target: &str) -> Result<Expr, LowerError> {
        Ok(v.expr)
    }

    fn exp(&mut self, v: Value) -> Result<Value, LowerError> {
        Ok(Value::new(Expr::call("expf", vec![v.expr]), 0))
    }

    fn tanh(&mut self, v: Value) -> Result<Value, LowerError> {
        Ok(Value::new(Expr::call("tanhf", vec![v.expr]), 0))
    }

    fn sigmoid(&mut self, v: Value) -> Result<Value, LowerError> {
        let denom = Expr::binary(
            BinOp::Add,
            Expr::Float(1.0),
            Expr::call("expf", vec![Expr::unary(UnaryOp::Neg, v.expr)]),
        );
        Ok(Value::new(Expr::binary(BinOp::Div, Expr::Float(1.0), denom), 0))
    }

    fn relu(&mut self, v: Value) -> Result<Value, LowerError> {
        Ok(Value::new(max_expr(v.expr, Expr::Float(0.0)), 0))
    }

    fn after_define(&mut self, decl: &Decl, element: &Expr) -> Result<Vec<Stmt>, LowerError> {
        if !self.profile || decl.elem != ElemKind::Word {
            return Ok(Vec::new());
        }
        let slot = match self.profiled.iter().position(|n| *n == decl.name) {
            Some(slot) => slot,
            None => {
                self.profiled.push(decl.name.clone());
                self.profiled.len() - 1
            }
        };
        let update = |array: &str, func: &str| {
            let cell = Expr::index(array, vec![Expr::Int(slot as i64)]);
            Stmt::assign(cell.clone(), Expr::call(func, vec![cell, element.clone()]))
        };
        Ok(vec![
            update("fixc_profile_lo", "fminf"),
            update("fixc_profile_hi", "fmaxf"),
        ])
    }

    fn finish(&mut self) -> StrategyOutput {
        StrategyOutput {
            profiled: std::mem::take(&mut self.profiled),
            ..StrategyOutput::default()
        }
    }
}

/// Scaled-integer arithmetic over a fixed scale map. Every intermediate is
/// held in the wide type; stores narrow through `FIXC_STORE`.
#[derive(Debug)]
pub struct FixedArithmetic {
    scales: ScaleMap,
    bound: i32,
    word: WordLength,
    debug_vars: BTreeSet<String>,
    tables: TableRegistry,
}

impl FixedArithmetic {
    pub fn new(scales: ScaleMap, bound: i32, word: WordLength) -> Self {
        Self {
            scales,
            bound,
            word,
            debug_vars: BTreeSet::new(),
            tables: TableRegistry::new(),
        }
    }

    pub fn with_debug_vars(mut self, vars: BTreeSet<String>) -> Self {
        self.debug_vars = vars;
        self
    }

    fn scale_of(&self, name: &str) -> Result<i32, LowerError> {
        self.scales.get(name).ok_or_else(|| LowerError::MissingScale {
            name: name.to_string(),
        })
    }

    fn check_shift(&self, what: &str, shift: i32) -> Result<(), LowerError> {
        if shift.unsigned_abs() >= self.word.wide_bits() {
            return Err(ScaleOverflowError {
                name: what.to_string(),
                message: format!(
                    "shift by {shift} does not fit the {}-bit accumulator",
                    self.word.wide_bits()
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Fails when a value needing `bits` does not fit the wide type.
    fn check_width(&self, what: &str, bits: u32) -> Result<(), LowerError> {
        let wide = self.word.wide_bits();
        if bits > wide {
            return Err(ScaleOverflowError {
                name: what.to_string(),
                message: format!("needs {bits} bits but the accumulator has {wide}"),
            }
            .into());
        }
        Ok(())
    }

    /// `v` re-expressed at `scale`.
    fn shift_to(&self, what: &str, v: Value, scale: i32) -> Result<Value, LowerError> {
        let shift = v.scale - scale;
        self.check_shift(what, shift)?;
        let (expr, bits) = match shift {
            0 => (v.expr, v.bits),
            s if s > 0 => (
                Expr::binary(BinOp::Shr, v.expr, Expr::Int(s as i64)),
                v.bits.saturating_sub(s as u32).max(1),
            ),
            s => {
                let bits = v.bits + s.unsigned_abs();
                self.check_width(what, bits)?;
                (Expr::binary(BinOp::Shl, v.expr, Expr::Int(-s as i64)), bits)
            }
        };
        Ok(Value::with_bits(expr, scale, bits))
    }

    fn word_value(&self, expr: Expr, scale: i32) -> Value {
        Value::with_bits(expr, scale, self.word.bits())
    }

    fn wide_const(&self, value: f64, scale: i32) -> Expr {
        Expr::Int(to_fixed(value, scale))
    }
}

impl NumericStrategy for FixedArithmetic {
    fn mode(&self) -> NumericMode {
        NumericMode::Fixed
    }

    fn load(&mut self, name: &str, element: Expr) -> Result<Value, LowerError> {
        let scale = self.scale_of(name)?;
        Ok(self.word_value(Expr::unary(UnaryOp::Widen, element), scale))
    }

    fn constant(&mut self, value: f64) -> Result<Value, LowerError> {
        let scale = scale_for("literal", value, self.bound, self.word)?;
        Ok(self.word_value(Expr::Int(to_fixed(value, scale)), scale))
    }

    /// Operands meet at the smaller scale: the finer one is shifted right,
    /// never left, so alignment cannot overflow the wide type.
    fn add(&mut self, op: BinOp, a: Value, b: Value) -> Result<Value, LowerError> {
        let common = a.scale.min(b.scale);
        let a = self.shift_to("addition operand", a, common)?;
        let b = self.shift_to("addition operand", b, common)?;
        let bits = a.bits.max(b.bits) + 1;
        self.check_width("addition", bits)?;
        Ok(Value::with_bits(Expr::binary(op, a.expr, b.expr), common, bits))
    }

    fn mul(&mut self, a: Value, b: Value) -> Result<Value, LowerError> {
        let bits = a.bits + b.bits - 1;
        self.check_width("product", bits)?;
        Ok(Value::with_bits(
            Expr::binary(BinOp::Mul, a.expr, b.expr),
            a.scale + b.scale,
            bits,
        ))
    }

    fn neg(&mut self, a: Value) -> Result<Value, LowerError> {
        Ok(Value::with_bits(
            Expr::unary(UnaryOp::Neg, a.expr),
            a.scale,
            a.bits,
        ))
    }

    fn rescale(&mut self, v: Value, target: &str) -> Result<Value, LowerError> {
        let scale = self.scale_of(target)?;
        self.shift_to(target, v, scale)
    }

    fn store(&mut self, v: Value, target: &str) -> Result<Expr, LowerError> {
        let v = self.rescale(v, target)?;
        Ok(Expr::call("FIXC_STORE", vec![v.expr]))
    }

    fn exp(&mut self, v: Value) -> Result<Value, LowerError> {
        let table = self.tables.get_or_build(v.scale, self.word);
        let index = Expr::call(
            "FIXC_EXP_INDEX",
            vec![v.expr, Expr::Int(table.drop_bits as i64)],
        );
        let hi = Expr::binary(BinOp::Shr, index.clone(), Expr::Int(table.lo_bits as i64));
        let lo = Expr::binary(
            BinOp::BitAnd,
            index,
            Expr::Int((1i64 << table.lo_bits) - 1),
        );
        let coarse = Expr::unary(UnaryOp::Widen, Expr::index(table.coarse_name(), vec![hi]));
        let fine = Expr::unary(UnaryOp::Widen, Expr::index(table.fine_name(), vec![lo]));
        Ok(Value::with_bits(
            Expr::binary(BinOp::Mul, coarse, fine),
            table.result_scale(),
            2 * self.word.bits() - 2,
        ))
    }

    fn tanh(&mut self, v: Value) -> Result<Value, LowerError> {
        // 1.0 has no exact encoding below scale 0; saturate at the word.
        let one = if v.scale < 0 {
            self.word.max()
        } else {
            to_fixed(1.0, v.scale).min(self.word.max())
        };
        Ok(Value::with_bits(
            clamp_expr(v.expr, Expr::Int(-one), Expr::Int(one)),
            v.scale,
            self.word.bits(),
        ))
    }

    fn sigmoid(&mut self, v: Value) -> Result<Value, LowerError> {
        // x/4 + 1/2 at scale s+2 reuses x's integer unchanged.
        let scale = v.scale + 2;
        let shifted = Expr::binary(BinOp::Add, v.expr, self.wide_const(0.5, scale));
        Ok(Value::with_bits(
            clamp_expr(shifted, Expr::Int(0), self.wide_const(1.0, scale)),
            scale,
            v.bits + 1,
        ))
    }

    fn relu(&mut self, v: Value) -> Result<Value, LowerError> {
        Ok(Value::with_bits(
            max_expr(v.expr, Expr::Int(0)),
            v.scale,
            v.bits,
        ))
    }

    fn companion(&self, decl: &Decl) -> Option<Decl> {
        if !self.debug_vars.contains(&decl.name) || decl.elem != ElemKind::Word {
            return None;
        }
        Some(Decl::new(
            format!("{}_real", decl.name),
            decl.ty.clone(),
            StorageClass::Internal,
            ElemKind::Real,
        ))
    }

    fn after_define(&mut self, decl: &Decl, element: &Expr) -> Result<Vec<Stmt>, LowerError> {
        if !self.debug_vars.contains(&decl.name) || decl.elem != ElemKind::Word {
            return Ok(Vec::new());
        }
        let scale = self.scale_of(&decl.name)?;
        let target = match element {
            Expr::Index { indices, .. } => Expr::index(format!("{}_real", decl.name), indices.clone()),
            _ => Expr::var(format!("{}_real", decl.name)),
        };
        Ok(vec![Stmt::assign(
            target,
            Expr::call("FIXC_TO_REAL", vec![element.clone(), Expr::Int(scale as i64)]),
        )])
    }

    fn finish(&mut self) -> StrategyOutput {
        StrategyOutput {
            scales: self.scales.clone(),
            tables: std::mem::take(&mut self.tables).into_tables(),
            profiled: Vec::new(),
        }
    }
}
