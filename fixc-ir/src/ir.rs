#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::{Decl, NumericMode, ScaleMap, StorageClass, WordLength};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    /// Cast to the accumulator type before arithmetic.
    Widen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,

    Shl,
    Shr,
    BitAnd,

    Gt,
    Lt,
}

impl BinOp {
    pub fn c_symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Var(String),
    Int(i64),
    Float(f64),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Row-major element access `base[i0][i1]...`.
    Index {
        base: String,
        indices: Vec<Expr>,
    },
    /// Runtime helper, libm function or macro.
    Call {
        func: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn index(base: impl Into<String>, indices: Vec<Expr>) -> Self {
        Expr::Index {
            base: base.into(),
            indices,
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            args,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign {
        target: Expr,
        value: Expr,
    },
    /// `for (int var = 0; var < bound; var++)`.
    Loop {
        var: String,
        bound: usize,
        body: Vec<Stmt>,
    },
    /// Print `value * 2^-scale` as a real number.
    PrintAsReal {
        value: Expr,
        scale: i32,
    },
    Seq(Vec<Stmt>),
}

impl Stmt {
    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign { target, value }
    }

    /// True when the statement contains no nested loop.
    pub fn is_loop_free(&self) -> bool {
        match self {
            Stmt::Loop { .. } => false,
            Stmt::Seq(items) => items.iter().all(Stmt::is_loop_free),
            Stmt::Assign { .. } | Stmt::PrintAsReal { .. } => true,
        }
    }
}

/// Coarse/fine table pair approximating `exp(x)` for `x <= 0` at one
/// argument scale. With `t = -x >> drop_bits`, the result is
/// `coarse[t >> lo_bits] * fine[t & mask]` at scale `2 * entry_scale`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupTable {
    pub key_scale: i32,
    pub coarse: Vec<i64>,
    pub fine: Vec<i64>,
    pub entry_scale: i32,
    pub lo_bits: u32,
    pub drop_bits: u32,
}

impl LookupTable {
    pub fn base_name(key_scale: i32) -> String {
        if key_scale < 0 {
            format!("exp_m{}", -key_scale)
        } else {
            format!("exp_{key_scale}")
        }
    }

    pub fn coarse_name(&self) -> String {
        format!("{}_coarse", Self::base_name(self.key_scale))
    }

    pub fn fine_name(&self) -> String {
        format!("{}_fine", Self::base_name(self.key_scale))
    }

    pub fn result_scale(&self) -> i32 {
        2 * self.entry_scale
    }
}

/// A fully lowered program for one numeric mode.
#[derive(Clone, Debug)]
pub struct ModuleIR {
    pub mode: NumericMode,
    pub word: WordLength,
    pub decls: Vec<Decl>,
    pub body: Vec<Stmt>,
    /// Name of the declaration holding the program result.
    pub result: String,
    /// Empty in real mode.
    pub scales: ScaleMap,
    pub tables: BTreeMap<i32, LookupTable>,
    /// Profiled variables; position is the profile slot.
    pub profiled: Vec<String>,
}

impl ModuleIR {
    pub fn decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn input(&self) -> Option<&Decl> {
        self.decls.iter().find(|d| d.storage == StorageClass::Input)
    }

    pub fn result_decl(&self) -> Option<&Decl> {
        self.decl(&self.result)
    }

    pub fn globals(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter().filter(|d| d.storage == StorageClass::Global)
    }
}
