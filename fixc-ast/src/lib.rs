#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub type Ident = Spanned<String>;

/// A whole `.fx` source file: declarations, bindings, and the returned value.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub decls: Vec<TopDecl>,
    pub bindings: Vec<Binding>,
    pub result: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    /// The primary input tensor; becomes the entry function's parameter.
    Input,
    /// A trained model parameter, supplied by the converter.
    Param,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopDecl {
    pub span: Span,
    pub kind: DeclKind,
    pub name: Ident,
    pub shape: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub span: Span,
    pub name: Ident,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    /// `*`: matrix product, or scalar-by-tensor when one side is scalar.
    Mul,
    /// `<*>`: elementwise product.
    MulElem,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::MulElem => "<*>",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Builtin {
    Exp,
    Tanh,
    Sigmoid,
    Relu,
    ArgMax,
    Sgn,
    Transpose,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Builtin::Exp,
            "tanh" => Builtin::Tanh,
            "sigmoid" => Builtin::Sigmoid,
            "relu" => Builtin::Relu,
            "argmax" => Builtin::ArgMax,
            "sgn" => Builtin::Sgn,
            "transpose" => Builtin::Transpose,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Exp => "exp",
            Builtin::Tanh => "tanh",
            Builtin::Sigmoid => "sigmoid",
            Builtin::Relu => "relu",
            Builtin::ArgMax => "argmax",
            Builtin::Sgn => "sgn",
            Builtin::Transpose => "transpose",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(String),
    Float(f64),
    Neg(Box<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Call {
        func: Spanned<Builtin>,
        args: Vec<Expr>,
    },
}
