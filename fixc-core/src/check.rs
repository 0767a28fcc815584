#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use fixc_ast::{BinOp, Builtin, DeclKind, Expr, ExprKind, Program, Span};
use fixc_ir::{TensorType, Type};

use crate::error::ShapeError;

/// Types of every named value, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeEnv {
    order: Vec<String>,
    types: BTreeMap<String, Type>,
    result: Option<Type>,
}

impl TypeEnv {
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Names with their types, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.order
            .iter()
            .filter_map(|n| self.types.get(n).map(|t| (n.as_str(), t)))
    }

    pub fn result(&self) -> Option<&Type> {
        self.result.as_ref()
    }

    fn bind(&mut self, name: &str, ty: Type, span: Span) -> Result<(), ShapeError> {
        if let Some(reason) = reserved_name(name) {
            return Err(ShapeError {
                message: format!("name '{name}' is reserved ({reason})"),
                span,
            });
        }
        if self.types.contains_key(name) {
            return Err(ShapeError {
                message: format!("'{name}' is already defined"),
                span,
            });
        }
        self.order.push(name.to_string());
        self.types.insert(name.to_string(), ty);
        Ok(())
    }
}

/// Names the lowering introduces on its own.
fn reserved_name(name: &str) -> Option<&'static str> {
    if name.starts_with("fixc_") {
        return Some("runtime prefix");
    }
    if name.contains("__") {
        return Some("helper variable separator");
    }
    if name.ends_with("_real") {
        return Some("debug copy suffix");
    }
    if let Some(rest) = name.strip_prefix("tmp") {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            return Some("compiler temporary");
        }
    }
    None
}

#[derive(Default)]
pub struct Checker {
    env: TypeEnv,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_program(&mut self, program: &Program) -> Result<TypeEnv, ShapeError> {
        let mut env = TypeEnv::default();

        let inputs: Vec<_> = program
            .decls
            .iter()
            .filter(|d| d.kind == DeclKind::Input)
            .collect();
        match inputs.as_slice() {
            [_] => {}
            [] => {
                return Err(ShapeError {
                    message: "program declares no 'input'".to_string(),
                    span: program.result.span,
                });
            }
            [_, extra, ..] => {
                return Err(ShapeError {
                    message: "only one 'input' may be declared".to_string(),
                    span: extra.span,
                });
            }
        }

        for decl in &program.decls {
            let ty = Type::Tensor(TensorType::new(decl.shape.clone()));
            env.bind(&decl.name.node, ty, decl.name.span)?;
        }

        for binding in &program.bindings {
            let ty = infer_type(&binding.value, &env)?;
            env.bind(&binding.name.node, ty, binding.name.span)?;
        }

        env.result = Some(infer_type(&program.result, &env)?);
        self.env = env.clone();
        Ok(env)
    }

    /// Environment from the last successful `check_program`.
    pub fn env(&self) -> &TypeEnv {
        &self.env
    }

    pub fn infer_type(&self, expr: &Expr) -> Result<Type, ShapeError> {
        infer_type(expr, &self.env)
    }
}

pub fn infer_type(expr: &Expr, env: &TypeEnv) -> Result<Type, ShapeError> {
    match &expr.kind {
        ExprKind::Float(_) => Ok(Type::Tensor(TensorType::scalar())),
        ExprKind::Ident(name) => env.get(name).cloned().ok_or_else(|| ShapeError {
            message: format!("unknown identifier '{name}'"),
            span: expr.span,
        }),
        ExprKind::Neg(inner) => {
            let t = infer_type(inner, env)?;
            numeric(&t, "negation", inner.span)?;
            Ok(t)
        }
        ExprKind::Binary { left, op, right } => {
            let l = infer_type(left, env)?;
            let r = infer_type(right, env)?;
            binary_type(*op, &l, &r, expr.span)
        }
        ExprKind::Call { func, args } => {
            let tys = args
                .iter()
                .map(|a| infer_type(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            call_type(func.node, &tys, expr.span)
        }
    }
}

fn numeric<'t>(ty: &'t Type, what: &str, span: Span) -> Result<&'t TensorType, ShapeError> {
    ty.as_tensor().ok_or_else(|| ShapeError {
        message: format!("{what} needs a numeric operand, but this is an int (class index)"),
        span,
    })
}

/// Shape of an elementwise combination, if the operands are broadcastable.
pub fn broadcast(a: &TensorType, b: &TensorType) -> Option<TensorType> {
    if a == b {
        return Some(a.clone());
    }
    match (a.is_all_ones(), b.is_all_ones()) {
        (true, true) => Some(if a.rank() >= b.rank() { a.clone() } else { b.clone() }),
        (true, false) => Some(b.clone()),
        (false, true) => Some(a.clone()),
        (false, false) => None,
    }
}

pub fn binary_type(op: BinOp, l: &Type, r: &Type, span: Span) -> Result<Type, ShapeError> {
    let what = format!("'{}'", op.symbol());
    let a = numeric(l, &what, span)?;
    let b = numeric(r, &what, span)?;
    match op {
        BinOp::Add | BinOp::Sub | BinOp::MulElem => {
            broadcast(a, b).map(Type::Tensor).ok_or_else(|| ShapeError {
                message: format!("operands of {what} have incompatible shapes {a} and {b}"),
                span,
            })
        }
        BinOp::Mul => {
            if a.is_scalar() {
                return Ok(Type::Tensor(b.clone()));
            }
            if b.is_scalar() {
                return Ok(Type::Tensor(a.clone()));
            }
            if a.rank() != 2 || b.rank() != 2 {
                return Err(ShapeError {
                    message: format!("matrix product needs rank-2 operands, got {a} and {b}"),
                    span,
                });
            }
            if a.shape[1] != b.shape[0] {
                return Err(ShapeError {
                    message: format!(
                        "matrix product inner dimensions differ: {a} * {b} ({} vs {})",
                        a.shape[1], b.shape[0]
                    ),
                    span,
                });
            }
            Ok(Type::Tensor(TensorType::matrix(a.shape[0], b.shape[1])))
        }
    }
}

pub fn call_type(func: Builtin, args: &[Type], span: Span) -> Result<Type, ShapeError> {
    let [arg] = args else {
        return Err(ShapeError {
            message: format!("'{}' takes 1 argument, got {}", func.name(), args.len()),
            span,
        });
    };
    let t = numeric(arg, &format!("'{}'", func.name()), span)?;
    match func {
        Builtin::Exp | Builtin::Tanh | Builtin::Sigmoid | Builtin::Relu => {
            Ok(Type::Tensor(t.clone()))
        }
        Builtin::ArgMax => Ok(Type::Int),
        Builtin::Sgn => {
            if !t.is_all_ones() {
                return Err(ShapeError {
                    message: format!("'sgn' expects a scalar, got {t}"),
                    span,
                });
            }
            Ok(Type::Int)
        }
        Builtin::Transpose => {
            if t.rank() != 2 {
                return Err(ShapeError {
                    message: format!("'transpose' expects a matrix, got {t}"),
                    span,
                });
            }
            Ok(Type::Tensor(TensorType::matrix(t.shape[1], t.shape[0])))
        }
    }
}
