#![forbid(unsafe_code)]

use fixc_ast::{BinOp as AstBinOp, Builtin, DeclKind, Expr as AstExpr, ExprKind, Program};
use fixc_ir::{
    BinOp, CompileConfig, Decl, ElemKind, Expr, ModuleIR, NumericMode, ScaleMap, StorageClass,
    Stmt, TensorType, Type,
};
use tracing::debug;

use crate::check::{binary_type, call_type, Checker, TypeEnv};
use crate::error::LowerError;
use crate::strategy::{FixedArithmetic, NumericStrategy, RealArithmetic, Value};

/// Picks the arithmetic for `config.mode`. `scales` and `bound` only matter
/// in fixed mode.
pub fn select_strategy(
    config: &CompileConfig,
    scales: ScaleMap,
    bound: i32,
) -> Box<dyn NumericStrategy> {
    match config.mode {
        NumericMode::Real => Box::new(RealArithmetic::new(config.profile)),
        NumericMode::Fixed => Box::new(
            FixedArithmetic::new(scales, bound, config.word_length)
                .with_debug_vars(config.debug_vars.clone()),
        ),
    }
}

/// Check, pick a strategy and elaborate in one go.
pub fn lower_program(
    program: &Program,
    config: &CompileConfig,
    scales: ScaleMap,
    bound: i32,
) -> Result<ModuleIR, LowerError> {
    let env = Checker::new().check_program(program)?;
    let mut strategy = select_strategy(config, scales, bound);
    elaborate(program, &env, strategy.as_mut(), config)
}

/// Lowers a checked program to loop-level IR using `strategy` for every
/// arithmetic decision. Every let binding and every compound
/// sub-expression gets its own declaration; temporaries are numbered in
/// visiting order so both modes agree on names.
pub fn elaborate(
    program: &Program,
    env: &TypeEnv,
    strategy: &mut dyn NumericStrategy,
    config: &CompileConfig,
) -> Result<ModuleIR, LowerError> {
    config.validate()?;

    let mut el = Elaborator {
        env,
        strategy,
        decls: Vec::new(),
        body: Vec::new(),
        next_temp: 0,
    };

    for decl in &program.decls {
        let ty = TensorType::new(decl.shape.clone());
        let storage = match decl.kind {
            DeclKind::Input => StorageClass::Input,
            DeclKind::Param => StorageClass::Global,
        };
        let d = Decl::new(decl.name.node.clone(), ty, storage, ElemKind::Word);
        el.decls.push(d.clone());
        if storage == StorageClass::Input {
            el.observe_input(&d)?;
        }
    }

    for binding in &program.bindings {
        el.lower(&binding.value, Some(&binding.name.node))?;
    }

    let result = match el.lower(&program.result, None)? {
        Operand::Var { name, .. } | Operand::Index(name) => name,
        constant @ Operand::Const(_) => el.copy_into_temp(constant)?,
    };
    el.print_result(&result)?;

    let mode = el.strategy.mode();
    let output = el.strategy.finish();
    let mut decls = el.decls;
    for table in output.tables.values() {
        decls.push(Decl::new(
            table.coarse_name(),
            TensorType::new(vec![table.coarse.len()]),
            StorageClass::Global,
            ElemKind::Word,
        ));
        decls.push(Decl::new(
            table.fine_name(),
            TensorType::new(vec![table.fine.len()]),
            StorageClass::Global,
            ElemKind::Word,
        ));
    }

    debug!(
        mode = mode.name(),
        decls = decls.len(),
        tables = output.tables.len(),
        "elaborated module"
    );

    Ok(ModuleIR {
        mode,
        word: config.word_length,
        decls,
        body: el.body,
        result,
        scales: output.scales,
        tables: output.tables,
        profiled: output.profiled,
    })
}

#[derive(Clone, Debug)]
enum Operand {
    Var { name: String, ty: TensorType },
    Const(f64),
    /// An `int` class index.
    Index(String),
}

impl Operand {
    fn ty(&self) -> Type {
        match self {
            Operand::Var { ty, .. } => Type::Tensor(ty.clone()),
            Operand::Const(_) => Type::Tensor(TensorType::scalar()),
            Operand::Index(_) => Type::Int,
        }
    }

    fn tensor(&self) -> TensorType {
        match self {
            Operand::Var { ty, .. } => ty.clone(),
            Operand::Const(_) | Operand::Index(_) => TensorType::scalar(),
        }
    }

    /// Plain element access, broadcast to a loop nest of shape `target`.
    fn element(&self, idx: &[Expr]) -> Expr {
        match self {
            Operand::Var { name, ty } => element_of(name, ty, idx),
            Operand::Const(v) => Expr::Float(*v),
            Operand::Index(name) => Expr::var(name.clone()),
        }
    }

    fn load(&self, strategy: &mut dyn NumericStrategy, idx: &[Expr]) -> Result<Value, LowerError> {
        match self {
            Operand::Var { name, .. } => strategy.load(name, self.element(idx)),
            Operand::Const(v) => strategy.constant(*v),
            Operand::Index(name) => strategy.load(name, Expr::var(name.clone())),
        }
    }
}

fn element_of(name: &str, ty: &TensorType, idx: &[Expr]) -> Expr {
    if ty.is_scalar() {
        return Expr::var(name);
    }
    if ty.is_all_ones() {
        return Expr::index(name, vec![Expr::Int(0); ty.rank()]);
    }
    Expr::index(name, idx.to_vec())
}

fn loop_var(depth: usize) -> String {
    format!("fixc_i{depth}")
}

/// Wraps `inner` in one loop per dimension, outermost slowest.
fn loop_nest(
    shape: &[usize],
    inner: impl FnOnce(&[Expr]) -> Result<Vec<Stmt>, LowerError>,
) -> Result<Vec<Stmt>, LowerError> {
    let idx: Vec<Expr> = (0..shape.len()).map(|d| Expr::var(loop_var(d))).collect();
    let mut body = inner(&idx)?;
    for (depth, bound) in shape.iter().enumerate().rev() {
        body = vec![Stmt::Loop {
            var: loop_var(depth),
            bound: *bound,
            body,
        }];
    }
    Ok(body)
}

struct Elaborator<'a> {
    env: &'a TypeEnv,
    strategy: &'a mut dyn NumericStrategy,
    decls: Vec<Decl>,
    body: Vec<Stmt>,
    next_temp: usize,
}

impl Elaborator<'_> {
    fn temp(&mut self) -> String {
        self.next_temp += 1;
        format!("tmp{}", self.next_temp)
    }

    fn target(&mut self, dest: Option<&str>) -> String {
        match dest {
            Some(name) => name.to_string(),
            None => self.temp(),
        }
    }

    fn declare(&mut self, name: &str, ty: TensorType, elem: ElemKind) -> Decl {
        let decl = Decl::new(name, ty, StorageClass::Internal, elem);
        self.decls.push(decl.clone());
        decl
    }

    fn lower(&mut self, expr: &AstExpr, dest: Option<&str>) -> Result<Operand, LowerError> {
        match &expr.kind {
            ExprKind::Float(v) => match dest {
                Some(name) => self.copy_into(Operand::Const(*v), name),
                None => Ok(Operand::Const(*v)),
            },
            ExprKind::Ident(name) => {
                let operand = match self.env.get(name) {
                    Some(Type::Int) => Operand::Index(name.clone()),
                    Some(Type::Tensor(ty)) => Operand::Var {
                        name: name.clone(),
                        ty: ty.clone(),
                    },
                    None => {
                        return Err(crate::error::ShapeError {
                            message: format!("unknown identifier '{name}'"),
                            span: expr.span,
                        }
                        .into());
                    }
                };
                match dest {
                    Some(target) => self.copy_into(operand, target),
                    None => Ok(operand),
                }
            }
            ExprKind::Neg(inner) => {
                let a = self.lower(inner, None)?;
                let target = self.target(dest);
                let ty = a.tensor();
                self.define(&target, &ty, |s, idx| {
                    let v = a.load(s, idx)?;
                    s.neg(v)
                })
            }
            ExprKind::Binary { left, op, right } => {
                let a = self.lower(left, None)?;
                let b = self.lower(right, None)?;
                let ty = binary_type(*op, &a.ty(), &b.ty(), expr.span)?;
                let ty = ty.as_tensor().cloned().unwrap_or_default();
                let target = self.target(dest);
                match op {
                    AstBinOp::Mul if !a.tensor().is_scalar() && !b.tensor().is_scalar() => {
                        self.matmul(&target, &ty, &a, &b)
                    }
                    AstBinOp::Mul | AstBinOp::MulElem => self.define(&target, &ty, |s, idx| {
                        let x = a.load(s, idx)?;
                        let y = b.load(s, idx)?;
                        s.mul(x, y)
                    }),
                    AstBinOp::Add | AstBinOp::Sub => {
                        let op = if *op == AstBinOp::Add { BinOp::Add } else { BinOp::Sub };
                        self.define(&target, &ty, |s, idx| {
                            let x = a.load(s, idx)?;
                            let y = b.load(s, idx)?;
                            s.add(op, x, y)
                        })
                    }
                }
            }
            ExprKind::Call { func, args } => {
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    operands.push(self.lower(arg, None)?);
                }
                let tys: Vec<Type> = operands.iter().map(Operand::ty).collect();
                let ty = call_type(func.node, &tys, expr.span)?;
                let a = operands.remove(0);
                let target = self.target(dest);
                match func.node {
                    Builtin::Exp => self.define(&target, &a.tensor(), |s, idx| {
                        let v = a.load(s, idx)?;
                        s.exp(v)
                    }),
                    Builtin::Tanh => self.define(&target, &a.tensor(), |s, idx| {
                        let v = a.load(s, idx)?;
                        s.tanh(v)
                    }),
                    Builtin::Sigmoid => self.define(&target, &a.tensor(), |s, idx| {
                        let v = a.load(s, idx)?;
                        s.sigmoid(v)
                    }),
                    Builtin::Relu => self.define(&target, &a.tensor(), |s, idx| {
                        let v = a.load(s, idx)?;
                        s.relu(v)
                    }),
                    Builtin::Transpose => {
                        let out = ty.as_tensor().cloned().unwrap_or_default();
                        self.define(&target, &out, |s, idx| {
                            let swapped: Vec<Expr> = idx.iter().rev().cloned().collect();
                            a.load(s, &swapped)
                        })
                    }
                    Builtin::ArgMax => self.argmax(&target, &a),
                    Builtin::Sgn => self.sgn(&target, &a),
                }
            }
        }
    }

    /// Materializes `target = f(element)` over the full shape of `target`.
    fn define(
        &mut self,
        target: &str,
        ty: &TensorType,
        mut f: impl FnMut(&mut dyn NumericStrategy, &[Expr]) -> Result<Value, LowerError>,
    ) -> Result<Operand, LowerError> {
        let decl = self.declare(target, ty.clone(), ElemKind::Word);
        if let Some(companion) = self.strategy.companion(&decl) {
            self.decls.push(companion);
        }
        let strategy = &mut *self.strategy;
        let stmts = loop_nest(&ty.shape, |idx| {
            let element = element_of(target, ty, idx);
            let value = f(strategy, idx)?;
            let stored = strategy.store(value, target)?;
            let mut body = vec![Stmt::assign(element.clone(), stored)];
            body.extend(strategy.after_define(&decl, &element)?);
            Ok(body)
        })?;
        self.body.extend(stmts);
        Ok(Operand::Var {
            name: target.to_string(),
            ty: ty.clone(),
        })
    }

    fn matmul(
        &mut self,
        target: &str,
        ty: &TensorType,
        a: &Operand,
        b: &Operand,
    ) -> Result<Operand, LowerError> {
        let inner = a.tensor().shape[1];
        let decl = self.declare(target, ty.clone(), ElemKind::Word);
        if let Some(companion) = self.strategy.companion(&decl) {
            self.decls.push(companion);
        }
        let acc = format!("{target}__acc");
        self.declare(&acc, TensorType::scalar(), ElemKind::Wide);

        let strategy = &mut *self.strategy;
        let stmts = loop_nest(&ty.shape, |idx| {
            let k = Expr::var("fixc_k");
            let x = a.load(strategy, &[idx[0].clone(), k.clone()])?;
            let y = b.load(strategy, &[k, idx[1].clone()])?;
            let product = strategy.mul(x, y)?;
            let term = strategy.rescale(product, target)?;
            let acc_scale = term.scale;

            let element = element_of(target, ty, idx);
            let acc_bits = term.bits + inner.next_power_of_two().trailing_zeros();
            let sum = Value::with_bits(Expr::var(acc.clone()), acc_scale, acc_bits);
            let stored = strategy.store(sum, target)?;
            let mut body = vec![
                Stmt::assign(Expr::var(acc.clone()), Expr::Int(0)),
                Stmt::Loop {
                    var: "fixc_k".to_string(),
                    bound: inner,
                    body: vec![Stmt::assign(
                        Expr::var(acc.clone()),
                        Expr::binary(BinOp::Add, Expr::var(acc.clone()), term.expr),
                    )],
                },
                Stmt::assign(element.clone(), stored),
            ];
            body.extend(strategy.after_define(&decl, &element)?);
            Ok(body)
        })?;
        self.body.extend(stmts);
        Ok(Operand::Var {
            name: target.to_string(),
            ty: ty.clone(),
        })
    }

    /// Row-major scan; strict `>` keeps the first maximum.
    fn argmax(&mut self, target: &str, a: &Operand) -> Result<Operand, LowerError> {
        self.declare(target, TensorType::scalar(), ElemKind::Index);
        let Operand::Var { ty, .. } = a else {
            self.body.push(Stmt::assign(Expr::var(target), Expr::Int(0)));
            return Ok(Operand::Index(target.to_string()));
        };
        let best = format!("{target}__best");
        let count = format!("{target}__count");
        self.declare(&best, TensorType::scalar(), ElemKind::Word);
        self.declare(&count, TensorType::scalar(), ElemKind::Index);

        let first = a.element(&vec![Expr::Int(0); ty.rank()]);
        self.body.push(Stmt::assign(Expr::var(target), Expr::Int(0)));
        self.body.push(Stmt::assign(Expr::var(best.clone()), first));
        self.body.push(Stmt::assign(Expr::var(count.clone()), Expr::Int(0)));

        let scan = loop_nest(&ty.shape, |idx| {
            let x = a.element(idx);
            Ok(vec![
                Stmt::assign(
                    Expr::var(target),
                    Expr::call(
                        "FIXC_SELECT_GT",
                        vec![
                            x.clone(),
                            Expr::var(best.clone()),
                            Expr::var(count.clone()),
                            Expr::var(target),
                        ],
                    ),
                ),
                Stmt::assign(
                    Expr::var(best.clone()),
                    Expr::call("FIXC_MAX", vec![x, Expr::var(best.clone())]),
                ),
                Stmt::assign(
                    Expr::var(count.clone()),
                    Expr::binary(BinOp::Add, Expr::var(count.clone()), Expr::Int(1)),
                ),
            ])
        })?;
        self.body.extend(scan);
        Ok(Operand::Index(target.to_string()))
    }

    fn sgn(&mut self, target: &str, a: &Operand) -> Result<Operand, LowerError> {
        self.declare(target, TensorType::scalar(), ElemKind::Index);
        let value = match a {
            Operand::Const(v) => Expr::Int(i64::from(*v > 0.0)),
            other => {
                let zeros = vec![Expr::Int(0); other.tensor().rank()];
                Expr::binary(BinOp::Gt, other.element(&zeros), Expr::Int(0))
            }
        };
        self.body.push(Stmt::assign(Expr::var(target), value));
        Ok(Operand::Index(target.to_string()))
    }

    fn copy_into(&mut self, source: Operand, target: &str) -> Result<Operand, LowerError> {
        if let Operand::Index(name) = &source {
            self.declare(target, TensorType::scalar(), ElemKind::Index);
            self.body
                .push(Stmt::assign(Expr::var(target), Expr::var(name.clone())));
            return Ok(Operand::Index(target.to_string()));
        }
        let ty = source.tensor();
        self.define(target, &ty, |s, idx| source.load(s, idx))
    }

    fn copy_into_temp(&mut self, source: Operand) -> Result<String, LowerError> {
        let target = self.temp();
        self.copy_into(source, &target)?;
        Ok(target)
    }

    /// Profiling and debug hooks for the entry parameter.
    fn observe_input(&mut self, decl: &Decl) -> Result<(), LowerError> {
        if let Some(companion) = self.strategy.companion(decl) {
            self.decls.push(companion);
        }
        let strategy = &mut *self.strategy;
        let mut any = false;
        let stmts = loop_nest(&decl.ty.shape, |idx| {
            let element = element_of(&decl.name, &decl.ty, idx);
            let extra = strategy.after_define(decl, &element)?;
            any = !extra.is_empty();
            Ok(extra)
        })?;
        if any {
            self.body.extend(stmts);
        }
        Ok(())
    }

    /// Tensor results are printed row-major; class indices are returned.
    fn print_result(&mut self, result: &str) -> Result<(), LowerError> {
        let Some(decl) = self.decls.iter().find(|d| d.name == result).cloned() else {
            return Ok(());
        };
        if decl.elem == ElemKind::Index {
            return Ok(());
        }
        let strategy = &mut *self.strategy;
        let stmts = loop_nest(&decl.ty.shape, |idx| {
            let element = element_of(&decl.name, &decl.ty, idx);
            let value = strategy.load(&decl.name, element)?;
            Ok(vec![Stmt::PrintAsReal {
                value: value.expr,
                scale: value.scale,
            }])
        })?;
        self.body.extend(stmts);
        Ok(())
    }
}
