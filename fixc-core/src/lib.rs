#![forbid(unsafe_code)]

mod check;
mod elaborate;
mod error;
mod strategy;
mod tables;

pub use check::{binary_type, broadcast, call_type, infer_type, Checker, TypeEnv};
pub use elaborate::{elaborate, lower_program, select_strategy};
pub use error::{LowerError, ShapeError};
pub use strategy::{FixedArithmetic, NumericStrategy, RealArithmetic, StrategyOutput, Value};
pub use tables::{build_exp_table, TableRegistry};
