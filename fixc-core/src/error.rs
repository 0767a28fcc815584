#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use fixc_ast::Span;
use fixc_ir::{ConfigurationError, ScaleOverflowError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("shape error: {message}")]
#[diagnostic(code(fixc::shape))]
#[allow(unused_assignments)]
pub struct ShapeError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Debug, Error, Diagnostic)]
pub enum LowerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ScaleOverflow(#[from] ScaleOverflowError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigurationError),

    #[error("no scale factor for '{name}'")]
    #[diagnostic(
        code(fixc::missing_scale),
        help("every fixed-point variable needs an entry in the scale map; re-run profiling")
    )]
    MissingScale { name: String },
}
