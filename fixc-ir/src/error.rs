#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[error("scale overflow for '{name}': {message}")]
#[diagnostic(
    code(fixc::scale_overflow),
    help("lower the maximum scale factor or use a wider word length")
)]
pub struct ScaleOverflowError {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[error("configuration error: {message}")]
#[diagnostic(code(fixc::config))]
pub struct ConfigurationError {
    pub message: String,
}
