#![forbid(unsafe_code)]

use std::path::PathBuf;

use fixc_ir::ScaleOverflowError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConvertError {
    #[error("cannot read or write {}", path.display())]
    #[diagnostic(code(fixc::convert::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{what}, line {line}: {message}")]
    #[diagnostic(code(fixc::convert::parse))]
    Parse {
        what: String,
        line: usize,
        message: String,
    },

    #[error("'{name}' value {value} does not fit a {bits}-bit word at scale {scale}")]
    #[diagnostic(
        code(fixc::convert::overflow),
        help("use a smaller scale for this parameter")
    )]
    Overflow {
        name: String,
        value: f64,
        scale: i32,
        bits: u32,
    },

    #[error("malformed dataset binary: {message}")]
    #[diagnostic(code(fixc::convert::layout))]
    Layout { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scale(#[from] ScaleOverflowError),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }
}
