#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("C backend error: {message}")]
#[diagnostic(code(fixc::backend_c))]
#[allow(unused_assignments)]
pub struct CBackendError {
    pub message: String,
}

impl CBackendError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("could not open {} after {attempts} attempts", path.display())]
#[diagnostic(
    code(fixc::resource_contention),
    help("another process may hold the output file; retry later")
)]
pub struct ResourceContentionError {
    pub path: PathBuf,
    pub attempts: u32,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error, Diagnostic)]
pub enum OutputError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Contention(#[from] ResourceContentionError),

    #[error("failed writing {}: {source}", path.display())]
    #[diagnostic(code(fixc::output_io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output writer stopped before all chunks were written")]
    #[diagnostic(code(fixc::output_closed))]
    Closed,
}
