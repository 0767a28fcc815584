#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::path::PathBuf;

use fixc_backend_c::{CBackendError, OutputError};
use fixc_core::LowerError;
use fixc_ir::ScaleOverflowError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{what}, line {line}: {message}")]
#[diagnostic(code(fixc::profile))]
pub struct ProfileError {
    pub what: String,
    pub line: usize,
    pub message: String,
}

/// Why a single candidate could not be scored.
#[derive(Debug, Error, Diagnostic)]
pub enum CandidateError {
    #[error("no C compiler found (tried $CC, cc, gcc, clang)")]
    #[diagnostic(code(fixc::candidate::toolchain))]
    NoCompiler,

    #[error("C compiler failed ({status}):\n{stderr}")]
    #[diagnostic(code(fixc::candidate::compile))]
    Compile { status: String, stderr: String },

    #[error("harness exited with {status}:\n{stderr}")]
    #[diagnostic(code(fixc::candidate::crashed))]
    Crashed { status: String, stderr: String },

    #[error("{stage} exceeded the {seconds}s watchdog")]
    #[diagnostic(
        code(fixc::candidate::timeout),
        help("raise `timeout_secs` in fixc.toml")
    )]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("unexpected harness output: {message}")]
    #[diagnostic(code(fixc::candidate::output))]
    Output { message: String },

    #[error("I/O failure on {}", path.display())]
    #[diagnostic(code(fixc::candidate::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Write(#[from] OutputError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Profile(#[from] ProfileError),
}

impl CandidateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CandidateError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("all {tried} candidate bounds were rejected")]
    #[diagnostic(
        code(fixc::search::all_rejected),
        help("run with RUST_LOG=fixc=debug to see why each candidate failed")
    )]
    AllCandidatesRejected { tried: usize },

    #[error("profiling run produced no profile log")]
    #[diagnostic(code(fixc::search::no_profile))]
    MissingProfile,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lower(#[from] LowerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] CBackendError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Candidate(#[from] CandidateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scale(#[from] ScaleOverflowError),
}

/// Measured result disagrees with the recorded one.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum AccuracyRegressionError {
    #[error("FAIL: Expected accuracy {expected:.6}%")]
    #[diagnostic(code(fixc::regression::accuracy))]
    Accuracy { expected: f64, measured: f64 },

    #[error("FAIL: Expected best scale {expected}")]
    #[diagnostic(code(fixc::regression::scale))]
    Scale { expected: i32, measured: i32 },
}

#[derive(Debug, Error, Diagnostic)]
#[error("result cache {}: {message}", path.display())]
#[diagnostic(code(fixc::cache))]
pub struct CacheError {
    pub path: PathBuf,
    pub message: String,
}
