#![forbid(unsafe_code)]

//! Scale factor inference: profile a real-mode run, then search the bound
//! that maximizes fixed-point accuracy.

pub mod cache;
pub mod error;
pub mod profile;
pub mod runner;
pub mod search;

pub use cache::{verify, CacheRecord, ResultCache, Verdict, ACCURACY_TOLERANCE};
pub use error::{AccuracyRegressionError, CacheError, CandidateError, ProfileError, SearchError};
pub use profile::{ProfileLog, ProfileScales};
pub use runner::{
    find_c_compiler, parse_harness_output, CandidateProgram, CandidateRunner, RunReport,
    ToolchainRunner,
};
pub use search::{prefer, CandidateOutcome, Scored, SearchEngine, SearchOutcome, SearchState};
