#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ir;
pub mod scale;
pub mod types;

pub use config::*;
pub use error::*;
pub use ir::*;
pub use scale::*;
pub use types::*;
