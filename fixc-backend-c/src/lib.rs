#![forbid(unsafe_code)]

//! C code generation: the per-mode module, the runtime support files, the
//! desktop harness and the real-vs-fixed debug program.

pub mod debug;
pub mod emit;
pub mod error;
pub mod harness;
pub mod queue;
pub mod runtime;
pub mod target;

use std::path::{Path, PathBuf};

pub use debug::{diff_candidates, emit_debug_program};
pub use emit::{c_ident, c_type, dispatcher_name, emit_module, entry_call, entry_name, CArtifacts};
pub use error::{CBackendError, OutputError, ResourceContentionError};
pub use harness::emit_harness;
pub use queue::{open_with_retry, write_ordered_blocking, OutputQueue, RetryPolicy};
pub use runtime::{emit_runtime_c, emit_runtime_h};
pub use target::{create_style, DesktopStyle, FpgaStyle, MicrocontrollerStyle, TargetStyle};

/// Writes every artifact into `dir`, the module unit through the ordered
/// output queue. Returns the written paths.
pub fn write_artifacts(
    artifacts: &CArtifacts,
    dir: &Path,
    policy: RetryPolicy,
) -> Result<Vec<PathBuf>, OutputError> {
    let mut written = Vec::new();
    for (name, text) in artifacts.support_files() {
        let path = dir.join(name);
        std::fs::write(&path, text).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    let module = dir.join(artifacts.module_file_name());
    let bytes = write_ordered_blocking(&module, &artifacts.module_parts, policy)?;
    tracing::debug!(path = %module.display(), bytes, "module written");
    written.push(module);
    Ok(written)
}
