#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use fixc_backend_c::{write_artifacts, CArtifacts, RetryPolicy};
use fixc_ir::ScaleMap;
use tokio::process::Command;
use tracing::debug;

use crate::error::CandidateError;
use crate::profile::ProfileLog;

/// A generated program ready to be compiled and scored.
#[derive(Clone, Debug)]
pub struct CandidateProgram {
    /// Search bound that produced it; `None` for the profiling run.
    pub bound: Option<i32>,
    pub scales: ScaleMap,
    pub artifacts: CArtifacts,
    /// Ask the harness to write its profile log.
    pub profile: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Percentage of rows classified correctly.
    pub accuracy: f64,
    pub overflows: u64,
    pub profile: Option<ProfileLog>,
}

/// Compiles and executes candidates. The search only talks to this trait.
pub trait CandidateRunner {
    fn run(&mut self, candidate: &CandidateProgram) -> Result<RunReport, CandidateError>;
}

/// First compiler in `$CC`, `cc`, `gcc`, `clang` that answers `--version`.
pub fn find_c_compiler() -> Option<String> {
    let from_env = std::env::var("CC").ok().filter(|cc| !cc.trim().is_empty());
    from_env
        .into_iter()
        .chain(["cc", "gcc", "clang"].map(String::from))
        .find(|cc| {
            std::process::Command::new(cc)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|s| s.success())
        })
}

/// Reads `accuracy <pct>` and `overflows <n>` from harness stdout.
pub fn parse_harness_output(stdout: &str) -> Result<(f64, u64), CandidateError> {
    let mut accuracy = None;
    let mut overflows = None;
    for line in stdout.lines() {
        let mut it = line.split_whitespace();
        match (it.next(), it.next()) {
            (Some("accuracy"), Some(v)) => accuracy = v.parse::<f64>().ok(),
            (Some("overflows"), Some(v)) => overflows = v.parse::<u64>().ok(),
            _ => {}
        }
    }
    match (accuracy, overflows) {
        (Some(a), Some(o)) => Ok((a, o)),
        _ => Err(CandidateError::Output {
            message: format!(
                "missing accuracy or overflow line in {} bytes of output",
                stdout.len()
            ),
        }),
    }
}

async fn run_with_watchdog(
    mut cmd: Command,
    limit: Duration,
    stage: &'static str,
) -> Result<Output, CandidateError> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = cmd
        .spawn()
        .map_err(|e| CandidateError::io(PathBuf::from(stage), e))?;
    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(out) => out.map_err(|e| CandidateError::io(PathBuf::from(stage), e)),
        // Dropping the future drops the child, which kills it.
        Err(_) => Err(CandidateError::Timeout {
            stage,
            seconds: limit.as_secs(),
        }),
    }
}

/// Scores candidates with the host C compiler in a scratch directory.
pub struct ToolchainRunner {
    compiler: String,
    dataset: PathBuf,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
}

impl ToolchainRunner {
    pub fn new(dataset: &Path, timeout: Duration) -> Result<Self, CandidateError> {
        let compiler = find_c_compiler().ok_or(CandidateError::NoCompiler)?;
        let dataset = std::path::absolute(dataset).map_err(|e| CandidateError::io(dataset, e))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CandidateError::io("tokio runtime", e))?;
        Ok(Self {
            compiler,
            dataset,
            timeout,
            runtime,
        })
    }

    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }
}

impl CandidateRunner for ToolchainRunner {
    fn run(&mut self, candidate: &CandidateProgram) -> Result<RunReport, CandidateError> {
        let scratch = tempfile::Builder::new()
            .prefix("fixc-candidate-")
            .tempdir()
            .map_err(|e| CandidateError::io(std::env::temp_dir(), e))?;
        let dir = scratch.path();
        write_artifacts(&candidate.artifacts, dir, RetryPolicy::default())?;

        let exe = dir.join("harness");
        let profile_path = dir.join("profile.txt");

        let mut compile = Command::new(&self.compiler);
        compile
            .current_dir(dir)
            .args(["-O2", "-std=c99", "-I."])
            .args(candidate.artifacts.harness_sources())
            .arg("-o")
            .arg(&exe)
            .arg("-lm");

        let mut execute = Command::new(&exe);
        execute.current_dir(dir).arg(&self.dataset);
        if candidate.profile {
            execute.arg(&profile_path);
        }

        let limit = self.timeout;
        let stdout = self.runtime.block_on(async {
            let out = run_with_watchdog(compile, limit, "compile").await?;
            if !out.status.success() {
                return Err(CandidateError::Compile {
                    status: out.status.to_string(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                });
            }
            let out = run_with_watchdog(execute, limit, "execute").await?;
            if !out.status.success() {
                return Err(CandidateError::Crashed {
                    status: out.status.to_string(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                });
            }
            Ok(String::from_utf8_lossy(&out.stdout).into_owned())
        })?;

        let (accuracy, overflows) = parse_harness_output(&stdout)?;
        let profile = if candidate.profile {
            Some(ProfileLog::load(&profile_path)?)
        } else {
            None
        };
        debug!(
            bound = ?candidate.bound,
            accuracy,
            overflows,
            compiler = %self.compiler,
            "candidate executed"
        );
        Ok(RunReport {
            accuracy,
            overflows,
            profile,
        })
    }
}
