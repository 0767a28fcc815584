#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use fixc_ir::{Target, WordLength};
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "fixc.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(fixc::config_file))]
pub struct ConfigFileError {
    pub message: String,
}

/// Contents of `fixc.toml`. Every section is optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub paths: Paths,
    pub compile: CompileDefaults,
    pub sweep: SweepPlan,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    /// `<models>/<algo>/<dataset>/` holds `program.fx`, the model and the
    /// `train.tsv`/`test.tsv` splits.
    pub models: PathBuf,
    pub build: PathBuf,
    pub cache: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            models: PathBuf::from("models"),
            build: PathBuf::from("build"),
            cache: PathBuf::from("results.json"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileDefaults {
    pub word_length: WordLength,
    pub target: Target,
    pub max_scale_factor: i32,
    pub workers: usize,
    pub saturate: bool,
    /// Watchdog for each compile and each harness run.
    pub timeout_secs: u64,
}

impl Default for CompileDefaults {
    fn default() -> Self {
        Self {
            word_length: WordLength::W16,
            target: Target::Desktop,
            max_scale_factor: 15,
            workers: 1,
            saturate: false,
            timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepPlan {
    pub algos: Vec<String>,
    pub datasets: Vec<String>,
    pub targets: Vec<Target>,
    pub word_lengths: Vec<WordLength>,
}

impl ProjectConfig {
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigFileError> {
        toml::from_str(text).map_err(|e| ConfigFileError {
            message: format!("failed to parse {}: {e}", origin.display()),
        })
    }

    /// Reads `explicit`, or `./fixc.toml` when present, or falls back to
    /// defaults. Relative paths are resolved against the file's directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigFileError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let raw = fs::read_to_string(&path).map_err(|e| ConfigFileError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let mut cfg = Self::parse(&raw, &path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.paths.models = resolve_path(base, &cfg.paths.models);
        cfg.paths.build = resolve_path(base, &cfg.paths.build);
        cfg.paths.cache = resolve_path(base, &cfg.paths.cache);
        Ok(cfg)
    }
}

fn resolve_path(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
