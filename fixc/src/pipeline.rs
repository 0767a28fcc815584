#![forbid(unsafe_code)]

//! Stage wiring for the CLI: locate a workload, profile, search, emit.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fixc_ast::Program;
use fixc_backend_c::{emit_debug_program, emit_module, write_artifacts, RetryPolicy};
use fixc_convert::{Dataset, ModelParams};
use fixc_core::lower_program;
use fixc_ir::{CompileConfig, NumericMode, ScaleMap, Target};
use fixc_scale::{
    CandidateProgram, CandidateRunner, ProfileLog, RunReport, Scored, SearchEngine,
    ToolchainRunner,
};
use miette::{Diagnostic, IntoDiagnostic, NamedSource};
use tracing::info;

use crate::config::Paths;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Training,
    Testing,
}

impl Split {
    fn file_stem(self) -> &'static str {
        match self {
            Split::Training => "train",
            Split::Testing => "test",
        }
    }
}

/// One algorithm trained on one dataset.
#[derive(Clone, Debug)]
pub struct Workload {
    pub algo: String,
    pub dataset: String,
    pub dir: PathBuf,
    pub out: PathBuf,
}

impl Workload {
    pub fn locate(paths: &Paths, algo: &str, dataset: &str) -> miette::Result<Self> {
        let dir = paths.models.join(algo).join(dataset);
        if !dir.is_dir() {
            return Err(miette::miette!(
                code = "fixc::workload",
                "no model directory for {algo}/{dataset} at {}",
                dir.display()
            ));
        }
        Ok(Self {
            algo: algo.to_string(),
            dataset: dataset.to_string(),
            dir,
            out: paths.build.join(algo).join(dataset),
        })
    }

    pub fn program_path(&self) -> PathBuf {
        self.dir.join("program.fx")
    }

    pub fn model_path(&self) -> PathBuf {
        let json = self.dir.join("model.json");
        if json.exists() {
            json
        } else {
            self.dir.join("model.txt")
        }
    }

    pub fn split_tsv(&self, split: Split) -> PathBuf {
        self.dir.join(format!("{}.tsv", split.file_stem()))
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.algo, self.dataset)
    }

    /// Converts `split` to the harness binary layout under the build dir.
    pub fn dataset_bin(&self, split: Split) -> miette::Result<PathBuf> {
        let dir = self.out.join("data");
        fs::create_dir_all(&dir).into_diagnostic()?;
        let dst = dir.join(format!("{}.bin", split.file_stem()));
        let ds = Dataset::load_tsv(&self.split_tsv(split))?;
        ds.write_binary(&dst)?;
        Ok(dst)
    }
}

/// A parsed program kept together with its text so later diagnostics can
/// point into it.
pub struct SourceProgram {
    pub program: Program,
    source: NamedSource<String>,
}

impl SourceProgram {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let text = fs::read_to_string(path).into_diagnostic()?;
        Self::from_text(&path.display().to_string(), text)
    }

    pub fn from_text(name: &str, text: String) -> miette::Result<Self> {
        let source = NamedSource::new(name, text);
        let program = fixc_parse::parse_source(source.inner())
            .map_err(|e| e.with_source_code(source.clone()))?;
        Ok(Self { program, source })
    }

    /// Attaches the program text to a stage error.
    pub fn report<E>(&self, err: E) -> miette::Report
    where
        E: Diagnostic + Send + Sync + 'static,
    {
        miette::Report::new(err).with_source_code(self.source.clone())
    }
}

/// Resolved settings for one invocation.
#[derive(Clone, Debug)]
pub struct Settings {
    pub config: CompileConfig,
    pub timeout: Duration,
}

/// Profiles the real program on the training split, then searches every
/// bound (or re-scores `load_sf` only).
pub fn tune(
    workload: &Workload,
    source: &SourceProgram,
    params: &ModelParams,
    settings: &Settings,
    load_sf: Option<i32>,
    seed: Option<ScaleMap>,
) -> miette::Result<Scored> {
    let train = workload.dataset_bin(Split::Training)?;
    let runner = ToolchainRunner::new(&train, settings.timeout)?;
    info!(workload = %workload.label(), compiler = runner.compiler(), "tuning scale factors");

    let mut engine = SearchEngine::new(&source.program, params, &settings.config, runner);
    if let Some(seed) = seed {
        engine = engine.with_seed(seed);
    }
    let profile = engine.collect_profile().map_err(|e| source.report(e))?;
    fs::create_dir_all(&workload.out).into_diagnostic()?;
    fs::write(workload.out.join("profile.txt"), profile_text(&profile)).into_diagnostic()?;

    match load_sf {
        Some(bound) => engine.replay(&profile, bound),
        None => engine.search(&profile).map(|o| o.best),
    }
    .map_err(|e| source.report(e))
}

fn profile_text(profile: &ProfileLog) -> String {
    let mut out = String::from("# fixc profile\n");
    for (name, lo, hi) in profile.iter() {
        out.push_str(&format!("{name} {lo} {hi}\n"));
    }
    out
}

/// Scores a desktop build of the program on `split`.
pub fn evaluate(
    workload: &Workload,
    source: &SourceProgram,
    params: &ModelParams,
    settings: &Settings,
    mode: NumericMode,
    scales: &ScaleMap,
    bound: i32,
    split: Split,
) -> miette::Result<RunReport> {
    let config = CompileConfig {
        mode,
        target: Target::Desktop,
        workers: 1,
        profile: false,
        ..settings.config.clone()
    };
    let ir = lower_program(&source.program, &config, scales.clone(), bound)
        .map_err(|e| source.report(e))?;
    let artifacts = emit_module(&ir, &config, params)?;
    let data = workload.dataset_bin(split)?;
    let mut runner = ToolchainRunner::new(&data, settings.timeout)?;
    let report = runner.run(&CandidateProgram {
        bound: Some(bound),
        scales: scales.clone(),
        artifacts,
        profile: false,
    })?;
    Ok(report)
}

/// Writes the final sources for `settings.config` into
/// `<build>/<algo>/<dataset>/<mode>-<target>/`. Fixed desktop builds also
/// get the real module and `debug.c`.
pub fn emit(
    workload: &Workload,
    source: &SourceProgram,
    params: &ModelParams,
    settings: &Settings,
    scales: &ScaleMap,
    bound: i32,
) -> miette::Result<Vec<PathBuf>> {
    let config = &settings.config;
    let dir = workload
        .out
        .join(format!("{}-{}", config.mode, config.target));
    fs::create_dir_all(&dir).into_diagnostic()?;

    let ir = lower_program(&source.program, config, scales.clone(), bound)
        .map_err(|e| source.report(e))?;
    let artifacts = emit_module(&ir, config, params)?;
    let mut written = write_artifacts(&artifacts, &dir, RetryPolicy::default())?;

    if config.mode == NumericMode::Fixed {
        let scales_path = dir.join("scales.json");
        let json = serde_json::to_string_pretty(scales).into_diagnostic()?;
        fs::write(&scales_path, json + "\n").into_diagnostic()?;
        written.push(scales_path);

        if config.target == Target::Desktop {
            let real_config = CompileConfig {
                mode: NumericMode::Real,
                workers: 1,
                ..config.clone()
            };
            let real = lower_program(&source.program, &real_config, ScaleMap::new(), bound)
                .map_err(|e| source.report(e))?;
            let real_artifacts = emit_module(&real, &real_config, params)?;
            // Both modes share one runtime; keep the fixed one.
            for (name, text) in real_artifacts.support_files() {
                if name == "fixc_runtime.h" || name == "fixc_runtime.c" {
                    continue;
                }
                let path = dir.join(name);
                fs::write(&path, text).into_diagnostic()?;
                written.push(path);
            }
            let module = dir.join(real_artifacts.module_file_name());
            fs::write(&module, real_artifacts.module_c()).into_diagnostic()?;
            written.push(module);

            let debug = dir.join("debug.c");
            fs::write(&debug, emit_debug_program(&real, &ir, config)?).into_diagnostic()?;
            written.push(debug);
        }
    }
    info!(dir = %dir.display(), files = written.len(), "sources written");
    Ok(written)
}
