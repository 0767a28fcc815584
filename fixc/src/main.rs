#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fixc_convert::ModelParams;
use fixc_ir::{CompileConfig, NumericMode, ScaleMap, Target, WordLength};
use fixc_scale::{verify, CacheRecord, ResultCache};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod pipeline;

use config::ProjectConfig;
use pipeline::{Settings, SourceProgram, Split, Workload};

#[derive(Parser, Debug)]
#[command(
    name = "fixc",
    version,
    about = "Compile floating-point inference programs to fixed-point C"
)]
struct Cli {
    /// Project configuration. Defaults to `./fixc.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    /// Floating-point C, used as the accuracy reference
    Real,
    /// Scaled-integer C with inferred scale factors
    Fixed,
}

impl From<ModeArg> for NumericMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Real => NumericMode::Real,
            ModeArg::Fixed => NumericMode::Fixed,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TargetArg {
    Desktop,
    Microcontroller,
    Fpga,
}

impl From<TargetArg> for Target {
    fn from(v: TargetArg) -> Self {
        match v {
            TargetArg::Desktop => Target::Desktop,
            TargetArg::Microcontroller => Target::Microcontroller,
            TargetArg::Fpga => Target::Fpga,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct WorkloadArgs {
    /// Algorithm directory under the models root
    #[arg(long)]
    algo: String,

    /// Dataset directory under the algorithm
    #[arg(long)]
    dataset: String,
}

#[derive(Args, Debug, Clone)]
struct BuildArgs {
    #[command(flatten)]
    workload: WorkloadArgs,

    #[arg(long, value_enum, default_value_t = ModeArg::Fixed)]
    mode: ModeArg,

    /// Overrides `compile.target` in fixc.toml
    #[arg(long, value_enum)]
    target: Option<TargetArg>,

    /// 8, 16 or 32
    #[arg(long = "word-length")]
    word_length: Option<u32>,

    #[arg(long = "max-scale-factor")]
    max_scale_factor: Option<i32>,

    /// Re-score this bound instead of searching
    #[arg(long = "load-sf")]
    load_sf: Option<i32>,

    /// FPGA variants in one translation unit
    #[arg(long)]
    workers: Option<usize>,

    /// Keep a real-valued copy of this variable (repeatable)
    #[arg(long = "debug-var")]
    debug_vars: Vec<String>,

    /// Start the search from the converter's parameter scales
    #[arg(long, default_value_t = false)]
    seed: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Tune scale factors and write C sources
    Compile {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Convert model parameters and dataset splits
    Convert {
        #[command(flatten)]
        workload: WorkloadArgs,

        #[arg(long = "word-length")]
        word_length: Option<u32>,
    },
    /// Tune on the training split and report accuracy on another split
    Predict {
        #[command(flatten)]
        build: BuildArgs,

        #[arg(long, value_enum, default_value_t = Split::Testing)]
        split: Split,
    },
    /// Run every configuration in fixc.toml's [sweep] and compare with the
    /// result cache
    Sweep {
        /// Re-score the cached scale instead of searching
        #[arg(long = "load-sf", default_value_t = false)]
        load_sf: bool,

        /// Write measured results back to the cache
        #[arg(long, default_value_t = false)]
        record: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fixc=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn word_length(arg: Option<u32>, default: WordLength) -> miette::Result<WordLength> {
    match arg {
        Some(bits) => Ok(WordLength::try_from(bits)?),
        None => Ok(default),
    }
}

fn settings(project: &ProjectConfig, build: &BuildArgs) -> miette::Result<Settings> {
    let defaults = &project.compile;
    let config = CompileConfig {
        word_length: word_length(build.word_length, defaults.word_length)?,
        target: build.target.map(Target::from).unwrap_or(defaults.target),
        mode: build.mode.into(),
        max_scale: build.max_scale_factor.unwrap_or(defaults.max_scale_factor),
        workers: build.workers.unwrap_or(defaults.workers),
        profile: false,
        debug_vars: build.debug_vars.iter().cloned().collect(),
        saturate: defaults.saturate,
    };
    config.validate()?;
    Ok(Settings {
        config,
        timeout: Duration::from_secs(defaults.timeout_secs),
    })
}

struct Loaded {
    workload: Workload,
    source: SourceProgram,
    params: ModelParams,
}

fn load(project: &ProjectConfig, args: &WorkloadArgs) -> miette::Result<Loaded> {
    let workload = Workload::locate(&project.paths, &args.algo, &args.dataset)?;
    let source = SourceProgram::load(&workload.program_path())?;
    let params = ModelParams::load(&workload.model_path())?;
    Ok(Loaded {
        workload,
        source,
        params,
    })
}

fn seed_scales(loaded: &Loaded, settings: &Settings, seed: bool) -> miette::Result<Option<ScaleMap>> {
    if !seed {
        return Ok(None);
    }
    let config = &settings.config;
    Ok(Some(fixc_convert::initial_scales(
        &loaded.params,
        config.max_scale,
        config.word_length,
    )?))
}

fn run_compile(project: &ProjectConfig, build: &BuildArgs) -> miette::Result<()> {
    let settings = settings(project, build)?;
    let loaded = load(project, &build.workload)?;
    let (scales, bound) = match settings.config.mode {
        NumericMode::Real => (ScaleMap::new(), 0),
        NumericMode::Fixed => {
            let seed = seed_scales(&loaded, &settings, build.seed)?;
            let tuned = pipeline::tune(
                &loaded.workload,
                &loaded.source,
                &loaded.params,
                &settings,
                build.load_sf,
                seed,
            )?;
            println!(
                "best scale {} (training accuracy {:.6}%, {} overflows)",
                tuned.bound, tuned.accuracy, tuned.overflows
            );
            (tuned.scales, tuned.bound)
        }
    };
    let written = pipeline::emit(
        &loaded.workload,
        &loaded.source,
        &loaded.params,
        &settings,
        &scales,
        bound,
    )?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn run_convert(
    project: &ProjectConfig,
    args: &WorkloadArgs,
    bits: Option<u32>,
) -> miette::Result<()> {
    let workload = Workload::locate(&project.paths, &args.algo, &args.dataset)?;
    let word = word_length(bits, project.compile.word_length)?;
    let out = workload.out.join("converted");
    let train = workload.split_tsv(Split::Training);
    let test = workload.split_tsv(Split::Testing);
    let converted = fixc_convert::convert(
        &workload.model_path(),
        train.exists().then_some(train.as_path()),
        test.exists().then_some(test.as_path()),
        &out,
        project.compile.max_scale_factor,
        word,
    )?;
    println!("{}", converted.header.display());
    for path in [converted.train_bin, converted.test_bin].into_iter().flatten() {
        println!("{}", path.display());
    }
    Ok(())
}

/// Accuracy of the tuned program on `split`, with the bound it used.
fn predict(
    project: &ProjectConfig,
    build: &BuildArgs,
    split: Split,
) -> miette::Result<CacheRecord> {
    let settings = settings(project, build)?;
    let loaded = load(project, &build.workload)?;
    let mode = settings.config.mode;
    let (scales, bound) = match mode {
        NumericMode::Real => (ScaleMap::new(), 0),
        NumericMode::Fixed => {
            let seed = seed_scales(&loaded, &settings, build.seed)?;
            let tuned = pipeline::tune(
                &loaded.workload,
                &loaded.source,
                &loaded.params,
                &settings,
                build.load_sf,
                seed,
            )?;
            (tuned.scales, tuned.bound)
        }
    };
    if settings.config.target != Target::Desktop {
        // Static check that the requested target still generates.
        pipeline::emit(
            &loaded.workload,
            &loaded.source,
            &loaded.params,
            &settings,
            &scales,
            bound,
        )?;
    }
    let report = pipeline::evaluate(
        &loaded.workload,
        &loaded.source,
        &loaded.params,
        &settings,
        mode,
        &scales,
        bound,
        split,
    )?;
    if report.overflows > 0 {
        warn!(overflows = report.overflows, "overflows on the evaluation split");
    }
    Ok(CacheRecord {
        accuracy: report.accuracy,
        sf: bound,
    })
}

fn run_sweep(project: &ProjectConfig, load_sf: bool, record: bool) -> miette::Result<()> {
    let plan = &project.sweep;
    if plan.algos.is_empty() || plan.datasets.is_empty() {
        return Err(miette::miette!(
            code = "fixc::sweep",
            help = "list algos and datasets under [sweep] in fixc.toml",
            "nothing to sweep"
        ));
    }
    let targets = if plan.targets.is_empty() {
        vec![project.compile.target]
    } else {
        plan.targets.clone()
    };
    let words = if plan.word_lengths.is_empty() {
        vec![project.compile.word_length]
    } else {
        plan.word_lengths.clone()
    };

    // float32 reference first, then one fixed kind per word length.
    let mut kinds = vec![(ModeArg::Real, project.compile.word_length)];
    kinds.extend(words.iter().map(|&word| (ModeArg::Fixed, word)));

    let mut cache = ResultCache::load(&project.paths.cache)?;
    let (mut total, mut failed) = (0usize, 0usize);
    for algo in &plan.algos {
        for dataset in &plan.datasets {
            for &(mode, word) in &kinds {
                let kind = NumericMode::from(mode).value_kind(word);
                let expected = cache.get(algo, kind, dataset).copied();
                for &target in &targets {
                    total += 1;
                    let label = format!("{algo} {dataset} {kind} {target}");
                    let build = BuildArgs {
                        workload: WorkloadArgs {
                            algo: algo.clone(),
                            dataset: dataset.clone(),
                        },
                        mode,
                        target: Some(match target {
                            Target::Desktop => TargetArg::Desktop,
                            Target::Microcontroller => TargetArg::Microcontroller,
                            Target::Fpga => TargetArg::Fpga,
                        }),
                        word_length: Some(word.bits()),
                        max_scale_factor: None,
                        load_sf: match mode {
                            ModeArg::Fixed if load_sf => expected.map(|r| r.sf),
                            _ => None,
                        },
                        workers: None,
                        debug_vars: Vec::new(),
                        seed: false,
                    };
                    match predict(project, &build, Split::Testing) {
                        Ok(measured) => {
                            let verdict = verify(expected.as_ref(), &measured);
                            if verdict.is_failure() {
                                failed += 1;
                            }
                            println!("{label}: {verdict}");
                            if record {
                                cache.record(algo, kind, dataset, measured);
                            }
                        }
                        Err(e) => {
                            failed += 1;
                            println!("{label}: ERROR");
                            eprintln!("{e:?}");
                        }
                    }
                }
            }
        }
    }
    if record {
        cache.save(&project.paths.cache)?;
        info!(path = %project.paths.cache.display(), "result cache updated");
    }
    if failed > 0 {
        return Err(miette::miette!("{failed} of {total} configurations failed"));
    }
    Ok(())
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let project = ProjectConfig::load(cli.config.as_deref())?;
    match cli.cmd {
        Cmd::Compile { build } => run_compile(&project, &build),
        Cmd::Convert {
            workload,
            word_length,
        } => run_convert(&project, &workload, word_length),
        Cmd::Predict { build, split } => {
            let measured = predict(&project, &build, split)?;
            println!("accuracy {:.6}%, scale {}", measured.accuracy, measured.sf);
            Ok(())
        }
        Cmd::Sweep { load_sf, record } => run_sweep(&project, load_sf, record),
    }
}
