use std::path::Path;
use std::process::Command;
use std::time::Duration;

use fixc_backend_c::{emit_module, write_artifacts, RetryPolicy};
use fixc_convert::{Dataset, ModelParams};
use fixc_core::lower_program;
use fixc_ir::{CompileConfig, ScaleMap};
use fixc_scale::{find_c_compiler, CandidateOutcome, ProfileLog, SearchEngine, ToolchainRunner};

const LINEAR: &str = "input X[3][1]; param W[2][3]; param b[2][1];\n\
                      let s = W * X + b; return argmax(s);";

const OFFSET: &str = "input X[1]; param b[1]; return X + b;";

/// `None` when no compiler is installed; `FIXC_REQUIRE_CC=1` turns that
/// into a failure.
fn compiler() -> Option<String> {
    let cc = find_c_compiler();
    if cc.is_none() && std::env::var("FIXC_REQUIRE_CC").ok().as_deref() == Some("1") {
        panic!("FIXC_REQUIRE_CC=1 but no C compiler found");
    }
    cc
}

fn write_dataset(path: &Path, labels: Vec<i32>, rows: Vec<Vec<f32>>) {
    let ds = Dataset {
        cols: rows[0].len(),
        labels,
        rows,
    };
    ds.write_binary(path).unwrap();
}

fn linear_params() -> ModelParams {
    let mut params = ModelParams::new();
    params.insert("W", vec![2, 3], vec![0.5, -0.25, 1.0, -1.0, 0.75, 0.125]);
    params.insert("b", vec![2, 1], vec![0.1, -0.1]);
    params
}

fn offset_params() -> ModelParams {
    let mut params = ModelParams::new();
    params.insert("b", vec![1], vec![100000.0]);
    params
}

fn search(src: &str, params: &ModelParams, data: &Path) -> (ProfileLog, fixc_scale::SearchOutcome) {
    let program = fixc_parse::parse_source(src).unwrap();
    let runner = ToolchainRunner::new(data, Duration::from_secs(60)).unwrap();
    let mut engine = SearchEngine::new(&program, params, &CompileConfig::default(), runner);
    let profile = engine.collect_profile().unwrap();
    let outcome = engine.search(&profile).unwrap();
    (profile, outcome)
}

fn assert_no_overflows(outcome: &fixc_scale::SearchOutcome) {
    for (bound, result) in &outcome.trail {
        match result {
            CandidateOutcome::Scored { overflows, .. } => {
                assert_eq!(*overflows, 0, "bound {bound} overflowed on profiled rows")
            }
            CandidateOutcome::Rejected(why) => panic!("bound {bound} rejected: {why}"),
        }
    }
}

#[test]
fn linear_search_is_exact_and_overflow_free() {
    if compiler().is_none() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("train.bin");
    write_dataset(
        &data,
        vec![0, 1],
        vec![vec![1.0, 0.5, 2.0], vec![-1.0, 2.0, 0.0]],
    );

    let (profile, outcome) = search(LINEAR, &linear_params(), &data);
    assert!(profile.contains("X"));
    assert!(profile.contains("s"));
    assert_no_overflows(&outcome);
    assert_eq!(outcome.best.accuracy, 100.0);
    assert_eq!(outcome.best.overflows, 0);
}

#[test]
fn addition_across_distant_scales_stays_overflow_free() {
    if compiler().is_none() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("train.bin");
    write_dataset(&data, vec![0, 0], vec![vec![0.5], vec![0.25]]);

    let (_, outcome) = search(OFFSET, &offset_params(), &data);
    assert_no_overflows(&outcome);
    let best = &outcome.best;
    assert_eq!(best.scales.get("X"), Some(15i32.min(best.bound)));
    assert_eq!(best.scales.get("b"), Some(-2));
}

#[test]
fn addition_across_distant_scales_prints_the_right_sum() {
    let Some(cc) = compiler() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("train.bin");
    write_dataset(&data, vec![0], vec![vec![0.5]]);

    // The scales profiling yields for X in [0.25, 0.5] and b = 100000.
    let scales: ScaleMap = [("X", 15), ("b", -2), ("tmp1", -2)]
        .into_iter()
        .map(|(n, s)| (n.to_string(), s))
        .collect();
    let config = CompileConfig::default();
    let program = fixc_parse::parse_source(OFFSET).unwrap();
    let ir = lower_program(&program, &config, scales, 15).unwrap();
    let artifacts = emit_module(&ir, &config, &offset_params()).unwrap();
    write_artifacts(&artifacts, dir.path(), RetryPolicy::default()).unwrap();

    let built = Command::new(&cc)
        .current_dir(dir.path())
        .args(["-O2", "-std=c99", "-I."])
        .args(artifacts.harness_sources())
        .args(["-o", "harness", "-lm"])
        .output()
        .unwrap();
    assert!(built.status.success(), "{}", String::from_utf8_lossy(&built.stderr));

    let run = Command::new(dir.path().join("harness"))
        .current_dir(dir.path())
        .arg(&data)
        .output()
        .unwrap();
    assert!(run.status.success());
    let stdout = String::from_utf8_lossy(&run.stdout);
    let printed: Vec<f64> = stdout.lines().filter_map(|l| l.trim().parse().ok()).collect();
    assert_eq!(printed.len(), 1, "{stdout}");
    // One unit at scale -2 is 4.0.
    assert!((printed[0] - 100000.5).abs() <= 4.0, "{stdout}");
    assert!(stdout.contains("overflows 0"), "{stdout}");
}
