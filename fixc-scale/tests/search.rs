use fixc_ast::Program;
use fixc_convert::{initial_scales, ModelParams};
use fixc_ir::{CompileConfig, WordLength};
use fixc_scale::{
    CandidateError, CandidateOutcome, CandidateProgram, CandidateRunner, ProfileLog, RunReport,
    SearchEngine, SearchError, SearchState,
};
use proptest::prelude::*;

const LINEAR: &str = "input X[16][1]; param Z[4][16]; param W[2][4];\n\
                      let xp = Z * X; let s = W * xp; return argmax(s);";

type Score = Box<dyn Fn(&CandidateProgram) -> Result<(f64, u64), String>>;

struct FakeRunner {
    profile: ProfileLog,
    score: Score,
    runs: Vec<Option<i32>>,
}

impl FakeRunner {
    fn new(score: impl Fn(&CandidateProgram) -> Result<(f64, u64), String> + 'static) -> Self {
        Self {
            profile: linear_profile(),
            score: Box::new(score),
            runs: Vec::new(),
        }
    }

    fn by_bound(score: impl Fn(i32) -> Result<(f64, u64), String> + 'static) -> Self {
        Self::new(move |c| score(c.bound.unwrap_or(-1)))
    }
}

impl CandidateRunner for FakeRunner {
    fn run(&mut self, candidate: &CandidateProgram) -> Result<RunReport, CandidateError> {
        self.runs.push(candidate.bound);
        if candidate.profile {
            return Ok(RunReport {
                accuracy: 100.0,
                overflows: 0,
                profile: Some(self.profile.clone()),
            });
        }
        let (accuracy, overflows) =
            (self.score)(candidate).map_err(|message| CandidateError::Output { message })?;
        Ok(RunReport {
            accuracy,
            overflows,
            profile: None,
        })
    }
}

fn program() -> Program {
    fixc_parse::parse_source(LINEAR).expect("parse")
}

fn params() -> ModelParams {
    let mut params = ModelParams::new();
    params.insert("Z", vec![4, 16], vec![0.5; 64]);
    params.insert("W", vec![2, 4], vec![-0.25; 8]);
    params
}

fn linear_profile() -> ProfileLog {
    ProfileLog::parse("# fixc profile\nX -8 8\nxp -4 3.5\ns -20 19\n", "profile").unwrap()
}

#[test]
fn search_keeps_the_most_accurate_bound() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|b| Ok((if b == 9 { 91.2 } else { 80.0 + b as f64 / 10.0 }, 0)));
    let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
    let outcome = engine.search(&linear_profile()).unwrap();
    assert_eq!(outcome.best.bound, 9);
    assert_eq!(outcome.best.accuracy, 91.2);
    assert_eq!(outcome.trail.len(), 16);
    assert_eq!(engine.state(), SearchState::Done);
}

#[test]
fn ties_prefer_larger_bound_until_it_overflows() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|b| match b {
        0..=4 => Ok((50.0, 0)),
        5..=11 => Ok((90.0, 0)),
        _ => Ok((90.0, 3)),
    });
    let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
    let best = engine.search(&linear_profile()).unwrap().best;
    assert_eq!(best.bound, 11);
    assert_eq!(best.overflows, 0);
}

#[test]
fn failing_candidates_are_skipped() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|b| {
        if b % 2 == 0 {
            Err(format!("bound {b} crashed"))
        } else {
            Ok((b as f64, 0))
        }
    });
    let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
    let outcome = engine.search(&linear_profile()).unwrap();
    assert_eq!(outcome.best.bound, 15);
    let rejected = outcome
        .trail
        .iter()
        .filter(|(_, o)| matches!(o, CandidateOutcome::Rejected(_)))
        .count();
    assert_eq!(rejected, 8);
}

#[test]
fn search_fails_only_when_every_candidate_fails() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|_| Err("no".to_string()));
    let config = CompileConfig {
        max_scale: 5,
        ..CompileConfig::default()
    };
    let mut engine = SearchEngine::new(&program, &params, &config, runner);
    let err = engine.search(&linear_profile()).unwrap_err();
    assert!(matches!(err, SearchError::AllCandidatesRejected { tried: 6 }));
}

#[test]
fn search_limit_respects_word_length() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|b| Ok((b as f64, 0)));
    let config = CompileConfig {
        word_length: WordLength::W8,
        ..CompileConfig::default()
    };
    let mut engine = SearchEngine::new(&program, &params, &config, runner);
    // X at 8.0 needs scale 3 in 8 bits; the search still tries 0..=7.
    let outcome = engine.search(&linear_profile()).unwrap();
    assert_eq!(outcome.trail.len(), 8);
}

#[test]
fn profiling_run_returns_observed_ranges() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|_| Ok((0.0, 0)));
    let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
    let profile = engine.collect_profile().unwrap();
    assert_eq!(profile.observed_max("s"), Some(20.0));
    assert_eq!(engine.state(), SearchState::ProfileLoaded);
    assert_eq!(engine.runner().runs, vec![None]);
}

#[test]
fn identical_scale_maps_run_once() {
    let (program, params) = (program(), params());
    // Every magnitude exceeds the word, so no scale depends on the bound.
    let profile = ProfileLog::parse(
        "X 0 40000\nxp 0 40000\ns 0 40000\nZ 0 40000\nW 0 40000\n",
        "profile",
    )
    .unwrap();
    let runner = FakeRunner::by_bound(|_| Ok((75.0, 0)));
    let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
    let outcome = engine.search(&profile).unwrap();
    assert_eq!(engine.runner().runs.len(), 1);
    assert_eq!(outcome.trail.len(), 16);
    assert_eq!(outcome.best.bound, 15);
}

#[test]
fn seeded_search_matches_search_from_scratch() {
    let (program, params) = (program(), params());
    let config = CompileConfig::default();
    let score = |c: &CandidateProgram| -> Result<(f64, u64), String> {
        let total: i32 = c.scales.iter().map(|(_, s)| (s - 9).abs()).sum();
        Ok((100.0 - total as f64, 0))
    };

    let mut scratch = SearchEngine::new(&program, &params, &config, FakeRunner::new(score));
    let seed = initial_scales(&params, config.max_scale, config.word_length).unwrap();
    let mut seeded =
        SearchEngine::new(&program, &params, &config, FakeRunner::new(score)).with_seed(seed);

    let profile = linear_profile();
    for bound in [0, 9, 15] {
        assert_eq!(
            scratch.scales_at(&profile, bound).unwrap(),
            seeded.scales_at(&profile, bound).unwrap()
        );
    }
    let a = scratch.search(&profile).unwrap().best;
    let b = seeded.search(&profile).unwrap().best;
    assert!((a.accuracy - b.accuracy).abs() < 1e-9);
    assert_eq!(a.bound, b.bound);
}

#[test]
fn replay_scores_only_the_recorded_bound() {
    let (program, params) = (program(), params());
    let runner = FakeRunner::by_bound(|b| Ok((if b == 9 { 91.2 } else { 0.0 }, 0)));
    let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
    let scored = engine.replay(&linear_profile(), 9).unwrap();
    assert_eq!(scored.accuracy, 91.2);
    assert_eq!(scored.scales.get("X"), Some(9));
    assert_eq!(engine.runner().runs, vec![Some(9)]);
}

proptest! {
    #[test]
    fn chosen_bound_has_maximal_accuracy(
        accs in proptest::collection::vec(0u32..100, 16),
        overflow in proptest::collection::vec(any::<bool>(), 16),
    ) {
        let (program, params) = (program(), params());
        let table: Vec<(f64, u64)> = accs
            .iter()
            .zip(&overflow)
            .map(|(a, o)| (*a as f64, u64::from(*o)))
            .collect();
        let expected_max = table.iter().map(|(a, _)| *a).fold(f64::MIN, f64::max);
        let lookup = table.clone();
        let runner = FakeRunner::by_bound(move |b| Ok(lookup[b as usize]));
        let mut engine = SearchEngine::new(&program, &params, &CompileConfig::default(), runner);
        let best = engine.search(&linear_profile()).unwrap().best;
        prop_assert_eq!(best.accuracy, expected_max);
        prop_assert_eq!(table[best.bound as usize].0, expected_max);
    }
}
