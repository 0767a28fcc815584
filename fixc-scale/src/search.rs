#![forbid(unsafe_code)]

use std::collections::HashMap;

use fixc_ast::Program;
use fixc_backend_c::emit_module;
use fixc_convert::ModelParams;
use fixc_core::lower_program;
use fixc_ir::{CompileConfig, NumericMode, ScaleMap, ScaleOverflowError, Target};
use tracing::{debug, info, warn};

use crate::cache::ACCURACY_TOLERANCE;
use crate::error::SearchError;
use crate::profile::{ProfileLog, ProfileScales};
use crate::runner::{CandidateProgram, CandidateRunner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    Init,
    ProfileLoaded,
    CandidateBuild { bound: i32 },
    Execute { bound: i32 },
    Score { bound: i32 },
    Accept { bound: i32 },
    NextCandidate { bound: i32 },
    Done,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scored {
    pub bound: i32,
    pub scales: ScaleMap,
    pub accuracy: f64,
    pub overflows: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CandidateOutcome {
    Scored { accuracy: f64, overflows: u64 },
    Rejected(String),
}

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub best: Scored,
    /// Every bound tried, in order.
    pub trail: Vec<(i32, CandidateOutcome)>,
}

/// True when `candidate` should replace `incumbent`. Candidates arrive in
/// ascending bound order, so a tie goes to the newcomer unless it
/// overflowed.
pub fn prefer(candidate: &Scored, incumbent: &Scored) -> bool {
    let delta = candidate.accuracy - incumbent.accuracy;
    if delta.abs() < ACCURACY_TOLERANCE {
        candidate.bound > incumbent.bound && candidate.overflows == 0
    } else {
        delta > 0.0
    }
}

/// Bound search over `0..=search_limit`. Candidates are always scored as
/// single-variant desktop builds; the requested target only matters for
/// the final emission.
pub struct SearchEngine<'a, R> {
    program: &'a Program,
    params: &'a ModelParams,
    config: CompileConfig,
    seed: Option<ScaleMap>,
    runner: R,
    state: SearchState,
    memo: HashMap<(ScaleMap, String), CandidateOutcome>,
}

impl<'a, R: CandidateRunner> SearchEngine<'a, R> {
    pub fn new(program: &'a Program, params: &'a ModelParams, config: &CompileConfig, runner: R) -> Self {
        let config = CompileConfig {
            mode: NumericMode::Fixed,
            target: Target::Desktop,
            workers: 1,
            profile: false,
            ..config.clone()
        };
        Self {
            program,
            params,
            config,
            seed: None,
            runner,
            state: SearchState::Init,
            memo: HashMap::new(),
        }
    }

    /// Start from converter-supplied parameter scales.
    pub fn with_seed(mut self, seed: ScaleMap) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    fn transition(&mut self, next: SearchState) {
        debug!(from = ?self.state, to = ?next, "search state");
        self.state = next;
    }

    /// Runs the real-mode program with profiling enabled and returns the
    /// observed ranges.
    pub fn collect_profile(&mut self) -> Result<ProfileLog, SearchError> {
        let real = CompileConfig {
            mode: NumericMode::Real,
            profile: true,
            ..self.config.clone()
        };
        let ir = lower_program(self.program, &real, ScaleMap::new(), 0)?;
        let artifacts = emit_module(&ir, &real, self.params)?;
        let report = self.runner.run(&CandidateProgram {
            bound: None,
            scales: ScaleMap::new(),
            artifacts,
            profile: true,
        })?;
        let profile = report.profile.ok_or(SearchError::MissingProfile)?;
        info!(
            variables = profile.len(),
            accuracy = report.accuracy,
            "profiled real-mode run"
        );
        self.transition(SearchState::ProfileLoaded);
        Ok(profile)
    }

    /// The scale map tried at `bound`.
    pub fn scales_at(&self, profile: &ProfileLog, bound: i32) -> Result<ScaleMap, ScaleOverflowError> {
        let map = ScaleMap::from_profile(profile, self.params, bound, self.config.word_length)?;
        Ok(match &self.seed {
            Some(seed) => map.with_seed(seed, bound),
            None => map,
        })
    }

    fn build(&self, scales: &ScaleMap, bound: i32) -> Result<CandidateProgram, SearchError> {
        let ir = lower_program(self.program, &self.config, scales.clone(), bound)?;
        let artifacts = emit_module(&ir, &self.config, self.params)?;
        Ok(CandidateProgram {
            bound: Some(bound),
            scales: scales.clone(),
            artifacts,
            profile: false,
        })
    }

    fn evaluate(&mut self, scales: &ScaleMap, bound: i32) -> CandidateOutcome {
        let candidate = match self.build(scales, bound) {
            Ok(c) => c,
            Err(e) => return CandidateOutcome::Rejected(e.to_string()),
        };
        // Identical maps normally give identical code; keying on the module
        // text as well covers literals whose scale follows the bound.
        let key = (scales.clone(), candidate.artifacts.module_c());
        if let Some(seen) = self.memo.get(&key) {
            debug!(bound, "identical candidate already scored");
            return seen.clone();
        }
        self.transition(SearchState::Execute { bound });
        let outcome = match self.runner.run(&candidate) {
            Ok(report) => {
                self.transition(SearchState::Score { bound });
                CandidateOutcome::Scored {
                    accuracy: report.accuracy,
                    overflows: report.overflows,
                }
            }
            Err(e) => CandidateOutcome::Rejected(e.to_string()),
        };
        self.memo.insert(key, outcome.clone());
        outcome
    }

    pub fn search(&mut self, profile: &ProfileLog) -> Result<SearchOutcome, SearchError> {
        if self.state == SearchState::Init {
            self.transition(SearchState::ProfileLoaded);
        }
        let limit = self.config.search_limit();
        let mut best: Option<Scored> = None;
        let mut trail = Vec::new();

        for bound in 0..=limit {
            self.transition(SearchState::CandidateBuild { bound });
            let outcome = match self.scales_at(profile, bound) {
                Ok(scales) => {
                    let outcome = self.evaluate(&scales, bound);
                    if let CandidateOutcome::Scored {
                        accuracy,
                        overflows,
                    } = outcome
                    {
                        let scored = Scored {
                            bound,
                            scales,
                            accuracy,
                            overflows,
                        };
                        debug!(bound, accuracy, overflows, "candidate scored");
                        if best.as_ref().is_none_or(|b| prefer(&scored, b)) {
                            info!(bound, accuracy, overflows, "accepted candidate");
                            self.transition(SearchState::Accept { bound });
                            best = Some(scored);
                        } else {
                            self.transition(SearchState::NextCandidate { bound });
                        }
                    }
                    outcome
                }
                Err(e) => CandidateOutcome::Rejected(e.to_string()),
            };
            if let CandidateOutcome::Rejected(reason) = &outcome {
                warn!(bound, %reason, "candidate rejected");
                self.transition(SearchState::NextCandidate { bound });
            }
            trail.push((bound, outcome));
        }

        self.transition(SearchState::Done);
        let best = best.ok_or(SearchError::AllCandidatesRejected { tried: trail.len() })?;
        info!(
            bound = best.bound,
            accuracy = best.accuracy,
            "search finished"
        );
        Ok(SearchOutcome { best, trail })
    }

    /// Scores only `bound`, as recorded by an earlier search. Failures are
    /// errors rather than rejections.
    pub fn replay(&mut self, profile: &ProfileLog, bound: i32) -> Result<Scored, SearchError> {
        self.transition(SearchState::CandidateBuild { bound });
        let scales = self.scales_at(profile, bound)?;
        let candidate = self.build(&scales, bound)?;
        self.transition(SearchState::Execute { bound });
        let report = self.runner.run(&candidate)?;
        self.transition(SearchState::Score { bound });
        self.transition(SearchState::Done);
        Ok(Scored {
            bound,
            scales,
            accuracy: report.accuracy,
            overflows: report.overflows,
        })
    }
}
