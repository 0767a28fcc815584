#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;

use fixc_convert::ModelParams;
use fixc_ir::{ScaleMap, ScaleOverflowError, WordLength};

use crate::error::ProfileError;

/// Observed `[lo, hi]` range per variable from a real-mode run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileLog {
    ranges: BTreeMap<String, (f64, f64)>,
}

impl ProfileLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of `name lo hi`. Blank lines and `#` comments are skipped; a
    /// repeated name widens the earlier range.
    pub fn parse(text: &str, what: &str) -> Result<Self, ProfileError> {
        let mut log = Self::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |message: String| ProfileError {
                what: what.to_string(),
                line: i + 1,
                message,
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [name, lo, hi] = fields.as_slice() else {
                return Err(err(format!(
                    "expected 'name lo hi', found {} fields",
                    fields.len()
                )));
            };
            let lo: f64 = lo
                .parse()
                .map_err(|_| err(format!("invalid lower bound '{lo}'")))?;
            let hi: f64 = hi
                .parse()
                .map_err(|_| err(format!("invalid upper bound '{hi}'")))?;
            log.record(name, lo, hi);
        }
        Ok(log)
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|e| ProfileError {
            what: path.display().to_string(),
            line: 0,
            message: e.to_string(),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn record(&mut self, name: &str, lo: f64, hi: f64) {
        self.ranges
            .entry(name.to_string())
            .and_modify(|(l, h)| {
                *l = l.min(lo);
                *h = h.max(hi);
            })
            .or_insert((lo, hi));
    }

    pub fn range(&self, name: &str) -> Option<(f64, f64)> {
        self.ranges.get(name).copied()
    }

    /// `max(|lo|, |hi|)`. A variable that was never written reports
    /// infinite bounds and therefore no constraint.
    pub fn observed_max(&self, name: &str) -> Option<f64> {
        self.range(name).map(|(lo, hi)| lo.abs().max(hi.abs()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ranges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, f64)> {
        self.ranges.iter().map(|(n, (lo, hi))| (n.as_str(), *lo, *hi))
    }
}

/// Building scale maps from profiling data.
pub trait ProfileScales: Sized {
    /// One scale per profiled variable, plus one per model parameter the
    /// profile does not mention (from the parameter's largest magnitude).
    fn from_profile(
        profile: &ProfileLog,
        params: &ModelParams,
        bound: i32,
        word: WordLength,
    ) -> Result<Self, ScaleOverflowError>;

    /// Replaces entries with precomputed seed scales, capped at `bound`.
    fn with_seed(self, seed: &ScaleMap, bound: i32) -> Self;
}

impl ProfileScales for ScaleMap {
    fn from_profile(
        profile: &ProfileLog,
        params: &ModelParams,
        bound: i32,
        word: WordLength,
    ) -> Result<Self, ScaleOverflowError> {
        let mut map = ScaleMap::new();
        for (name, lo, hi) in profile.iter() {
            map.insert_observed(name, lo.abs().max(hi.abs()), bound, word)?;
        }
        for (name, tensor) in params.iter() {
            if !profile.contains(name) {
                map.insert_observed(name, tensor.max_abs(), bound, word)?;
            }
        }
        Ok(map)
    }

    fn with_seed(mut self, seed: &ScaleMap, bound: i32) -> Self {
        for (name, scale) in seed.iter() {
            self.insert(name, scale.min(bound));
        }
        self
    }
}
