#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AccuracyRegressionError, CacheError};

/// Accuracies closer than this are equal.
pub const ACCURACY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub accuracy: f64,
    pub sf: i32,
}

/// Known-good results: algorithm, then value kind (`float32`, `int8`,
/// `int16`, `int32`), then dataset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCache(BTreeMap<String, BTreeMap<String, BTreeMap<String, CacheRecord>>>);

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(CacheError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        serde_json::from_str(&text).map_err(|e| CacheError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let err = |message: String| CacheError {
            path: path.to_path_buf(),
            message,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| err(e.to_string()))?;
        std::fs::write(path, json + "\n").map_err(|e| err(e.to_string()))
    }

    pub fn get(&self, algo: &str, kind: &str, dataset: &str) -> Option<&CacheRecord> {
        self.0.get(algo)?.get(kind)?.get(dataset)
    }

    pub fn record(&mut self, algo: &str, kind: &str, dataset: &str, record: CacheRecord) {
        self.0
            .entry(algo.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .insert(dataset.to_string(), record);
    }
}

/// Outcome of comparing a run against the cache.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Pass,
    /// Nothing recorded for this configuration yet.
    New(CacheRecord),
    Fail(AccuracyRegressionError),
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Fail(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::New(r) => write!(f, "NEW: accuracy {:.6}%, scale {}", r.accuracy, r.sf),
            Verdict::Fail(e) => write!(f, "{e}"),
        }
    }
}

/// Accuracy is compared first; the scale only matters once accuracy
/// agrees.
pub fn verify(expected: Option<&CacheRecord>, measured: &CacheRecord) -> Verdict {
    let Some(expected) = expected else {
        return Verdict::New(*measured);
    };
    if (expected.accuracy - measured.accuracy).abs() >= ACCURACY_TOLERANCE {
        return Verdict::Fail(AccuracyRegressionError::Accuracy {
            expected: expected.accuracy,
            measured: measured.accuracy,
        });
    }
    if expected.sf != measured.sf {
        return Verdict::Fail(AccuracyRegressionError::Scale {
            expected: expected.sf,
            measured: measured.sf,
        });
    }
    Verdict::Pass
}
