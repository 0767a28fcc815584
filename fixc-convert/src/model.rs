#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// One trained parameter tensor, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl ParamTensor {
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }
}

/// Named parameter tensors of one trained model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelParams {
    params: BTreeMap<String, ParamTensor>,
}

impl ModelParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, values: Vec<f64>) {
        self.params
            .insert(name.into(), ParamTensor { shape, values });
    }

    pub fn get(&self, name: &str) -> Option<&ParamTensor> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamTensor)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Reads `.json` (`{"Z": {"shape": [..], "values": [..]}}`) or the
    /// plain text format understood by [`ModelParams::parse`].
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let text = fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            let params: Self = serde_json::from_str(&text).map_err(|e| ConvertError::Parse {
                what: path.display().to_string(),
                line: e.line(),
                message: e.to_string(),
            })?;
            params.validate(&path.display().to_string())?;
            return Ok(params);
        }
        Self::parse(&text, &path.display().to_string())
    }

    /// Text format: a header line `name d0 d1 ...` followed by the
    /// row-major values, whitespace separated, over any number of lines.
    /// `#` starts a comment.
    pub fn parse(text: &str, what: &str) -> Result<Self, ConvertError> {
        let mut params = Self::new();
        let mut current: Option<(String, Vec<usize>, Vec<f64>, usize)> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(first) = fields.next() else {
                continue;
            };

            // `nan` and `inf` read as numbers, not as parameter names.
            let starts_header = first.parse::<f64>().is_err()
                && first
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
            if starts_header {
                if let Some((name, shape, values, at)) = current.take() {
                    params.finish_tensor(what, name, shape, values, at)?;
                }
                let shape = fields
                    .map(|d| {
                        d.parse::<usize>().map_err(|_| ConvertError::Parse {
                            what: what.to_string(),
                            line: lineno + 1,
                            message: format!("bad dimension '{d}' for '{first}'"),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                current = Some((first.to_string(), shape, Vec::new(), lineno + 1));
                continue;
            }

            let Some((_, _, values, _)) = current.as_mut() else {
                return Err(ConvertError::Parse {
                    what: what.to_string(),
                    line: lineno + 1,
                    message: "values before any parameter header".to_string(),
                });
            };
            for field in std::iter::once(first).chain(fields) {
                let v = field.parse::<f64>().map_err(|_| ConvertError::Parse {
                    what: what.to_string(),
                    line: lineno + 1,
                    message: format!("bad number '{field}'"),
                })?;
                if !v.is_finite() {
                    return Err(ConvertError::Parse {
                        what: what.to_string(),
                        line: lineno + 1,
                        message: format!("non-finite value '{field}'"),
                    });
                }
                values.push(v);
            }
        }

        if let Some((name, shape, values, at)) = current.take() {
            params.finish_tensor(what, name, shape, values, at)?;
        }
        Ok(params)
    }

    fn finish_tensor(
        &mut self,
        what: &str,
        name: String,
        shape: Vec<usize>,
        values: Vec<f64>,
        line: usize,
    ) -> Result<(), ConvertError> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(ConvertError::Parse {
                what: what.to_string(),
                line,
                message: format!(
                    "'{name}' declares {expected} values but {} were given",
                    values.len()
                ),
            });
        }
        if self.params.contains_key(&name) {
            return Err(ConvertError::Parse {
                what: what.to_string(),
                line,
                message: format!("'{name}' is defined twice"),
            });
        }
        self.insert(name, shape, values);
        Ok(())
    }

    fn validate(&self, what: &str) -> Result<(), ConvertError> {
        for (name, p) in &self.params {
            let expected: usize = p.shape.iter().product();
            if p.values.len() != expected {
                return Err(ConvertError::Parse {
                    what: what.to_string(),
                    line: 0,
                    message: format!(
                        "'{name}' declares {expected} values but {} were given",
                        p.values.len()
                    ),
                });
            }
        }
        Ok(())
    }
}
