#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use crate::error::ConvertError;

/// Labelled feature rows. Binary layout (little endian): `u32 rows`,
/// `u32 cols`, then per row `i32 label` followed by `cols` `f32` values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    pub cols: usize,
    pub labels: Vec<i32>,
    pub rows: Vec<Vec<f32>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tab (or comma) separated, label first. Blank lines are skipped.
    pub fn from_tsv(text: &str, what: &str) -> Result<Self, ConvertError> {
        let mut ds = Dataset::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parse_err = |message: String| ConvertError::Parse {
                what: what.to_string(),
                line: lineno + 1,
                message,
            };
            let mut fields = line
                .split(|c: char| c == '\t' || c == ',')
                .map(str::trim)
                .filter(|f| !f.is_empty());

            let label_field = fields
                .next()
                .ok_or_else(|| parse_err("missing label".to_string()))?;
            let label = parse_label(label_field)
                .ok_or_else(|| parse_err(format!("bad label '{label_field}'")))?;

            let row = fields
                .map(|f| {
                    f.parse::<f32>()
                        .map_err(|_| parse_err(format!("bad feature '{f}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;

            if ds.rows.is_empty() {
                ds.cols = row.len();
            } else if row.len() != ds.cols {
                return Err(parse_err(format!(
                    "expected {} features, found {}",
                    ds.cols,
                    row.len()
                )));
            }
            ds.labels.push(label);
            ds.rows.push(row);
        }
        Ok(ds)
    }

    pub fn load_tsv(path: &Path) -> Result<Self, ConvertError> {
        let text = fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        Self::from_tsv(&text, &path.display().to_string())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.rows.len() * (4 + 4 * self.cols));
        out.extend_from_slice(&(self.rows.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.cols as u32).to_le_bytes());
        for (label, row) in self.labels.iter().zip(&self.rows) {
            out.extend_from_slice(&label.to_le_bytes());
            for v in row {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConvertError> {
        let mut cursor = bytes;
        let rows = take_u32(&mut cursor)? as usize;
        let cols = take_u32(&mut cursor)? as usize;
        let expected = rows * (4 + 4 * cols);
        if cursor.len() != expected {
            return Err(ConvertError::Layout {
                message: format!(
                    "{rows} rows of {cols} features need {expected} bytes, found {}",
                    cursor.len()
                ),
            });
        }
        let mut ds = Dataset {
            cols,
            labels: Vec::with_capacity(rows),
            rows: Vec::with_capacity(rows),
        };
        for _ in 0..rows {
            ds.labels.push(take_u32(&mut cursor)? as i32);
            let row = (0..cols)
                .map(|_| take_u32(&mut cursor).map(f32::from_bits))
                .collect::<Result<Vec<_>, _>>()?;
            ds.rows.push(row);
        }
        Ok(ds)
    }

    pub fn write_binary(&self, path: &Path) -> Result<(), ConvertError> {
        fs::write(path, self.to_bytes()).map_err(|e| ConvertError::io(path, e))
    }

    pub fn read_binary(path: &Path) -> Result<Self, ConvertError> {
        let bytes = fs::read(path).map_err(|e| ConvertError::io(path, e))?;
        Self::from_bytes(&bytes)
    }
}

/// Labels are integers; `3.0` style floats from exported tables are accepted.
fn parse_label(field: &str) -> Option<i32> {
    if let Ok(v) = field.parse::<i32>() {
        return Some(v);
    }
    let v = field.parse::<f64>().ok()?;
    (v.fract() == 0.0 && v.abs() <= i32::MAX as f64).then_some(v as i32)
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32, ConvertError> {
    let Some((head, rest)) = cursor.split_first_chunk::<4>() else {
        return Err(ConvertError::Layout {
            message: "truncated input".to_string(),
        });
    };
    *cursor = rest;
    Ok(u32::from_le_bytes(*head))
}
