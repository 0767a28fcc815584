#![forbid(unsafe_code)]

//! Model and dataset conversion: trained parameters in, quantized tables
//! and harness-ready binaries out.

mod dataset;
mod error;
mod header;
mod model;
mod quantize;

use std::fs;
use std::path::{Path, PathBuf};

use fixc_ir::{ScaleMap, WordLength};
use tracing::info;

pub use dataset::Dataset;
pub use error::ConvertError;
pub use header::{format_initializer, write_fixed_header};
pub use model::{ModelParams, ParamTensor};
pub use quantize::{initial_scales, quantize};

/// Everything `convert` produces for one model and dataset pair.
#[derive(Clone, Debug)]
pub struct Converted {
    pub params: ModelParams,
    pub scales: ScaleMap,
    pub train_bin: Option<PathBuf>,
    pub test_bin: Option<PathBuf>,
    pub header: PathBuf,
}

/// Loads the model, computes seed scales, writes dataset binaries and the
/// quantized header into `out_dir`.
pub fn convert(
    model: &Path,
    train: Option<&Path>,
    test: Option<&Path>,
    out_dir: &Path,
    bound: i32,
    word: WordLength,
) -> Result<Converted, ConvertError> {
    fs::create_dir_all(out_dir).map_err(|e| ConvertError::io(out_dir, e))?;

    let params = ModelParams::load(model)?;
    let scales = initial_scales(&params, bound, word)?;
    info!(params = params.len(), bound, bits = word.bits(), "loaded model");

    let write_split = |src: Option<&Path>, name: &str| -> Result<Option<PathBuf>, ConvertError> {
        let Some(src) = src else {
            return Ok(None);
        };
        let ds = Dataset::load_tsv(src)?;
        let dst = out_dir.join(name);
        ds.write_binary(&dst)?;
        info!(rows = ds.len(), cols = ds.cols, path = %dst.display(), "wrote dataset");
        Ok(Some(dst))
    };
    let train_bin = write_split(train, "train.bin")?;
    let test_bin = write_split(test, "test.bin")?;

    let header = out_dir.join("model_fixed.h");
    let text = write_fixed_header(&params, &scales, word)?;
    fs::write(&header, text).map_err(|e| ConvertError::io(&header, e))?;

    let seeds = out_dir.join("scales.json");
    let json = serde_json::to_string_pretty(&scales).map_err(|e| ConvertError::Parse {
        what: seeds.display().to_string(),
        line: 0,
        message: e.to_string(),
    })?;
    fs::write(&seeds, json).map_err(|e| ConvertError::io(&seeds, e))?;

    Ok(Converted {
        params,
        scales,
        train_bin,
        test_bin,
        header,
    })
}
