#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::scale::WordLength;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericMode {
    Real,
    Fixed,
}

impl NumericMode {
    pub fn name(self) -> &'static str {
        match self {
            NumericMode::Real => "real",
            NumericMode::Fixed => "fixed",
        }
    }

    /// Result-cache key: `float32` for real mode, `int<W>` for fixed.
    pub fn value_kind(self, word: WordLength) -> &'static str {
        match self {
            NumericMode::Real => "float32",
            NumericMode::Fixed => word.kind_name(),
        }
    }
}

impl fmt::Display for NumericMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" | "float" => Ok(NumericMode::Real),
            "fixed" => Ok(NumericMode::Fixed),
            other => Err(ConfigurationError {
                message: format!("unknown mode '{other}'; expected real or fixed"),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Desktop,
    Microcontroller,
    Fpga,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::Desktop => "desktop",
            Target::Microcontroller => "microcontroller",
            Target::Fpga => "fpga",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" | "x86" => Ok(Target::Desktop),
            "microcontroller" | "arduino" => Ok(Target::Microcontroller),
            "fpga" => Ok(Target::Fpga),
            other => Err(ConfigurationError {
                message: format!("unknown target '{other}'; expected desktop, microcontroller or fpga"),
            }),
        }
    }
}

/// Everything a compilation needs, passed explicitly through every stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileConfig {
    pub word_length: WordLength,
    pub target: Target,
    pub mode: NumericMode,
    /// Upper limit for the search bound.
    pub max_scale: i32,
    /// Number of FPGA variants rendered into one translation unit.
    pub workers: usize,
    /// Emit profiling updates (real mode only).
    pub profile: bool,
    /// Variables materialized as reals alongside their fixed values.
    pub debug_vars: BTreeSet<String>,
    /// Clamp on overflow instead of wrapping.
    pub saturate: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            word_length: WordLength::W16,
            target: Target::Desktop,
            mode: NumericMode::Fixed,
            max_scale: 15,
            workers: 1,
            profile: false,
            debug_vars: BTreeSet::new(),
            saturate: false,
        }
    }
}

impl CompileConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.workers == 0 {
            return Err(ConfigurationError {
                message: "workers must be at least 1".to_string(),
            });
        }
        if self.workers > 1 && (self.target != Target::Fpga || self.mode != NumericMode::Fixed) {
            return Err(ConfigurationError {
                message: format!(
                    "workers = {} is only supported for fixed-point FPGA builds (got {} {})",
                    self.workers, self.mode, self.target
                ),
            });
        }
        if self.profile && self.mode != NumericMode::Real {
            return Err(ConfigurationError {
                message: "profiling instrumentation requires real mode".to_string(),
            });
        }
        if self.max_scale < 0 {
            return Err(ConfigurationError {
                message: format!("max scale factor must be non-negative, got {}", self.max_scale),
            });
        }
        Ok(())
    }

    /// Largest bound the search will try: `min(max_scale, W - 1)`.
    pub fn search_limit(&self) -> i32 {
        self.max_scale.min(self.word_length.bits() as i32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CompileConfig::default().validate().is_ok());
    }

    #[test]
    fn workers_require_fixed_fpga() {
        let cfg = CompileConfig {
            workers: 4,
            ..CompileConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.message.contains("FPGA"));

        let cfg = CompileConfig {
            workers: 4,
            target: Target::Fpga,
            ..CompileConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn profiling_requires_real_mode() {
        let cfg = CompileConfig {
            profile: true,
            ..CompileConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn search_limit_respects_word_length() {
        let cfg = CompileConfig {
            word_length: WordLength::W8,
            max_scale: 15,
            ..CompileConfig::default()
        };
        assert_eq!(cfg.search_limit(), 7);
    }

    #[test]
    fn unknown_target_name_is_rejected() {
        assert!("gpu".parse::<Target>().is_err());
        assert_eq!("arduino".parse::<Target>(), Ok(Target::Microcontroller));
    }

    #[test]
    fn value_kind_names_the_cached_number_format() {
        assert_eq!(NumericMode::Real.value_kind(WordLength::W16), "float32");
        assert_eq!(NumericMode::Fixed.value_kind(WordLength::W8), "int8");
        assert_eq!(NumericMode::Fixed.value_kind(WordLength::W32), "int32");
    }
}
