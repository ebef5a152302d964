//! Build-time configuration.

use std::path::{Path, PathBuf};

use crate::error::BrzError;
use crate::hash::HashKind;

/// Default base seed for reproducible builds.
const DEFAULT_SEED: u64 = 0xb12_7a55_ed5e_ed01;

/// Configuration for [`BrzBuilder`](crate::BrzBuilder).
///
/// Setters chain, so a customized build reads like:
///
/// ```
/// use brz_mph::{BrzConfig, HashKind};
///
/// let config = BrzConfig::new()
///     .memory_availability(64)
///     .load_factor(1.0)
///     .hashfuncs([HashKind::Jenkins; 3])
///     .seed(42);
/// ```
#[derive(Debug, Clone)]
pub struct BrzConfig {
    /// Hash kinds for the three roles: per-bucket h1, per-bucket h2, and the
    /// global partition hash h3.
    pub hashfuncs: [HashKind; 3],
    /// Construction RAM budget in MiB.
    pub memory_availability: u32,
    /// Directory that receives the builder's scoped temporary directory.
    pub tmp_dir: PathBuf,
    /// Vertices-per-key load factor of the per-bucket graphs.
    pub c: f32,
    /// Emit per-stage progress at `info` level.
    pub verbosity: bool,
    /// Base seed for every hash seed drawn during construction.
    pub seed: u64,
}

impl Default for BrzConfig {
    fn default() -> Self {
        Self {
            hashfuncs: [HashKind::Jenkins; 3],
            memory_availability: 1,
            tmp_dir: PathBuf::from("/var/tmp/"),
            c: 1.0,
            verbosity: false,
            seed: DEFAULT_SEED,
        }
    }
}

impl BrzConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hashfuncs(mut self, kinds: [HashKind; 3]) -> Self {
        self.hashfuncs = kinds;
        self
    }

    /// RAM budget in MiB (minimum 1).
    pub fn memory_availability(mut self, mib: u32) -> Self {
        self.memory_availability = mib;
        self
    }

    pub fn tmp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.tmp_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Load factor `c`; valid range `[0.93, 2.0]`.
    pub fn load_factor(mut self, c: f32) -> Self {
        self.c = c;
        self
    }

    pub fn verbosity(mut self, on: bool) -> Self {
        self.verbosity = on;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), BrzError> {
        if !(0.93..=2.0).contains(&self.c) {
            return Err(BrzError::InvalidConfig(format!(
                "load factor {} outside [0.93, 2.0]",
                self.c
            )));
        }
        if self.memory_availability == 0 {
            return Err(BrzError::InvalidConfig(
                "memory availability must be at least 1 MiB".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn budget_bytes(&self) -> usize {
        self.memory_availability as usize * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(BrzConfig::default().validate().is_ok());
    }

    #[test]
    fn load_factor_bounds() {
        assert!(BrzConfig::new().load_factor(0.92).validate().is_err());
        assert!(BrzConfig::new().load_factor(2.1).validate().is_err());
        assert!(BrzConfig::new().load_factor(0.93).validate().is_ok());
        assert!(BrzConfig::new().load_factor(2.0).validate().is_ok());
    }

    #[test]
    fn zero_budget_rejected() {
        assert!(BrzConfig::new().memory_availability(0).validate().is_err());
    }
}
