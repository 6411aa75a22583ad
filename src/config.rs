use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fixed kernel hyperparameters. These are never fitted to data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Matérn 5/2 length-scale (rho).
    pub length_scale: f64,
    pub signal_variance: f64,
    pub noise_variance: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            length_scale: 0.4,
            signal_variance: 1.0,
            noise_variance: 0.001,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Success threshold as a fraction of the best simulated fitness.
    pub alpha: f64,
    /// UCB exploration weight.
    pub kappa: f64,
    /// Trial budget.
    pub max_iter: u32,
    /// Observations required before the discrepancy model is consulted.
    pub min_observations: usize,
    pub kernel: KernelConfig,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            alpha: 0.90,
            kappa: 0.05,
            max_iter: 40,
            min_observations: 2,
            kernel: KernelConfig::default(),
        }
    }
}

impl AdaptationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(out_of_range("alpha", self.alpha, "must be finite and > 0"));
        }
        if !(self.kappa.is_finite() && self.kappa >= 0.0) {
            return Err(out_of_range("kappa", self.kappa, "must be finite and >= 0"));
        }
        if self.min_observations == 0 {
            return Err(out_of_range(
                "min_observations",
                0.0,
                "the model cannot be fitted without observations",
            ));
        }
        let kernel = &self.kernel;
        if !(kernel.length_scale.is_finite() && kernel.length_scale > 0.0) {
            return Err(out_of_range(
                "kernel.length_scale",
                kernel.length_scale,
                "must be finite and > 0",
            ));
        }
        if !(kernel.signal_variance.is_finite() && kernel.signal_variance > 0.0) {
            return Err(out_of_range(
                "kernel.signal_variance",
                kernel.signal_variance,
                "must be finite and > 0",
            ));
        }
        if !(kernel.noise_variance.is_finite() && kernel.noise_variance >= 0.0) {
            return Err(out_of_range(
                "kernel.noise_variance",
                kernel.noise_variance,
                "must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, value: f64, reason: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value,
        reason,
    }
}
