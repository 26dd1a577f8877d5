// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};
use crate::state::{QuadratureType, ResidualType, SourceType, StabilizationType};

/// Runtime parameters recognized by the transport core.
///
/// Defaults follow the richer runtime-parameter schema: 1000 outer
/// iterations, 1.0e-4 source tolerance, fission-source residual, and an
/// explicit quadrature selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker pool size for the transport sweep (> 0).
    pub num_threads: usize,
    /// Convergence threshold on the outer-iteration residual (> 0).
    pub tolerance: f64,
    /// Outer iteration cap (> 0).
    pub max_iters: usize,
    /// Residual metric used for the convergence check.
    pub residual_type: ResidualType,
    /// Transport stabilization variant applied each outer iteration.
    pub stabilization: StabilizationType,
    /// Damping factor for the selected stabilization variant (> 0).
    pub stabilization_factor: f64,
    /// true: k_eff from successive fission rates; false: fission/(absorption
    /// + leakage) balance. Balance mode requires that no CMFD bridge is
    /// attached, since the leakage tally only exists without one.
    pub keff_from_fission_rates: bool,
    /// Maximum optical path length per segment; longer segments are split.
    pub max_optical_length: f64,
    /// Source shape within an FSR. Only `Flat` is implemented.
    pub source_type: SourceType,
    /// Polar quadrature family handed to the quadrature constructor.
    pub quadrature_type: QuadratureType,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            num_threads: 1,
            tolerance: 1.0e-4,
            max_iters: 1000,
            residual_type: ResidualType::FissionSource,
            stabilization: StabilizationType::None,
            stabilization_factor: 1.0,
            keff_from_fission_rates: true,
            max_optical_length: 10.0,
            source_type: SourceType::Flat,
            quadrature_type: QuadratureType::GaussLegendre,
        }
    }
}

impl RuntimeConfig {
    /// Load runtime parameters from a JSON file.
    pub fn from_file(path: &str) -> TransportResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation of every recognized option, performed before
    /// any iteration begins.
    pub fn validate(&self) -> TransportResult<()> {
        if self.num_threads == 0 {
            return Err(TransportError::ConfigError(
                "num_threads must be > 0".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(TransportError::ConfigError(format!(
                "tolerance must be finite and > 0, got {}",
                self.tolerance
            )));
        }
        if self.max_iters == 0 {
            return Err(TransportError::ConfigError(
                "max_iters must be > 0".to_string(),
            ));
        }
        if !self.stabilization_factor.is_finite() || self.stabilization_factor <= 0.0 {
            return Err(TransportError::ConfigError(format!(
                "stabilization_factor must be finite and > 0, got {}",
                self.stabilization_factor
            )));
        }
        if !self.max_optical_length.is_finite() || self.max_optical_length <= 0.0 {
            return Err(TransportError::ConfigError(format!(
                "max_optical_length must be finite and > 0, got {}",
                self.max_optical_length
            )));
        }
        if self.source_type == SourceType::Linear {
            return Err(TransportError::ConfigError(
                "linear sources are not implemented; use source_type = Flat".to_string(),
            ));
        }
        Ok(())
    }
}
