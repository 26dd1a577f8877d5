// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

/// Residual metric for the outer-iteration convergence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResidualType {
    ScalarFlux,
    FissionSource,
    TotalSource,
}

/// Transport stabilization variant (flux damping against negative
/// in-group scattering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilizationType {
    None,
    Diagonal,
    Yamamoto,
    Global,
}

/// Source shape within a flat source region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Flat,
    Linear,
}

/// Polar quadrature family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuadratureType {
    GaussLegendre,
    EqualWeight,
    EqualAngle,
}

/// Boundary condition on a track endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryType {
    Reflective,
    Periodic,
    Vacuum,
    /// Boundary between two spatial domains of the same geometry; the
    /// outgoing flux is forwarded by the halo exchange.
    Interface,
}

/// Traversal direction along a track. Forward runs start → end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackDirection {
    Forward,
    Reverse,
}

impl TrackDirection {
    pub const BOTH: [TrackDirection; 2] = [TrackDirection::Forward, TrackDirection::Reverse];

    pub fn index(self) -> usize {
        match self {
            TrackDirection::Forward => 0,
            TrackDirection::Reverse => 1,
        }
    }

    pub fn opposite(self) -> TrackDirection {
        match self {
            TrackDirection::Forward => TrackDirection::Reverse,
            TrackDirection::Reverse => TrackDirection::Forward,
        }
    }

    pub fn from_index(index: usize) -> TrackDirection {
        if index == 0 {
            TrackDirection::Forward
        } else {
            TrackDirection::Reverse
        }
    }
}

/// Per-outer-iteration diagnostics recorded by the eigenvalue driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub k_eff: f64,
    pub residual: f64,
    pub negative_sources: u64,
    pub negative_fluxes: u64,
}

/// Result of an eigenvalue or fixed-source solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResult {
    pub converged: bool,
    pub iterations: usize,
    pub k_eff: f64,
    pub residual: f64,
    pub solve_time_ms: f64,
    pub history: Vec<IterationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_indexing_roundtrip() {
        for d in TrackDirection::BOTH {
            assert_eq!(TrackDirection::from_index(d.index()), d);
        }
        assert_eq!(TrackDirection::Forward.opposite(), TrackDirection::Reverse);
        assert_eq!(TrackDirection::Reverse.opposite(), TrackDirection::Forward);
    }

    #[test]
    fn test_enum_serde_names() {
        let json = serde_json::to_string(&ResidualType::FissionSource).expect("serialize");
        assert_eq!(json, "\"FissionSource\"");
        let back: ResidualType = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ResidualType::FissionSource);
    }
}
