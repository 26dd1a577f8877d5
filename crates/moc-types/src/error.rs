// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Error
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Allocation error: {0}")]
    AllocationError(String),

    #[error("Solver diverged at iteration {iteration}: {message}")]
    SolverDiverged { iteration: usize, message: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Track linking error on track {track}: {message}")]
    TrackLinkError { track: usize, message: String },

    #[error("Domain decomposition error: {0}")]
    DomainError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
