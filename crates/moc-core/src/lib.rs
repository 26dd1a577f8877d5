// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — MOC Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Method-of-characteristics neutron transport core.
//!
//! The solver sweeps angular fluxes along pre-generated characteristic
//! tracks, accumulates flat-source-region scalar fluxes, and drives the
//! outer fission-source iteration for k_eff, with optional transport
//! stabilization, CMFD acceleration hooks, and a spatial domain
//! decomposition coupled through angular-flux halo exchange.

pub mod cmfd;
pub mod domain;
pub mod material;
pub mod region;
pub mod solver;
pub mod source;
pub mod stabilizer;
pub mod sweep;
pub mod track;
