// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — CMFD Bridge
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Opaque interface to an external coarse-mesh finite-difference
//! accelerator. The transport core only drives the tally and update
//! hooks; the CMFD linear system itself is the collaborator's business.

use moc_types::error::TransportResult;

use crate::region::FsrStore;
use crate::track::Segment;

/// Hooks the sweep and driver call into when a bridge is attached.
///
/// Tally hooks run from inside the parallel sweep, so implementations
/// must be `Sync` and handle their own interior mutability.
pub trait CmfdBridge: Send + Sync {
    /// Reset surface current tallies at the start of a sweep.
    fn zero_currents(&self);

    /// Whether the accelerated flux update is active this iteration.
    fn is_flux_update_on(&self) -> bool;

    /// Whether starting currents should be tallied for the σt rebalance.
    fn is_sigma_t_rebalance_on(&self) -> bool;

    /// Tally the current carried by `track_flux` across the CMFD
    /// surfaces of a (possibly split) segment.
    fn tally_current(
        &self,
        segment: &Segment,
        track_flux: &[f64],
        azim_index: usize,
        polar_index: usize,
        forward: bool,
    );

    /// Tally the current impingent on boundary cells from a track
    /// endpoint, displaced by `delta` into the geometry.
    fn tally_starting_current(
        &self,
        point: &[f64; 3],
        delta: &[f64; 3],
        track_flux: &[f32],
        weight: f64,
    );

    /// Apply the coarse-mesh flux update to the fine-mesh scalar flux.
    fn update_flux(&self, fsrs: &mut FsrStore) -> TransportResult<()>;
}
