// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Track Store & Angular Fluxes
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Characteristic tracks, connectivity, and per-track angular flux state.
//!
//! Tracks and their segments are produced by an external track generator
//! and are immutable for the run. Angular fluxes are stored per
//! (track, direction) slot: `boundary` is the working state mutated by
//! the sweep, `start` the stable snapshot consumed at the next iteration.

use log::info;
use parking_lot::Mutex;

use moc_math::quadrature::Quadrature;
use moc_math::reduce::pairwise_sum;
use moc_types::error::{TransportError, TransportResult};
use moc_types::state::{BoundaryType, TrackDirection};

/// Portion of a track lying within one flat source region.
#[derive(Debug, Clone)]
pub struct Segment {
    pub length: f64,
    pub fsr_id: usize,
    pub material_id: usize,
    /// CMFD surface crossed on the forward-exit side; −1 when none.
    pub cmfd_surface_fwd: i32,
    /// CMFD surface crossed on the backward-exit side; −1 when none.
    pub cmfd_surface_bwd: i32,
    /// Starting position of the segment in the forward direction; only
    /// consumed when splitting long segments.
    pub starting_position: [f64; 3],
}

/// Per-direction connectivity of a track.
#[derive(Debug, Clone)]
pub struct TrackLink {
    /// Successor track id; local to the owning domain.
    pub next_track: Option<usize>,
    /// Whether the successor is entered in its reverse direction.
    pub next_is_reverse: bool,
    pub boundary: BoundaryType,
    /// Neighbor domain owning the successor for INTERFACE boundaries.
    pub neighbor_domain: Option<usize>,
}

impl TrackLink {
    pub fn vacuum() -> Self {
        TrackLink {
            next_track: None,
            next_is_reverse: false,
            boundary: BoundaryType::Vacuum,
            neighbor_domain: None,
        }
    }
}

/// A directed characteristic ray through the geometry.
#[derive(Debug, Clone)]
pub struct Track {
    pub uid: usize,
    pub start: [f64; 3],
    pub end: [f64; 3],
    pub azim_index: usize,
    pub polar_index: usize,
    pub phi: f64,
    pub theta: f64,
    pub segments: Vec<Segment>,
    pub link_fwd: TrackLink,
    pub link_bwd: TrackLink,
}

impl Track {
    /// Connectivity on the exit side of the given traversal direction.
    pub fn link(&self, direction: TrackDirection) -> &TrackLink {
        match direction {
            TrackDirection::Forward => &self.link_fwd,
            TrackDirection::Reverse => &self.link_bwd,
        }
    }
}

/// Immutable collection of tracks plus the flux layout they imply.
#[derive(Debug)]
pub struct TrackStore {
    tracks: Vec<Track>,
    solve_3d: bool,
    num_groups: usize,
    num_polar: usize,
    fluxes_per_track: usize,
}

impl TrackStore {
    /// In 3D mode each track carries one polar angle, so F = G; in 2D
    /// mode each direction carries one polar half-space, F = G·P/2.
    pub fn new(
        tracks: Vec<Track>,
        solve_3d: bool,
        num_groups: usize,
        num_polar: usize,
    ) -> TransportResult<Self> {
        if tracks.is_empty() {
            return Err(TransportError::ConfigError(
                "track store requires at least one track".to_string(),
            ));
        }
        if num_groups == 0 {
            return Err(TransportError::ConfigError(
                "track store requires num_groups > 0".to_string(),
            ));
        }
        if num_polar == 0 || num_polar % 2 != 0 {
            return Err(TransportError::ConfigError(format!(
                "track store requires a positive even num_polar, got {num_polar}"
            )));
        }
        let fluxes_per_track = if solve_3d {
            num_groups
        } else {
            num_groups * num_polar / 2
        };
        Ok(TrackStore {
            tracks,
            solve_3d,
            num_groups,
            num_polar,
            fluxes_per_track,
        })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[inline]
    pub fn track(&self, id: usize) -> &Track {
        &self.tracks[id]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn solve_3d(&self) -> bool {
        self.solve_3d
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_polar(&self) -> usize {
        self.num_polar
    }

    pub fn fluxes_per_track(&self) -> usize {
        self.fluxes_per_track
    }
}

/// Angular flux arrays for all tracks, plus the per-track vacuum leakage
/// tally used by the balance form of the k_eff update.
pub struct TrackFluxes {
    num_tracks: usize,
    fluxes_per_track: usize,
    boundary: Vec<Mutex<Vec<f32>>>,
    start: Vec<Mutex<Vec<f32>>>,
    leakage: Option<Vec<Mutex<f64>>>,
}

impl TrackFluxes {
    pub fn new(num_tracks: usize, fluxes_per_track: usize) -> Self {
        let slots = 2 * num_tracks;
        let size_mb = (2 * slots * fluxes_per_track * std::mem::size_of::<f32>()) as f64 / 1.0e6;
        info!("Boundary angular flux storage per domain = {size_mb:6.2} MB");

        let boundary = (0..slots)
            .map(|_| Mutex::new(vec![0.0_f32; fluxes_per_track]))
            .collect();
        let start = (0..slots)
            .map(|_| Mutex::new(vec![0.0_f32; fluxes_per_track]))
            .collect();
        TrackFluxes {
            num_tracks,
            fluxes_per_track,
            boundary,
            start,
            leakage: None,
        }
    }

    #[inline]
    fn slot(&self, track: usize, direction: TrackDirection) -> usize {
        2 * track + direction.index()
    }

    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    pub fn fluxes_per_track(&self) -> usize {
        self.fluxes_per_track
    }

    /// Working angular flux of one (track, direction) slot.
    #[inline]
    pub fn boundary_slot(&self, track: usize, direction: TrackDirection) -> &Mutex<Vec<f32>> {
        &self.boundary[self.slot(track, direction)]
    }

    /// Iteration-start angular flux of one (track, direction) slot.
    #[inline]
    pub fn start_slot(&self, track: usize, direction: TrackDirection) -> &Mutex<Vec<f32>> {
        &self.start[self.slot(track, direction)]
    }

    pub fn boundary_snapshot(&self, track: usize, direction: TrackDirection) -> Vec<f32> {
        self.boundary_slot(track, direction).lock().clone()
    }

    pub fn start_snapshot(&self, track: usize, direction: TrackDirection) -> Vec<f32> {
        self.start_slot(track, direction).lock().clone()
    }

    pub fn set_start(&mut self, track: usize, direction: TrackDirection, values: &[f32]) {
        let slot = self.slot(track, direction);
        self.start[slot].get_mut().copy_from_slice(values);
    }

    pub fn set_boundary(&mut self, track: usize, direction: TrackDirection, values: &[f32]) {
        let slot = self.slot(track, direction);
        self.boundary[slot].get_mut().copy_from_slice(values);
    }

    /// Zero both flux arrays for every track and direction.
    pub fn zero_track_fluxes(&mut self) {
        for slot in self.boundary.iter_mut().chain(self.start.iter_mut()) {
            slot.get_mut().fill(0.0);
        }
    }

    /// Copy the stable start fluxes into the working boundary array.
    pub fn copy_boundary_fluxes(&mut self) {
        for (boundary, start) in self.boundary.iter_mut().zip(self.start.iter()) {
            boundary.get_mut().copy_from_slice(&start.lock());
        }
    }

    /// Scale every angular flux (both arrays) by a common factor.
    pub fn scale_fluxes(&mut self, factor: f64) {
        let factor = factor as f32;
        for slot in self.boundary.iter_mut().chain(self.start.iter_mut()) {
            for psi in slot.get_mut().iter_mut() {
                *psi *= factor;
            }
        }
    }

    /// Allocate or drop the per-track leakage tally. The tally only
    /// exists when no CMFD bridge is attached.
    pub fn set_leakage_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.leakage.is_none() {
                self.leakage = Some((0..self.num_tracks).map(|_| Mutex::new(0.0)).collect());
            }
        } else {
            self.leakage = None;
        }
    }

    pub fn leakage_enabled(&self) -> bool {
        self.leakage.is_some()
    }

    pub fn zero_leakage(&mut self) {
        if let Some(leakage) = self.leakage.as_mut() {
            for cell in leakage.iter_mut() {
                *cell.get_mut() = 0.0;
            }
        }
    }

    /// Accumulate vacuum leakage for one track.
    pub fn add_leakage(&self, track: usize, value: f64) {
        if let Some(leakage) = self.leakage.as_ref() {
            *leakage[track].lock() += value;
        }
    }

    pub fn track_leakage(&self, track: usize) -> f64 {
        self.leakage.as_ref().map_or(0.0, |l| *l[track].lock())
    }

    /// Total leakage over all tracks.
    pub fn total_leakage(&self) -> f64 {
        match self.leakage.as_ref() {
            Some(leakage) => {
                let values: Vec<f64> = leakage.iter().map(|cell| *cell.lock()).collect();
                pairwise_sum(&values)
            }
            None => 0.0,
        }
    }
}

/// Track-tallied region volumes, sharing the segment format with the
/// transport sweep so the add-source normalization is conservative:
/// V_r = Σ over crossing tracks and both directions of (w/4π)·ℓ₃D.
pub fn tally_fsr_volumes(
    tracks: &TrackStore,
    quadrature: &Quadrature,
    num_fsrs: usize,
) -> Vec<f64> {
    let mut volumes = vec![0.0; num_fsrs];
    for track in tracks.iter() {
        let weight = if tracks.solve_3d() {
            2.0 * quadrature.volume_weight(track.azim_index, track.polar_index)
        } else {
            let half = tracks.num_polar() / 2;
            2.0 * (0..half)
                .map(|p| {
                    quadrature.volume_weight(track.azim_index, p)
                        / quadrature.sin_theta(track.azim_index, p)
                })
                .sum::<f64>()
        };
        for segment in &track.segments {
            volumes[segment.fsr_id] += weight * segment.length;
        }
    }
    volumes
}
