//! The MOC transport sweep.
//!
//! Each outer iteration walks every track once in both directions,
//! attenuating the angular flux segment by segment, tallying the change
//! into the crossed region under its lock, and routing the outgoing flux
//! per the exit boundary condition. Tracks are the parallel work unit;
//! the per-region mutex keeps the tally equivalent to the serial result
//! up to floating-point associativity.

use std::sync::Arc;

use rayon::prelude::*;

use moc_math::expeval::{ExpEvaluator, ExpTable};
use moc_math::quadrature::Quadrature;
use moc_types::error::{TransportError, TransportResult};
use moc_types::state::{BoundaryType, TrackDirection};

use crate::cmfd::CmfdBridge;
use crate::material::MaterialStore;
use crate::region::FsrStore;
use crate::track::{Segment, Track, TrackFluxes, TrackStore};

/// Displacement used to nudge a track endpoint into the geometry when
/// tallying starting currents.
const TINY_MOVE: f64 = 1.0e-10;

/// One exponential evaluator per (azimuthal, polar) angle pair, sharing
/// a single interpolation table.
pub struct ExpEvaluatorSet {
    evaluators: Vec<ExpEvaluator>,
    num_polar: usize,
}

impl ExpEvaluatorSet {
    pub fn new(quadrature: &Quadrature) -> TransportResult<Self> {
        let table = Arc::new(ExpTable::new());
        let num_azim = quadrature.num_azim();
        let num_polar = quadrature.num_polar();
        let mut evaluators = Vec::with_capacity(num_azim * num_polar);
        for a in 0..num_azim {
            for p in 0..num_polar {
                evaluators.push(ExpEvaluator::new(
                    Arc::clone(&table),
                    quadrature.sin_theta(a, p),
                )?);
            }
        }
        Ok(ExpEvaluatorSet {
            evaluators,
            num_polar,
        })
    }

    #[inline]
    pub fn get(&self, azim: usize, polar: usize) -> &ExpEvaluator {
        &self.evaluators[azim * self.num_polar + polar]
    }
}

/// Borrowed state shared by all sweep workers.
pub struct SweepContext<'a> {
    pub tracks: &'a TrackStore,
    pub fluxes: &'a TrackFluxes,
    pub fsrs: &'a FsrStore,
    pub materials: &'a MaterialStore,
    pub quadrature: &'a Quadrature,
    pub exp_evaluators: &'a ExpEvaluatorSet,
    pub cmfd: Option<&'a dyn CmfdBridge>,
    pub max_optical_length: f64,
}

struct SweepScratch {
    psi: Vec<f64>,
    fsr_flux: Vec<f64>,
}

/// Walk every track in both directions, in parallel.
pub fn transport_sweep(ctx: &SweepContext) -> TransportResult<()> {
    let fluxes_per_track = ctx.tracks.fluxes_per_track();
    let num_groups = ctx.tracks.num_groups();
    (0..ctx.tracks.len())
        .into_par_iter()
        .try_for_each_init(
            || SweepScratch {
                psi: vec![0.0; fluxes_per_track],
                fsr_flux: vec![0.0; num_groups],
            },
            |scratch, t| -> TransportResult<()> {
                for direction in TrackDirection::BOTH {
                    sweep_track(ctx, t, direction, scratch)?;
                }
                Ok(())
            },
        )
}

fn sweep_track(
    ctx: &SweepContext,
    track_id: usize,
    direction: TrackDirection,
    scratch: &mut SweepScratch,
) -> TransportResult<()> {
    let track = ctx.tracks.track(track_id);

    {
        let guard = ctx.fluxes.boundary_slot(track_id, direction).lock();
        for (local, stored) in scratch.psi.iter_mut().zip(guard.iter()) {
            *local = *stored as f64;
        }
    }

    match direction {
        TrackDirection::Forward => {
            for segment in &track.segments {
                tally_segment(ctx, track, direction, segment, scratch);
            }
        }
        TrackDirection::Reverse => {
            for segment in track.segments.iter().rev() {
                tally_segment(ctx, track, direction, segment, scratch);
            }
        }
    }

    {
        let mut guard = ctx.fluxes.boundary_slot(track_id, direction).lock();
        for (stored, local) in guard.iter_mut().zip(scratch.psi.iter()) {
            *stored = *local as f32;
        }
    }

    transfer_boundary_flux(ctx, track, track_id, direction, &scratch.psi)
}

/// Apply the attenuation kernel to one segment, splitting it first when
/// its maximum optical path exceeds the configured cap.
fn tally_segment(
    ctx: &SweepContext,
    track: &Track,
    direction: TrackDirection,
    segment: &Segment,
    scratch: &mut SweepScratch,
) {
    let material = ctx.materials.get(segment.material_id);
    let split_sin_theta = if ctx.tracks.solve_3d() {
        ctx.quadrature
            .sin_theta(track.azim_index, track.polar_index)
    } else {
        1.0
    };

    let tau_max = segment.length * material.max_sigma_t() * split_sin_theta;
    if tau_max <= ctx.max_optical_length {
        apply_attenuation(ctx, track, direction, segment, scratch);
        return;
    }

    let num_cuts = (tau_max / ctx.max_optical_length).ceil() as usize;
    let sub_length = segment.length / num_cuts as f64;
    let cosines = direction_cosines(track);
    let mut position = match direction {
        TrackDirection::Forward => segment.starting_position,
        TrackDirection::Reverse => {
            let mut far_end = segment.starting_position;
            for (x, u) in far_end.iter_mut().zip(cosines.iter()) {
                *x += segment.length * u;
            }
            far_end
        }
    };
    let step_sign = match direction {
        TrackDirection::Forward => 1.0,
        TrackDirection::Reverse => -1.0,
    };

    for cut in 0..num_cuts {
        let first = cut == 0;
        let last = cut == num_cuts - 1;
        // The travel-entry surface belongs to the first cut, the
        // travel-exit surface to the last; intermediates carry none.
        let (surface_fwd, surface_bwd) = match direction {
            TrackDirection::Forward => (
                if last { segment.cmfd_surface_fwd } else { -1 },
                if first { segment.cmfd_surface_bwd } else { -1 },
            ),
            TrackDirection::Reverse => (
                if first { segment.cmfd_surface_fwd } else { -1 },
                if last { segment.cmfd_surface_bwd } else { -1 },
            ),
        };
        let sub_segment = Segment {
            length: sub_length,
            fsr_id: segment.fsr_id,
            material_id: segment.material_id,
            cmfd_surface_fwd: surface_fwd,
            cmfd_surface_bwd: surface_bwd,
            starting_position: position,
        };
        apply_attenuation(ctx, track, direction, &sub_segment, scratch);
        for (x, u) in position.iter_mut().zip(cosines.iter()) {
            *x += step_sign * sub_length * u;
        }
    }
}

/// Attenuate the working angular flux across one (sub)segment and merge
/// the tally into the region under its lock.
fn apply_attenuation(
    ctx: &SweepContext,
    track: &Track,
    direction: TrackDirection,
    segment: &Segment,
    scratch: &mut SweepScratch,
) {
    let material = ctx.materials.get(segment.material_id);
    let sigma_t = material.sigma_t();
    let num_groups = ctx.tracks.num_groups();
    let azim = track.azim_index;
    scratch.fsr_flux.fill(0.0);

    if ctx.tracks.solve_3d() {
        let polar = track.polar_index;
        let evaluator = ctx.exp_evaluators.get(azim, polar);
        let weight = ctx.quadrature.weight(azim, polar);
        let length_2d = segment.length * evaluator.sin_theta();

        for g in 0..num_groups {
            let tau = sigma_t[g] * length_2d;
            let exponential = evaluator.exponential_f1(tau);
            let delta_psi = (tau * scratch.psi[g]
                - length_2d * ctx.fsrs.reduced_source(segment.fsr_id, g))
                * exponential;
            scratch.fsr_flux[g] = delta_psi * weight;
            scratch.psi[g] -= delta_psi;
        }
    } else {
        let half = ctx.tracks.num_polar() / 2;
        for g in 0..num_groups {
            let tau = sigma_t[g] * segment.length;
            let source = ctx.fsrs.reduced_source(segment.fsr_id, g);
            let mut pe = g * half;
            for p in 0..half {
                let evaluator = ctx.exp_evaluators.get(azim, p);
                let exponential = evaluator.exponential_f1(tau);
                let delta_psi =
                    (tau * scratch.psi[pe] - segment.length * source) * exponential;
                scratch.fsr_flux[g] += delta_psi * ctx.quadrature.weight(azim, p);
                scratch.psi[pe] -= delta_psi;
                pe += 1;
            }
        }
    }

    ctx.fsrs.add_to_flux(segment.fsr_id, &scratch.fsr_flux);

    if let Some(cmfd) = ctx.cmfd {
        if cmfd.is_flux_update_on() {
            cmfd.tally_current(
                segment,
                &scratch.psi,
                azim,
                track.polar_index,
                direction == TrackDirection::Forward,
            );
        }
    }
}

/// Route the outgoing angular flux per the exit boundary condition.
fn transfer_boundary_flux(
    ctx: &SweepContext,
    track: &Track,
    track_id: usize,
    direction: TrackDirection,
    psi: &[f64],
) -> TransportResult<()> {
    let link = track.link(direction);
    match link.boundary {
        BoundaryType::Reflective | BoundaryType::Periodic => {
            let next = link.next_track.ok_or_else(|| TransportError::TrackLinkError {
                track: track_id,
                message: format!("{:?} exit boundary has no successor track", link.boundary),
            })?;
            let next_direction = if link.next_is_reverse {
                TrackDirection::Reverse
            } else {
                TrackDirection::Forward
            };
            let mut guard = ctx.fluxes.start_slot(next, next_direction).lock();
            for (stored, value) in guard.iter_mut().zip(psi.iter()) {
                *stored = *value as f32;
            }
        }
        BoundaryType::Vacuum => {
            // The exit of this direction is the entry of the opposite
            // one: nothing comes back in from a vacuum.
            ctx.fluxes
                .start_slot(track_id, direction.opposite())
                .lock()
                .fill(0.0);
            if ctx.cmfd.is_none() {
                ctx.fluxes
                    .add_leakage(track_id, outgoing_current(ctx, track, psi));
            }
        }
        BoundaryType::Interface => {
            // Left in the boundary array; the halo exchange forwards it
            // to the neighbor domain after the sweep.
        }
    }
    Ok(())
}

/// Σ_pe w(a, p) · ψ_pe of the outgoing angular flux.
fn outgoing_current(ctx: &SweepContext, track: &Track, psi: &[f64]) -> f64 {
    if ctx.tracks.solve_3d() {
        let weight = ctx.quadrature.weight(track.azim_index, track.polar_index);
        weight * psi.iter().sum::<f64>()
    } else {
        let half = ctx.tracks.num_polar() / 2;
        let mut current = 0.0;
        for (pe, value) in psi.iter().enumerate() {
            let p = pe % half;
            current += ctx.quadrature.weight(track.azim_index, p) * value;
        }
        current
    }
}

/// Tally the currents carried by the iteration-start fluxes at both
/// track endpoints into the CMFD bridge.
pub fn tally_starting_currents(ctx: &SweepContext) -> TransportResult<()> {
    let cmfd = match ctx.cmfd {
        Some(cmfd) => cmfd,
        None => return Ok(()),
    };
    (0..ctx.tracks.len()).into_par_iter().for_each(|t| {
        let track = ctx.tracks.track(t);
        let cosines = direction_cosines(track);
        let delta = [
            cosines[0] * TINY_MOVE,
            cosines[1] * TINY_MOVE,
            cosines[2] * TINY_MOVE,
        ];
        let neg_delta = [-delta[0], -delta[1], -delta[2]];
        let weight = ctx.quadrature.weight(track.azim_index, track.polar_index);
        cmfd.tally_starting_current(
            &track.start,
            &delta,
            &ctx.fluxes.start_snapshot(t, TrackDirection::Forward),
            weight,
        );
        cmfd.tally_starting_current(
            &track.end,
            &neg_delta,
            &ctx.fluxes.start_snapshot(t, TrackDirection::Reverse),
            weight,
        );
    });
    Ok(())
}

fn direction_cosines(track: &Track) -> [f64; 3] {
    let sin_theta = track.theta.sin();
    [
        sin_theta * track.phi.cos(),
        sin_theta * track.phi.sin(),
        track.theta.cos(),
    ]
}
