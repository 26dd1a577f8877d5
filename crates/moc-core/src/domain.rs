// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Domain Decomposition & Halo Exchange
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Spatial domain decomposition and angular-flux halo exchange.
//!
//! This module defines deterministic partition metadata and the packing
//! protocol for forwarding interface angular fluxes between neighboring
//! domains, plus a lockstep in-memory implementation of the exchange
//! that can be wired to an MPI binding later. The protocol is the
//! classical bounded-round scheme: pack fixed-size buffers, post paired
//! send/receive per neighbor, wait, unpack, repeat until every boundary
//! track list is drained.

use log::info;

use moc_types::error::{TransportError, TransportResult};
use moc_types::state::{BoundaryType, TrackDirection};

use crate::solver::MocSolver;
use crate::track::{TrackFluxes, TrackStore};

/// Fixed number of track slots per exchange buffer.
pub const TRACKS_PER_BUFFER: usize = 1000;

/// Position tolerance when cross-checking track links across domains.
const LINK_POSITION_TOLERANCE: f64 = 1.0e-5;

/// Angle tolerance when cross-checking track links across domains.
const LINK_ANGLE_TOLERANCE: f64 = 1.0e-5;

/// Cartesian process grid; ranks are x-major, then y, then z.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartesianTopology {
    dims: [usize; 3],
}

impl CartesianTopology {
    pub fn new(dims: [usize; 3]) -> TransportResult<Self> {
        if dims.iter().any(|d| *d == 0) {
            return Err(TransportError::DomainError(format!(
                "cartesian topology requires positive extents, got {dims:?}"
            )));
        }
        Ok(CartesianTopology { dims })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn num_domains(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn coords(&self, rank: usize) -> [usize; 3] {
        let x = rank % self.dims[0];
        let y = (rank / self.dims[0]) % self.dims[1];
        let z = rank / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    pub fn rank_of(&self, coords: [usize; 3]) -> usize {
        coords[0] + self.dims[0] * (coords[1] + self.dims[1] * coords[2])
    }

    /// Rank of the neighbor at the given offset, when inside the grid.
    pub fn neighbor_rank(&self, rank: usize, offset: [i32; 3]) -> Option<usize> {
        let coords = self.coords(rank);
        let mut neighbor = [0usize; 3];
        for axis in 0..3 {
            let shifted = coords[axis] as i64 + offset[axis] as i64;
            if shifted < 0 || shifted >= self.dims[axis] as i64 {
                return None;
            }
            neighbor[axis] = shifted as usize;
        }
        Some(self.rank_of(neighbor))
    }

    /// Unit-cell offset from one rank to another, when both share the
    /// 3×3×3 stencil.
    pub fn offset_between(&self, from: usize, to: usize) -> Option<[i32; 3]> {
        let a = self.coords(from);
        let b = self.coords(to);
        let mut offset = [0i32; 3];
        for axis in 0..3 {
            let delta = b[axis] as i64 - a[axis] as i64;
            if delta.abs() > 1 {
                return None;
            }
            offset[axis] = delta as i32;
        }
        Some(offset)
    }
}

/// Whether the supported track geometry can cross a boundary with this
/// offset: the four lateral faces with any axial shift, plus the two
/// pure axial neighbors. The lateral edge and corner offsets
/// (dx, dy) ∈ {(±1, ±1)} are excluded and asserted unreachable.
pub fn is_supported_offset(offset: [i32; 3]) -> bool {
    let [dx, dy, dz] = offset;
    dx.abs() + dy.abs() == 1 || (dx == 0 && dy == 0 && dz != 0)
}

/// The supported neighbor offsets in deterministic enumeration order.
pub fn supported_offsets() -> Vec<[i32; 3]> {
    let mut offsets = Vec::with_capacity(14);
    for dx in -1..=1 {
        for dy in -1..=1 {
            for dz in -1..=1 {
                if is_supported_offset([dx, dy, dz]) {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

/// One slot of an exchange buffer: F fluxes, the receiver direction,
/// and the successor track id with −1 as the empty sentinel.
#[derive(Debug, Clone)]
pub struct FluxSlot {
    pub successor: i64,
    pub direction: u8,
    pub fluxes: Vec<f32>,
}

impl FluxSlot {
    fn sentinel(fluxes_per_track: usize) -> Self {
        FluxSlot {
            successor: -1,
            direction: 0,
            fluxes: vec![0.0; fluxes_per_track],
        }
    }
}

/// Statistics of one full exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeStats {
    pub rounds: usize,
    pub delivered: u64,
}

/// Per-domain halo bookkeeping: neighbor list, ordered boundary-track
/// lists, packing cursors, send buffers and the receive inbox.
pub struct HaloState {
    rank: usize,
    fluxes_per_track: usize,
    tracks_per_buffer: usize,
    neighbor_domains: Vec<usize>,
    boundary_tracks: Vec<Vec<u64>>,
    cursors: Vec<usize>,
    send_buffers: Vec<Vec<FluxSlot>>,
    inbox: Vec<(usize, Vec<FluxSlot>)>,
}

impl HaloState {
    /// Discover neighbors and build the ordered boundary-track lists.
    pub fn build(
        rank: usize,
        topology: &CartesianTopology,
        tracks: &TrackStore,
        tracks_per_buffer: usize,
    ) -> TransportResult<Self> {
        if rank >= topology.num_domains() {
            return Err(TransportError::DomainError(format!(
                "rank {rank} outside topology of {} domains",
                topology.num_domains()
            )));
        }

        let mut neighbor_domains = Vec::new();
        for offset in supported_offsets() {
            if let Some(neighbor) = topology.neighbor_rank(rank, offset) {
                neighbor_domains.push(neighbor);
            }
        }

        let mut boundary_tracks = vec![Vec::new(); neighbor_domains.len()];
        for (t, track) in tracks.iter().enumerate() {
            for direction in TrackDirection::BOTH {
                let link = track.link(direction);
                if link.boundary != BoundaryType::Interface {
                    continue;
                }
                let domain = link.neighbor_domain.ok_or_else(|| {
                    TransportError::InvariantViolation(format!(
                        "track {t} has an INTERFACE boundary but no neighbor domain"
                    ))
                })?;
                let offset = topology.offset_between(rank, domain).ok_or_else(|| {
                    TransportError::DomainError(format!(
                        "track {t} names domain {domain}, outside the stencil of rank {rank}"
                    ))
                })?;
                if !is_supported_offset(offset) {
                    return Err(TransportError::InvariantViolation(format!(
                        "track {t} crosses an unsupported lateral-edge offset {offset:?} \
                         between ranks {rank} and {domain}"
                    )));
                }
                if link.next_track.is_none() {
                    return Err(TransportError::TrackLinkError {
                        track: t,
                        message: "INTERFACE boundary has no successor track".to_string(),
                    });
                }
                let index = neighbor_domains
                    .iter()
                    .position(|d| *d == domain)
                    .ok_or_else(|| {
                        TransportError::DomainError(format!(
                            "domain {domain} is not a registered neighbor of rank {rank}"
                        ))
                    })?;
                boundary_tracks[index].push(2 * t as u64 + direction.index() as u64);
            }
        }

        let num_neighbors = neighbor_domains.len();
        let fluxes_per_track = tracks.fluxes_per_track();
        info!(
            "Rank {rank}: {num_neighbors} halo neighbors, {} interface tracks",
            boundary_tracks.iter().map(Vec::len).sum::<usize>()
        );

        let send_buffers = (0..num_neighbors)
            .map(|_| {
                (0..tracks_per_buffer)
                    .map(|_| FluxSlot::sentinel(fluxes_per_track))
                    .collect()
            })
            .collect();

        Ok(HaloState {
            rank,
            fluxes_per_track,
            tracks_per_buffer,
            neighbor_domains,
            boundary_tracks,
            cursors: vec![0; num_neighbors],
            send_buffers,
            inbox: Vec::new(),
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_neighbors(&self) -> usize {
        self.neighbor_domains.len()
    }

    pub fn neighbor_domains(&self) -> &[usize] {
        &self.neighbor_domains
    }

    pub fn boundary_tracks(&self, neighbor_index: usize) -> &[u64] {
        &self.boundary_tracks[neighbor_index]
    }

    /// Longest boundary list; bounds the number of exchange rounds.
    pub fn max_list_length(&self) -> usize {
        self.boundary_tracks.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn reset_cursors(&mut self) {
        self.cursors.fill(0);
    }

    /// Fill every send buffer from its cursor. Returns the messages to
    /// post this round as (destination rank, buffer) pairs; buffers with
    /// no live slot are withheld, as in the reference protocol.
    pub fn pack_round(
        &mut self,
        tracks: &TrackStore,
        fluxes: &TrackFluxes,
    ) -> TransportResult<Vec<(usize, Vec<FluxSlot>)>> {
        let mut messages = Vec::new();
        for (i, list) in self.boundary_tracks.iter().enumerate() {
            for slot in self.send_buffers[i].iter_mut() {
                slot.successor = -1;
            }

            let remaining = list.len() - self.cursors[i];
            let batch = remaining.min(self.tracks_per_buffer);
            for b in 0..batch {
                let entry = list[self.cursors[i] + b];
                let t = (entry / 2) as usize;
                let direction = TrackDirection::from_index((entry % 2) as usize);
                let link = tracks.track(t).link(direction);
                let successor = link.next_track.ok_or_else(|| {
                    TransportError::TrackLinkError {
                        track: t,
                        message: "INTERFACE boundary lost its successor".to_string(),
                    }
                })?;
                let receiver_direction = if link.next_is_reverse {
                    direction.opposite()
                } else {
                    direction
                };

                let slot = &mut self.send_buffers[i][b];
                slot.successor = successor as i64;
                slot.direction = receiver_direction.index() as u8;
                let guard = fluxes.boundary_slot(t, direction).lock();
                slot.fluxes.copy_from_slice(&guard);
            }
            self.cursors[i] += batch;

            if batch > 0 {
                messages.push((self.neighbor_domains[i], self.send_buffers[i].clone()));
            }
        }
        Ok(messages)
    }

    /// Queue a buffer received from a neighbor for unpacking.
    pub fn receive(&mut self, from_rank: usize, buffer: Vec<FluxSlot>) -> TransportResult<()> {
        if !self.neighbor_domains.contains(&from_rank) {
            return Err(TransportError::DomainError(format!(
                "rank {} received a buffer from non-neighbor rank {from_rank}",
                self.rank
            )));
        }
        self.inbox.push((from_rank, buffer));
        Ok(())
    }

    /// Drain the inbox, copying each live slot into the successor's
    /// start flux. Returns the number of delivered slots.
    pub fn unpack_inbox(&mut self, fluxes: &mut TrackFluxes) -> TransportResult<u64> {
        let mut delivered = 0;
        for (from_rank, buffer) in self.inbox.drain(..) {
            for slot in &buffer {
                if slot.successor < 0 {
                    continue;
                }
                let successor = slot.successor as usize;
                if successor >= fluxes.num_tracks() {
                    return Err(TransportError::DomainError(format!(
                        "rank {} received successor track {successor} from rank {from_rank}, \
                         but only {} tracks exist",
                        self.rank,
                        fluxes.num_tracks()
                    )));
                }
                if slot.fluxes.len() != self.fluxes_per_track {
                    return Err(TransportError::DomainError(format!(
                        "rank {} received a slot of width {} from rank {from_rank}, expected {}",
                        self.rank,
                        slot.fluxes.len(),
                        self.fluxes_per_track
                    )));
                }
                let direction = TrackDirection::from_index(slot.direction as usize);
                fluxes.set_start(successor, direction, &slot.fluxes);
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

/// Forward every interface angular flux to its successor domain using
/// bounded rounds of paired sends and receives. Domains are addressed
/// by index: `solvers[rank]` must own rank `rank`.
pub fn exchange_interface_fluxes(solvers: &mut [MocSolver]) -> TransportResult<ExchangeStats> {
    for (index, solver) in solvers.iter().enumerate() {
        let halo = solver.halo().ok_or_else(|| {
            TransportError::DomainError(format!(
                "solver {index} takes part in an exchange without halo state"
            ))
        })?;
        if halo.rank() != index {
            return Err(TransportError::DomainError(format!(
                "solver at index {index} owns rank {}",
                halo.rank()
            )));
        }
    }

    for solver in solvers.iter_mut() {
        solver.halo_reset_cursors();
    }

    let mut stats = ExchangeStats::default();
    loop {
        // Pack phase; a barrier separates rounds in the MPI rendition.
        let mut staged: Vec<(usize, usize, Vec<FluxSlot>)> = Vec::new();
        for (src, solver) in solvers.iter_mut().enumerate() {
            for (dest, buffer) in solver.halo_pack_round()? {
                staged.push((dest, src, buffer));
            }
        }
        if staged.is_empty() {
            break;
        }
        stats.rounds += 1;

        // Paired post + wait collapses to direct delivery in memory.
        for (dest, src, buffer) in staged {
            if dest >= solvers.len() {
                return Err(TransportError::DomainError(format!(
                    "rank {src} targets rank {dest} outside the {}-domain exchange",
                    solvers.len()
                )));
            }
            solvers[dest].halo_receive(src, buffer)?;
        }
        for solver in solvers.iter_mut() {
            stats.delivered += solver.halo_unpack()?;
        }
    }
    Ok(stats)
}

/// Debug validator: walk every INTERFACE track and cross-check endpoint
/// coordinates, angles, and (optionally) flux delivery against the
/// successor on the neighboring domain. Angle mismatches are forgiven at
/// double-reflection corners where both an x- and a z-boundary of the
/// global geometry meet.
pub fn validate_interface_links(
    solvers: &[MocSolver],
    global_bounds: Option<&[f64; 6]>,
    check_fluxes: bool,
) -> TransportResult<()> {
    for solver in solvers {
        let halo = match solver.halo() {
            Some(halo) => halo,
            None => continue,
        };
        let rank = halo.rank();
        for (t, track) in solver.tracks().iter().enumerate() {
            for direction in TrackDirection::BOTH {
                let link = track.link(direction);
                if link.boundary != BoundaryType::Interface {
                    continue;
                }
                let dest = link.neighbor_domain.ok_or_else(|| {
                    TransportError::InvariantViolation(format!(
                        "track {t} on rank {rank} has an INTERFACE boundary but no \
                         neighbor domain"
                    ))
                })?;
                let successor = link.next_track.ok_or_else(|| {
                    TransportError::TrackLinkError {
                        track: t,
                        message: format!("INTERFACE boundary on rank {rank} has no successor"),
                    }
                })?;
                let peer = &solvers[dest];
                let peer_track = peer.tracks().track(successor);

                let exit_point = match direction {
                    TrackDirection::Forward => track.end,
                    TrackDirection::Reverse => track.start,
                };
                let receiver_direction = if link.next_is_reverse {
                    direction.opposite()
                } else {
                    direction
                };
                let entry_point = match receiver_direction {
                    TrackDirection::Forward => peer_track.start,
                    TrackDirection::Reverse => peer_track.end,
                };

                for axis in 0..3 {
                    if (exit_point[axis] - entry_point[axis]).abs() > LINK_POSITION_TOLERANCE {
                        return Err(TransportError::TrackLinkError {
                            track: t,
                            message: format!(
                                "rank {rank} exit point {exit_point:?} does not meet track \
                                 {successor} on rank {dest} at {entry_point:?}"
                            ),
                        });
                    }
                }

                let on_double_reflection = global_bounds.is_some_and(|bounds| {
                    let on_x = (exit_point[0] - bounds[0]).abs() < LINK_POSITION_TOLERANCE
                        || (exit_point[0] - bounds[1]).abs() < LINK_POSITION_TOLERANCE;
                    let on_z = (exit_point[2] - bounds[4]).abs() < LINK_POSITION_TOLERANCE
                        || (exit_point[2] - bounds[5]).abs() < LINK_POSITION_TOLERANCE;
                    on_x && on_z
                });
                if !on_double_reflection
                    && ((track.phi - peer_track.phi).abs() > LINK_ANGLE_TOLERANCE
                        || (track.theta - peer_track.theta).abs() > LINK_ANGLE_TOLERANCE)
                {
                    return Err(TransportError::TrackLinkError {
                        track: t,
                        message: format!(
                            "rank {rank} direction ({}, {}) does not match track {successor} \
                             on rank {dest} with ({}, {})",
                            track.theta, track.phi, peer_track.theta, peer_track.phi
                        ),
                    });
                }

                if check_fluxes {
                    let sent = solver.fluxes().boundary_snapshot(t, direction);
                    let received = peer.fluxes().start_snapshot(successor, receiver_direction);
                    if sent != received {
                        return Err(TransportError::TrackLinkError {
                            track: t,
                            message: format!(
                                "angular flux mismatch between rank {rank} track {t} and \
                                 rank {dest} track {successor}"
                            ),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}
