// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Halo Exchange Scenarios
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Distributed-domain scenarios over the in-memory lockstep exchange:
//! exactly-once interface flux delivery on a 2×2×2 decomposition,
//! bounded communication rounds, and a two-domain eigenvalue solve.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use moc_core::domain::{
    exchange_interface_fluxes, supported_offsets, validate_interface_links, CartesianTopology,
    HaloState,
};
use moc_core::material::{Material, MaterialStore};
use moc_core::region::FsrStore;
use moc_core::solver::{DomainEnsemble, MocSolver};
use moc_core::track::{tally_fsr_volumes, Segment, Track, TrackFluxes, TrackLink, TrackStore};
use moc_math::quadrature::Quadrature;
use moc_types::config::RuntimeConfig;
use moc_types::error::TransportError;
use moc_types::state::{BoundaryType, QuadratureType, TrackDirection};

const NUM_GROUPS: usize = 3;

fn test_materials() -> MaterialStore {
    let mut materials = MaterialStore::new();
    materials
        .add(
            Material::new(
                "medium",
                vec![1.0; NUM_GROUPS],
                vec![1.0; NUM_GROUPS],
                vec![0.0; NUM_GROUPS],
                vec![0.0; NUM_GROUPS],
                vec![0.0; NUM_GROUPS * NUM_GROUPS],
            )
            .expect("valid material"),
        )
        .expect("add material");
    materials
}

fn vacuum_track(uid: usize, start: [f64; 3], end: [f64; 3], phi: f64, theta: f64) -> Track {
    Track {
        uid,
        start,
        end,
        azim_index: 0,
        polar_index: 0,
        phi,
        theta,
        segments: vec![Segment {
            length: 1.0,
            fsr_id: 0,
            material_id: 0,
            cmfd_surface_fwd: -1,
            cmfd_surface_bwd: -1,
            starting_position: start,
        }],
        link_fwd: TrackLink::vacuum(),
        link_bwd: TrackLink::vacuum(),
    }
}

fn build_solver(tracks: Vec<Track>) -> MocSolver {
    let materials = test_materials();
    let quadrature =
        Quadrature::new(QuadratureType::EqualWeight, 1, 2).expect("valid quadrature");
    let tracks = TrackStore::new(tracks, true, NUM_GROUPS, 2).expect("valid store");
    let fsrs = FsrStore::new(vec![1.0], vec![0], &materials).expect("valid store");
    MocSolver::new(RuntimeConfig::default(), materials, fsrs, tracks, quadrature)
        .expect("valid solver")
}

/// One randomized interface link from a source (track, direction) to a
/// fresh successor track on the destination rank.
struct InterfaceLink {
    src_rank: usize,
    src_track: usize,
    direction: TrackDirection,
    dest_rank: usize,
    dest_track: usize,
}

/// Scenario: 2×2×2 decomposition, 1000 randomized interface tracks.
/// After an exchange every interface flux must appear exactly once in
/// the successor's start slot on the receiving domain.
#[test]
fn test_interface_fluxes_delivered_exactly_once() {
    let topology = CartesianTopology::new([2, 2, 2]).expect("valid topology");
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let offsets = supported_offsets();

    // Every domain starts with one plain track so each store is
    // populated even if the draw never lands on it.
    let mut domain_tracks: Vec<Vec<Track>> = (0..8)
        .map(|rank| {
            vec![vacuum_track(
                0,
                [rank as f64, 0.0, 0.0],
                [rank as f64 + 1.0, 0.0, 0.0],
                0.0,
                1.0,
            )]
        })
        .collect();
    let mut links = Vec::new();

    for _ in 0..1000 {
        // Draw a source rank and a supported offset that stays in grid.
        let (src_rank, dest_rank) = loop {
            let src = rng.gen_range(0..8);
            let offset = offsets[rng.gen_range(0..offsets.len())];
            if let Some(dest) = topology.neighbor_rank(src, offset) {
                break (src, dest);
            }
        };
        let direction = if rng.gen_bool(0.5) {
            TrackDirection::Forward
        } else {
            TrackDirection::Reverse
        };

        let phi = rng.gen_range(0.0..std::f64::consts::PI);
        let theta = rng.gen_range(0.3..std::f64::consts::FRAC_PI_2);
        let meeting = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let offset_point = |p: [f64; 3], s: f64| [p[0] + s, p[1], p[2]];

        // The exit point of the source track must meet the entry point
        // of the successor (entered in the same direction).
        let src_track_id = domain_tracks[src_rank].len();
        let dest_track_id = domain_tracks[dest_rank].len();
        let (src_track, dest_track) = match direction {
            TrackDirection::Forward => (
                vacuum_track(src_track_id, offset_point(meeting, -1.0), meeting, phi, theta),
                vacuum_track(dest_track_id, meeting, offset_point(meeting, 1.0), phi, theta),
            ),
            TrackDirection::Reverse => (
                vacuum_track(src_track_id, meeting, offset_point(meeting, 1.0), phi, theta),
                vacuum_track(dest_track_id, offset_point(meeting, -1.0), meeting, phi, theta),
            ),
        };
        let mut src_track = src_track;
        let link = TrackLink {
            next_track: Some(dest_track_id),
            next_is_reverse: false,
            boundary: BoundaryType::Interface,
            neighbor_domain: Some(dest_rank),
        };
        match direction {
            TrackDirection::Forward => src_track.link_fwd = link,
            TrackDirection::Reverse => src_track.link_bwd = link,
        }
        domain_tracks[src_rank].push(src_track);
        domain_tracks[dest_rank].push(dest_track);

        links.push(InterfaceLink {
            src_rank,
            src_track: src_track_id,
            direction,
            dest_rank,
            dest_track: dest_track_id,
        });
    }

    let solvers: Vec<MocSolver> = domain_tracks.into_iter().map(build_solver).collect();
    let mut ensemble =
        DomainEnsemble::new(solvers, topology).expect("valid ensemble");

    // Seed every outgoing boundary flux with a recognizable pattern.
    for (i, link) in links.iter().enumerate() {
        let pattern: Vec<f32> = (0..NUM_GROUPS)
            .map(|g| (i * NUM_GROUPS + g) as f32 * 0.001 + 1.0)
            .collect();
        ensemble
            .solver_mut(link.src_rank)
            .fluxes_mut()
            .set_boundary(link.src_track, link.direction, &pattern);
    }

    let stats = exchange_interface_fluxes(ensemble.solvers_mut()).expect("exchange succeeds");
    assert_eq!(stats.delivered, 1000, "every interface flux is delivered once");
    assert_eq!(stats.rounds, 1, "1000 links fit into a single round");

    // Receiver start flux equals sender boundary flux, slot by slot.
    for link in &links {
        let sent = ensemble
            .solver(link.src_rank)
            .fluxes()
            .boundary_snapshot(link.src_track, link.direction);
        let received = ensemble
            .solver(link.dest_rank)
            .fluxes()
            .start_snapshot(link.dest_track, link.direction);
        assert_eq!(sent, received, "flux mismatch on link {:?}", link.src_track);
    }

    // The debug validator agrees, including the flux cross-check.
    validate_interface_links(ensemble.solvers_mut(), None, true)
        .expect("all interface links are consistent");
}

#[test]
fn test_validator_catches_corrupted_delivery() {
    let topology = CartesianTopology::new([2, 1, 1]).expect("valid topology");

    let meeting = [1.0, 0.0, 0.0];
    let mut src = vacuum_track(0, [0.0, 0.0, 0.0], meeting, 0.1, 1.2);
    src.link_fwd = TrackLink {
        next_track: Some(0),
        next_is_reverse: false,
        boundary: BoundaryType::Interface,
        neighbor_domain: Some(1),
    };
    let dest = vacuum_track(0, meeting, [2.0, 0.0, 0.0], 0.1, 1.2);

    let solvers = vec![build_solver(vec![src]), build_solver(vec![dest])];
    let mut ensemble = DomainEnsemble::new(solvers, topology).expect("valid ensemble");

    ensemble
        .solver_mut(0)
        .fluxes_mut()
        .set_boundary(0, TrackDirection::Forward, &[1.0, 2.0, 3.0]);
    exchange_interface_fluxes(ensemble.solvers_mut()).expect("exchange succeeds");
    validate_interface_links(ensemble.solvers_mut(), None, true).expect("links consistent");

    // Corrupt the delivered flux: the validator must name the track.
    ensemble
        .solver_mut(1)
        .fluxes_mut()
        .set_start(0, TrackDirection::Forward, &[1.0, 2.0, 9.0]);
    let err = validate_interface_links(ensemble.solvers_mut(), None, true)
        .expect_err("corrupted flux must be detected");
    match err {
        TransportError::TrackLinkError { track, message } => {
            assert_eq!(track, 0);
            assert!(message.contains("mismatch"));
        }
        other => panic!("Unexpected error: {other:?}"),
    }
}

#[test]
fn test_lateral_edge_neighbor_is_rejected() {
    // Rank 0 → rank 3 in a 2×2×1 grid is the (1, 1, 0) lateral edge,
    // which the supported track geometry never crosses.
    let topology = CartesianTopology::new([2, 2, 1]).expect("valid topology");
    let mut track = vacuum_track(0, [0.0; 3], [1.0, 0.0, 0.0], 0.0, 1.0);
    track.link_fwd = TrackLink {
        next_track: Some(0),
        next_is_reverse: false,
        boundary: BoundaryType::Interface,
        neighbor_domain: Some(3),
    };
    let solver = build_solver(vec![track]);
    let others: Vec<MocSolver> = (0..3)
        .map(|i| build_solver(vec![vacuum_track(0, [i as f64; 3], [1.0; 3], 0.0, 1.0)]))
        .collect();
    let mut solvers = vec![solver];
    solvers.extend(others);

    let err = DomainEnsemble::new(solvers, topology)
        .expect_err("lateral edge neighbor must be rejected");
    match err {
        TransportError::InvariantViolation(msg) => assert!(msg.contains("lateral-edge")),
        other => panic!("Unexpected error: {other:?}"),
    }
}

#[test]
fn test_exchange_rounds_are_bounded_by_buffer_capacity() {
    // 40 interface tracks with a 16-slot buffer drain in ⌈40/16⌉ = 3
    // pack rounds, exercised on the raw halo primitives.
    let topology = CartesianTopology::new([2, 1, 1]).expect("valid topology");
    let num_links = 40;
    let buffer_slots = 16;

    let mut src_tracks = Vec::new();
    let mut dest_tracks = Vec::new();
    for i in 0..num_links {
        let mut track = vacuum_track(i, [0.0; 3], [1.0, 0.0, 0.0], 0.0, 1.0);
        track.link_fwd = TrackLink {
            next_track: Some(i),
            next_is_reverse: false,
            boundary: BoundaryType::Interface,
            neighbor_domain: Some(1),
        };
        src_tracks.push(track);
        dest_tracks.push(vacuum_track(i, [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], 0.0, 1.0));
    }
    let src_store = TrackStore::new(src_tracks, true, NUM_GROUPS, 2).expect("valid store");
    let dest_store = TrackStore::new(dest_tracks, true, NUM_GROUPS, 2).expect("valid store");

    let mut src_halo =
        HaloState::build(0, &topology, &src_store, buffer_slots).expect("valid halo");
    let mut dest_halo =
        HaloState::build(1, &topology, &dest_store, buffer_slots).expect("valid halo");
    assert_eq!(src_halo.max_list_length(), num_links);

    let mut src_fluxes = TrackFluxes::new(num_links, NUM_GROUPS);
    let mut dest_fluxes = TrackFluxes::new(num_links, NUM_GROUPS);
    for i in 0..num_links {
        src_fluxes.set_boundary(i, TrackDirection::Forward, &[i as f32; NUM_GROUPS]);
    }

    let mut rounds = 0;
    let mut delivered = 0;
    loop {
        let messages = src_halo
            .pack_round(&src_store, &src_fluxes)
            .expect("pack succeeds");
        let empty = dest_halo
            .pack_round(&dest_store, &dest_fluxes)
            .expect("pack succeeds");
        assert!(empty.is_empty(), "destination has no interface tracks");
        if messages.is_empty() {
            break;
        }
        rounds += 1;
        for (dest, buffer) in messages {
            assert_eq!(dest, 1);
            dest_halo.receive(0, buffer).expect("receive succeeds");
        }
        delivered += dest_halo
            .unpack_inbox(&mut dest_fluxes)
            .expect("unpack succeeds");
    }

    assert_eq!(rounds, 3, "rounds must equal ceil(40/16)");
    assert_eq!(delivered, num_links as u64);
    for i in 0..num_links {
        assert_eq!(
            dest_fluxes.start_snapshot(i, TrackDirection::Forward),
            vec![i as f32; NUM_GROUPS]
        );
    }
}

/// Two domains closed into a periodic loop through their interfaces
/// reproduce the infinite-medium eigenvalue.
#[test]
fn test_two_domain_ensemble_reproduces_k_inf() {
    let topology = CartesianTopology::new([2, 1, 1]).expect("valid topology");

    let build_domain = |rank: usize| -> MocSolver {
        let mut materials = MaterialStore::new();
        materials
            .add(
                Material::new(
                    "fuel",
                    vec![1.0],
                    vec![0.7],
                    vec![0.84],
                    vec![1.0],
                    vec![0.3],
                )
                .expect("valid material"),
            )
            .expect("add material");
        let other = 1 - rank;
        let length = 10.0;
        let x0 = rank as f64 * length;
        let mut track = vacuum_track(0, [x0, 0.0, 0.0], [x0 + length, 0.0, 0.0], 0.0, 1.0);
        track.segments[0].length = length;
        track.link_fwd = TrackLink {
            next_track: Some(0),
            next_is_reverse: false,
            boundary: BoundaryType::Interface,
            neighbor_domain: Some(other),
        };
        track.link_bwd = TrackLink {
            next_track: Some(0),
            next_is_reverse: false,
            boundary: BoundaryType::Interface,
            neighbor_domain: Some(other),
        };
        let quadrature =
            Quadrature::new(QuadratureType::EqualWeight, 1, 2).expect("valid quadrature");
        let tracks = TrackStore::new(vec![track], true, 1, 2).expect("valid store");
        let volumes = tally_fsr_volumes(&tracks, &quadrature, 1);
        let fsrs = FsrStore::new(volumes, vec![0], &materials).expect("valid store");
        let config = RuntimeConfig {
            tolerance: 1.0e-6,
            max_iters: 400,
            ..RuntimeConfig::default()
        };
        MocSolver::new(config, materials, fsrs, tracks, quadrature).expect("valid solver")
    };

    let solvers = vec![build_domain(0), build_domain(1)];
    let mut ensemble = DomainEnsemble::new(solvers, topology).expect("valid ensemble");
    let result = ensemble.solve_eigenvalue().expect("solve succeeds");

    assert!(result.converged, "coupled domains must converge");
    assert!(
        (result.k_eff - 1.2).abs() < 2.0e-3,
        "ensemble k_eff {} vs analytic 1.2",
        result.k_eff
    );

    // Symmetric domains carry the same flux.
    let flux0 = ensemble.solver(0).fsrs().flux(0, 0);
    let flux1 = ensemble.solver(1).fsrs().flux(0, 0);
    assert!(
        (flux0 - flux1).abs() / flux0 < 1.0e-4,
        "domain fluxes diverged: {flux0} vs {flux1}"
    );

    // The global gather stitches both domains in rank order.
    let gathered = ensemble
        .gather_fluxes(&[(0, 0), (1, 0)])
        .expect("gather succeeds");
    assert!((gathered[[0, 0]] - flux0).abs() < 1e-15);
    assert!((gathered[[1, 0]] - flux1).abs() < 1e-15);

    let err = ensemble
        .gather_fluxes(&[(5, 0)])
        .expect_err("bad rank must fail");
    match err {
        TransportError::DomainError(msg) => assert!(msg.contains("rank")),
        other => panic!("Unexpected error: {other:?}"),
    }
}
