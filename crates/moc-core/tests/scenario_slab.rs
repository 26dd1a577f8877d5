// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Fixed-Source Slab Scenario
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Two-group vacuum-bounded slab driven by a uniform fixed source:
//! symmetry, spectral coupling, infinite-medium bounds, and the global
//! neutron balance at convergence.

use moc_core::material::{Material, MaterialStore};
use moc_core::region::FsrStore;
use moc_core::solver::MocSolver;
use moc_core::track::{tally_fsr_volumes, Segment, Track, TrackLink, TrackStore};
use moc_math::quadrature::Quadrature;
use moc_types::config::RuntimeConfig;
use moc_types::state::{QuadratureType, ResidualType};

const NUM_FSRS: usize = 100;
const SLAB_WIDTH: f64 = 1.0;

/// Σt = (1, 2), down-scatter 0.3, in-group (0.5, 1.0); Σa is the
/// removal-consistent (0.2, 1.0) so absorption closes the balance.
fn slab_materials() -> MaterialStore {
    let mut materials = MaterialStore::new();
    materials
        .add(
            Material::new(
                "slab",
                vec![1.0, 2.0],
                vec![0.2, 1.0],
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![0.5, 0.0, 0.3, 1.0],
            )
            .expect("valid material"),
        )
        .expect("add material");
    materials
}

fn slab_solver() -> MocSolver {
    let materials = slab_materials();
    let quadrature =
        Quadrature::new(QuadratureType::EqualWeight, 1, 2).expect("valid quadrature");

    let cell_width = SLAB_WIDTH / NUM_FSRS as f64;
    let segments = (0..NUM_FSRS)
        .map(|r| Segment {
            length: cell_width,
            fsr_id: r,
            material_id: 0,
            cmfd_surface_fwd: -1,
            cmfd_surface_bwd: -1,
            starting_position: [r as f64 * cell_width, 0.0, 0.0],
        })
        .collect();
    let track = Track {
        uid: 0,
        start: [0.0, 0.0, 0.0],
        end: [SLAB_WIDTH, 0.0, 0.0],
        azim_index: 0,
        polar_index: 0,
        phi: 0.0,
        theta: std::f64::consts::FRAC_PI_2,
        segments,
        link_fwd: TrackLink::vacuum(),
        link_bwd: TrackLink::vacuum(),
    };
    let tracks = TrackStore::new(vec![track], true, 2, 2).expect("valid store");
    let volumes = tally_fsr_volumes(&tracks, &quadrature, NUM_FSRS);
    let fsrs = FsrStore::new(volumes, vec![0; NUM_FSRS], &materials).expect("valid store");

    let config = RuntimeConfig {
        tolerance: 1.0e-6,
        max_iters: 500,
        residual_type: ResidualType::ScalarFlux,
        ..RuntimeConfig::default()
    };
    let mut solver =
        MocSolver::new(config, materials, fsrs, tracks, quadrature).expect("valid solver");
    for r in 0..NUM_FSRS {
        solver.set_fixed_source(r, 0, 1.0).expect("fixed source");
    }
    solver
}

#[test]
fn test_slab_converges_symmetric_and_bounded() {
    let mut solver = slab_solver();
    let result = solver.solve_fixed_source().expect("solve succeeds");
    assert!(result.converged, "slab must converge: residual {}", result.residual);

    let flux = solver.get_fluxes();

    // Mirror symmetry of the geometry and source.
    for r in 0..NUM_FSRS / 2 {
        for g in 0..2 {
            let left = flux[[r, g]];
            let right = flux[[NUM_FSRS - 1 - r, g]];
            assert!(
                (left - right).abs() / left.max(right) < 1.0e-4,
                "asymmetry at FSR {r} group {g}: {left} vs {right}"
            );
        }
    }

    // The flux peaks at the center and decays toward the vacuum edges.
    let center = NUM_FSRS / 2;
    for g in 0..2 {
        assert!(
            flux[[center, g]] > flux[[0, g]],
            "group {g} must peak away from the vacuum boundary"
        );
    }

    // Infinite-medium bounds: φ1∞ = 2, φ2∞ = 0.6.
    for r in 0..NUM_FSRS {
        assert!(flux[[r, 0]] > 0.0 && flux[[r, 0]] < 2.0, "φ1 out of bounds at {r}");
        assert!(flux[[r, 1]] > 0.0 && flux[[r, 1]] < 0.6, "φ2 out of bounds at {r}");
    }

    // Spectral coupling at the center: the down-scatter ratio is
    // bounded by the infinite-medium value Σs12/(Σt2 − Σs22) = 0.3.
    let ratio = flux[[center, 1]] / flux[[center, 0]];
    assert!(
        ratio > 0.05 && ratio < 0.45,
        "group coupling ratio {ratio} outside physical bounds"
    );
}

#[test]
fn test_slab_neutron_balance_closes() {
    let mut solver = slab_solver();
    let result = solver.solve_fixed_source().expect("solve succeeds");
    assert!(result.converged);

    let flux = solver.get_fluxes();
    let mut source_rate = 0.0;
    let mut absorption_rate = 0.0;
    for r in 0..NUM_FSRS {
        let volume = solver.fsrs().volume(r);
        source_rate += volume * 1.0;
        absorption_rate += volume * (0.2 * flux[[r, 0]] + 1.0 * flux[[r, 1]]);
    }
    let leakage_rate = solver.fluxes().total_leakage();

    assert!(leakage_rate > 0.0, "a vacuum-bounded slab must leak");
    let imbalance = (source_rate - absorption_rate - leakage_rate).abs() / source_rate;
    assert!(
        imbalance < 1.0e-2,
        "balance violated: S = {source_rate}, A = {absorption_rate}, L = {leakage_rate}"
    );
}
