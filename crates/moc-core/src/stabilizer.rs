//! Transport stabilization: damped flux updates that keep the source
//! iteration contractive when in-group scattering is negative.
//!
//! Each variant computes a stabilizing flux from the pre-sweep scalar
//! flux and folds it back in after the source has been added, dividing
//! by the same factor used to form it so the converged solution is
//! unbiased.

use moc_types::state::StabilizationType;

use crate::material::MaterialStore;
use crate::region::FsrStore;

/// Compute the stabilizing flux from the current (pre-sweep) scalar flux.
pub fn compute_stabilizing_flux(
    fsrs: &mut FsrStore,
    materials: &MaterialStore,
    stabilization: StabilizationType,
    factor: f64,
) {
    let num_groups = fsrs.num_groups();
    let num_fsrs = fsrs.num_fsrs();

    match stabilization {
        StabilizationType::None => {}

        StabilizationType::Diagonal => {
            for r in 0..num_fsrs {
                let material_id = fsrs.material_id(r);
                for g in 0..num_groups {
                    let material = materials.get(material_id);
                    let sigma_s = material.sigma_s_diagonal(g);
                    if sigma_s < 0.0 {
                        let sigma_t = material.sigma_t()[g];
                        let value = -fsrs.flux(r, g) * factor * sigma_s / sigma_t;
                        fsrs.stabilizing_flux_mut()[[r, g]] = value;
                    } else {
                        fsrs.stabilizing_flux_mut()[[r, g]] = 0.0;
                    }
                }
            }
        }

        StabilizationType::Yamamoto => {
            for g in 0..num_groups {
                let max_ratio = max_scattering_ratio(fsrs, materials, g) * factor;
                for r in 0..num_fsrs {
                    let value = fsrs.flux(r, g) * max_ratio;
                    fsrs.stabilizing_flux_mut()[[r, g]] = value;
                }
            }
        }

        StabilizationType::Global => {
            let mult_factor = 1.0 / factor - 1.0;
            for r in 0..num_fsrs {
                for g in 0..num_groups {
                    let value = mult_factor * fsrs.flux(r, g);
                    fsrs.stabilizing_flux_mut()[[r, g]] = value;
                }
            }
        }
    }
}

/// Fold the stabilizing flux into the post-sweep scalar flux.
pub fn stabilize_flux(
    fsrs: &mut FsrStore,
    materials: &MaterialStore,
    stabilization: StabilizationType,
    factor: f64,
) {
    let num_groups = fsrs.num_groups();
    let num_fsrs = fsrs.num_fsrs();

    match stabilization {
        StabilizationType::None => {}

        StabilizationType::Diagonal => {
            for r in 0..num_fsrs {
                let material = materials.get(fsrs.material_id(r));
                for g in 0..num_groups {
                    let sigma_s = material.sigma_s_diagonal(g);
                    if sigma_s < 0.0 {
                        let sigma_t = material.sigma_t()[g];
                        let delta = fsrs.stabilizing_flux_mut()[[r, g]];
                        let damped =
                            (fsrs.flux(r, g) + delta) / (1.0 - factor * sigma_s / sigma_t);
                        fsrs.set_flux(r, g, damped);
                    }
                }
            }
        }

        StabilizationType::Yamamoto => {
            for g in 0..num_groups {
                let max_ratio = max_scattering_ratio(fsrs, materials, g) * factor;
                for r in 0..num_fsrs {
                    let delta = fsrs.stabilizing_flux_mut()[[r, g]];
                    let damped = (fsrs.flux(r, g) + delta) / (1.0 + max_ratio);
                    fsrs.set_flux(r, g, damped);
                }
            }
        }

        StabilizationType::Global => {
            for r in 0..num_fsrs {
                for g in 0..num_groups {
                    let delta = fsrs.stabilizing_flux_mut()[[r, g]];
                    let damped = (fsrs.flux(r, g) + delta) * factor;
                    fsrs.set_flux(r, g, damped);
                }
            }
        }
    }
}

/// Largest |Σs_gg / Σt_g| over all regions for one group.
fn max_scattering_ratio(fsrs: &FsrStore, materials: &MaterialStore, group: usize) -> f64 {
    let mut max_ratio = 0.0_f64;
    for r in 0..fsrs.num_fsrs() {
        let material = materials.get(fsrs.material_id(r));
        let ratio = (material.sigma_s_diagonal(group) / material.sigma_t()[group]).abs();
        max_ratio = max_ratio.max(ratio);
    }
    max_ratio
}
