//! Reduced source construction for the flat-source approximation.
//!
//! Per region and outgoing group:
//!   q = (χ·fission/k + in-scatter + fixed) / 4π
//! Negative sources are counted every iteration; during the first 30
//! outer iterations they are clamped to a vanishing positive value,
//! afterwards preserved so a physically negative scattering matrix can
//! be handled by the transport stabilizer instead.

use moc_math::reduce::pairwise_sum;
use moc_types::error::{TransportError, TransportResult};

use crate::material::MaterialStore;
use crate::region::{FsrStore, FLUX_EPSILON};

const ONE_OVER_FOUR_PI: f64 = 1.0 / (4.0 * std::f64::consts::PI);

/// Outer iterations during which negative reduced sources are clamped.
pub const SOURCE_CLAMP_ITERATIONS: usize = 30;

/// Rebuild every reduced source from the current scalar flux estimate.
/// Returns the number of negative sources encountered locally.
pub fn compute_fsr_sources(
    fsrs: &mut FsrStore,
    materials: &MaterialStore,
    k_eff: f64,
    iteration: usize,
) -> TransportResult<u64> {
    if !k_eff.is_finite() || k_eff <= 0.0 {
        return Err(TransportError::InvariantViolation(format!(
            "source update requires finite k_eff > 0, got {k_eff}"
        )));
    }

    let num_groups = fsrs.num_groups();
    let mut group_scratch = vec![0.0; num_groups];
    let mut flux = vec![0.0; num_groups];
    let mut num_negative = 0_u64;

    for r in 0..fsrs.num_fsrs() {
        let material = materials.get(fsrs.material_id(r));
        for g in 0..num_groups {
            flux[g] = fsrs.flux(r, g);
        }

        let mut fission_source = 0.0;
        if material.is_fissionable() {
            let nu_sigma_f = material.nu_sigma_f();
            for g in 0..num_groups {
                group_scratch[g] = flux[g] * nu_sigma_f[g];
            }
            fission_source = pairwise_sum(&group_scratch) / k_eff;
        }

        let chi = material.chi();
        let sigma_s = material.sigma_s();
        for g_out in 0..num_groups {
            let first = g_out * num_groups;
            for g_in in 0..num_groups {
                group_scratch[g_in] = sigma_s[first + g_in] * flux[g_in];
            }
            let scatter_source = pairwise_sum(&group_scratch);

            let mut reduced = fission_source * chi[g_out];
            reduced += scatter_source + fsrs.fixed_source(r, g_out);
            reduced *= ONE_OVER_FOUR_PI;

            if reduced < 0.0 {
                num_negative += 1;
                if iteration < SOURCE_CLAMP_ITERATIONS {
                    reduced = FLUX_EPSILON;
                }
            }
            fsrs.reduced_sources_mut()[[r, g_out]] = reduced;
        }
    }

    Ok(num_negative)
}
