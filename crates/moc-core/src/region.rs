// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Flat Source Region Store
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-region state: volumes, scalar fluxes, sources, tally locks.
//!
//! Scalar fluxes live behind one mutex per region — the exclusive-access
//! token serializing tally accumulation during the parallel sweep. All
//! other per-region fields are only touched by the serial outer-iteration
//! phases and use plain dense arrays.

use log::{info, warn};
use ndarray::Array2;
use parking_lot::Mutex;

use moc_math::reduce::pairwise_sum;
use moc_types::error::{TransportError, TransportResult};

use crate::material::MaterialStore;

/// Clamp value for negative scalar fluxes and sources.
pub const FLUX_EPSILON: f64 = 1.0e-20;

const FOUR_PI: f64 = 4.0 * std::f64::consts::PI;

#[derive(Debug)]
pub struct FsrStore {
    num_groups: usize,
    volumes: Vec<f64>,
    material_ids: Vec<usize>,
    scalar_flux: Vec<Mutex<Vec<f64>>>,
    old_scalar_flux: Array2<f64>,
    reduced_sources: Array2<f64>,
    fixed_sources: Array2<f64>,
    stabilizing_flux: Option<Array2<f64>>,
    num_fissionable: usize,
}

impl FsrStore {
    pub fn new(
        volumes: Vec<f64>,
        material_ids: Vec<usize>,
        materials: &MaterialStore,
    ) -> TransportResult<Self> {
        if volumes.len() != material_ids.len() {
            return Err(TransportError::ConfigError(format!(
                "FSR store requires one material per region: {} volumes vs {} materials",
                volumes.len(),
                material_ids.len()
            )));
        }
        if volumes.is_empty() {
            return Err(TransportError::ConfigError(
                "FSR store requires at least one region".to_string(),
            ));
        }
        if volumes.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(TransportError::ConfigError(
                "FSR volumes must be finite and > 0".to_string(),
            ));
        }
        for (r, id) in material_ids.iter().enumerate() {
            if *id >= materials.len() {
                return Err(TransportError::ConfigError(format!(
                    "FSR {r} references material {id} but only {} materials exist",
                    materials.len()
                )));
            }
        }
        let num_groups = materials.num_groups();
        if num_groups == 0 {
            return Err(TransportError::ConfigError(
                "FSR store requires a populated material store".to_string(),
            ));
        }

        let num_fsrs = volumes.len();
        let num_fissionable = material_ids
            .iter()
            .filter(|id| materials.get(**id).is_fissionable())
            .count();

        let size_mb = (3 * num_fsrs * num_groups * std::mem::size_of::<f64>()) as f64 / 1.0e6;
        info!("Scalar flux and source storage per domain = {size_mb:6.2} MB");

        let scalar_flux = (0..num_fsrs)
            .map(|_| Mutex::new(vec![0.0; num_groups]))
            .collect();

        Ok(FsrStore {
            num_groups,
            volumes,
            material_ids,
            scalar_flux,
            old_scalar_flux: Array2::zeros((num_fsrs, num_groups)),
            reduced_sources: Array2::zeros((num_fsrs, num_groups)),
            fixed_sources: Array2::zeros((num_fsrs, num_groups)),
            stabilizing_flux: None,
            num_fissionable,
        })
    }

    pub fn num_fsrs(&self) -> usize {
        self.volumes.len()
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_fissionable(&self) -> usize {
        self.num_fissionable
    }

    #[inline]
    pub fn volume(&self, fsr: usize) -> f64 {
        self.volumes[fsr]
    }

    #[inline]
    pub fn material_id(&self, fsr: usize) -> usize {
        self.material_ids[fsr]
    }

    #[inline]
    pub fn reduced_source(&self, fsr: usize, group: usize) -> f64 {
        self.reduced_sources[[fsr, group]]
    }

    pub fn reduced_sources_mut(&mut self) -> &mut Array2<f64> {
        &mut self.reduced_sources
    }

    pub fn fixed_source(&self, fsr: usize, group: usize) -> f64 {
        self.fixed_sources[[fsr, group]]
    }

    pub fn old_flux(&self, fsr: usize, group: usize) -> f64 {
        self.old_scalar_flux[[fsr, group]]
    }

    /// Current scalar flux of one region and group.
    pub fn flux(&self, fsr: usize, group: usize) -> f64 {
        self.scalar_flux[fsr].lock()[group]
    }

    /// Overwrite the scalar flux of one region and group.
    pub fn set_flux(&mut self, fsr: usize, group: usize, value: f64) {
        self.scalar_flux[fsr].get_mut()[group] = value;
    }

    /// Snapshot of the full scalar flux field.
    pub fn flux_snapshot(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.num_fsrs(), self.num_groups));
        for (r, row) in self.scalar_flux.iter().enumerate() {
            let guard = row.lock();
            for g in 0..self.num_groups {
                out[[r, g]] = guard[g];
            }
        }
        out
    }

    /// Serialize a tally contribution into one region under its lock.
    #[inline]
    pub fn add_to_flux(&self, fsr: usize, deltas: &[f64]) {
        let mut guard = self.scalar_flux[fsr].lock();
        for (phi, delta) in guard.iter_mut().zip(deltas.iter()) {
            *phi += *delta;
        }
    }

    /// Set every scalar flux to `value`.
    pub fn flatten_fluxes(&mut self, value: f64) {
        for row in self.scalar_flux.iter_mut() {
            for phi in row.get_mut().iter_mut() {
                *phi = value;
            }
        }
    }

    /// Copy the current scalar flux into the previous-iteration buffer.
    pub fn store_fluxes(&mut self) {
        for (r, row) in self.scalar_flux.iter_mut().enumerate() {
            let flux = row.get_mut();
            for g in 0..self.num_groups {
                self.old_scalar_flux[[r, g]] = flux[g];
            }
        }
    }

    /// Scale all scalar fluxes by a common factor.
    pub fn scale_fluxes(&mut self, factor: f64) {
        for row in self.scalar_flux.iter_mut() {
            for phi in row.get_mut().iter_mut() {
                *phi *= factor;
            }
        }
    }

    /// Assign a fixed source to a region and group (group index 0-based).
    pub fn set_fixed_source(
        &mut self,
        fsr: usize,
        group: usize,
        source: f64,
    ) -> TransportResult<()> {
        if fsr >= self.num_fsrs() {
            return Err(TransportError::ConfigError(format!(
                "cannot set fixed source for FSR {fsr} with only {} regions",
                self.num_fsrs()
            )));
        }
        if group >= self.num_groups {
            return Err(TransportError::ConfigError(format!(
                "cannot set fixed source for group {group} in a {}-group problem",
                self.num_groups
            )));
        }
        if !source.is_finite() {
            return Err(TransportError::ConfigError(format!(
                "fixed source for FSR {fsr} group {group} must be finite, got {source}"
            )));
        }
        let old = self.fixed_sources[[fsr, group]];
        if old.abs() > f64::EPSILON {
            warn!("Overriding fixed source {old} in FSR {fsr} group {group} with {source}");
        }
        self.fixed_sources[[fsr, group]] = source;
        Ok(())
    }

    /// Lazily allocated damping buffer for the transport stabilizer.
    pub fn stabilizing_flux_mut(&mut self) -> &mut Array2<f64> {
        let shape = (self.volumes.len(), self.num_groups);
        self.stabilizing_flux
            .get_or_insert_with(|| Array2::zeros(shape))
    }

    /// Volume-integrated total fission production Σ_r V_r Σ_g νΣf φ.
    pub fn local_fission_source(&self, materials: &MaterialStore) -> f64 {
        let mut region_sources = vec![0.0; self.num_fsrs()];
        let mut group_scratch = vec![0.0; self.num_groups];
        for (r, region_source) in region_sources.iter_mut().enumerate() {
            let material = materials.get(self.material_ids[r]);
            let nu_sigma_f = material.nu_sigma_f();
            let flux = self.scalar_flux[r].lock();
            for g in 0..self.num_groups {
                group_scratch[g] = nu_sigma_f[g] * flux[g] * self.volumes[r];
            }
            *region_source = pairwise_sum(&group_scratch);
        }
        pairwise_sum(&region_sources)
    }

    /// Volume-integrated, energy-integrated nu-fission rate per region.
    pub fn compute_fission_rates(&self, materials: &MaterialStore) -> Vec<f64> {
        let mut rates = vec![0.0; self.num_fsrs()];
        for (r, rate) in rates.iter_mut().enumerate() {
            let nu_sigma_f = materials.get(self.material_ids[r]).nu_sigma_f();
            let flux = self.scalar_flux[r].lock();
            for g in 0..self.num_groups {
                *rate += nu_sigma_f[g] * flux[g] * self.volumes[r];
            }
        }
        rates
    }

    /// Final step of the transport sweep: divide the tallied flux by
    /// Σt·V and add the reduced source contribution. Negative results are
    /// clamped to a vanishing positive value and counted.
    pub fn add_source_to_scalar_flux(&mut self, materials: &MaterialStore) -> u64 {
        let mut num_negative = 0_u64;
        for (r, row) in self.scalar_flux.iter_mut().enumerate() {
            let volume = self.volumes[r];
            let sigma_t = materials.get(self.material_ids[r]).sigma_t();
            let flux = row.get_mut();
            for g in 0..self.num_groups {
                flux[g] /= sigma_t[g] * volume;
                flux[g] += FOUR_PI * self.reduced_sources[[r, g]] / sigma_t[g];
                if flux[g] < 0.0 {
                    flux[g] = FLUX_EPSILON;
                    num_negative += 1;
                }
            }
        }
        num_negative
    }
}
