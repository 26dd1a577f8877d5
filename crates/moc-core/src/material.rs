// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — Material Store
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Multigroup cross-section data, read-only during a run.

use moc_types::error::{TransportError, TransportResult};

/// Multigroup cross sections for one material.
///
/// The scattering matrix is stored row-major as Σs[g_out · G + g_in],
/// matching the inner loop of the source builder which accumulates all
/// in-scattering contributions to one outgoing group at a time.
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    sigma_t: Vec<f64>,
    sigma_a: Vec<f64>,
    nu_sigma_f: Vec<f64>,
    chi: Vec<f64>,
    sigma_s: Vec<f64>,
    fissionable: bool,
    max_sigma_t: f64,
}

impl Material {
    pub fn new(
        name: &str,
        sigma_t: Vec<f64>,
        sigma_a: Vec<f64>,
        nu_sigma_f: Vec<f64>,
        chi: Vec<f64>,
        sigma_s: Vec<f64>,
    ) -> TransportResult<Self> {
        let num_groups = sigma_t.len();
        if num_groups == 0 {
            return Err(TransportError::ConfigError(format!(
                "material '{name}' must carry at least one energy group"
            )));
        }
        for (label, data) in [
            ("sigma_a", &sigma_a),
            ("nu_sigma_f", &nu_sigma_f),
            ("chi", &chi),
        ] {
            if data.len() != num_groups {
                return Err(TransportError::ConfigError(format!(
                    "material '{name}': {label} has {} entries, expected {num_groups}",
                    data.len()
                )));
            }
        }
        if sigma_s.len() != num_groups * num_groups {
            return Err(TransportError::ConfigError(format!(
                "material '{name}': scattering matrix has {} entries, expected {}",
                sigma_s.len(),
                num_groups * num_groups
            )));
        }
        if sigma_t.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(TransportError::ConfigError(format!(
                "material '{name}': sigma_t must be finite and > 0 in every group"
            )));
        }
        if sigma_a
            .iter()
            .chain(nu_sigma_f.iter())
            .chain(chi.iter())
            .chain(sigma_s.iter())
            .any(|v| !v.is_finite())
        {
            return Err(TransportError::ConfigError(format!(
                "material '{name}': cross sections must be finite"
            )));
        }

        let fissionable = nu_sigma_f.iter().any(|v| *v > 0.0);
        let max_sigma_t = sigma_t.iter().cloned().fold(0.0, f64::max);

        Ok(Material {
            name: name.to_string(),
            sigma_t,
            sigma_a,
            nu_sigma_f,
            chi,
            sigma_s,
            fissionable,
            max_sigma_t,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_groups(&self) -> usize {
        self.sigma_t.len()
    }

    #[inline]
    pub fn sigma_t(&self) -> &[f64] {
        &self.sigma_t
    }

    #[inline]
    pub fn sigma_a(&self) -> &[f64] {
        &self.sigma_a
    }

    #[inline]
    pub fn nu_sigma_f(&self) -> &[f64] {
        &self.nu_sigma_f
    }

    #[inline]
    pub fn chi(&self) -> &[f64] {
        &self.chi
    }

    /// Full scattering matrix, row-major [g_out · G + g_in].
    #[inline]
    pub fn sigma_s(&self) -> &[f64] {
        &self.sigma_s
    }

    /// Σs for scattering from `g_in` into `g_out`.
    #[inline]
    pub fn sigma_s_in_out(&self, g_in: usize, g_out: usize) -> f64 {
        self.sigma_s[g_out * self.num_groups() + g_in]
    }

    /// In-group (diagonal) scattering element for `group`.
    #[inline]
    pub fn sigma_s_diagonal(&self, group: usize) -> f64 {
        self.sigma_s[group * self.num_groups() + group]
    }

    pub fn is_fissionable(&self) -> bool {
        self.fissionable
    }

    /// Largest total cross section over all groups; used by the segment
    /// splitting criterion.
    #[inline]
    pub fn max_sigma_t(&self) -> f64 {
        self.max_sigma_t
    }
}

/// Registry of materials addressed by dense integer handles.
#[derive(Debug, Clone, Default)]
pub struct MaterialStore {
    materials: Vec<Material>,
}

impl MaterialStore {
    pub fn new() -> Self {
        MaterialStore {
            materials: Vec::new(),
        }
    }

    /// Register a material; all materials must share the group count of
    /// the first one added.
    pub fn add(&mut self, material: Material) -> TransportResult<usize> {
        if let Some(first) = self.materials.first() {
            if material.num_groups() != first.num_groups() {
                return Err(TransportError::ConfigError(format!(
                    "material '{}' has {} groups but the store holds {}-group data",
                    material.name(),
                    material.num_groups(),
                    first.num_groups()
                )));
            }
        }
        self.materials.push(material);
        Ok(self.materials.len() - 1)
    }

    #[inline]
    pub fn get(&self, id: usize) -> &Material {
        &self.materials[id]
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn num_groups(&self) -> usize {
        self.materials.first().map_or(0, Material::num_groups)
    }
}
