//! Product quadrature over azimuthal and polar angle.
//!
//! The sweep consumes the combined weight w(a, p) = 4π · ω_a · δ_a ·
//! ω_p · δ_p, where the ω sum to one over the full angular range and the
//! δ are the lateral track spacings supplied by the track generator.
//! With that convention the track-tallied region volume is
//! Σ (w/4π) · ℓ, which is the normalization the add-source step assumes.

use ndarray::Array2;

use moc_types::error::{TransportError, TransportResult};
use moc_types::state::QuadratureType;

pub const FOUR_PI: f64 = 4.0 * std::f64::consts::PI;

/// Azimuthal × polar quadrature with per-angle spacings.
#[derive(Debug, Clone)]
pub struct Quadrature {
    num_azim: usize,
    num_polar: usize,
    azim_weights: Vec<f64>,
    azim_spacings: Vec<f64>,
    polar_weights: Array2<f64>,
    polar_spacings: Array2<f64>,
    sin_thetas: Array2<f64>,
    total_weights: Array2<f64>,
}

impl Quadrature {
    /// Build a quadrature with unit track spacings. `num_azim` counts
    /// azimuthal angles over [0, 2π); `num_polar` counts polar angles
    /// over (0, π) and must be even so each direction owns a half-space.
    pub fn new(
        quadrature_type: QuadratureType,
        num_azim: usize,
        num_polar: usize,
    ) -> TransportResult<Self> {
        if num_azim == 0 {
            return Err(TransportError::ConfigError(
                "quadrature requires num_azim > 0".to_string(),
            ));
        }
        if num_polar == 0 || num_polar % 2 != 0 {
            return Err(TransportError::ConfigError(format!(
                "quadrature requires a positive even num_polar, got {num_polar}"
            )));
        }

        let azim_weights = vec![1.0 / num_azim as f64; num_azim];
        let azim_spacings = vec![1.0; num_azim];

        let (mus, weights) = match quadrature_type {
            QuadratureType::GaussLegendre => gauss_legendre_nodes(num_polar),
            QuadratureType::EqualWeight => equal_weight_nodes(num_polar),
            QuadratureType::EqualAngle => equal_angle_nodes(num_polar),
        };

        let mut polar_weights = Array2::zeros((num_azim, num_polar));
        let polar_spacings = Array2::from_elem((num_azim, num_polar), 1.0);
        let mut sin_thetas = Array2::zeros((num_azim, num_polar));
        for a in 0..num_azim {
            for p in 0..num_polar {
                polar_weights[[a, p]] = weights[p];
                sin_thetas[[a, p]] = (1.0 - mus[p] * mus[p]).sqrt().max(1.0e-12);
            }
        }

        let mut quadrature = Quadrature {
            num_azim,
            num_polar,
            azim_weights,
            azim_spacings,
            polar_weights,
            polar_spacings,
            sin_thetas,
            total_weights: Array2::zeros((num_azim, num_polar)),
        };
        quadrature.precompute_weights();
        Ok(quadrature)
    }

    /// Overwrite all track spacings with uniform values and refresh the
    /// combined weights.
    pub fn set_uniform_spacings(&mut self, azim_spacing: f64, polar_spacing: f64) {
        for s in self.azim_spacings.iter_mut() {
            *s = azim_spacing;
        }
        self.polar_spacings.fill(polar_spacing);
        self.precompute_weights();
    }

    fn precompute_weights(&mut self) {
        for a in 0..self.num_azim {
            for p in 0..self.num_polar {
                self.total_weights[[a, p]] = FOUR_PI
                    * self.azim_weights[a]
                    * self.azim_spacings[a]
                    * self.polar_weights[[a, p]]
                    * self.polar_spacings[[a, p]];
            }
        }
    }

    pub fn num_azim(&self) -> usize {
        self.num_azim
    }

    pub fn num_polar(&self) -> usize {
        self.num_polar
    }

    /// Combined sweep weight w(a, p).
    #[inline]
    pub fn weight(&self, azim: usize, polar: usize) -> f64 {
        self.total_weights[[azim, polar]]
    }

    #[inline]
    pub fn sin_theta(&self, azim: usize, polar: usize) -> f64 {
        self.sin_thetas[[azim, polar]]
    }

    pub fn azim_spacing(&self, azim: usize) -> f64 {
        self.azim_spacings[azim]
    }

    pub fn polar_spacing(&self, azim: usize, polar: usize) -> f64 {
        self.polar_spacings[[azim, polar]]
    }

    /// Track cross-section weight used by volume tallies: w/4π.
    pub fn volume_weight(&self, azim: usize, polar: usize) -> f64 {
        self.total_weights[[azim, polar]] / FOUR_PI
    }
}

/// Gauss–Legendre nodes and weights on μ ∈ (−1, 1), weights normalized
/// to sum to one.
fn gauss_legendre_nodes(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = Vec::with_capacity(n);
    for i in 0..n {
        // Newton iteration from the Chebyshev initial guess.
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (pn, dpn) = legendre_with_derivative(n, x);
            let dx = pn / dpn;
            x -= dx;
            if dx.abs() < 1.0e-15 {
                break;
            }
        }
        let (_, dpn) = legendre_with_derivative(n, x);
        // Normalize from the natural weight sum of 2 to a sum of 1.
        nodes.push((x, 1.0 / ((1.0 - x * x) * dpn * dpn)));
    }
    nodes.sort_by(|a, b| a.0.total_cmp(&b.0));
    nodes.into_iter().unzip()
}

fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// Equal-weight nodes: uniform bins in μ with midpoint abscissae.
fn equal_weight_nodes(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mus = (0..n)
        .map(|p| -1.0 + 2.0 * (p as f64 + 0.5) / n as f64)
        .collect();
    let weights = vec![1.0 / n as f64; n];
    (mus, weights)
}

/// Equal-angle nodes: uniform bins in θ, weights ∝ sin θ · Δθ.
fn equal_angle_nodes(n: usize) -> (Vec<f64>, Vec<f64>) {
    let dtheta = std::f64::consts::PI / n as f64;
    let thetas: Vec<f64> = (0..n).map(|p| (p as f64 + 0.5) * dtheta).collect();
    let raw: Vec<f64> = thetas.iter().map(|t| t.sin() * dtheta).collect();
    let total: f64 = raw.iter().sum();
    let mus = thetas.iter().map(|t| t.cos()).collect();
    let weights = raw.iter().map(|w| w / total).collect();
    (mus, weights)
}
