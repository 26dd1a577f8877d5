//! The outer eigenvalue driver.
//!
//! One Picard iteration runs: normalize → sources → sweep → add source →
//! stabilize → CMFD → residual → k_eff → convergence check. The same
//! loop drives a single domain and a decomposed ensemble; every global
//! quantity (fission source, reaction rates, residual parts, negative
//! counts) is a sum of per-domain contributions, reduced across domains
//! exactly where a distributed run would place its allreduce calls.

use std::time::Instant;

use log::{debug, info, warn};
use ndarray::Array2;

use moc_math::quadrature::Quadrature;
use moc_math::reduce::pairwise_sum;
use moc_types::config::RuntimeConfig;
use moc_types::error::{TransportError, TransportResult};
use moc_types::state::{
    BoundaryType, IterationRecord, ResidualType, SolveResult, StabilizationType, TrackDirection,
};

use crate::cmfd::CmfdBridge;
use crate::domain::{
    exchange_interface_fluxes, CartesianTopology, FluxSlot, HaloState, TRACKS_PER_BUFFER,
};
use crate::material::MaterialStore;
use crate::region::FsrStore;
use crate::source::{compute_fsr_sources, SOURCE_CLAMP_ITERATIONS};
use crate::stabilizer::{compute_stabilizing_flux, stabilize_flux};
use crate::sweep::{tally_starting_currents, transport_sweep, ExpEvaluatorSet, SweepContext};
use crate::track::{TrackFluxes, TrackStore};

/// What the outer iteration solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Fission-source iteration for k_eff and the flux mode.
    Eigenvalue,
    /// Flux response to fixed sources; k_eff is left at unity.
    FixedSource,
}

/// Method-of-characteristics transport solver for one spatial domain.
pub struct MocSolver {
    config: RuntimeConfig,
    materials: MaterialStore,
    fsrs: FsrStore,
    tracks: TrackStore,
    fluxes: TrackFluxes,
    quadrature: Quadrature,
    exp_evaluators: ExpEvaluatorSet,
    cmfd: Option<Box<dyn CmfdBridge>>,
    pool: rayon::ThreadPool,
    k_eff: f64,
    reference_flux: Option<Array2<f64>>,
    halo: Option<HaloState>,
}

impl MocSolver {
    pub fn new(
        config: RuntimeConfig,
        materials: MaterialStore,
        fsrs: FsrStore,
        tracks: TrackStore,
        quadrature: Quadrature,
    ) -> TransportResult<Self> {
        config.validate()?;

        if materials.num_groups() != tracks.num_groups()
            || fsrs.num_groups() != tracks.num_groups()
        {
            return Err(TransportError::ConfigError(format!(
                "group count mismatch: materials {}, regions {}, tracks {}",
                materials.num_groups(),
                fsrs.num_groups(),
                tracks.num_groups()
            )));
        }
        if quadrature.num_polar() != tracks.num_polar() {
            return Err(TransportError::ConfigError(format!(
                "quadrature carries {} polar angles but tracks expect {}",
                quadrature.num_polar(),
                tracks.num_polar()
            )));
        }
        for (t, track) in tracks.iter().enumerate() {
            if track.azim_index >= quadrature.num_azim()
                || track.polar_index >= quadrature.num_polar()
            {
                return Err(TransportError::ConfigError(format!(
                    "track {t} carries angle indexes ({}, {}) outside the quadrature",
                    track.azim_index, track.polar_index
                )));
            }
            for segment in &track.segments {
                if segment.fsr_id >= fsrs.num_fsrs() {
                    return Err(TransportError::ConfigError(format!(
                        "track {t} crosses FSR {} but only {} regions exist",
                        segment.fsr_id,
                        fsrs.num_fsrs()
                    )));
                }
                if segment.material_id >= materials.len() {
                    return Err(TransportError::ConfigError(format!(
                        "track {t} references material {} but only {} materials exist",
                        segment.material_id,
                        materials.len()
                    )));
                }
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .map_err(|e| {
                TransportError::AllocationError(format!("could not build worker pool: {e}"))
            })?;

        let exp_evaluators = ExpEvaluatorSet::new(&quadrature)?;
        let fluxes = TrackFluxes::new(tracks.len(), tracks.fluxes_per_track());

        Ok(MocSolver {
            config,
            materials,
            fsrs,
            tracks,
            fluxes,
            quadrature,
            exp_evaluators,
            cmfd: None,
            pool,
            k_eff: 1.0,
            reference_flux: None,
            halo: None,
        })
    }

    /// Attach a CMFD acceleration bridge. The balance form of the k_eff
    /// update relies on the vacuum leakage tally, which does not exist
    /// with a bridge attached, so that combination is rejected here.
    pub fn set_cmfd(&mut self, bridge: Box<dyn CmfdBridge>) -> TransportResult<()> {
        if !self.config.keff_from_fission_rates {
            return Err(TransportError::ConfigError(
                "balance k_eff requires the vacuum leakage tally, which is unavailable \
                 with a CMFD bridge attached"
                    .to_string(),
            ));
        }
        self.cmfd = Some(bridge);
        Ok(())
    }

    /// Join a domain decomposition: build the halo neighbor lists and
    /// exchange buffers for this rank.
    pub fn enable_halo(
        &mut self,
        rank: usize,
        topology: &CartesianTopology,
    ) -> TransportResult<()> {
        self.halo = Some(HaloState::build(
            rank,
            topology,
            &self.tracks,
            TRACKS_PER_BUFFER,
        )?);
        Ok(())
    }

    pub fn set_fixed_source(
        &mut self,
        fsr: usize,
        group: usize,
        source: f64,
    ) -> TransportResult<()> {
        self.fsrs.set_fixed_source(fsr, group, source)
    }

    /// Pin the residual reference to a fixed flux instead of the
    /// previous iterate.
    pub fn set_reference_flux(&mut self, reference: Array2<f64>) -> TransportResult<()> {
        if reference.dim() != (self.fsrs.num_fsrs(), self.fsrs.num_groups()) {
            return Err(TransportError::ConfigError(format!(
                "reference flux shape {:?} does not match ({}, {})",
                reference.dim(),
                self.fsrs.num_fsrs(),
                self.fsrs.num_groups()
            )));
        }
        self.reference_flux = Some(reference);
        Ok(())
    }

    pub fn k_eff(&self) -> f64 {
        self.k_eff
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn fsrs(&self) -> &FsrStore {
        &self.fsrs
    }

    pub fn fsrs_mut(&mut self) -> &mut FsrStore {
        &mut self.fsrs
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn fluxes(&self) -> &TrackFluxes {
        &self.fluxes
    }

    pub fn fluxes_mut(&mut self) -> &mut TrackFluxes {
        &mut self.fluxes
    }

    pub fn quadrature(&self) -> &Quadrature {
        &self.quadrature
    }

    pub fn halo(&self) -> Option<&HaloState> {
        self.halo.as_ref()
    }

    /// Scalar flux snapshot for post-processing.
    pub fn get_fluxes(&self) -> Array2<f64> {
        self.fsrs.flux_snapshot()
    }

    /// Volume-integrated nu-fission rate per region.
    pub fn compute_fsr_fission_rates(&self) -> Vec<f64> {
        self.fsrs.compute_fission_rates(&self.materials)
    }

    pub fn solve_eigenvalue(&mut self) -> TransportResult<SolveResult> {
        run_outer(std::slice::from_mut(self), SolveMode::Eigenvalue)
    }

    pub fn solve_fixed_source(&mut self) -> TransportResult<SolveResult> {
        run_outer(std::slice::from_mut(self), SolveMode::FixedSource)
    }

    // ── Per-iteration pieces, composed by `run_outer` ────────────────

    fn prepare_solve(&mut self) -> TransportResult<()> {
        if !self.config.keff_from_fission_rates && self.cmfd.is_some() {
            return Err(TransportError::ConfigError(
                "balance k_eff cannot be combined with a CMFD bridge".to_string(),
            ));
        }
        for (t, track) in self.tracks.iter().enumerate() {
            for direction in TrackDirection::BOTH {
                let link = track.link(direction);
                match link.boundary {
                    BoundaryType::Reflective | BoundaryType::Periodic => {
                        let next = link.next_track.ok_or_else(|| {
                            TransportError::TrackLinkError {
                                track: t,
                                message: format!(
                                    "{:?} exit boundary has no successor track",
                                    link.boundary
                                ),
                            }
                        })?;
                        if next >= self.tracks.len() {
                            return Err(TransportError::TrackLinkError {
                                track: t,
                                message: format!(
                                    "successor {next} outside the {}-track store",
                                    self.tracks.len()
                                ),
                            });
                        }
                    }
                    BoundaryType::Interface => {
                        if self.halo.is_none() {
                            return Err(TransportError::DomainError(format!(
                                "track {t} has an INTERFACE boundary but the solver is not \
                                 part of a domain decomposition"
                            )));
                        }
                    }
                    BoundaryType::Vacuum => {}
                }
            }
        }

        self.fluxes.set_leakage_enabled(self.cmfd.is_none());
        self.fluxes.zero_track_fluxes();
        self.fsrs.flatten_fluxes(1.0);
        self.fsrs.store_fluxes();
        self.k_eff = 1.0;
        Ok(())
    }

    fn set_k_eff(&mut self, k_eff: f64) {
        self.k_eff = k_eff;
    }

    fn local_fission_source(&self) -> f64 {
        self.fsrs.local_fission_source(&self.materials)
    }

    fn apply_normalization(&mut self, factor: f64) {
        self.fsrs.scale_fluxes(factor);
        self.fluxes.scale_fluxes(factor);
    }

    fn compute_sources(&mut self, k_eff: f64, iteration: usize) -> TransportResult<u64> {
        compute_fsr_sources(&mut self.fsrs, &self.materials, k_eff, iteration)
    }

    fn compute_stabilizing_flux(&mut self) {
        compute_stabilizing_flux(
            &mut self.fsrs,
            &self.materials,
            self.config.stabilization,
            self.config.stabilization_factor,
        );
    }

    fn stabilize_flux(&mut self) {
        stabilize_flux(
            &mut self.fsrs,
            &self.materials,
            self.config.stabilization,
            self.config.stabilization_factor,
        );
    }

    /// One local transport sweep: zero tallies, copy the start fluxes
    /// into the working array, walk every track both ways.
    fn transport_sweep_local(&mut self) -> TransportResult<()> {
        if let Some(cmfd) = self.cmfd.as_ref() {
            if cmfd.is_flux_update_on() {
                cmfd.zero_currents();
            }
        }
        self.fsrs.flatten_fluxes(0.0);
        self.fluxes.copy_boundary_fluxes();
        self.fluxes.zero_leakage();

        let ctx = SweepContext {
            tracks: &self.tracks,
            fluxes: &self.fluxes,
            fsrs: &self.fsrs,
            materials: &self.materials,
            quadrature: &self.quadrature,
            exp_evaluators: &self.exp_evaluators,
            cmfd: self.cmfd.as_deref(),
            max_optical_length: self.config.max_optical_length,
        };
        if let Some(cmfd) = ctx.cmfd {
            if cmfd.is_sigma_t_rebalance_on() {
                tally_starting_currents(&ctx)?;
            }
        }
        self.pool.install(|| transport_sweep(&ctx))
    }

    fn add_source_to_scalar_flux(&mut self) -> u64 {
        self.fsrs.add_source_to_scalar_flux(&self.materials)
    }

    fn apply_cmfd_update(&mut self) -> TransportResult<()> {
        if let Some(cmfd) = self.cmfd.as_ref() {
            if cmfd.is_flux_update_on() {
                cmfd.update_flux(&mut self.fsrs)?;
            }
        }
        Ok(())
    }

    fn store_fluxes(&mut self) {
        self.fsrs.store_fluxes();
    }

    /// Local reaction rates: (fission, absorption, leakage).
    fn local_rates(&self) -> (f64, f64, f64) {
        let num_groups = self.fsrs.num_groups();
        let mut fission_parts = vec![0.0; self.fsrs.num_fsrs()];
        let mut absorption_parts = vec![0.0; self.fsrs.num_fsrs()];
        for r in 0..self.fsrs.num_fsrs() {
            let material = self.materials.get(self.fsrs.material_id(r));
            let volume = self.fsrs.volume(r);
            for g in 0..num_groups {
                let flux = self.fsrs.flux(r, g);
                fission_parts[r] += material.nu_sigma_f()[g] * flux * volume;
                absorption_parts[r] += material.sigma_a()[g] * flux * volume;
            }
        }
        (
            pairwise_sum(&fission_parts),
            pairwise_sum(&absorption_parts),
            self.fluxes.total_leakage(),
        )
    }

    fn reference(&self, fsr: usize, group: usize) -> f64 {
        match self.reference_flux.as_ref() {
            Some(reference) => reference[[fsr, group]],
            None => self.fsrs.old_flux(fsr, group),
        }
    }

    /// Local residual contribution: (sum of squared relative
    /// differences, normalization count).
    fn local_residual(&self, k_eff: f64) -> (f64, u64) {
        let num_fsrs = self.fsrs.num_fsrs();
        let num_groups = self.fsrs.num_groups();
        let mut residuals = vec![0.0; num_fsrs];

        match self.config.residual_type {
            ResidualType::ScalarFlux => {
                for (r, residual) in residuals.iter_mut().enumerate() {
                    for g in 0..num_groups {
                        let reference = self.reference(r, g);
                        if reference > 0.0 {
                            let delta = (self.fsrs.flux(r, g) - reference) / reference;
                            *residual += delta * delta;
                        }
                    }
                }
                (pairwise_sum(&residuals), num_fsrs as u64)
            }

            ResidualType::FissionSource => {
                for (r, residual) in residuals.iter_mut().enumerate() {
                    let material = self.materials.get(self.fsrs.material_id(r));
                    if !material.is_fissionable() {
                        continue;
                    }
                    let mut new_source = 0.0;
                    let mut old_source = 0.0;
                    for g in 0..num_groups {
                        new_source += self.fsrs.flux(r, g) * material.nu_sigma_f()[g];
                        old_source += self.reference(r, g) * material.nu_sigma_f()[g];
                    }
                    if old_source > 0.0 {
                        let delta = (new_source - old_source) / old_source;
                        *residual = delta * delta;
                    }
                }
                (
                    pairwise_sum(&residuals),
                    self.fsrs.num_fissionable() as u64,
                )
            }

            ResidualType::TotalSource => {
                let inverse_k = 1.0 / k_eff;
                for (r, residual) in residuals.iter_mut().enumerate() {
                    let material = self.materials.get(self.fsrs.material_id(r));
                    let mut new_source = 0.0;
                    let mut old_source = 0.0;
                    if material.is_fissionable() {
                        for g in 0..num_groups {
                            new_source += self.fsrs.flux(r, g) * material.nu_sigma_f()[g];
                            old_source += self.reference(r, g) * material.nu_sigma_f()[g];
                        }
                        new_source *= inverse_k;
                        old_source *= inverse_k;
                    }
                    let sigma_s = material.sigma_s();
                    for g_out in 0..num_groups {
                        let first = g_out * num_groups;
                        for g_in in 0..num_groups {
                            new_source += sigma_s[first + g_in] * self.fsrs.flux(r, g_in);
                            old_source += sigma_s[first + g_in] * self.reference(r, g_in);
                        }
                    }
                    if old_source > 0.0 {
                        let delta = (new_source - old_source) / old_source;
                        *residual = delta * delta;
                    }
                }
                (pairwise_sum(&residuals), num_fsrs as u64)
            }
        }
    }

    // ── Halo plumbing used by the exchange orchestrator ──────────────

    pub(crate) fn halo_reset_cursors(&mut self) {
        if let Some(halo) = self.halo.as_mut() {
            halo.reset_cursors();
        }
    }

    pub(crate) fn halo_pack_round(&mut self) -> TransportResult<Vec<(usize, Vec<FluxSlot>)>> {
        match self.halo.as_mut() {
            Some(halo) => halo.pack_round(&self.tracks, &self.fluxes),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn halo_receive(
        &mut self,
        from_rank: usize,
        buffer: Vec<FluxSlot>,
    ) -> TransportResult<()> {
        match self.halo.as_mut() {
            Some(halo) => halo.receive(from_rank, buffer),
            None => Err(TransportError::DomainError(
                "received a halo buffer without halo state".to_string(),
            )),
        }
    }

    pub(crate) fn halo_unpack(&mut self) -> TransportResult<u64> {
        match self.halo.as_mut() {
            Some(halo) => halo.unpack_inbox(&mut self.fluxes),
            None => Ok(0),
        }
    }
}

/// Finish a residual reduction: guard the degenerate cases and fold the
/// sum into the RMS form.
fn finalize_residual(
    sum: f64,
    norm: u64,
    residual_type: ResidualType,
) -> TransportResult<f64> {
    let mut sum = sum;
    let mut norm = norm;
    if residual_type == ResidualType::FissionSource && norm == 0 {
        return Err(TransportError::ConfigError(
            "cannot compute a FISSION_SOURCE residual without fissionable FSRs".to_string(),
        ));
    }
    if sum < 0.0 {
        warn!("Residual mean square error {sum:.4e} less than zero, clamping to zero");
        sum = 0.0;
    }
    if norm == 0 {
        warn!("Residual norm is zero, clamping to one");
        norm = 1;
    }
    Ok((sum / norm as f64).sqrt())
}

/// Drive the outer iteration over one or more domains.
pub(crate) fn run_outer(
    domains: &mut [MocSolver],
    mode: SolveMode,
) -> TransportResult<SolveResult> {
    let start = Instant::now();
    let config = domains[0].config.clone();

    for domain in domains.iter_mut() {
        domain.prepare_solve()?;
    }

    let total_fsrs: u64 = domains.iter().map(|d| d.fsrs.num_fsrs() as u64).sum();
    let total_fissionable: u64 = domains
        .iter()
        .map(|d| d.fsrs.num_fissionable() as u64)
        .sum();
    if mode == SolveMode::Eigenvalue && total_fissionable == 0 {
        return Err(TransportError::ConfigError(
            "eigenvalue solve requires at least one fissionable region".to_string(),
        ));
    }
    if config.residual_type == ResidualType::FissionSource && total_fissionable == 0 {
        return Err(TransportError::ConfigError(
            "cannot compute a FISSION_SOURCE residual without fissionable FSRs".to_string(),
        ));
    }

    let exchanging = domains.iter().any(|d| d.halo.is_some());
    let mut k_eff = 1.0;
    let mut residual = f64::MAX;
    let mut converged = false;
    let mut iterations = 0;
    let mut history = Vec::new();

    for iteration in 0..config.max_iters {
        iterations = iteration + 1;

        if mode == SolveMode::Eigenvalue {
            let total_fission: f64 = domains.iter().map(|d| d.local_fission_source()).sum();
            if !total_fission.is_finite() || total_fission <= 0.0 {
                return Err(TransportError::SolverDiverged {
                    iteration,
                    message: format!("total fission source collapsed to {total_fission}"),
                });
            }
            let factor = total_fsrs as f64 / total_fission;
            debug!("Tot. Fiss. Src. = {total_fission:.6e}, Norm. factor = {factor:.6e}");
            for domain in domains.iter_mut() {
                domain.apply_normalization(factor);
            }
        }

        let mut negative_sources = 0_u64;
        let mut negative_source_domains = 0_u32;
        for domain in domains.iter_mut() {
            let count = domain.compute_sources(k_eff, iteration)?;
            negative_sources += count;
            negative_source_domains += u32::from(count > 0);
        }
        if negative_sources > 0 {
            warn!(
                "Computed {negative_sources} negative sources on \
                 {negative_source_domains} domains"
            );
            if iteration < SOURCE_CLAMP_ITERATIONS {
                warn!("Negative sources corrected to zero");
            }
        }

        if config.stabilization != StabilizationType::None {
            for domain in domains.iter_mut() {
                domain.compute_stabilizing_flux();
            }
        }

        for domain in domains.iter_mut() {
            domain.transport_sweep_local()?;
        }
        if exchanging {
            exchange_interface_fluxes(domains)?;
        }

        let mut negative_fluxes = 0_u64;
        let mut negative_flux_domains = 0_u32;
        for domain in domains.iter_mut() {
            let count = domain.add_source_to_scalar_flux();
            negative_fluxes += count;
            negative_flux_domains += u32::from(count > 0);
        }
        if negative_fluxes > 0 {
            warn!(
                "Computed {negative_fluxes} negative fluxes on \
                 {negative_flux_domains} domains"
            );
        }

        if config.stabilization != StabilizationType::None {
            for domain in domains.iter_mut() {
                domain.stabilize_flux();
            }
        }

        for domain in domains.iter_mut() {
            domain.apply_cmfd_update()?;
        }

        let mut residual_sum = 0.0;
        let mut residual_norm = 0_u64;
        for domain in domains.iter() {
            let (sum, norm) = domain.local_residual(k_eff);
            residual_sum += sum;
            residual_norm += norm;
        }
        residual = finalize_residual(residual_sum, residual_norm, config.residual_type)?;

        if mode == SolveMode::Eigenvalue {
            let mut fission = 0.0;
            let mut absorption = 0.0;
            let mut leakage = 0.0;
            for domain in domains.iter() {
                let (f, a, l) = domain.local_rates();
                fission += f;
                absorption += a;
                leakage += l;
            }
            if config.keff_from_fission_rates {
                k_eff *= fission / total_fsrs as f64;
            } else {
                k_eff = fission / (absorption + leakage);
            }
            if !k_eff.is_finite() || k_eff <= 0.0 {
                return Err(TransportError::SolverDiverged {
                    iteration,
                    message: format!("k_eff collapsed to {k_eff}"),
                });
            }
        }

        for domain in domains.iter_mut() {
            domain.store_fluxes();
            domain.set_k_eff(k_eff);
        }

        info!(
            "Iteration {iteration:4}: k_eff = {k_eff:.6}, residual = {residual:.3e}"
        );
        history.push(IterationRecord {
            iteration,
            k_eff,
            residual,
            negative_sources,
            negative_fluxes,
        });

        if iteration >= 1 && residual < config.tolerance {
            converged = true;
            break;
        }
    }

    let solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        "Solve finished in {solve_time_ms:.1} ms: converged = {converged}, \
         k_eff = {k_eff:.6}"
    );

    Ok(SolveResult {
        converged,
        iterations,
        k_eff,
        residual,
        solve_time_ms,
        history,
    })
}

/// A set of domain solvers coupled through halo exchange, mirroring a
/// distributed run with one rank per domain.
pub struct DomainEnsemble {
    solvers: Vec<MocSolver>,
}

impl std::fmt::Debug for DomainEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainEnsemble")
            .field("solvers", &self.solvers.len())
            .finish()
    }
}

impl DomainEnsemble {
    /// Couple one solver per rank of the topology; solver `i` owns rank
    /// `i` in x-major order.
    pub fn new(
        mut solvers: Vec<MocSolver>,
        topology: CartesianTopology,
    ) -> TransportResult<Self> {
        if solvers.len() != topology.num_domains() {
            return Err(TransportError::DomainError(format!(
                "{} solvers cannot fill a topology of {} domains",
                solvers.len(),
                topology.num_domains()
            )));
        }
        for (rank, solver) in solvers.iter_mut().enumerate() {
            solver.enable_halo(rank, &topology)?;
        }
        Ok(DomainEnsemble { solvers })
    }

    pub fn solve_eigenvalue(&mut self) -> TransportResult<SolveResult> {
        run_outer(&mut self.solvers, SolveMode::Eigenvalue)
    }

    pub fn solve_fixed_source(&mut self) -> TransportResult<SolveResult> {
        run_outer(&mut self.solvers, SolveMode::FixedSource)
    }

    pub fn solver(&self, rank: usize) -> &MocSolver {
        &self.solvers[rank]
    }

    pub fn solver_mut(&mut self, rank: usize) -> &mut MocSolver {
        &mut self.solvers[rank]
    }

    pub fn solvers_mut(&mut self) -> &mut [MocSolver] {
        &mut self.solvers
    }

    /// Gather the global scalar flux field: `locations[g]` names the
    /// (rank, local FSR id) pair owning global region g.
    pub fn gather_fluxes(
        &self,
        locations: &[(usize, usize)],
    ) -> TransportResult<Array2<f64>> {
        let num_groups = self.solvers[0].fsrs.num_groups();
        let mut gathered = Array2::zeros((locations.len(), num_groups));
        for (global, (rank, local)) in locations.iter().enumerate() {
            let solver = self.solvers.get(*rank).ok_or_else(|| {
                TransportError::DomainError(format!(
                    "global FSR {global} maps to rank {rank}, outside the \
                     {}-domain ensemble",
                    self.solvers.len()
                ))
            })?;
            if *local >= solver.fsrs.num_fsrs() {
                return Err(TransportError::DomainError(format!(
                    "global FSR {global} maps to local region {local} on rank {rank}, \
                     which owns {} regions",
                    solver.fsrs.num_fsrs()
                )));
            }
            for g in 0..num_groups {
                gathered[[global, g]] = solver.fsrs.flux(*local, g);
            }
        }
        Ok(gathered)
    }
}
