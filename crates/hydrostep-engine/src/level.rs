//! Single-level advance: per-step setup, dispatch and teardown.
//!
//! [`LevelAdvancer`] is the primary user-facing API. Each call to
//! [`advance()`](LevelAdvancer::advance) runs one coarse step on one
//! level:
//!
//! ```text
//! setup      swap time levels, sanitize old state, checkpoint
//! integrate  one pass of the stage integrator
//! evaluate   retry controller (may restore and sub-cycle)
//! finalize   reduce losses, feed the flux register
//! teardown   drop the step workspace
//! ```
//!
//! # Ownership model
//!
//! `LevelAdvancer` is [`Send`] but not [`Sync`]. It owns the level state
//! exclusively; all mutating methods take `&mut self`, so nothing can
//! observe the state between setup and teardown.
//!
//! # Failure
//!
//! Every fatal error marks the advancer aborted and aborts its collective,
//! so peer ranks fail rather than block. Further advances return
//! [`AdvanceError::Aborted`] until [`reset()`](LevelAdvancer::reset).
//! An invalid step size is rejected up front and does not abort.

use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, error};
use rayon::prelude::*;

use hydrostep_core::{
    AdvanceError, Collective, FaceFluxes, FluxRegister, KernelError, LevelId, StateTypeId, StepId,
};
use hydrostep_kernel::{HydroKernels, KernelContext};
use hydrostep_state::{StateData, StateError};

use crate::config::{AdvanceConfig, ConfigError};
use crate::integrator::{integrator_for, StageEnv, StageIntegrator, StageOptions, StepWorkspace};
use crate::losses::LossTally;
use crate::metrics::AdvanceMetrics;
use crate::retry::{RetryCheckpoint, RetryController, RetryPolicy, RetryReport, RetryState, StepExecutor};
use crate::sanitize::SanitizerGate;

// Compile-time assertion: LevelAdvancer is Send.
// Fails to compile if any field is !Send.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<LevelAdvancer>();
    }
};

// ── AdvanceOutcome ─────────────────────────────────────────────────

/// Result of a successful [`LevelAdvancer::advance()`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct AdvanceOutcome {
    /// Suggested next step: the stable sub-step after a retry, otherwise
    /// the step just taken.
    pub dt_new: f64,
    /// What the retry controller did.
    pub report: RetryReport,
    /// Timing and work counters.
    pub metrics: AdvanceMetrics,
    /// Boundary losses of this step, summed over all ranks. Zero when
    /// loss tracking is off.
    pub losses: LossTally,
}

// ── LevelCore ──────────────────────────────────────────────────────

/// The level state plus everything needed to integrate it. Split from
/// [`LevelAdvancer`] so the retry controller can drive it while the
/// advancer holds the collective.
struct LevelCore {
    level: LevelId,
    config: AdvanceConfig,
    kernels: Box<dyn HydroKernels>,
    integrator: Box<dyn StageIntegrator>,
    hydro: StateData,
    aux: IndexMap<StateTypeId, StateData>,
    workspace: Option<StepWorkspace>,
    ctx: KernelContext,
    stages_executed: u32,
    passes: u64,
}

impl LevelCore {
    fn options(&self) -> StageOptions {
        StageOptions {
            do_hydro: self.config.do_hydro,
            do_react: self.config.do_react,
            track_grid_losses: self.config.track_grid_losses,
        }
    }

    fn kernel_failed(&self, reason: KernelError) -> AdvanceError {
        AdvanceError::KernelFailed {
            kernel: self.kernels.name().to_string(),
            reason,
        }
    }

    fn no_workspace(&self) -> AdvanceError {
        AdvanceError::StateAccess {
            level: self.level,
            reason: "step workspace missing at teardown".to_string(),
        }
    }

    /// Sanitize the old hydro state before the first pass.
    fn clean_old(&mut self) -> Result<(), AdvanceError> {
        SanitizerGate::new(self.kernels.as_ref())
            .clean_state(&self.ctx, self.hydro.old_mut(), None)
            .map(|_| ())
    }
}

impl StepExecutor for LevelCore {
    type Checkpoint = RetryCheckpoint;

    fn local_stable_dt(&mut self, time: f64, dt: f64) -> Result<f64, AdvanceError> {
        let ctx = self.ctx.for_step(time, dt);
        let kernels = self.kernels.as_ref();
        let results: Vec<Result<f64, KernelError>> = self
            .hydro
            .new_data()
            .blocks()
            .par_iter()
            .map(|b| kernels.stable_dt(&ctx, b))
            .collect();
        let mut tau = f64::INFINITY;
        for r in results {
            tau = tau.min(r.map_err(|e| self.kernel_failed(e))?);
        }
        Ok(tau)
    }

    fn local_frac_change(&self) -> f64 {
        self.workspace.as_ref().map_or(1.0, |ws| ws.frac_change)
    }

    fn checkpoint(&self) -> RetryCheckpoint {
        let (losses, fluxes) = match &self.workspace {
            Some(ws) => (ws.losses, ws.fluxes.clone()),
            None => (
                LossTally::default(),
                FaceFluxes::new(self.hydro.geometry().ncell(), self.hydro.ncomp()),
            ),
        };
        RetryCheckpoint {
            hydro: self.hydro.snapshot(),
            aux: self.aux.iter().map(|(id, s)| (*id, s.snapshot())).collect(),
            losses,
            fluxes,
        }
    }

    fn restore(&mut self, cp: &RetryCheckpoint) {
        self.hydro.restore_old_from(&cp.hydro);
        self.hydro.restore_new_from(&cp.hydro);
        for (id, state) in &mut self.aux {
            if let Some(snap) = cp.aux.get(id) {
                state.restore_old_from(snap);
                state.restore_new_from(snap);
            }
        }
        if let Some(ws) = self.workspace.as_mut() {
            ws.losses = cp.losses;
            ws.fluxes.clone_from(&cp.fluxes);
        }
    }

    fn restore_old(&mut self, cp: &RetryCheckpoint) {
        self.hydro.restore_old_from(&cp.hydro);
        for (id, state) in &mut self.aux {
            if let Some(snap) = cp.aux.get(id) {
                state.restore_old_from(snap);
            }
        }
    }

    fn swap_time_levels(&mut self, dt: f64) {
        self.hydro.swap_time_levels(dt);
        for state in self.aux.values_mut() {
            state.swap_time_levels(dt);
            state.carry_forward();
        }
    }

    fn set_time_level(&mut self, prev_time: f64, cur_time: f64) {
        self.hydro.set_time_level(prev_time, cur_time);
        for state in self.aux.values_mut() {
            state.set_time_level(prev_time, cur_time);
        }
    }

    fn integrate(&mut self, time: f64, dt: f64) -> Result<(), AdvanceError> {
        let options = self.options();
        let ctx = self.ctx.for_step(time, dt);
        let level = self.level;
        let Some(workspace) = self.workspace.as_mut() else {
            return Err(AdvanceError::StateAccess {
                level,
                reason: "integration outside an advance".to_string(),
            });
        };
        let mut env = StageEnv {
            kernels: self.kernels.as_ref(),
            state: &mut self.hydro,
            workspace,
            ctx,
            options,
        };
        let report = self.integrator.advance_one_step(&mut env)?;
        self.stages_executed += report.stages as u32;
        self.passes += 1;
        Ok(())
    }
}

// ── LevelAdvancer ──────────────────────────────────────────────────

/// Advances the state of one level by one coarse step at a time.
///
/// # Example
///
/// ```ignore
/// let mut level = LevelAdvancer::new(LevelId(0), config, kernels, state, comm)?;
/// let dt = level.estimate_timestep()?;
/// let outcome = level.step(dt)?;
/// println!("next dt: {}", outcome.dt_new);
/// ```
pub struct LevelAdvancer {
    core: LevelCore,
    controller: RetryController,
    comm: Box<dyn Collective>,
    flux_register: Option<Box<dyn FluxRegister>>,
    cumulative_losses: LossTally,
    step: StepId,
    aborted: bool,
    last_metrics: AdvanceMetrics,
    last_report: Option<RetryReport>,
}

impl LevelAdvancer {
    /// Assemble an advancer for `level` owning the hydro state `hydro`.
    ///
    /// Validates `config`, checks that the state carries the kernel
    /// layout and that the kernel halo fits the level, and builds the
    /// integrator for the configured scheme.
    pub fn new(
        level: LevelId,
        config: AdvanceConfig,
        kernels: Box<dyn HydroKernels>,
        hydro: StateData,
        comm: Box<dyn Collective>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let expected = kernels.layout().ncomp();
        if hydro.ncomp() != expected {
            return Err(ConfigError::LayoutMismatch {
                expected,
                got: hydro.ncomp(),
            });
        }
        let geom = *hydro.geometry();
        let ghost = kernels.ghost_width();
        if ghost > geom.ncell() {
            return Err(StateError::GhostTooWide {
                ghost,
                ncell: geom.ncell(),
            }
            .into());
        }
        let hydro = hydro.with_odd_components(kernels.odd_components());
        let ctx = KernelContext::new(
            level,
            config.scheme,
            hydro.cur_time(),
            0.0,
            geom.dx(),
            geom.ncell(),
        );
        let controller = RetryController::new(RetryPolicy::from_config(&config), level);
        Ok(Self {
            core: LevelCore {
                level,
                integrator: integrator_for(config.scheme),
                config,
                kernels,
                hydro,
                aux: IndexMap::new(),
                workspace: None,
                ctx,
                stages_executed: 0,
                passes: 0,
            },
            controller,
            comm,
            flux_register: None,
            cumulative_losses: LossTally::default(),
            step: StepId(0),
            aborted: false,
            last_metrics: AdvanceMetrics::default(),
            last_report: None,
        })
    }

    /// Track an auxiliary state type. It is swapped, checkpointed and
    /// restored with the hydro state, and its new slot carries the old
    /// data forward each step.
    pub fn add_state_type(&mut self, id: StateTypeId, state: StateData) -> Result<(), ConfigError> {
        if id == StateTypeId::HYDRO || self.core.aux.contains_key(&id) {
            return Err(ConfigError::DuplicateStateType { id });
        }
        if state.geometry() != self.core.hydro.geometry() {
            return Err(ConfigError::GeometryMismatch { id });
        }
        self.core.aux.insert(id, state);
        Ok(())
    }

    /// Attach the flux register that receives this level's face fluxes
    /// when refluxing is enabled.
    pub fn set_flux_register(&mut self, register: Box<dyn FluxRegister>) {
        self.flux_register = Some(register);
    }

    /// Advance the level from `time` to `time + dt`.
    ///
    /// `amr_iteration` and `amr_ncycle` position this step within the
    /// coarser level's subcycle and are passed through to the kernels.
    ///
    /// # Errors
    ///
    /// [`AdvanceError::InvalidTimestep`] for a step that is not finite and
    /// positive (the advancer stays usable). Any other error is fatal: it
    /// marks the advancer aborted and aborts the collective, so peer ranks
    /// fail their next collective instead of waiting for this one.
    pub fn advance(
        &mut self,
        time: f64,
        dt: f64,
        amr_iteration: u32,
        amr_ncycle: u32,
    ) -> Result<AdvanceOutcome, AdvanceError> {
        let level = self.core.level;
        if self.aborted {
            return Err(AdvanceError::Aborted { level });
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(AdvanceError::InvalidTimestep { level, dt });
        }

        let started = Instant::now();
        let mut metrics = AdvanceMetrics::default();
        let mut report = RetryReport::new(dt);
        let result = self.run_step(time, dt, amr_iteration, amr_ncycle, &mut metrics, &mut report);
        // Teardown happens on every path.
        self.core.workspace = None;

        metrics.stages_executed = self.core.stages_executed;
        metrics.zones_advanced = self.core.passes * self.core.hydro.geometry().ncell() as u64;
        metrics.subcycles = report.substeps;
        metrics.retries = report.retries;
        metrics.max_retry_depth = report.max_depth;
        metrics.total_us = started.elapsed().as_micros() as u64;
        self.last_metrics = metrics.clone();
        self.last_report = Some(report.clone());

        match result {
            Ok((dt_new, losses)) => {
                self.step = StepId(self.step.0 + 1);
                if self.comm.is_io_rank() {
                    debug!(
                        "level {level}: step {} to t = {:e} done (dt = {dt:e}, next dt <= {dt_new:e})",
                        self.step,
                        time + dt,
                    );
                }
                Ok(AdvanceOutcome {
                    dt_new,
                    report,
                    metrics,
                    losses,
                })
            }
            Err(e) => {
                self.aborted = true;
                // Peers may be blocked in a collective this rank will never join.
                self.comm.abort();
                if self.comm.is_io_rank() {
                    match e.remediation() {
                        Some(hint) => error!("level {level}: {e}; {hint}"),
                        None => error!("level {level}: {e}"),
                    }
                }
                Err(e)
            }
        }
    }

    fn run_step(
        &mut self,
        time: f64,
        dt: f64,
        amr_iteration: u32,
        amr_ncycle: u32,
        metrics: &mut AdvanceMetrics,
        report: &mut RetryReport,
    ) -> Result<(f64, LossTally), AdvanceError> {
        let level = self.core.level;
        let geom = *self.core.hydro.geometry();

        // ── Setup ──
        let phase = Instant::now();
        self.core.ctx = KernelContext::new(
            level,
            self.core.config.scheme,
            time,
            dt,
            geom.dx(),
            geom.ncell(),
        )
        .with_iteration(amr_iteration, amr_ncycle);
        self.core.stages_executed = 0;
        self.core.passes = 0;
        self.core.swap_time_levels(dt);
        self.core.set_time_level(time, time + dt);
        self.core.clean_old()?;
        self.core.workspace = Some(StepWorkspace::new(&self.core.hydro, self.core.config.scheme));
        let checkpoint = self
            .core
            .config
            .use_retry
            .then(|| self.core.checkpoint());
        metrics.setup_us = phase.elapsed().as_micros() as u64;

        // ── Integrate ──
        let phase = Instant::now();
        self.core.integrate(time, dt)?;
        metrics.integrate_us = phase.elapsed().as_micros() as u64;

        // ── Evaluate ──
        let phase = Instant::now();
        let dt_new = match &checkpoint {
            Some(cp) => self.controller.evaluate(
                &mut self.core,
                self.comm.as_mut(),
                time,
                dt,
                cp,
                report,
            )?,
            None => {
                report.transitions.push(RetryState::Accepted);
                dt
            }
        };
        drop(checkpoint);
        metrics.retry_us = phase.elapsed().as_micros() as u64;

        // ── Finalize ──
        let phase = Instant::now();
        let workspace = self
            .core
            .workspace
            .take()
            .ok_or_else(|| self.core.no_workspace())?;
        let mut losses = LossTally::default();
        if self.core.config.track_grid_losses {
            losses = workspace.losses;
            self.comm.reduce_sum(losses.as_mut_slice())?;
            self.cumulative_losses.accumulate(&losses);
        }
        if self.core.config.do_reflux && level.has_coarser() {
            if let Some(register) = self.flux_register.as_mut() {
                register.init_coarse_contribution(level, &workspace.fluxes);
                register.add_fine_contribution(level, &workspace.fluxes);
            }
        }
        metrics.finalize_us = phase.elapsed().as_micros() as u64;
        Ok((dt_new, losses))
    }

    /// Advance from the current time by `dt` as iteration 1 of 1.
    pub fn step(&mut self, dt: f64) -> Result<AdvanceOutcome, AdvanceError> {
        self.advance(self.time(), dt, 1, 1)
    }

    /// Largest stable step for the current new state: `cfl` times the
    /// global minimum signal-crossing time. One collective min.
    pub fn estimate_timestep(&mut self) -> Result<f64, AdvanceError> {
        if self.aborted {
            return Err(AdvanceError::Aborted {
                level: self.core.level,
            });
        }
        let time = self.time();
        let tau = self.core.local_stable_dt(time, 0.0)?;
        let tau = self.comm.reduce_min(tau)?;
        Ok(self.core.config.cfl * tau)
    }

    /// Clear the abort flag, the step counter, the cumulative losses and
    /// the last metrics. State data is left as is; reload it through
    /// [`hydro_mut()`](Self::hydro_mut) if an abort left it inconsistent.
    ///
    /// An aborted collective stays aborted, so on more than one rank the
    /// advancer must be rebuilt with a fresh group instead.
    pub fn reset(&mut self) {
        self.aborted = false;
        self.step = StepId(0);
        self.cumulative_losses = LossTally::default();
        self.last_metrics = AdvanceMetrics::default();
        self.last_report = None;
        self.core.workspace = None;
    }

    /// Level being advanced.
    pub fn level(&self) -> LevelId {
        self.core.level
    }

    /// Active configuration.
    pub fn config(&self) -> &AdvanceConfig {
        &self.core.config
    }

    /// Name of the active integrator.
    pub fn integrator_name(&self) -> &str {
        self.core.integrator.name()
    }

    /// Time stamp of the new hydro state.
    pub fn time(&self) -> f64 {
        self.core.hydro.cur_time()
    }

    /// Coarse steps completed since construction or reset.
    pub fn current_step(&self) -> StepId {
        self.step
    }

    /// The hydro state.
    pub fn hydro(&self) -> &StateData {
        &self.core.hydro
    }

    /// The hydro state, mutably.
    pub fn hydro_mut(&mut self) -> &mut StateData {
        &mut self.core.hydro
    }

    /// An auxiliary state type.
    pub fn aux(&self, id: StateTypeId) -> Option<&StateData> {
        self.core.aux.get(&id)
    }

    /// An auxiliary state type, mutably.
    pub fn aux_mut(&mut self, id: StateTypeId) -> Option<&mut StateData> {
        self.core.aux.get_mut(&id)
    }

    /// Losses accumulated over every completed step.
    pub fn cumulative_losses(&self) -> &LossTally {
        &self.cumulative_losses
    }

    /// Metrics from the most recent advance, successful or not.
    pub fn last_metrics(&self) -> &AdvanceMetrics {
        &self.last_metrics
    }

    /// Retry report from the most recent advance.
    pub fn last_report(&self) -> Option<&RetryReport> {
        self.last_report.as_ref()
    }

    /// Whether a fatal error has stopped the advancer.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether this rank emits log output.
    pub fn is_io_rank(&self) -> bool {
        self.comm.is_io_rank()
    }
}

impl std::fmt::Debug for LevelAdvancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelAdvancer")
            .field("level", &self.core.level)
            .field("integrator", &self.core.integrator.name())
            .field("kernels", &self.core.kernels.name())
            .field("time", &self.core.hydro.cur_time())
            .field("step", &self.step)
            .field("aux_types", &self.core.aux.len())
            .field("aborted", &self.aborted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrostep_core::{IntegrationScheme, MolTableau, StateLayout, URHO};
    use hydrostep_state::{BoundaryKind, LevelGeometry};
    use hydrostep_test_utils::{
        assert_bits_eq, decay_state, RecordingCollective, RecordingFluxRegister, Reduction,
        RefluxSide, ScriptedKernels,
    };

    /// Retry triggers exactly when the scripted tau is below dt.
    fn exact_config() -> AdvanceConfig {
        AdvanceConfig {
            cfl: 1.0,
            retry_tolerance: 0.0,
            ..AdvanceConfig::default()
        }
    }

    fn advancer(kernels: ScriptedKernels, config: AdvanceConfig) -> LevelAdvancer {
        advancer_on(LevelId(0), kernels, config, RecordingCollective::new())
    }

    fn advancer_on(
        level: LevelId,
        kernels: ScriptedKernels,
        config: AdvanceConfig,
        comm: RecordingCollective,
    ) -> LevelAdvancer {
        let state = decay_state(12, 5, StateLayout::new(1));
        LevelAdvancer::new(level, config, Box::new(kernels), state, Box::new(comm)).unwrap()
    }

    #[test]
    fn accepted_step_advances_by_exactly_dt() {
        let mut lvl = advancer(ScriptedKernels::new(0.5), exact_config());
        let before = lvl.hydro().new_data().clone();
        let out = lvl.step(0.1).unwrap();
        assert_eq!(out.dt_new, 0.1);
        assert_eq!(lvl.hydro().prev_time(), 0.0);
        assert_eq!(lvl.hydro().cur_time(), 0.1);
        assert_bits_eq(lvl.hydro().old(), &before);
        assert!(!out.report.retried());
        assert_eq!(out.report.final_state(), Some(RetryState::Accepted));
        assert_eq!(lvl.current_step(), StepId(1));
        assert_eq!(out.metrics.stages_executed, 1);
        assert_eq!(out.metrics.zones_advanced, 12);
    }

    #[test]
    fn late_retry_executes_exactly_the_planned_subcycles() {
        let (time, dt) = (285.66679250267373, 0.11894945914007407);
        let kernels = ScriptedKernels::new(0.0).with_stable_dt(dt / 709.5);
        let config = AdvanceConfig {
            retry_max_subcycles: 0,
            ..exact_config()
        };
        let mut lvl = advancer(kernels, config);
        let out = lvl.advance(time, dt, 1, 1).unwrap();
        assert_eq!(out.report.subcycles, 710);
        assert_eq!(out.report.substeps, 710);
        assert_eq!(lvl.hydro().prev_time(), time);
        assert_eq!(lvl.hydro().cur_time(), time + dt);
    }

    #[test]
    fn unstable_step_is_subcycled_four_times() {
        let rate = 0.4;
        let kernels = ScriptedKernels::new(rate).with_stable_dt(0.3);
        let mut lvl = advancer(kernels, exact_config());
        let before = lvl.hydro().new_data().clone();
        let out = lvl.step(1.0).unwrap();

        assert_eq!(out.report.subcycles, 4);
        assert_eq!(out.dt_new, 0.3);
        assert_eq!(lvl.hydro().prev_time(), 0.0);
        assert_eq!(lvl.hydro().cur_time(), 1.0);
        assert_bits_eq(lvl.hydro().old(), &before);

        let growth = (1.0 - 0.25 * rate).powi(4);
        for i in 0..12 {
            let expected = before.get(i, URHO) * growth;
            assert!((lvl.hydro().new_data().get(i, URHO) - expected).abs() < 1e-14);
        }
        // First pass plus four sub-steps.
        assert_eq!(out.metrics.stages_executed, 5);
        assert_eq!(out.metrics.subcycles, 4);
        assert_eq!(out.metrics.zones_advanced, 5 * 12);
    }

    #[test]
    fn identical_inputs_give_bit_identical_results() {
        let run = || {
            let kernels = ScriptedKernels::new(1.7).with_stable_dt(0.07);
            let config = AdvanceConfig {
                scheme: IntegrationScheme::MethodOfLines(MolTableau::SspRk3),
                ..exact_config()
            };
            let mut lvl = advancer(kernels, config);
            let out = lvl.step(0.5).unwrap();
            (out.report.subcycles, lvl.hydro().new_data().clone())
        };
        let (n1, a) = run();
        let (n2, b) = run();
        assert_eq!(n1, n2);
        assert_bits_eq(&a, &b);
    }

    #[test]
    fn density_drop_shrinks_the_retry_step() {
        let kernels = ScriptedKernels::new(0.1).with_density_drop(0.2, -0.5);
        let mut lvl = advancer(kernels, exact_config());
        let out = lvl.step(1.0).unwrap();
        assert!(out.report.dt_stable <= 0.2);
        assert!(out.report.subcycles >= 5);
        assert_eq!(out.report.frac_change, -0.5);
        assert_eq!(lvl.hydro().cur_time(), 1.0);
    }

    #[test]
    fn too_many_subcycles_aborts_until_reset() {
        let kernels = ScriptedKernels::new(1.0).with_stable_dt(0.01);
        let mut lvl = advancer(kernels, exact_config());
        let err = lvl.step(1.0).unwrap_err();
        assert!(matches!(
            err,
            AdvanceError::TooManySubcycles {
                subcycles: 100,
                max_subcycles: 10,
                ..
            }
        ));
        assert!(lvl.is_aborted());
        assert_eq!(
            lvl.last_report().and_then(RetryReport::final_state),
            Some(RetryState::Aborted)
        );
        assert!(matches!(lvl.step(0.001), Err(AdvanceError::Aborted { .. })));
        assert!(matches!(
            lvl.estimate_timestep(),
            Err(AdvanceError::Aborted { .. })
        ));

        lvl.reset();
        assert!(!lvl.is_aborted());
        assert!(lvl.step(0.005).is_ok());
    }

    #[test]
    fn invalid_timestep_does_not_abort() {
        let mut lvl = advancer(ScriptedKernels::new(1.0), exact_config());
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                lvl.step(dt),
                Err(AdvanceError::InvalidTimestep { .. })
            ));
        }
        assert!(!lvl.is_aborted());
        assert_eq!(lvl.time(), 0.0);
        assert!(lvl.step(0.1).is_ok());
    }

    #[test]
    fn non_finite_update_aborts() {
        let kernels = ScriptedKernels::new(1.0).with_nan_from(0.0);
        let mut lvl = advancer(kernels, exact_config());
        let err = lvl.step(0.1).unwrap_err();
        assert!(matches!(err, AdvanceError::NonFiniteState { .. }));
        assert!(lvl.is_aborted());
    }

    #[test]
    fn disabled_retry_lets_unstable_step_stand() {
        let kernels = ScriptedKernels::new(1.0).with_stable_dt(1.0e-6);
        let config = AdvanceConfig {
            use_retry: false,
            ..exact_config()
        };
        let mut lvl = advancer(kernels, config);
        let out = lvl.step(0.1).unwrap();
        assert_eq!(out.dt_new, 0.1);
        assert_eq!(out.report.transitions.as_slice(), &[RetryState::Accepted]);
        assert_eq!(out.report.dt_stable, f64::INFINITY);
    }

    #[test]
    fn auxiliary_state_carries_forward_and_survives_retry() {
        let kernels = ScriptedKernels::new(1.0).with_stable_dt(0.3);
        let mut lvl = advancer(kernels, exact_config());
        let mut aux = decay_state(12, 5, StateLayout::new(1));
        aux.new_mut().set_val(4.0);
        lvl.add_state_type(StateTypeId(1), aux).unwrap();

        lvl.step(1.0).unwrap();
        let aux = lvl.aux(StateTypeId(1)).unwrap();
        assert_eq!(aux.old().get(3, 0), 4.0);
        assert_eq!(aux.new_data().get(3, 0), 4.0);
        assert_eq!((aux.prev_time(), aux.cur_time()), (0.0, 1.0));
    }

    #[test]
    fn state_type_registration_is_checked() {
        let mut lvl = advancer(ScriptedKernels::new(1.0), exact_config());
        let same = || decay_state(12, 5, StateLayout::new(1));
        assert_eq!(
            lvl.add_state_type(StateTypeId::HYDRO, same()),
            Err(ConfigError::DuplicateStateType {
                id: StateTypeId::HYDRO
            })
        );
        lvl.add_state_type(StateTypeId(2), same()).unwrap();
        assert!(lvl.add_state_type(StateTypeId(2), same()).is_err());
        let other = decay_state(16, 4, StateLayout::new(1));
        assert_eq!(
            lvl.add_state_type(StateTypeId(3), other),
            Err(ConfigError::GeometryMismatch { id: StateTypeId(3) })
        );
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let state = decay_state(12, 5, StateLayout::new(3));
        let err = LevelAdvancer::new(
            LevelId(0),
            AdvanceConfig::default(),
            Box::new(ScriptedKernels::new(1.0)),
            state,
            Box::new(RecordingCollective::new()),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::LayoutMismatch { expected: 6, got: 8 });
    }

    #[test]
    fn single_cell_level_accepts_unit_halo() {
        let geom = LevelGeometry::new(1, 1, 0.0, 1.0, BoundaryKind::Periodic).unwrap();
        let tiny = StateData::new(geom, 6, 0.0);
        let ok = LevelAdvancer::new(
            LevelId(0),
            AdvanceConfig::default(),
            Box::new(ScriptedKernels::new(1.0)),
            tiny,
            Box::new(RecordingCollective::new()),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn reflux_only_on_finer_levels() {
        let config = AdvanceConfig {
            do_reflux: true,
            ..exact_config()
        };
        let mut fine = advancer_on(
            LevelId(1),
            ScriptedKernels::new(1.0),
            config.clone(),
            RecordingCollective::new(),
        );
        let (reg, log) = RecordingFluxRegister::new();
        fine.set_flux_register(Box::new(reg));
        fine.step(0.1).unwrap();
        let calls = log.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].side, RefluxSide::Coarse);
        assert_eq!(calls[1].side, RefluxSide::Fine);
        assert_eq!(calls[1].level, LevelId(1));

        let mut coarse = advancer(ScriptedKernels::new(1.0), config);
        let (reg, log) = RecordingFluxRegister::new();
        coarse.set_flux_register(Box::new(reg));
        coarse.step(0.1).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn losses_are_reduced_once_per_step() {
        let comm = RecordingCollective::new();
        let log = comm.log();
        let config = AdvanceConfig {
            use_retry: false,
            ..exact_config()
        };
        let mut lvl = advancer_on(LevelId(0), ScriptedKernels::new(1.0), config, comm);
        lvl.step(0.1).unwrap();
        lvl.step(0.1).unwrap();
        let sums = log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, Reduction::Sum(_)))
            .count();
        assert_eq!(sums, 2);
        // Scripted fluxes are zero.
        assert_eq!(*lvl.cumulative_losses(), LossTally::default());
    }

    #[test]
    fn estimate_uses_global_minimum() {
        let kernels = ScriptedKernels::new(1.0).with_stable_dt(0.4);
        let comm = RecordingCollective::new().with_peer_min(0.1);
        let config = AdvanceConfig {
            cfl: 0.5,
            ..AdvanceConfig::default()
        };
        let mut lvl = advancer_on(LevelId(0), kernels, config, comm);
        assert_eq!(lvl.estimate_timestep().unwrap(), 0.05);
    }
}
