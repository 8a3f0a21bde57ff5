//! Stage integrators: the single-pass CTU update and the multi-stage
//! method-of-lines update.
//!
//! An integrator turns the old state of one (sub-)step into a provisional
//! new state. It never judges stability; that is the retry controller's
//! job. Both variants share the same three capabilities, sequenced by the
//! provided [`StageIntegrator::advance_one_step`]:
//!
//! ```text
//!   for each stage:
//!       audit old state
//!       prepare_working_state  (ghost-padded state for this stage)
//!       compute_update         (stage derivative, face fluxes, losses)
//!   finalize                   (combine, sanitize, audit new state)
//! ```

use rayon::prelude::*;
use smallvec::SmallVec;

use hydrostep_core::{AdvanceError, FaceFluxes, IntegrationScheme, KernelError, StateSlot};
use hydrostep_kernel::{HydroKernels, KernelContext};
use hydrostep_state::{StateBuffer, StateData, StateError};

use crate::losses::LossTally;
use crate::sanitize::SanitizerGate;
use crate::tableau::{ButcherTableau, MAX_STAGES};

// ── Workspace ──────────────────────────────────────────────────────

/// Scratch buffers that live for one advance.
///
/// Allocated at step setup, dropped at teardown. Everything here is
/// zero-ghost interior data.
#[derive(Clone, Debug)]
pub struct StepWorkspace {
    /// dt-weighted update applied to the baseline state.
    pub hydro_source: StateBuffer,
    /// One derivative per stage.
    pub stage_derivatives: SmallVec<[StateBuffer; MAX_STAGES]>,
    /// Baseline of the multi-stage sum; absent for CTU.
    pub post_burn: Option<StateBuffer>,
    /// dt-weighted face fluxes accumulated over the step.
    pub fluxes: FaceFluxes,
    /// Boundary losses accumulated over the step.
    pub losses: LossTally,
    /// Most negative fractional density change of the last pass.
    pub frac_change: f64,
}

impl StepWorkspace {
    /// Zeroed workspace for advancing `state` with `scheme`.
    pub fn new(state: &StateData, scheme: IntegrationScheme) -> Self {
        let geom = state.geometry();
        let ncomp = state.ncomp();
        let zero = || StateBuffer::new(geom, ncomp, 0);
        Self {
            hydro_source: zero(),
            stage_derivatives: (0..scheme.stage_count()).map(|_| zero()).collect(),
            post_burn: (!scheme.is_ctu()).then(zero),
            fluxes: FaceFluxes::new(geom.ncell(), ncomp),
            losses: LossTally::default(),
            frac_change: 1.0,
        }
    }
}

// ── StageEnv ───────────────────────────────────────────────────────

/// Physics passes enabled for a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageOptions {
    /// Compute the flux divergence.
    pub do_hydro: bool,
    /// Burn the stage-0 working state.
    pub do_react: bool,
    /// Tally boundary losses.
    pub track_grid_losses: bool,
}

/// Everything an integrator touches during one (sub-)step.
pub struct StageEnv<'a> {
    /// Kernel set.
    pub kernels: &'a dyn HydroKernels,
    /// Hydro state; time levels already swapped for this (sub-)step.
    pub state: &'a mut StateData,
    /// Step scratch buffers.
    pub workspace: &'a mut StepWorkspace,
    /// Context of the (sub-)step, stage 0.
    pub ctx: KernelContext,
    /// Enabled passes.
    pub options: StageOptions,
}

/// What one call of [`StageIntegrator::advance_one_step`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageReport {
    /// Stages executed.
    pub stages: usize,
    /// Most negative fractional density change reported by the sanitizer.
    pub frac_change: f64,
}

// ── StageIntegrator ────────────────────────────────────────────────

/// A time-integration scheme, chosen once at configuration time.
pub trait StageIntegrator: Send {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    /// Stage structure of the scheme.
    fn tableau(&self) -> &ButcherTableau;

    /// Build the ghost-padded working state of `stage`, updating the new
    /// slot of `env.state` as the scheme requires.
    fn prepare_working_state(
        &self,
        env: &mut StageEnv<'_>,
        stage: usize,
    ) -> Result<StateBuffer, AdvanceError>;

    /// Compute the derivative of `stage` from `working`.
    fn compute_update(
        &self,
        env: &mut StageEnv<'_>,
        stage: usize,
        working: &StateBuffer,
    ) -> Result<(), AdvanceError>;

    /// Produce the final new state, sanitize it and audit it.
    /// `working` is the last stage's working state.
    fn finalize(&self, env: &mut StageEnv<'_>, working: &StateBuffer) -> Result<(), AdvanceError>;

    /// Run every stage of one (sub-)step.
    fn advance_one_step(&self, env: &mut StageEnv<'_>) -> Result<StageReport, AdvanceError> {
        let stages = self.tableau().stages();
        env.workspace.frac_change = 1.0;
        for stage in 0..stages {
            SanitizerGate::audit(env.ctx.level(), StateSlot::Old, env.state.old())?;
            let working = self.prepare_working_state(env, stage)?;
            self.compute_update(env, stage, &working)?;
            if stage + 1 == stages {
                self.finalize(env, &working)?;
            }
        }
        Ok(StageReport {
            stages,
            frac_change: env.workspace.frac_change,
        })
    }
}

/// The integrator for `scheme`.
pub fn integrator_for(scheme: IntegrationScheme) -> Box<dyn StageIntegrator> {
    match scheme {
        IntegrationScheme::Ctu => Box::new(CtuIntegrator::new()),
        IntegrationScheme::MethodOfLines(_) => {
            Box::new(MolIntegrator::new(ButcherTableau::for_scheme(scheme)))
        }
    }
}

// ── CTU ────────────────────────────────────────────────────────────

/// Single unsplit pass: `new = expanded + dt * k`.
#[derive(Clone, Debug)]
pub struct CtuIntegrator {
    tableau: ButcherTableau,
}

impl CtuIntegrator {
    /// The CTU integrator.
    pub fn new() -> Self {
        Self {
            tableau: ButcherTableau::FORWARD_EULER,
        }
    }
}

impl Default for CtuIntegrator {
    fn default() -> Self {
        Self::new()
    }
}

impl StageIntegrator for CtuIntegrator {
    fn name(&self) -> &str {
        "ctu"
    }

    fn tableau(&self) -> &ButcherTableau {
        &self.tableau
    }

    fn prepare_working_state(
        &self,
        env: &mut StageEnv<'_>,
        _stage: usize,
    ) -> Result<StateBuffer, AdvanceError> {
        let mut working = expand(env, env.state.prev_time())?;
        burn(env, &mut working)?;
        env.state.new_mut().copy_from(&working);
        Ok(working)
    }

    fn compute_update(
        &self,
        env: &mut StageEnv<'_>,
        stage: usize,
        working: &StateBuffer,
    ) -> Result<(), AdvanceError> {
        let dt = env.ctx.dt();
        let ctx = env.ctx.at_stage(stage, env.ctx.step_time());
        compute_derivative(env, &ctx, stage, working, dt)?;

        let ws = &mut *env.workspace;
        ws.hydro_source.set_val(0.0);
        ws.hydro_source.saxpy(dt, &ws.stage_derivatives[stage]);
        env.state.new_mut().add(&ws.hydro_source);
        Ok(())
    }

    fn finalize(&self, env: &mut StageEnv<'_>, working: &StateBuffer) -> Result<(), AdvanceError> {
        let frac = SanitizerGate::new(env.kernels).clean_state(
            &env.ctx,
            env.state.new_mut(),
            Some(working),
        )?;
        env.workspace.frac_change = env.workspace.frac_change.min(frac);
        SanitizerGate::audit(env.ctx.level(), StateSlot::New, env.state.new_data())
    }
}

// ── Method of lines ────────────────────────────────────────────────

/// Explicit multi-stage update driven by a Butcher tableau:
/// `new = post_burn + Σ dt * b[n] * k[n]`.
#[derive(Clone, Debug)]
pub struct MolIntegrator {
    tableau: ButcherTableau,
}

impl MolIntegrator {
    /// Integrator for `tableau`.
    pub fn new(tableau: ButcherTableau) -> Self {
        Self { tableau }
    }
}

impl StageIntegrator for MolIntegrator {
    fn name(&self) -> &str {
        "mol"
    }

    fn tableau(&self) -> &ButcherTableau {
        &self.tableau
    }

    fn prepare_working_state(
        &self,
        env: &mut StageEnv<'_>,
        stage: usize,
    ) -> Result<StateBuffer, AdvanceError> {
        let level = env.ctx.level();
        if stage == 0 {
            let mut working = expand(env, env.state.prev_time())?;
            burn(env, &mut working)?;
            env.state.new_mut().copy_from(&working);
            env.workspace
                .post_burn
                .as_mut()
                .ok_or_else(|| missing_baseline(level))?
                .copy_from(&working);
            return Ok(working);
        }

        let dt = env.ctx.dt();
        let ws = &*env.workspace;
        let post_burn = ws.post_burn.as_ref().ok_or_else(|| missing_baseline(level))?;
        let new = env.state.new_mut();
        new.copy_from(post_burn);
        for j in 0..stage {
            let a = self.tableau.a(stage, j);
            if a != 0.0 {
                new.saxpy(dt * a, &ws.stage_derivatives[j]);
            }
        }
        expand(env, env.state.cur_time())
    }

    fn compute_update(
        &self,
        env: &mut StageEnv<'_>,
        stage: usize,
        working: &StateBuffer,
    ) -> Result<(), AdvanceError> {
        let dt = env.ctx.dt();
        let ctx = env
            .ctx
            .at_stage(stage, env.ctx.step_time() + self.tableau.c(stage) * dt);
        compute_derivative(env, &ctx, stage, working, dt * self.tableau.b(stage))
    }

    fn finalize(&self, env: &mut StageEnv<'_>, _working: &StateBuffer) -> Result<(), AdvanceError> {
        let dt = env.ctx.dt();
        let level = env.ctx.level();
        let ws = &mut *env.workspace;
        ws.hydro_source.set_val(0.0);
        for n in 0..self.tableau.stages() {
            ws.hydro_source
                .saxpy(dt * self.tableau.b(n), &ws.stage_derivatives[n]);
        }
        let post_burn = ws.post_burn.as_ref().ok_or_else(|| missing_baseline(level))?;
        let new = env.state.new_mut();
        new.copy_from(post_burn);
        new.add(&ws.hydro_source);

        let frac = SanitizerGate::new(env.kernels).clean_state(&env.ctx, new, Some(post_burn))?;
        ws.frac_change = ws.frac_change.min(frac);
        SanitizerGate::audit(level, StateSlot::New, env.state.new_data())
    }
}

// ── Shared stage operations ────────────────────────────────────────

fn kernel_failed(kernels: &dyn HydroKernels, reason: KernelError) -> AdvanceError {
    AdvanceError::KernelFailed {
        kernel: kernels.name().to_string(),
        reason,
    }
}

fn state_access(level: hydrostep_core::LevelId, e: StateError) -> AdvanceError {
    AdvanceError::StateAccess {
        level,
        reason: e.to_string(),
    }
}

fn missing_baseline(level: hydrostep_core::LevelId) -> AdvanceError {
    AdvanceError::StateAccess {
        level,
        reason: "multi-stage update without a post-burn baseline".to_string(),
    }
}

fn expand(env: &StageEnv<'_>, time: f64) -> Result<StateBuffer, AdvanceError> {
    env.state
        .expand(time, env.kernels.ghost_width())
        .map_err(|e| state_access(env.ctx.level(), e))
}

fn burn(env: &StageEnv<'_>, working: &mut StateBuffer) -> Result<(), AdvanceError> {
    if !env.options.do_react {
        return Ok(());
    }
    let kernels = env.kernels;
    let ctx = &env.ctx;
    let results: Vec<Result<(), KernelError>> = working
        .blocks_mut()
        .par_iter_mut()
        .map(|b| kernels.burn(ctx, b))
        .collect();
    results
        .into_iter()
        .try_for_each(|r| r.map_err(|e| kernel_failed(kernels, e)))
}

/// Fill the derivative of `stage` from `working`, then fold the block
/// face fluxes into the step accumulators with `weight`.
fn compute_derivative(
    env: &mut StageEnv<'_>,
    ctx: &KernelContext,
    stage: usize,
    working: &StateBuffer,
    weight: f64,
) -> Result<(), AdvanceError> {
    if !env.options.do_hydro {
        return Ok(());
    }
    let kernels = env.kernels;
    let ncomp = working.ncomp();
    let mut q = working.reshaped(kernels.nprim(), working.ghost());
    let k = &mut env.workspace.stage_derivatives[stage];

    let block_faces: Vec<Result<Vec<f64>, KernelError>> = k
        .blocks_mut()
        .par_iter_mut()
        .zip(q.blocks_mut().par_iter_mut())
        .zip(working.blocks().par_iter())
        .map(|((kb, qb), wb)| {
            kernels.primitives(ctx, wb, qb)?;
            let mut faces = vec![0.0; (wb.len() + 1) * ncomp];
            kernels.flux_divergence(ctx, wb, qb, kb, &mut faces)?;
            Ok(faces)
        })
        .collect();

    let ncell = working.ncell();
    let ws = &mut *env.workspace;
    for (block, faces) in working.blocks().iter().zip(block_faces) {
        let faces = faces.map_err(|e| kernel_failed(kernels, e))?;
        ws.fluxes
            .accumulate_block(block.lo(), block.len(), weight, &faces);
        if env.options.track_grid_losses {
            let left = (block.lo() == 0).then(|| &faces[..ncomp]);
            let right = (block.hi() == ncell).then(|| &faces[block.len() * ncomp..]);
            ws.losses.record(weight, left, right);
        }
    }
    Ok(())
}
