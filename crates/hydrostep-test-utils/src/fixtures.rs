//! Scripted kernel sets for engine testing.
//!
//! [`ScriptedKernels`] evolves every component by linear decay
//! `dU/dt = -rate * U` with zero face fluxes, so exact answers are known
//! in closed form. Everything the retry controller reacts to is scripted:
//!
//! - the stable step, as a schedule over the step start time;
//! - a fractional density drop reported whenever the step is too long;
//! - NaN or hard failures injected from a given step start time.
//!
//! Every sanitizer call is logged per block, so tests can check the order
//! in which the engine applies them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hydrostep_core::{KernelError, StateLayout, URHO};
use hydrostep_kernel::{HydroKernels, KernelContext};
use hydrostep_state::Block;

/// Sanitizer calls as `(block lo, operation)`, in call order.
pub type SanitizeLog = Arc<Mutex<Vec<(usize, &'static str)>>>;

/// Linear-decay kernels with scripted stability behaviour.
pub struct ScriptedKernels {
    pub rate: f64,
    pub nspec: usize,
    /// `(from_time, tau)` pairs, ascending in `from_time`.
    stable_dt: Vec<(f64, f64)>,
    density_drop: Option<(f64, f64)>,
    nan_from: Option<f64>,
    fail_from: Option<f64>,
    burn_fraction: f64,
    flux_calls: AtomicUsize,
    stable_dt_calls: AtomicUsize,
    burn_calls: AtomicUsize,
    floor_calls: AtomicUsize,
    sanitize_log: SanitizeLog,
}

impl ScriptedKernels {
    /// Decay at `rate` with an unconditionally large stable step.
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            nspec: 1,
            stable_dt: vec![(f64::NEG_INFINITY, 1.0e30)],
            density_drop: None,
            nan_from: None,
            fail_from: None,
            burn_fraction: 0.0,
            flux_calls: AtomicUsize::new(0),
            stable_dt_calls: AtomicUsize::new(0),
            burn_calls: AtomicUsize::new(0),
            floor_calls: AtomicUsize::new(0),
            sanitize_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report `tau` as the signal-crossing time everywhere, always.
    pub fn with_stable_dt(mut self, tau: f64) -> Self {
        self.stable_dt = vec![(f64::NEG_INFINITY, tau)];
        self
    }

    /// Report `tau` for steps starting at or after `from_time`.
    pub fn with_stable_dt_from(mut self, from_time: f64, tau: f64) -> Self {
        self.stable_dt.push((from_time, tau));
        self.stable_dt.sort_by(|a, b| a.0.total_cmp(&b.0));
        self
    }

    /// Report fractional density change `frac` whenever a step longer
    /// than `dt_limit` is sanitized against a reference.
    pub fn with_density_drop(mut self, dt_limit: f64, frac: f64) -> Self {
        self.density_drop = Some((dt_limit, frac));
        self
    }

    /// Write NaN into the first cell's density update for steps starting
    /// at or after `time`.
    pub fn with_nan_from(mut self, time: f64) -> Self {
        self.nan_from = Some(time);
        self
    }

    /// Fail `flux_divergence` for steps starting at or after `time`.
    pub fn with_failure_from(mut self, time: f64) -> Self {
        self.fail_from = Some(time);
        self
    }

    /// Scale the whole working state by `1 - fraction` in the burn.
    pub fn with_burn(mut self, fraction: f64) -> Self {
        self.burn_fraction = fraction;
        self
    }

    /// Scripted signal-crossing time for a step starting at `time`.
    pub fn tau_at(&self, time: f64) -> f64 {
        self.stable_dt
            .iter()
            .rev()
            .find(|(from, _)| *from <= time)
            .map(|(_, tau)| *tau)
            .unwrap_or(f64::INFINITY)
    }

    /// Per-block `flux_divergence` calls so far.
    pub fn flux_calls(&self) -> usize {
        self.flux_calls.load(Ordering::Relaxed)
    }

    /// Per-block `stable_dt` calls so far.
    pub fn stable_dt_calls(&self) -> usize {
        self.stable_dt_calls.load(Ordering::Relaxed)
    }

    /// Per-block `burn` calls so far.
    pub fn burn_calls(&self) -> usize {
        self.burn_calls.load(Ordering::Relaxed)
    }

    /// Per-block `enforce_density_floor` calls so far.
    pub fn floor_calls(&self) -> usize {
        self.floor_calls.load(Ordering::Relaxed)
    }

    /// Handle to the sanitizer call log; stays valid after the kernels
    /// are moved into an advancer.
    pub fn sanitize_log(&self) -> SanitizeLog {
        Arc::clone(&self.sanitize_log)
    }

    /// Sanitizer operations applied to the block starting at `lo`.
    pub fn sanitize_calls(log: &SanitizeLog, lo: usize) -> Vec<&'static str> {
        let log = log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().filter(|(b, _)| *b == lo).map(|(_, op)| *op).collect()
    }

    fn record(&self, block: &Block, op: &'static str) {
        let mut log = self.sanitize_log.lock().unwrap_or_else(|e| e.into_inner());
        log.push((block.lo(), op));
    }
}

impl HydroKernels for ScriptedKernels {
    fn name(&self) -> &str {
        "scripted"
    }

    fn layout(&self) -> StateLayout {
        StateLayout::new(self.nspec)
    }

    fn ghost_width(&self) -> usize {
        1
    }

    fn burn(&self, _ctx: &KernelContext, state: &mut Block) -> Result<(), KernelError> {
        self.burn_calls.fetch_add(1, Ordering::Relaxed);
        let keep = 1.0 - self.burn_fraction;
        for v in state.data_mut() {
            *v *= keep;
        }
        Ok(())
    }

    fn flux_divergence(
        &self,
        ctx: &KernelContext,
        state: &Block,
        _q: &Block,
        divergence: &mut Block,
        face_flux: &mut [f64],
    ) -> Result<(), KernelError> {
        self.flux_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_from.is_some_and(|t| ctx.step_time() >= t) {
            return Err(KernelError::ExecutionFailed {
                reason: format!("scripted failure at t = {}", ctx.step_time()),
            });
        }
        for (d, s) in divergence.interior_mut().iter_mut().zip(state.interior()) {
            *d = -self.rate * s;
        }
        face_flux.fill(0.0);
        if self.nan_from.is_some_and(|t| ctx.step_time() >= t) && state.lo() == 0 {
            divergence.cell_mut(0)[URHO] = f64::NAN;
        }
        Ok(())
    }

    fn enforce_density_floor(
        &self,
        ctx: &KernelContext,
        state: &mut Block,
        reference: Option<&Block>,
    ) -> f64 {
        self.floor_calls.fetch_add(1, Ordering::Relaxed);
        self.record(state, "floor");
        match (self.density_drop, reference) {
            (Some((limit, frac)), Some(_)) if ctx.dt() > limit => frac,
            _ => 1.0,
        }
    }

    fn normalize_species(&self, _ctx: &KernelContext, state: &mut Block) {
        self.record(state, "species");
    }

    fn reset_internal_energy(&self, _ctx: &KernelContext, state: &mut Block) {
        self.record(state, "energy");
    }

    fn compute_temperature(
        &self,
        _ctx: &KernelContext,
        state: &mut Block,
    ) -> Result<(), KernelError> {
        self.record(state, "temperature");
        Ok(())
    }

    fn stable_dt(&self, ctx: &KernelContext, _state: &Block) -> Result<f64, KernelError> {
        self.stable_dt_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.tau_at(ctx.step_time()))
    }
}
