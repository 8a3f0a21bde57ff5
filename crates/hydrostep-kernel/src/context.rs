//! Immutable per-step context handed to physics kernels.
//!
//! [`KernelContext`] replaces ambient global state: everything a kernel
//! needs to know about the step in progress is carried in one `Copy`
//! value built by the engine at step setup.

use hydrostep_core::{IntegrationScheme, LevelId};

/// Step and stage information for kernel calls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelContext {
    level: LevelId,
    amr_iteration: u32,
    amr_ncycle: u32,
    scheme: IntegrationScheme,
    stage: usize,
    step_time: f64,
    time: f64,
    dt: f64,
    dx: f64,
    ncell: usize,
}

impl KernelContext {
    /// Context for a step of size `dt` starting at `time` on `level`.
    ///
    /// Starts at stage 0 of AMR iteration 1 of 1.
    pub fn new(
        level: LevelId,
        scheme: IntegrationScheme,
        time: f64,
        dt: f64,
        dx: f64,
        ncell: usize,
    ) -> Self {
        Self {
            level,
            amr_iteration: 1,
            amr_ncycle: 1,
            scheme,
            stage: 0,
            step_time: time,
            time,
            dt,
            dx,
            ncell,
        }
    }

    /// Set the position within the coarser level's subcycle.
    pub fn with_iteration(mut self, amr_iteration: u32, amr_ncycle: u32) -> Self {
        self.amr_iteration = amr_iteration;
        self.amr_ncycle = amr_ncycle;
        self
    }

    /// The same step, positioned at `stage` evaluated at `time`.
    pub fn at_stage(mut self, stage: usize, time: f64) -> Self {
        self.stage = stage;
        self.time = time;
        self
    }

    /// A (sub-)step of size `dt` starting at `time`, stage 0.
    pub fn for_step(mut self, time: f64, dt: f64) -> Self {
        self.step_time = time;
        self.time = time;
        self.dt = dt;
        self.stage = 0;
        self
    }

    /// Level being advanced.
    pub fn level(&self) -> LevelId {
        self.level
    }

    /// Iteration within the coarser level's subcycle, starting at 1.
    pub fn amr_iteration(&self) -> u32 {
        self.amr_iteration
    }

    /// Number of subcycles this level takes per coarse step.
    pub fn amr_ncycle(&self) -> u32 {
        self.amr_ncycle
    }

    /// Active integration scheme.
    pub fn scheme(&self) -> IntegrationScheme {
        self.scheme
    }

    /// Current stage index.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Start time of the step.
    pub fn step_time(&self) -> f64 {
        self.step_time
    }

    /// Time at which the current stage is evaluated.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Step size.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Cell width.
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Number of cells on the level.
    pub fn ncell(&self) -> usize {
        self.ncell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrostep_core::MolTableau;

    #[test]
    fn stage_and_step_rebinding() {
        let base = KernelContext::new(
            LevelId(2),
            IntegrationScheme::MethodOfLines(MolTableau::SspRk3),
            1.0,
            0.1,
            0.01,
            100,
        )
        .with_iteration(2, 4);

        let stage = base.at_stage(2, 1.05);
        assert_eq!(stage.stage(), 2);
        assert_eq!(stage.time(), 1.05);
        assert_eq!(stage.step_time(), 1.0);
        assert_eq!(stage.amr_iteration(), 2);

        let sub = stage.for_step(1.025, 0.025);
        assert_eq!(sub.stage(), 0);
        assert_eq!(sub.time(), 1.025);
        assert_eq!(sub.dt(), 0.025);
        assert_eq!(sub.level(), LevelId(2));
        assert_eq!(sub.amr_ncycle(), 4);
    }
}
