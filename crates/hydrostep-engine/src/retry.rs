//! Post-step stability evaluation and sub-cycling retry.
//!
//! After the integrator has produced a provisional new state, the
//! controller asks whether the step was stable. If not, it rolls the level
//! back to a checkpoint and re-executes the same interval as `N` shorter
//! sub-steps, each of which is evaluated in turn up to a nesting limit.
//!
//! ```text
//!             ┌────────────┐  dt within tol.    ┌──────────┐
//!  integrate ─► Evaluating ├────────────────────► Accepted │
//!             └─────┬──────┘                    └────▲─────┘
//!                   │ dt too long                    │ all sub-steps done
//!             ┌─────▼──────┐                         │
//!             │ Subcycling ├─────────────────────────┘
//!             └─────┬──────┘
//!                   │ overflow / ceiling / cutoff
//!             ┌─────▼──────┐
//!             │  Aborted   │
//!             └────────────┘
//! ```
//!
//! The controller talks to the level through [`StepExecutor`], so the
//! state machine is independent of how state is stored.

use indexmap::IndexMap;
use log::{debug, info, warn};
use smallvec::SmallVec;

use hydrostep_core::{AdvanceError, Collective, FaceFluxes, LevelId, StateTypeId};
use hydrostep_state::StateSnapshot;

use crate::config::AdvanceConfig;
use crate::losses::LossTally;

// ── Policy ─────────────────────────────────────────────────────────

/// The retry-relevant subset of [`AdvanceConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Courant number.
    pub cfl: f64,
    /// Relative slack in the accept test: a step stands when
    /// `dt <= (1 + tolerance) * dt_stable`. Sub-steps are sized from
    /// `dt_stable` alone.
    pub tolerance: f64,
    /// Density-drop shrink factor; `0` disables the criterion.
    pub neg_dens_factor: f64,
    /// Sub-cycle ceiling; `0` means unlimited.
    pub max_subcycles: u32,
    /// Smallest permitted sub-step.
    pub dt_cutoff: f64,
    /// Maximum nesting of retries.
    pub max_depth: u32,
}

impl RetryPolicy {
    /// Extract the policy from a validated config.
    pub fn from_config(config: &AdvanceConfig) -> Self {
        Self {
            cfl: config.cfl,
            tolerance: config.retry_tolerance,
            neg_dens_factor: config.retry_neg_dens_factor,
            max_subcycles: config.retry_max_subcycles,
            dt_cutoff: config.dt_cutoff,
            max_depth: config.retry_max_depth,
        }
    }
}

// ── Decision ───────────────────────────────────────────────────────

/// Controller state, as recorded in [`RetryReport::transitions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    /// The step stands.
    Accepted,
    /// Stability of the provisional new state is being computed.
    Evaluating,
    /// The step is being re-executed as sub-steps.
    Subcycling,
    /// The step failed fatally.
    Aborted,
}

/// A rejected step and how it will be re-executed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryContext {
    /// Step that was rejected.
    pub dt: f64,
    /// Largest stable sub-step, reduced over all ranks.
    pub dt_subcycle: f64,
    /// Number of sub-steps, `ceil(dt / dt_subcycle)`.
    pub subcycles: u32,
    /// Most negative fractional density change, reduced over all ranks.
    pub frac_change: f64,
}

/// Cap `dt_stable` when density fell by more than the tolerated fraction.
///
/// With `frac < 0`, returns `min(dt_stable, dt * -(factor / frac))`.
pub fn shrink_for_density_drop(dt_stable: f64, dt: f64, factor: f64, frac: f64) -> f64 {
    if frac < 0.0 {
        dt_stable.min(dt * -(factor / frac))
    } else {
        dt_stable
    }
}

/// Decide whether a step of `dt` stands given the global stable step.
///
/// `Ok(None)` accepts the step, which happens when
/// `dt_stable * (1 + tolerance) >= dt`. Otherwise the sub-cycle count
/// `ceil(dt / dt_stable)` is derived and checked, in order, for counter
/// overflow, the sub-cycle ceiling and the minimum sub-step.
pub fn plan_subcycles(
    policy: &RetryPolicy,
    level: LevelId,
    dt: f64,
    dt_stable: f64,
    frac_change: f64,
) -> Result<Option<RetryContext>, AdvanceError> {
    if dt_stable * (1.0 + policy.tolerance) >= dt {
        return Ok(None);
    }
    if !(dt_stable > 0.0 && dt_stable.is_finite()) || dt_stable * f64::from(u32::MAX) < dt {
        return Err(AdvanceError::SubcycleOverflow {
            level,
            dt,
            dt_subcycle: dt_stable,
        });
    }
    // Bounded by u32::MAX after the overflow check.
    let subcycles = (dt / dt_stable).ceil() as u32;
    if policy.max_subcycles > 0 && subcycles > policy.max_subcycles {
        return Err(AdvanceError::TooManySubcycles {
            level,
            dt,
            dt_subcycle: dt_stable,
            subcycles,
            max_subcycles: policy.max_subcycles,
        });
    }
    if dt_stable < policy.dt_cutoff {
        return Err(AdvanceError::SubcycleTooShort {
            level,
            dt,
            dt_subcycle: dt_stable,
            subcycles,
            dt_cutoff: policy.dt_cutoff,
        });
    }
    Ok(Some(RetryContext {
        dt,
        dt_subcycle: dt_stable,
        subcycles,
        frac_change,
    }))
}

// ── Sub-step schedule ──────────────────────────────────────────────

/// One sub-step of a retry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubStep {
    /// Zero-based position in the sequence.
    pub index: u32,
    /// Start time.
    pub time: f64,
    /// End time; the next sub-step's start, or the interval end.
    pub end: f64,
    /// Length, `end - time`.
    pub dt: f64,
}

/// Sub-steps of `dt / N` covering `[time, time + dt]`.
///
/// Sub-step `i` starts at `time + i * (dt / N)`, so rounding does not
/// accumulate along the sequence. Sub-step `N - 1` ends exactly at
/// `time + dt`, as does any earlier one that would end within
/// `1e-10 * dt` of it.
#[derive(Clone, Debug)]
pub struct SubcyclePlan {
    start: f64,
    end: f64,
    eps: f64,
    dt_advance: f64,
    subcycles: u32,
    index: u32,
    done: bool,
}

impl SubcyclePlan {
    /// Plan `subcycles` sub-steps over `[time, time + dt]`.
    pub fn new(time: f64, dt: f64, subcycles: u32) -> Self {
        let subcycles = subcycles.max(1);
        Self {
            start: time,
            end: time + dt,
            eps: 1.0e-10 * dt,
            dt_advance: dt / f64::from(subcycles),
            subcycles,
            index: 0,
            done: false,
        }
    }

    fn start_of(&self, index: u32) -> f64 {
        self.start + f64::from(index) * self.dt_advance
    }
}

impl Iterator for SubcyclePlan {
    type Item = SubStep;

    fn next(&mut self) -> Option<SubStep> {
        if self.done || self.index >= self.subcycles {
            return None;
        }
        let time = self.start_of(self.index);
        let next = self.start_of(self.index + 1);
        let last = self.index + 1 == self.subcycles || next > self.end - self.eps;
        let end = if last { self.end } else { next };
        let step = SubStep {
            index: self.index,
            time,
            end,
            dt: end - time,
        };
        self.index += 1;
        self.done = last;
        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.done {
            0
        } else {
            (self.subcycles - self.index) as usize
        };
        (0, Some(left))
    }
}

// ── Report ─────────────────────────────────────────────────────────

/// What the controller did during one advance.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryReport {
    /// States of the outermost evaluation, in order.
    pub transitions: SmallVec<[RetryState; 4]>,
    /// Requested step.
    pub dt: f64,
    /// Global stable step of the outermost evaluation; infinite when
    /// retry is disabled.
    pub dt_stable: f64,
    /// Most negative fractional density change of the first pass.
    pub frac_change: f64,
    /// Sub-steps of the outermost retry (0 when accepted).
    pub subcycles: u32,
    /// Sub-steps executed at any depth.
    pub substeps: u32,
    /// Retry sequences started at any depth.
    pub retries: u32,
    /// Deepest nesting reached.
    pub max_depth: u32,
    /// Sub-steps that stood without evaluation at the depth limit.
    pub unchecked_substeps: u32,
}

impl RetryReport {
    /// Empty report for a step of `dt`.
    pub fn new(dt: f64) -> Self {
        Self {
            transitions: SmallVec::new(),
            dt,
            dt_stable: f64::INFINITY,
            frac_change: 1.0,
            subcycles: 0,
            substeps: 0,
            retries: 0,
            max_depth: 0,
            unchecked_substeps: 0,
        }
    }

    /// Terminal state, if the evaluation finished.
    pub fn final_state(&self) -> Option<RetryState> {
        self.transitions
            .last()
            .copied()
            .filter(|s| matches!(s, RetryState::Accepted | RetryState::Aborted))
    }

    /// Whether the step was re-executed.
    pub fn retried(&self) -> bool {
        self.retries > 0
    }
}

// ── Checkpoint ─────────────────────────────────────────────────────

/// Everything a retry rolls back: both slots of every tracked state type,
/// plus the loss tally and face fluxes accumulated so far in the step.
#[derive(Clone, Debug)]
pub struct RetryCheckpoint {
    pub(crate) hydro: StateSnapshot,
    pub(crate) aux: IndexMap<StateTypeId, StateSnapshot>,
    pub(crate) losses: LossTally,
    pub(crate) fluxes: FaceFluxes,
}

impl RetryCheckpoint {
    /// Snapshot of the hydro state.
    pub fn hydro(&self) -> &StateSnapshot {
        &self.hydro
    }

    /// Snapshot of an auxiliary state type.
    pub fn aux(&self, id: StateTypeId) -> Option<&StateSnapshot> {
        self.aux.get(&id)
    }

    /// Loss tally at checkpoint time.
    pub fn losses(&self) -> &LossTally {
        &self.losses
    }
}

// ── StepExecutor ───────────────────────────────────────────────────

/// The operations the controller needs from a level.
pub trait StepExecutor {
    /// Rollback point type.
    type Checkpoint;

    /// This rank's smallest signal-crossing time over the new state of
    /// the (sub-)step `[time, time + dt]`.
    fn local_stable_dt(&mut self, time: f64, dt: f64) -> Result<f64, AdvanceError>;

    /// This rank's most negative fractional density change from the last
    /// integration.
    fn local_frac_change(&self) -> f64;

    /// Capture a rollback point.
    fn checkpoint(&self) -> Self::Checkpoint;

    /// Restore both slots of every state type, the loss tally and the face
    /// fluxes. Time stamps are untouched.
    fn restore(&mut self, checkpoint: &Self::Checkpoint);

    /// Restore the old slot of every state type. Time stamps are untouched.
    fn restore_old(&mut self, checkpoint: &Self::Checkpoint);

    /// Swap time levels of every state type.
    fn swap_time_levels(&mut self, dt: f64);

    /// Set the time bracket of every state type.
    fn set_time_level(&mut self, prev_time: f64, cur_time: f64);

    /// Run the integrator over `[time, time + dt]`. Time levels are
    /// already swapped.
    fn integrate(&mut self, time: f64, dt: f64) -> Result<(), AdvanceError>;
}

// ── RetryController ────────────────────────────────────────────────

/// Evaluates steps and drives sub-cycling.
#[derive(Clone, Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    level: LevelId,
}

impl RetryController {
    /// Controller for `level`.
    pub fn new(policy: RetryPolicy, level: LevelId) -> Self {
        Self { policy, level }
    }

    /// The active policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Global stable step and fractional density change for the
    /// (sub-)step just integrated.
    ///
    /// Collective calls, in order: a min over the density change (only
    /// when the density criterion is enabled), then a min over the
    /// candidate step.
    pub fn stable_step<E: StepExecutor + ?Sized>(
        &self,
        exec: &mut E,
        comm: &mut dyn Collective,
        time: f64,
        dt: f64,
    ) -> Result<(f64, f64), AdvanceError> {
        let tau = exec.local_stable_dt(time, dt)?;
        let mut dt_local = self.policy.cfl * tau;
        let mut frac = exec.local_frac_change();
        if self.policy.neg_dens_factor > 0.0 {
            frac = comm.reduce_min(frac)?;
            dt_local = shrink_for_density_drop(dt_local, dt, self.policy.neg_dens_factor, frac);
        }
        let dt_stable = comm.reduce_min(dt_local)?;
        Ok((dt_stable, frac))
    }

    /// Evaluate the step `[time, time + dt]` that was just integrated and
    /// retry it from `checkpoint` if it was unstable.
    ///
    /// Returns the suggested next step: `min(dt, dt_subcycle)` after a
    /// retry, `dt` otherwise. On return the level holds exactly one new
    /// state at `time + dt` and the old state at `time`.
    pub fn evaluate<E: StepExecutor + ?Sized>(
        &self,
        exec: &mut E,
        comm: &mut dyn Collective,
        time: f64,
        dt: f64,
        checkpoint: &E::Checkpoint,
        report: &mut RetryReport,
    ) -> Result<f64, AdvanceError> {
        let result = self.evaluate_at(exec, comm, time, dt, checkpoint, 0, report);
        if result.is_err() {
            report.transitions.push(RetryState::Aborted);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_at<E: StepExecutor + ?Sized>(
        &self,
        exec: &mut E,
        comm: &mut dyn Collective,
        time: f64,
        dt: f64,
        checkpoint: &E::Checkpoint,
        depth: u32,
        report: &mut RetryReport,
    ) -> Result<f64, AdvanceError> {
        let outermost = depth == 0;
        if outermost {
            report.transitions.push(RetryState::Evaluating);
        }
        let (dt_stable, frac) = self.stable_step(exec, comm, time, dt)?;
        if outermost {
            report.dt_stable = dt_stable;
            report.frac_change = frac;
        }

        let planned = plan_subcycles(&self.policy, self.level, dt, dt_stable, frac);
        if outermost && !matches!(planned, Ok(None)) {
            report.transitions.push(RetryState::Subcycling);
        }
        let Some(retry) = planned? else {
            if outermost {
                report.transitions.push(RetryState::Accepted);
            }
            return Ok(dt);
        };

        let io = comm.is_io_rank();
        if io {
            info!(
                "level {}: timestep {dt:e} at t = {time:e} rejected (stable dt = {:e}, \
                 density change {:.3}); retrying with {} subcycled timesteps at depth {}",
                self.level,
                retry.dt_subcycle,
                retry.frac_change,
                retry.subcycles,
                depth + 1,
            );
        }
        report.retries += 1;
        report.max_depth = report.max_depth.max(depth + 1);
        if outermost {
            report.subcycles = retry.subcycles;
        }

        exec.restore(checkpoint);
        // Collapse the bracket so the first sub-step's swap starts at `time`.
        exec.swap_time_levels(0.0);
        exec.set_time_level(time, time);

        let nested = depth + 1 < self.policy.max_depth;
        if !nested && io {
            warn!(
                "level {}: retry depth limit {} reached; {} subcycled timesteps stand unchecked",
                self.level, self.policy.max_depth, retry.subcycles,
            );
        }
        for sub in SubcyclePlan::new(time, dt, retry.subcycles) {
            if io {
                debug!(
                    "level {}: depth {} subcycle {}/{} from t = {:e} with dt = {:e}",
                    self.level,
                    depth + 1,
                    sub.index + 1,
                    retry.subcycles,
                    sub.time,
                    sub.dt,
                );
            }
            exec.swap_time_levels(sub.dt);
            exec.set_time_level(sub.time, sub.end);
            let sub_checkpoint = nested.then(|| exec.checkpoint());
            exec.integrate(sub.time, sub.dt)?;
            report.substeps += 1;
            match sub_checkpoint {
                Some(cp) => {
                    self.evaluate_at(exec, comm, sub.time, sub.dt, &cp, depth + 1, report)?;
                }
                None => report.unchecked_substeps += 1,
            }
        }

        exec.restore_old(checkpoint);
        exec.set_time_level(time, time + dt);
        if outermost {
            report.transitions.push(RetryState::Accepted);
        }
        Ok(dt.min(retry.dt_subcycle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrostep_test_utils::{RecordingCollective, Reduction};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            cfl: 1.0,
            tolerance: 0.0,
            neg_dens_factor: 0.1,
            max_subcycles: 10,
            dt_cutoff: 0.0,
            max_depth: 4,
        }
    }

    // ── plan_subcycles ──

    #[test]
    fn stable_step_equal_to_dt_is_accepted() {
        assert_eq!(plan_subcycles(&policy(), LevelId(0), 1.0, 1.0, 1.0), Ok(None));
    }

    #[test]
    fn tolerance_widens_acceptance_but_not_substeps() {
        let p = RetryPolicy {
            tolerance: 0.5,
            ..policy()
        };
        assert_eq!(plan_subcycles(&p, LevelId(0), 1.0, 0.7, 1.0), Ok(None));
        let ctx = plan_subcycles(&p, LevelId(0), 1.0, 0.3, 1.0).unwrap().unwrap();
        assert_eq!(ctx.dt_subcycle, 0.3);
        assert_eq!(ctx.subcycles, 4);
    }

    #[test]
    fn count_is_ceiling_of_ratio() {
        let ctx = plan_subcycles(&policy(), LevelId(0), 1.0, 0.3, 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(ctx.subcycles, 4);
        assert_eq!(ctx.dt_subcycle, 0.3);
    }

    #[test]
    fn density_drop_forces_at_least_five_subcycles() {
        let dt_stable = shrink_for_density_drop(f64::INFINITY, 1.0, 0.1, -0.5);
        assert!(dt_stable <= 0.2 + 1e-15);
        let ctx = plan_subcycles(&policy(), LevelId(0), 1.0, dt_stable, -0.5)
            .unwrap()
            .unwrap();
        assert!(ctx.subcycles >= 5);
    }

    #[test]
    fn positive_change_does_not_shrink() {
        assert_eq!(shrink_for_density_drop(0.7, 1.0, 0.1, 0.5), 0.7);
        assert_eq!(shrink_for_density_drop(0.7, 1.0, 0.1, 1.0), 0.7);
    }

    #[test]
    fn ceiling_violation_names_count_and_ceiling() {
        let err = plan_subcycles(&policy(), LevelId(2), 1.0, 0.05, 1.0).unwrap_err();
        assert_eq!(
            err,
            AdvanceError::TooManySubcycles {
                level: LevelId(2),
                dt: 1.0,
                dt_subcycle: 0.05,
                subcycles: 20,
                max_subcycles: 10,
            }
        );
    }

    #[test]
    fn unlimited_ceiling_permits_many_subcycles() {
        let p = RetryPolicy {
            max_subcycles: 0,
            ..policy()
        };
        let ctx = plan_subcycles(&p, LevelId(0), 1.0, 1.0e-3, 1.0).unwrap().unwrap();
        assert_eq!(ctx.subcycles, 1000);
    }

    #[test]
    fn overflow_checked_before_ceiling() {
        let err = plan_subcycles(&policy(), LevelId(0), 1.0, 1.0e-12, 1.0).unwrap_err();
        assert!(matches!(err, AdvanceError::SubcycleOverflow { .. }));
        let err = plan_subcycles(&policy(), LevelId(0), 1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, AdvanceError::SubcycleOverflow { .. }));
        let err = plan_subcycles(&policy(), LevelId(0), 1.0, f64::NAN, 1.0).unwrap_err();
        assert!(matches!(err, AdvanceError::SubcycleOverflow { .. }));
    }

    #[test]
    fn cutoff_checked_after_ceiling() {
        let p = RetryPolicy {
            dt_cutoff: 0.5,
            max_subcycles: 2,
            ..policy()
        };
        let err = plan_subcycles(&p, LevelId(0), 1.0, 0.3, 1.0).unwrap_err();
        assert!(matches!(err, AdvanceError::TooManySubcycles { .. }));
        let p = RetryPolicy {
            max_subcycles: 0,
            ..p
        };
        let err = plan_subcycles(&p, LevelId(0), 1.0, 0.3, 1.0).unwrap_err();
        assert!(matches!(
            err,
            AdvanceError::SubcycleTooShort { subcycles: 4, .. }
        ));
    }

    // ── SubcyclePlan ──

    #[test]
    fn even_split_needs_no_shortening() {
        let steps: Vec<SubStep> = SubcyclePlan::new(0.0, 1.0, 4).collect();
        assert_eq!(steps.len(), 4);
        for (i, s) in steps.iter().enumerate() {
            assert_eq!(s.index, i as u32);
            assert_eq!(s.dt, 0.25);
            assert_eq!(s.time, 0.25 * i as f64);
        }
    }

    #[test]
    fn last_step_lands_exactly_on_end() {
        let steps: Vec<SubStep> = SubcyclePlan::new(0.1, 0.7, 3).collect();
        assert_eq!(steps.len(), 3);
        let last = steps[2];
        assert_eq!(last.end, 0.1 + 0.7);
        assert_eq!(last.dt, last.end - last.time);
    }

    #[test]
    fn late_start_runs_exactly_the_planned_count() {
        let (time, dt) = (285.66679250267373, 0.11894945914007407);
        let steps: Vec<SubStep> = SubcyclePlan::new(time, dt, 710).collect();
        assert_eq!(steps.len(), 710);
        let last = steps[709];
        assert_eq!(last.index, 709);
        assert_eq!(last.end, time + dt);
        let nominal = dt / 710.0;
        for s in &steps {
            assert!((s.dt - nominal).abs() < 1.0e-6 * nominal, "sub-step {}", s.index);
        }
    }

    #[test]
    fn substep_stamps_follow_the_plan() {
        let (time, dt) = (285.66679250267373, 0.11894945914007407);
        let mut level = MockLevel::new(move |_, _| dt / 709.5);
        level.set_time_level(time, time + dt);
        let mut comm = RecordingCollective::new();
        let p = RetryPolicy {
            max_subcycles: 0,
            neg_dens_factor: 0.0,
            ..policy()
        };
        let mut report = RetryReport::new(dt);
        controller(p)
            .evaluate(&mut level, &mut comm, time, dt, &0, &mut report)
            .unwrap();
        assert_eq!(report.subcycles, 710);
        assert_eq!(report.substeps, 710);
        assert_eq!((level.prev, level.cur), (time, time + dt));
    }

    // ── Controller against a mock level ──

    /// Records every executor call; the stable step is scripted per
    /// (time, dt) of the (sub-)step.
    struct MockLevel {
        calls: Vec<String>,
        tau: Box<dyn Fn(f64, f64) -> f64>,
        frac: f64,
        data: u32,
        prev: f64,
        cur: f64,
    }

    impl MockLevel {
        fn new(tau: impl Fn(f64, f64) -> f64 + 'static) -> Self {
            Self {
                calls: Vec::new(),
                tau: Box::new(tau),
                frac: 1.0,
                data: 0,
                prev: 0.0,
                cur: 0.0,
            }
        }
    }

    impl StepExecutor for MockLevel {
        type Checkpoint = u32;

        fn local_stable_dt(&mut self, time: f64, dt: f64) -> Result<f64, AdvanceError> {
            Ok((self.tau)(time, dt))
        }
        fn local_frac_change(&self) -> f64 {
            self.frac
        }
        fn checkpoint(&self) -> u32 {
            self.data
        }
        fn restore(&mut self, cp: &u32) {
            self.calls.push(format!("restore {cp}"));
            self.data = *cp;
        }
        fn restore_old(&mut self, cp: &u32) {
            self.calls.push(format!("restore_old {cp}"));
        }
        fn swap_time_levels(&mut self, dt: f64) {
            self.prev = self.cur;
            self.cur += dt;
        }
        fn set_time_level(&mut self, prev: f64, cur: f64) {
            self.prev = prev;
            self.cur = cur;
        }
        fn integrate(&mut self, time: f64, dt: f64) -> Result<(), AdvanceError> {
            assert_eq!(time, self.prev, "integrate must start at the old stamp");
            self.calls.push(format!("integrate {time} {dt}"));
            self.data += 1;
            Ok(())
        }
    }

    fn controller(p: RetryPolicy) -> RetryController {
        RetryController::new(p, LevelId(0))
    }

    #[test]
    fn accepted_step_touches_nothing() {
        let mut level = MockLevel::new(|_, _| 2.0);
        let mut comm = RecordingCollective::new();
        let mut report = RetryReport::new(1.0);
        let dt_new = controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        assert_eq!(dt_new, 1.0);
        assert!(level.calls.is_empty());
        assert_eq!(
            report.transitions.as_slice(),
            &[RetryState::Evaluating, RetryState::Accepted]
        );
        assert!(!report.retried());
    }

    #[test]
    fn rejected_step_runs_four_quarter_substeps() {
        let mut level = MockLevel::new(|_, _| 0.3);
        level.set_time_level(0.0, 1.0);
        let mut comm = RecordingCollective::new();
        let mut report = RetryReport::new(1.0);
        let dt_new = controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &7, &mut report)
            .unwrap();
        assert_eq!(dt_new, 0.3);
        assert_eq!(report.subcycles, 4);
        assert_eq!(report.substeps, 4);
        assert_eq!(
            level.calls,
            vec![
                "restore 7",
                "integrate 0 0.25",
                "integrate 0.25 0.25",
                "integrate 0.5 0.25",
                "integrate 0.75 0.25",
                "restore_old 7",
            ]
        );
        assert_eq!((level.prev, level.cur), (0.0, 1.0));
        assert_eq!(report.final_state(), Some(RetryState::Accepted));
    }

    #[test]
    fn tolerance_does_not_lengthen_substeps() {
        let p = RetryPolicy {
            tolerance: 0.5,
            ..policy()
        };
        let mut level = MockLevel::new(|_, _| 0.3);
        let mut comm = RecordingCollective::new();
        let mut report = RetryReport::new(1.0);
        let dt_new = controller(p)
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        assert_eq!(report.dt_stable, 0.3);
        assert_eq!(report.subcycles, 4);
        assert_eq!(dt_new, 0.3);
        assert_eq!(level.calls[1], "integrate 0 0.25");
    }

    #[test]
    fn nested_retry_only_where_unstable() {
        // Steps starting at or after t = 0.5 need dt <= 0.1.
        let mut level = MockLevel::new(|t, _| if t < 0.5 { 0.3 } else { 0.1 });
        let mut comm = RecordingCollective::new();
        let mut report = RetryReport::new(1.0);
        controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        // Outer: 4 x 0.25. Sub-steps at 0.5 and 0.75 each retried as 3.
        assert_eq!(report.retries, 3);
        assert_eq!(report.max_depth, 2);
        assert_eq!(report.substeps, 4 + 3 + 3);
        assert_eq!(report.subcycles, 4);
        assert_eq!((level.prev, level.cur), (0.0, 1.0));
    }

    #[test]
    fn depth_limit_leaves_substeps_unchecked() {
        let p = RetryPolicy {
            max_depth: 1,
            ..policy()
        };
        let mut level = MockLevel::new(|t, _| if t < 0.5 { 0.3 } else { 0.1 });
        let mut comm = RecordingCollective::new();
        let mut report = RetryReport::new(1.0);
        controller(p)
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        assert_eq!(report.retries, 1);
        assert_eq!(report.unchecked_substeps, 4);
    }

    #[test]
    fn abort_records_terminal_state_and_skips_work() {
        let mut level = MockLevel::new(|_, _| 0.01);
        let mut comm = RecordingCollective::new();
        let mut report = RetryReport::new(1.0);
        let err = controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap_err();
        assert!(matches!(err, AdvanceError::TooManySubcycles { subcycles: 100, .. }));
        assert!(level.calls.is_empty());
        assert_eq!(
            report.transitions.as_slice(),
            &[
                RetryState::Evaluating,
                RetryState::Subcycling,
                RetryState::Aborted
            ]
        );
    }

    #[test]
    fn density_collective_precedes_step_collective() {
        let mut level = MockLevel::new(|_, _| 5.0);
        level.frac = -0.5;
        let mut comm = RecordingCollective::new();
        let log = comm.log();
        let mut report = RetryReport::new(1.0);
        controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        let log = log.lock().unwrap();
        // Outer evaluation: frac then dt. Five sub-steps, each evaluated.
        assert_eq!(log[0], Reduction::Min(-0.5));
        assert!(matches!(log[1], Reduction::Min(v) if (v - 0.2).abs() < 1e-15));
        assert!(report.subcycles >= 5);
    }

    #[test]
    fn disabled_density_criterion_skips_its_collective() {
        let p = RetryPolicy {
            neg_dens_factor: 0.0,
            ..policy()
        };
        let mut level = MockLevel::new(|_, _| 5.0);
        level.frac = -0.5;
        let mut comm = RecordingCollective::new();
        let log = comm.log();
        let mut report = RetryReport::new(1.0);
        controller(p)
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), &[Reduction::Min(5.0)]);
        assert_eq!(report.final_state(), Some(RetryState::Accepted));
    }

    #[test]
    fn peer_rank_can_force_a_retry() {
        let mut level = MockLevel::new(|_, _| 1.0e3);
        let mut comm = RecordingCollective::new().as_rank(1, 2).with_peer_min(0.5);
        let mut report = RetryReport::new(1.0);
        controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap();
        assert_eq!(report.subcycles, 2);
    }

    #[test]
    fn nan_from_a_peer_aborts_instead_of_accepting() {
        let mut level = MockLevel::new(|_, _| 1.0e3);
        let mut comm = RecordingCollective::new()
            .as_rank(1, 2)
            .with_peer_min(f64::NAN);
        let mut report = RetryReport::new(1.0);
        let err = controller(policy())
            .evaluate(&mut level, &mut comm, 0.0, 1.0, &0, &mut report)
            .unwrap_err();
        assert!(matches!(err, AdvanceError::SubcycleOverflow { .. }));
        assert!(report.dt_stable.is_nan());
        assert!(level.calls.is_empty());
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn plan_covers_interval_exactly(
                time in 0.0f64..1.0e3,
                dt in 1.0e-6f64..10.0,
                n in 1u32..2000,
            ) {
                let steps: Vec<SubStep> = SubcyclePlan::new(time, dt, n).collect();
                prop_assert_eq!(steps.len(), n as usize);
                let last = steps[steps.len() - 1];
                prop_assert_eq!(last.end, time + dt);
                prop_assert!(last.dt > 0.0);
                for w in steps.windows(2) {
                    prop_assert!(w[0].dt > 0.0);
                    prop_assert_eq!(w[0].end, w[1].time);
                }
                let total: f64 = steps.iter().map(|s| s.dt).sum();
                prop_assert!((total - dt).abs() <= 1.0e-9 * dt.max(time));
            }

            #[test]
            fn count_matches_ceiling(dt in 1.0e-3f64..1.0, ratio in 1.01f64..50.0) {
                let p = RetryPolicy { max_subcycles: 0, ..policy() };
                let dt_stable = dt / ratio;
                let ctx = plan_subcycles(&p, LevelId(0), dt, dt_stable, 1.0).unwrap().unwrap();
                prop_assert_eq!(ctx.subcycles, (dt / dt_stable).ceil() as u32);
                prop_assert!(f64::from(ctx.subcycles) * dt_stable >= dt);
            }
        }
    }
}
