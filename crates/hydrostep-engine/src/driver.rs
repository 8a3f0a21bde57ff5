//! Repeated advances of one level to a stop condition.
//!
//! [`LevelDriver`] chooses each step size, advances the level and keeps
//! the run totals used for the figure of merit (zones advanced per
//! microsecond of wall time).

use std::time::Instant;

use log::info;

use hydrostep_core::AdvanceError;

use crate::config::{ConfigError, DriverConfig};
use crate::level::{AdvanceOutcome, LevelAdvancer};

/// Totals of a completed run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Coarse steps taken.
    pub steps: u64,
    /// Steps that needed a retry.
    pub retried_steps: u64,
    /// Simulated time reached.
    pub time: f64,
    /// Cell updates performed, retries included.
    pub zones_advanced: u64,
    /// Wall time spent advancing, in microseconds.
    pub wall_us: f64,
}

impl RunSummary {
    /// Zones advanced per microsecond; 0 before any work was timed.
    pub fn figure_of_merit(&self) -> f64 {
        if self.wall_us > 0.0 {
            self.zones_advanced as f64 / self.wall_us
        } else {
            0.0
        }
    }
}

/// Drives a [`LevelAdvancer`] until `stop_time` or `max_step`.
///
/// The next step is the smallest of
///
/// - `cfl` times the global minimum signal-crossing time (scaled by
///   `init_shrink` on the first step),
/// - `change_max` times the previous step,
/// - the retry controller's suggestion after a retried step,
///
/// or `fixed_dt` when set, and is finally clamped so the run lands on
/// `stop_time`.
#[derive(Debug)]
pub struct LevelDriver {
    advancer: LevelAdvancer,
    config: DriverConfig,
    dt_prev: Option<f64>,
    dt_suggested: Option<f64>,
    summary: RunSummary,
}

impl LevelDriver {
    /// Driver over `advancer`.
    pub fn new(advancer: LevelAdvancer, config: DriverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let summary = RunSummary {
            time: advancer.time(),
            ..RunSummary::default()
        };
        Ok(Self {
            advancer,
            config,
            dt_prev: None,
            dt_suggested: None,
            summary,
        })
    }

    /// Size of the next step. Issues one collective min unless the step
    /// is fixed.
    pub fn next_timestep(&mut self) -> Result<f64, AdvanceError> {
        let mut dt = match self.config.fixed_dt {
            Some(dt) => dt,
            None => {
                let mut dt = self.advancer.estimate_timestep()?;
                match self.dt_prev {
                    None => dt *= self.config.init_shrink,
                    Some(prev) => dt = dt.min(self.config.change_max * prev),
                }
                if let Some(suggested) = self.dt_suggested {
                    dt = dt.min(suggested);
                }
                dt
            }
        };
        if let Some(stop) = self.config.stop_time {
            let time = self.advancer.time();
            let eps = 0.001 * dt;
            if time + dt > stop - eps {
                dt = stop - time;
            }
        }
        Ok(dt)
    }

    /// Take one step.
    pub fn step(&mut self) -> Result<AdvanceOutcome, AdvanceError> {
        let dt = self.next_timestep()?;
        let outcome = self.advancer.step(dt)?;
        self.dt_prev = Some(dt);
        self.dt_suggested = outcome.report.retried().then_some(outcome.dt_new);

        let s = &mut self.summary;
        s.steps += 1;
        s.retried_steps += u64::from(outcome.report.retried());
        s.time = self.advancer.time();
        s.zones_advanced += outcome.metrics.zones_advanced;
        Ok(outcome)
    }

    /// Whether a stop condition has been reached.
    pub fn is_finished(&self) -> bool {
        if self.config.max_step.is_some_and(|m| self.summary.steps >= m) {
            return true;
        }
        self.config.stop_time.is_some_and(|stop| {
            let time = self.advancer.time();
            time >= stop || stop - time <= 4.0 * f64::EPSILON * stop.abs()
        })
    }

    /// Step until finished and report the totals.
    pub fn run(&mut self) -> Result<RunSummary, AdvanceError> {
        let started = Instant::now();
        let result = self.run_steps();
        self.summary.wall_us += started.elapsed().as_secs_f64() * 1.0e6;
        result?;
        if self.advancer.is_io_rank() {
            info!(
                "level {}: {} steps ({} retried) to t = {:e}; figure of merit {:.3} zones/us",
                self.advancer.level(),
                self.summary.steps,
                self.summary.retried_steps,
                self.summary.time,
                self.summary.figure_of_merit(),
            );
        }
        Ok(self.summary.clone())
    }

    fn run_steps(&mut self) -> Result<(), AdvanceError> {
        while !self.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    /// Totals so far.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// The driven advancer.
    pub fn advancer(&self) -> &LevelAdvancer {
        &self.advancer
    }

    /// The driven advancer, mutably.
    pub fn advancer_mut(&mut self) -> &mut LevelAdvancer {
        &mut self.advancer
    }

    /// Give back the advancer.
    pub fn into_advancer(self) -> LevelAdvancer {
        self.advancer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvanceConfig;
    use hydrostep_core::{LevelId, StateLayout};
    use hydrostep_test_utils::{decay_state, RecordingCollective, ScriptedKernels};

    fn driver(kernels: ScriptedKernels, config: DriverConfig) -> LevelDriver {
        let state = decay_state(8, 4, StateLayout::new(1));
        let advancer = LevelAdvancer::new(
            LevelId(0),
            AdvanceConfig::default(),
            Box::new(kernels),
            state,
            Box::new(RecordingCollective::new()),
        )
        .unwrap();
        LevelDriver::new(advancer, config).unwrap()
    }

    #[test]
    fn fixed_step_is_clamped_to_stop_time() {
        let mut d = driver(
            ScriptedKernels::new(0.1),
            DriverConfig {
                stop_time: Some(1.0),
                fixed_dt: Some(0.3),
                ..DriverConfig::default()
            },
        );
        let summary = d.run().unwrap();
        assert_eq!(summary.steps, 4);
        assert!((summary.time - 1.0).abs() < 1e-15);
        assert_eq!(summary.zones_advanced, 4 * 8);
        assert!(d.is_finished());
    }

    #[test]
    fn max_step_stops_the_run() {
        let mut d = driver(
            ScriptedKernels::new(0.1),
            DriverConfig {
                stop_time: None,
                max_step: Some(3),
                fixed_dt: Some(0.01),
                ..DriverConfig::default()
            },
        );
        let summary = d.run().unwrap();
        assert_eq!(summary.steps, 3);
        assert!((summary.time - 0.03).abs() < 1e-15);
    }

    #[test]
    fn growth_is_limited_by_change_max() {
        // cfl 0.5 on tau 1.0.
        let mut d = driver(
            ScriptedKernels::new(0.0).with_stable_dt(1.0),
            DriverConfig {
                stop_time: None,
                max_step: Some(3),
                init_shrink: 0.1,
                ..DriverConfig::default()
            },
        );
        let dts: Vec<f64> = (0..3).map(|_| d.step().unwrap().report.dt).collect();
        assert!((dts[0] - 0.05).abs() < 1e-15);
        assert!((dts[1] - 0.055).abs() < 1e-15);
        assert!((dts[2] - 0.0605).abs() < 1e-15);
    }

    #[test]
    fn retry_suggestion_caps_next_step() {
        // A step over 0.1 drops density by half: factor 0.1 caps the retry
        // step at 0.1.
        let kernels = ScriptedKernels::new(0.0)
            .with_stable_dt(1.0)
            .with_density_drop(0.1, -0.5);
        let mut d = driver(
            kernels,
            DriverConfig {
                stop_time: None,
                max_step: Some(2),
                ..DriverConfig::default()
            },
        );
        let first = d.step().unwrap();
        assert!(first.report.retried());
        assert!((first.dt_new - 0.1).abs() < 1e-15);
        let second = d.step().unwrap();
        assert!(!second.report.retried());
        assert!(second.report.dt <= 0.1 + 1e-15);
        assert_eq!(d.summary().retried_steps, 1);
    }

    #[test]
    fn figure_of_merit_is_zero_without_wall_time() {
        let s = RunSummary {
            zones_advanced: 100,
            ..RunSummary::default()
        };
        assert_eq!(s.figure_of_merit(), 0.0);
        let s = RunSummary {
            zones_advanced: 100,
            wall_us: 50.0,
            ..RunSummary::default()
        };
        assert_eq!(s.figure_of_merit(), 2.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let state = decay_state(8, 4, StateLayout::new(1));
        let advancer = LevelAdvancer::new(
            LevelId(0),
            AdvanceConfig::default(),
            Box::new(ScriptedKernels::new(0.0)),
            state,
            Box::new(RecordingCollective::new()),
        )
        .unwrap();
        let err = LevelDriver::new(
            advancer,
            DriverConfig {
                stop_time: None,
                max_step: None,
                ..DriverConfig::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::NoStopCondition);
    }
}
