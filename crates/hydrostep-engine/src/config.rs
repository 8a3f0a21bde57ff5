//! Advance and driver configuration, validation, and error types.
//!
//! [`AdvanceConfig`] controls one level advance: scheme selection, the
//! retry policy and the optional physics passes. [`DriverConfig`] controls
//! the repeated advance performed by [`LevelDriver`](crate::LevelDriver).
//! Both are validated once at construction; nothing re-checks them per step.

use std::error::Error;
use std::fmt;

use hydrostep_core::{IntegrationScheme, StateTypeId};
use hydrostep_state::StateError;

// ── AdvanceConfig ──────────────────────────────────────────────────

/// Configuration for [`LevelAdvancer`](crate::LevelAdvancer).
#[derive(Clone, Debug, PartialEq)]
pub struct AdvanceConfig {
    /// Time-integration scheme. Default: single-pass CTU.
    pub scheme: IntegrationScheme,
    /// Evaluate each step after the fact and sub-cycle on violation.
    /// Default: true.
    pub use_retry: bool,
    /// Scale of the density-drop step shrink; `0` disables the density
    /// criterion. Default: 0.1.
    pub retry_neg_dens_factor: f64,
    /// Ceiling on the number of sub-cycles per step; `0` means unlimited.
    /// Default: 10.
    pub retry_max_subcycles: u32,
    /// Relative slack in the accept test: a step stands while
    /// `dt <= (1 + retry_tolerance) * dt_stable`. Retry sub-steps are sized
    /// from `dt_stable` alone. Default: 0.02.
    pub retry_tolerance: f64,
    /// Maximum nesting of retries. `1` leaves sub-steps unchecked.
    /// Default: 4.
    pub retry_max_depth: u32,
    /// Smallest sub-step a retry may take; `0` disables the check.
    /// Default: 0.
    pub dt_cutoff: f64,
    /// Courant number applied to the signal-crossing time. Default: 0.5.
    pub cfl: f64,
    /// Compute the hydrodynamic update. Default: true.
    pub do_hydro: bool,
    /// Run the pre-hydro reaction substep. Default: false.
    pub do_react: bool,
    /// Hand face fluxes to the attached flux register. Default: false.
    pub do_reflux: bool,
    /// Tally mass, momentum and energy leaving through the domain
    /// boundary. Default: true.
    pub track_grid_losses: bool,
}

impl Default for AdvanceConfig {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::Ctu,
            use_retry: true,
            retry_neg_dens_factor: 0.1,
            retry_max_subcycles: 10,
            retry_tolerance: 0.02,
            retry_max_depth: 4,
            dt_cutoff: 0.0,
            cfl: 0.5,
            do_hydro: true,
            do_react: false,
            do_reflux: false,
            track_grid_losses: true,
        }
    }
}

impl AdvanceConfig {
    /// Check every numeric parameter against its admissible range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cfl.is_finite() || self.cfl <= 0.0 || self.cfl > 1.0 {
            return Err(ConfigError::OutOfRange {
                name: "cfl",
                value: self.cfl,
                expected: "in (0, 1]",
            });
        }
        if !self.retry_tolerance.is_finite() || self.retry_tolerance < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "retry_tolerance",
                value: self.retry_tolerance,
                expected: "finite and >= 0",
            });
        }
        if !self.retry_neg_dens_factor.is_finite() || self.retry_neg_dens_factor < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "retry_neg_dens_factor",
                value: self.retry_neg_dens_factor,
                expected: "finite and >= 0",
            });
        }
        if !self.dt_cutoff.is_finite() || self.dt_cutoff < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "dt_cutoff",
                value: self.dt_cutoff,
                expected: "finite and >= 0",
            });
        }
        if self.retry_max_depth == 0 {
            return Err(ConfigError::OutOfRange {
                name: "retry_max_depth",
                value: 0.0,
                expected: "at least 1",
            });
        }
        Ok(())
    }
}

// ── DriverConfig ───────────────────────────────────────────────────

/// Configuration for [`LevelDriver`](crate::LevelDriver).
#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    /// Simulated time at which the run ends. `None` = no time limit.
    pub stop_time: Option<f64>,
    /// Number of steps after which the run ends. `None` = no step limit.
    pub max_step: Option<u64>,
    /// Largest permitted growth of the step from one step to the next.
    /// Default: 1.1.
    pub change_max: f64,
    /// Factor applied to the estimated first step. Default: 1.0.
    pub init_shrink: f64,
    /// Use this step size instead of estimating one. Default: `None`.
    pub fixed_dt: Option<f64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stop_time: Some(1.0e-2),
            max_step: None,
            change_max: 1.1,
            init_shrink: 1.0,
            fixed_dt: None,
        }
    }
}

impl DriverConfig {
    /// Check the stop condition and step-control parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_time.is_none() && self.max_step.is_none() {
            return Err(ConfigError::NoStopCondition);
        }
        if let Some(t) = self.stop_time {
            if !t.is_finite() || t < 0.0 {
                return Err(ConfigError::OutOfRange {
                    name: "stop_time",
                    value: t,
                    expected: "finite and >= 0",
                });
            }
        }
        if !self.change_max.is_finite() || self.change_max < 1.0 {
            return Err(ConfigError::OutOfRange {
                name: "change_max",
                value: self.change_max,
                expected: "finite and >= 1",
            });
        }
        if !self.init_shrink.is_finite() || self.init_shrink <= 0.0 || self.init_shrink > 1.0 {
            return Err(ConfigError::OutOfRange {
                name: "init_shrink",
                value: self.init_shrink,
                expected: "in (0, 1]",
            });
        }
        if let Some(dt) = self.fixed_dt {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(ConfigError::OutOfRange {
                    name: "fixed_dt",
                    value: dt,
                    expected: "finite and > 0",
                });
            }
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating configuration or assembling an
/// advancer.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// A numeric parameter is outside its admissible range.
    OutOfRange {
        /// Parameter name as it appears in the config struct.
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Description of the admissible range.
        expected: &'static str,
    },
    /// Neither `stop_time` nor `max_step` is set.
    NoStopCondition,
    /// The state's component count does not match the kernel layout.
    LayoutMismatch {
        /// Components the kernel set expects.
        expected: usize,
        /// Components the state carries.
        got: usize,
    },
    /// A state type was registered twice.
    DuplicateStateType {
        /// The duplicated id.
        id: StateTypeId,
    },
    /// An auxiliary state does not share the hydro state's geometry.
    GeometryMismatch {
        /// The offending state type.
        id: StateTypeId,
    },
    /// State container setup failed.
    State(StateError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                name,
                value,
                expected,
            } => write!(f, "{name} must be {expected}, got {value}"),
            Self::NoStopCondition => {
                write!(f, "at least one of stop_time and max_step must be set")
            }
            Self::LayoutMismatch { expected, got } => write!(
                f,
                "state has {got} components, kernel layout expects {expected}"
            ),
            Self::DuplicateStateType { id } => {
                write!(f, "state type {id} registered twice")
            }
            Self::GeometryMismatch { id } => {
                write!(f, "state type {id} does not share the level geometry")
            }
            Self::State(e) => write!(f, "state: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::State(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StateError> for ConfigError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrostep_core::MolTableau;

    #[test]
    fn defaults_validate() {
        assert!(AdvanceConfig::default().validate().is_ok());
        assert!(DriverConfig::default().validate().is_ok());
    }

    #[test]
    fn default_advance_matches_documented_values() {
        let cfg = AdvanceConfig::default();
        assert_eq!(cfg.scheme, IntegrationScheme::Ctu);
        assert!(cfg.use_retry);
        assert_eq!(cfg.retry_neg_dens_factor, 0.1);
        assert_eq!(cfg.retry_max_subcycles, 10);
        assert_eq!(cfg.dt_cutoff, 0.0);
        assert_eq!(cfg.cfl, 0.5);
    }

    #[test]
    fn cfl_out_of_range_rejected() {
        for cfl in [0.0, -0.5, 1.5, f64::NAN] {
            let cfg = AdvanceConfig {
                cfl,
                ..AdvanceConfig::default()
            };
            match cfg.validate() {
                Err(ConfigError::OutOfRange { name: "cfl", .. }) => {}
                other => panic!("expected cfl rejection for {cfl}, got {other:?}"),
            }
        }
    }

    #[test]
    fn negative_cutoff_rejected() {
        let cfg = AdvanceConfig {
            dt_cutoff: -1.0e-12,
            ..AdvanceConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("dt_cutoff"));
    }

    #[test]
    fn zero_depth_rejected() {
        let cfg = AdvanceConfig {
            retry_max_depth: 0,
            scheme: IntegrationScheme::MethodOfLines(MolTableau::Heun),
            ..AdvanceConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange {
                name: "retry_max_depth",
                ..
            })
        ));
    }

    #[test]
    fn driver_needs_a_stop_condition() {
        let cfg = DriverConfig {
            stop_time: None,
            max_step: None,
            ..DriverConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoStopCondition));

        let steps_only = DriverConfig {
            stop_time: None,
            max_step: Some(5),
            ..DriverConfig::default()
        };
        assert!(steps_only.validate().is_ok());
    }

    #[test]
    fn driver_rejects_shrinking_change_max() {
        let cfg = DriverConfig {
            change_max: 0.9,
            ..DriverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn driver_rejects_bad_fixed_dt() {
        let cfg = DriverConfig {
            fixed_dt: Some(0.0),
            ..DriverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn state_error_chains_source() {
        let err: ConfigError = StateError::EmptyDomain.into();
        assert!(err.source().is_some());
    }
}
