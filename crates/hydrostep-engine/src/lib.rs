//! Level-advance engine for hydrostep.
//!
//! Advances the state of one mesh level by one coarse step with either
//! the single-pass CTU integrator or a multi-stage method-of-lines
//! integrator, judges stability after the fact, and re-executes unstable
//! steps as sub-cycles from a snapshot ("retry").
//!
//! - [`LevelAdvancer`]: per-step setup, dispatch and teardown.
//! - [`LevelDriver`]: repeated advances with step-size control.
//! - [`RetryController`]: stability evaluation and sub-cycling.
//! - [`SerialCollective`] / [`ChannelCollective`]: cross-rank reductions.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod comm;
pub mod config;
pub mod driver;
pub mod integrator;
pub mod level;
pub mod losses;
pub mod metrics;
pub mod retry;
pub mod sanitize;
pub mod tableau;

pub use comm::{ChannelCollective, SerialCollective};
pub use config::{AdvanceConfig, ConfigError, DriverConfig};
pub use driver::{LevelDriver, RunSummary};
pub use integrator::{
    integrator_for, CtuIntegrator, MolIntegrator, StageEnv, StageIntegrator, StageOptions,
    StageReport, StepWorkspace,
};
pub use level::{AdvanceOutcome, LevelAdvancer};
pub use losses::LossTally;
pub use metrics::AdvanceMetrics;
pub use retry::{
    plan_subcycles, shrink_for_density_drop, RetryCheckpoint, RetryContext, RetryController,
    RetryPolicy, RetryReport, RetryState, StepExecutor, SubStep, SubcyclePlan,
};
pub use sanitize::SanitizerGate;
pub use tableau::{ButcherTableau, MAX_STAGES};
