//! Per-advance performance metrics.
//!
//! [`AdvanceMetrics`] captures timing and work counters for one level
//! advance, including everything spent inside retries.

/// Timing and work counters collected during a single advance.
///
/// All durations are in microseconds. The advancer populates these fields
/// after each `advance()` call, successful or not.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdvanceMetrics {
    /// Wall-clock time for the entire advance, in microseconds.
    pub total_us: u64,
    /// Time spent swapping time levels, sanitizing the old state and
    /// taking the checkpoint, in microseconds.
    pub setup_us: u64,
    /// Time spent in the first integrator pass, in microseconds.
    pub integrate_us: u64,
    /// Time spent evaluating stability and re-executing sub-steps, in
    /// microseconds.
    pub retry_us: u64,
    /// Time spent reducing losses and refluxing, in microseconds.
    pub finalize_us: u64,
    /// Integrator stages executed, rejected attempts included.
    pub stages_executed: u32,
    /// Sub-steps executed by retries at any depth.
    pub subcycles: u32,
    /// Retry sequences started at any depth.
    pub retries: u32,
    /// Deepest retry nesting reached (0 when the step was accepted).
    pub max_retry_depth: u32,
    /// Cell updates performed: cells times integrator passes.
    pub zones_advanced: u64,
}
