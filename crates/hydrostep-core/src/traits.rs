//! Cross-rank reduction interface.

use crate::error::CollectiveError;

/// Blocking collective reductions across the ranks advancing one level.
///
/// Every rank must issue the same sequence of calls; a rank that skips a
/// collective deadlocks its peers unless it calls [`abort`](Self::abort)
/// first. Implementations combine contributions in rank order so that
/// every rank observes a bit-identical result.
pub trait Collective: Send {
    /// This rank's index in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of participating ranks.
    fn size(&self) -> usize;

    /// Whether this rank emits log output. Rank 0 by convention.
    fn is_io_rank(&self) -> bool {
        self.rank() == 0
    }

    /// Global minimum of `value` over all ranks. NaN from any rank makes
    /// the result NaN on every rank (see [`min_or_nan`]).
    fn reduce_min(&mut self, value: f64) -> Result<f64, CollectiveError>;

    /// Element-wise global sum of `values` over all ranks, written back in place.
    fn reduce_sum(&mut self, values: &mut [f64]) -> Result<(), CollectiveError>;

    /// Leave the group after a fatal error. Peers blocked in, or later
    /// entering, a collective with this rank fail instead of waiting.
    /// Every later call on this rank fails too. The default does nothing,
    /// which suits single-rank collectives.
    fn abort(&mut self) {}
}

/// Combine two min-reduction contributions. Unlike [`f64::min`], NaN
/// wins, so corrupt data on one rank is never hidden by its peers.
pub fn min_or_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}
