//! Boundary-loss tallies.

use hydrostep_core::{LOSS_COMPONENTS, N_LOST};

/// Mass, x-momentum and total energy that left the domain through its
/// boundary faces (negative when material entered).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LossTally {
    values: [f64; N_LOST],
}

impl LossTally {
    /// Lost mass.
    pub fn mass(&self) -> f64 {
        self.values[0]
    }

    /// Lost x-momentum.
    pub fn xmom(&self) -> f64 {
        self.values[1]
    }

    /// Lost total energy.
    pub fn energy(&self) -> f64 {
        self.values[2]
    }

    /// All tallies in [`LOSS_COMPONENTS`] order.
    pub fn values(&self) -> &[f64; N_LOST] {
        &self.values
    }

    /// Mutable view for collective reduction.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Add another tally into this one.
    pub fn accumulate(&mut self, other: &LossTally) {
        for (v, o) in self.values.iter_mut().zip(other.values) {
            *v += o;
        }
    }

    /// Record the `weight`-scaled boundary fluxes of one block.
    ///
    /// `left` is the flux through the domain's lower face (positive into
    /// the domain), `right` the flux through its upper face (positive out
    /// of the domain). Either may be absent when the block does not touch
    /// that boundary.
    pub(crate) fn record(&mut self, weight: f64, left: Option<&[f64]>, right: Option<&[f64]>) {
        for (slot, &c) in self.values.iter_mut().zip(LOSS_COMPONENTS.iter()) {
            if let Some(l) = left {
                *slot -= weight * l[c];
            }
            if let Some(r) = right {
                *slot += weight * r[c];
            }
        }
    }
}
