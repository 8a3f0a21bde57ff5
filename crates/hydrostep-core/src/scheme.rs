//! Time-integration scheme selection.

use std::fmt;

/// Explicit Runge-Kutta tableau used by the method-of-lines scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MolTableau {
    /// One stage, first order.
    ForwardEuler,
    /// Two stages, second order (SSP-RK2).
    #[default]
    Heun,
    /// Three stages, third order, strong-stability preserving.
    SspRk3,
    /// Classic four-stage, fourth-order Runge-Kutta.
    ClassicRk4,
}

impl MolTableau {
    /// Number of stages.
    pub fn stages(self) -> usize {
        match self {
            Self::ForwardEuler => 1,
            Self::Heun => 2,
            Self::SspRk3 => 3,
            Self::ClassicRk4 => 4,
        }
    }
}

/// Which integrator advances the hydro state.
///
/// Chosen once at configuration time; the engine builds the matching
/// integrator and never re-dispatches per cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IntegrationScheme {
    /// Single unsplit pass ("corner transport upwind").
    #[default]
    Ctu,
    /// Explicit multi-stage method of lines.
    MethodOfLines(MolTableau),
}

impl IntegrationScheme {
    /// Number of stages executed per step.
    pub fn stage_count(self) -> usize {
        match self {
            Self::Ctu => 1,
            Self::MethodOfLines(tableau) => tableau.stages(),
        }
    }

    /// Whether this is the single-pass scheme.
    pub fn is_ctu(self) -> bool {
        matches!(self, Self::Ctu)
    }
}

impl fmt::Display for IntegrationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ctu => write!(f, "CTU"),
            Self::MethodOfLines(t) => write!(f, "MOL({t:?}, {} stages)", t.stages()),
        }
    }
}
