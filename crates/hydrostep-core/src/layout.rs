//! Component layout of the conserved state vector.
//!
//! Every state buffer on a level stores the same ordered set of
//! components per cell:
//!
//! ```text
//! URHO  UMX  UEDEN  UEINT  UTEMP  UFS .. UFS+nspec
//! ```
//!
//! Species are stored as partial densities `rho * X_n`.

/// Mass density.
pub const URHO: usize = 0;
/// x-momentum density.
pub const UMX: usize = 1;
/// Total energy density.
pub const UEDEN: usize = 2;
/// Internal energy density.
pub const UEINT: usize = 3;
/// Temperature.
pub const UTEMP: usize = 4;
/// First species partial density.
pub const UFS: usize = 5;

/// Number of conserved quantities tracked for boundary losses.
pub const N_LOST: usize = 3;

/// Components whose boundary fluxes are tallied as losses, in tally order:
/// mass, x-momentum, total energy.
pub const LOSS_COMPONENTS: [usize; N_LOST] = [URHO, UMX, UEDEN];

/// Describes the component layout for a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateLayout {
    nspec: usize,
}

impl StateLayout {
    /// Layout with `nspec` advected species.
    pub fn new(nspec: usize) -> Self {
        Self { nspec }
    }

    /// Number of species.
    pub fn nspec(&self) -> usize {
        self.nspec
    }

    /// Total number of components per cell.
    pub fn ncomp(&self) -> usize {
        UFS + self.nspec
    }

    /// Component index of species `n`.
    ///
    /// Returns `None` if `n` is out of range.
    pub fn species(&self, n: usize) -> Option<usize> {
        (n < self.nspec).then_some(UFS + n)
    }

    /// Range of species component indices.
    pub fn species_range(&self) -> std::ops::Range<usize> {
        UFS..UFS + self.nspec
    }

    /// Short human-readable component name for diagnostics.
    pub fn component_name(&self, comp: usize) -> String {
        match comp {
            URHO => "rho".to_string(),
            UMX => "xmom".to_string(),
            UEDEN => "rho_E".to_string(),
            UEINT => "rho_e".to_string(),
            UTEMP => "temp".to_string(),
            c if c < self.ncomp() => format!("rho_X{}", c - UFS),
            c => format!("comp{c}"),
        }
    }
}

impl Default for StateLayout {
    /// A single species.
    fn default() -> Self {
        Self::new(1)
    }
}
