//! Core types and traits for hydrostep.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, conserved-state layout, integration scheme selection,
//! error taxonomy, face-flux container and the collective and flux-register
//! traits shared by every other crate in the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod flux;
pub mod id;
pub mod layout;
pub mod scheme;
pub mod traits;

pub use error::{AdvanceError, CollectiveError, KernelError, StateSlot};
pub use flux::{FaceFluxes, FluxRegister};
pub use id::{LevelId, StateTypeId, StepId};
pub use layout::{StateLayout, LOSS_COMPONENTS, N_LOST, UEDEN, UEINT, UFS, UMX, URHO, UTEMP};
pub use scheme::{IntegrationScheme, MolTableau};
pub use traits::{min_or_nan, Collective};
