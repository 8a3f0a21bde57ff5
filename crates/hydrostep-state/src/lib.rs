//! Level state containers for hydrostep.
//!
//! Provides the block-decomposed, double-buffered state a level advance
//! operates on:
//!
//! ```text
//! StateData (one per state type)
//! ├── old: StateBuffer ── Block × nblocks (cell-major, ghost-padded)
//! ├── new: StateBuffer
//! └── prev_time / cur_time
//! ```
//!
//! Buffers with a halo are produced on demand by [`StateData::expand`];
//! the stored slots carry no ghost cells. [`StateSnapshot`] is a value
//! copy used to roll a level back.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod buffer;
pub mod error;
pub mod geometry;
pub mod ghost;
pub mod snapshot;
pub mod state_data;

pub use block::Block;
pub use buffer::{NonFinite, StateBuffer};
pub use error::StateError;
pub use geometry::{BoundaryKind, LevelGeometry};
pub use snapshot::StateSnapshot;
pub use state_data::StateData;
