//! Physics kernel trait and kernel context for hydrostep.
//!
//! The [`HydroKernels`] trait is the narrow interface through which the
//! engine reaches the physics: primitive reconstruction, reaction burn,
//! flux divergence, the sanitizer operators and the local stable step.
//! [`KernelContext`] is the immutable step description passed with
//! every call.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod kernels;

pub use context::KernelContext;
pub use kernels::HydroKernels;
