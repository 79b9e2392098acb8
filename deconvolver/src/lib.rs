//! Deconvolver -- fitting procedures that turn a reference atlas and a
//! cell-free DNA methylome into a cell-type mixture vector on the
//! probability simplex.
//!
//! The entry point is [fit::fit], which dispatches on a [fit::Model] to one
//! of the drivers: the uniform baseline, non-negative least squares, the two
//! binomial maximum-likelihood searches, or the iterative mixture-model
//! solver behind the [mmse::MixtureSolver] trait.
#[macro_use]
extern crate log;

pub mod error;
pub mod fit;
pub mod io;
pub mod likelihood;
pub mod misc;
pub mod mmse;
pub mod nnls;
pub mod simulate;

pub use error::DeconvError;
pub use fit::{fit, FitConfig, Model};
