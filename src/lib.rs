//! Hierarchical matrices
//!
//! Compression of dense kernel matrices into block-structured hierarchical
//! matrices with adaptive cross approximation, and matrix-vector products
//! distributed by rows over a group of processes.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

pub mod aca;
pub mod block;
pub mod cluster;
pub mod comm;
pub mod geometry;
pub mod hmatrix;
pub mod kernels;
mod linalg;
pub mod low_rank;
pub mod options;
pub mod solver;
pub mod traits;
pub mod types;

pub use hmatrix::{HMatrix, HMatrixBuilder, HMatrixInfo};
pub use options::HMatrixOptions;
pub use types::{HMatrixError, Result};
