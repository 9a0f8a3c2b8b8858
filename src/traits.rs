//! Trait definitions

mod collective;
mod compressor;
mod kernel;
mod solver;
mod splitter;

pub use collective::{Collective, Exchange};
pub use compressor::LowRankCompressor;
pub use kernel::KernelMatrix;
pub use solver::{DistributedOperator, IterativeMethod, LocalSolver};
pub use splitter::ClusterSplitter;
