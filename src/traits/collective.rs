//! Collective communication between the processes sharing a matrix
use crate::types::Result;

/// A group of cooperating processes.
pub trait Collective {
    /// Rank of the calling process
    fn rank(&self) -> usize;

    /// Number of processes in the group
    fn size(&self) -> usize;
}

/// Blocking collective operations on buffers of `T`.
///
/// Every process of the group must enter the same sequence of collective
/// calls. A call returns once all peers have contributed.
pub trait Exchange<T>: Collective {
    /// Concatenate `local` from every process in rank order into `output`.
    ///
    /// `counts[p]` is the number of entries contributed by process `p`.
    fn all_gather_varcount(&self, local: &[T], counts: &[usize], output: &mut [T]) -> Result<()>;

    /// Replace `buffer` on every process by the elementwise sum over all processes.
    fn all_reduce_sum(&self, buffer: &mut [T]) -> Result<()>;

    /// Replace `buffer` on every process by the buffer of process `root`.
    fn broadcast(&self, root: usize, buffer: &mut Vec<T>) -> Result<()>;
}
