//! Interfaces towards an external iterative solver
use crate::types::Result;
use rlst::RlstScalar;

/// Operator seen by a domain decomposition iterative method.
///
/// Vectors are local: each process passes the rows it owns, a batch of `mu`
/// vectors is stored contiguously (vector `m` starts at `m * local_size()`).
pub trait DistributedOperator<T: RlstScalar> {
    /// Number of rows owned by the calling process
    fn local_size(&self) -> usize;

    /// Generalised matrix-vector product on the local rows.
    fn gmv(&self, input: &[T], output: &mut [T], mu: usize) -> Result<()>;

    /// Apply the preconditioner. The default is the identity.
    fn apply(&self, input: &[T], output: &mut [T], mu: usize) -> Result<()> {
        if input.len() != output.len() || input.len() != self.local_size() * mu {
            return Err(crate::types::HMatrixError::InvalidInput(format!(
                "Preconditioner expects {} entries, got {} and {}.",
                self.local_size() * mu,
                input.len(),
                output.len()
            )));
        }
        output.copy_from_slice(input);
        Ok(())
    }
}

/// A solver for the local subdomain problem, used as preconditioner.
pub trait LocalSolver<T: RlstScalar> {
    /// Indices (in cluster numbering) outside the owned rows that the local
    /// problem also covers. They are appended after the owned rows.
    fn overlap(&self) -> &[usize] {
        &[]
    }

    /// Apply the local solver to a batch of `mu` contiguous vectors of length
    /// `owned rows + overlap().len()`.
    fn apply(&self, input: &[T], output: &mut [T], mu: usize) -> Result<()>;
}

/// An iterative method from an external library.
///
/// The method only sees the operator through [DistributedOperator] and keeps
/// its own stopping rule.
pub trait IterativeMethod<T: RlstScalar> {
    /// Solve `A x = rhs` for the local slices `rhs` and `x` (initial guess on
    /// entry), returning the number of iterations.
    fn solve<Op: DistributedOperator<T>>(
        &mut self,
        operator: &Op,
        rhs: &[T],
        x: &mut [T],
        mu: usize,
    ) -> Result<usize>;
}
