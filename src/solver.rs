//! Adapter between hierarchical matrices and external iterative solvers
use crate::hmatrix::HMatrix;
use crate::traits::{DistributedOperator, Exchange, IterativeMethod, LocalSolver};
use crate::types::{convert_layout, BatchLayout, HMatrixError, Result};
use itertools::izip;
use log::debug;
use rlst::RlstScalar;

/// Local solver that copies its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySolver;

impl<T: RlstScalar> LocalSolver<T> for IdentitySolver {
    fn apply(&self, input: &[T], output: &mut [T], _mu: usize) -> Result<()> {
        output.copy_from_slice(input);
        Ok(())
    }
}

/// A square hierarchical matrix seen as a distributed operator.
///
/// Local vectors are the rows owned by the calling process in cluster
/// numbering. The preconditioner is the local solver; if it declares overlap
/// indices their values are gathered from the other processes and its output
/// on them is dropped. The gather is collective: once any process declares
/// overlap, every process takes part in it on each preconditioner call.
pub struct HMatrixOperator<'a, T: RlstScalar, C: Exchange<T>, L: LocalSolver<T> = IdentitySolver>
{
    matrix: &'a HMatrix<T>,
    comm: &'a C,
    local_solver: Option<&'a L>,
    gather_overlap: bool,
}

impl<'a, T: RlstScalar, C: Exchange<T>> HMatrixOperator<'a, T, C> {
    /// Wrap a square matrix. The preconditioner is the identity.
    pub fn new(matrix: &'a HMatrix<T>, comm: &'a C) -> Result<Self> {
        if !matrix.is_square() {
            return Err(HMatrixError::InvalidInput(
                "Only square matrices sharing one cluster tree can be solved.".to_string(),
            ));
        }
        Ok(Self {
            matrix,
            comm,
            local_solver: None,
            gather_overlap: false,
        })
    }
}

impl<'a, T: RlstScalar, C: Exchange<T>, L: LocalSolver<T>> HMatrixOperator<'a, T, C, L> {
    /// Use `local_solver` as preconditioner.
    ///
    /// Collective: every process of the group must call this, and all of them
    /// fail if any process declares an overlap index it owns or that is out
    /// of range.
    pub fn with_local_solver<L2: LocalSolver<T>>(
        self,
        local_solver: &'a L2,
    ) -> Result<HMatrixOperator<'a, T, C, L2>>
    where
        C: Exchange<usize>,
    {
        let local = self.matrix.master_offsets()[self.comm.rank()];
        let overlap = local_solver.overlap();
        let invalid = overlap
            .iter()
            .find(|index| **index >= self.matrix.nrows() || local.contains_range(**index, 1));
        let mut flags = vec![usize::from(invalid.is_some()), usize::from(!overlap.is_empty())];
        Exchange::<usize>::all_reduce_sum(self.comm, &mut flags)?;
        if let Some(index) = invalid {
            return Err(HMatrixError::InvalidInput(format!(
                "Overlap index {index} is owned by this process or out of range."
            )));
        }
        if flags[0] > 0 {
            return Err(HMatrixError::InvalidInput(format!(
                "{} processes declared overlap indices they own or that are out of range.",
                flags[0]
            )));
        }
        if flags[1] > 0 {
            debug!("{} processes declare overlap indices", flags[1]);
        }
        Ok(HMatrixOperator {
            matrix: self.matrix,
            comm: self.comm,
            local_solver: Some(local_solver),
            gather_overlap: flags[1] > 0,
        })
    }

    /// The wrapped matrix
    pub fn matrix(&self) -> &HMatrix<T> {
        self.matrix
    }

    /// Solve `A x = rhs` for `mu` contiguous vectors in natural numbering.
    ///
    /// `x` holds the initial guess on entry and the solution of all processes
    /// on exit. Returns the number of iterations reported by `method`.
    pub fn solve<M: IterativeMethod<T>>(
        &self,
        method: &mut M,
        rhs: &[T],
        x: &mut [T],
        mu: usize,
    ) -> Result<usize> {
        let n = self.matrix.nrows();
        if rhs.len() != n * mu || x.len() != n * mu {
            return Err(HMatrixError::InvalidInput(format!(
                "Expected {} entries for {} vectors, got {} and {}.",
                n * mu,
                mu,
                rhs.len(),
                x.len()
            )));
        }
        let local = self.matrix.master_offsets()[self.comm.rank()];

        let mut rhs_cluster = vec![T::zero(); n * mu];
        let mut x_cluster = vec![T::zero(); n * mu];
        self.matrix.permute_to_cluster(rhs, &mut rhs_cluster, mu);
        self.matrix.permute_to_cluster(x, &mut x_cluster, mu);
        let extract = |cluster: &[T]| {
            (0..mu)
                .flat_map(|vector| {
                    cluster[vector * n + local.offset..vector * n + local.end()].iter()
                })
                .copied()
                .collect::<Vec<_>>()
        };
        let rhs_local = extract(&rhs_cluster);
        let mut x_local = extract(&x_cluster);

        let iterations = method.solve(self, &rhs_local, &mut x_local, mu)?;

        let mut interleaved = vec![T::zero(); x_local.len()];
        convert_layout(
            &x_local,
            BatchLayout::Contiguous,
            &mut interleaved,
            BatchLayout::Interleaved,
            local.size,
            mu,
        );
        let counts = self
            .matrix
            .master_offsets()
            .iter()
            .map(|slice| slice.size * mu)
            .collect::<Vec<_>>();
        let mut solution = vec![T::zero(); n * mu];
        self.comm
            .all_gather_varcount(&interleaved, &counts, &mut solution)?;
        self.matrix.row_tree().to_natural_with_layout(
            &solution,
            BatchLayout::Interleaved,
            x,
            BatchLayout::Contiguous,
            mu,
        );
        Ok(iterations)
    }

    fn apply_with_overlap(&self, solver: &L, input: &[T], output: &mut [T], mu: usize) -> Result<()> {
        if !self.gather_overlap {
            return solver.apply(input, output, mu);
        }
        let overlap = solver.overlap();
        let local = self.matrix.master_offsets()[self.comm.rank()];

        let mut interleaved = vec![T::zero(); input.len()];
        convert_layout(
            input,
            BatchLayout::Contiguous,
            &mut interleaved,
            BatchLayout::Interleaved,
            local.size,
            mu,
        );
        let counts = self
            .matrix
            .master_offsets()
            .iter()
            .map(|slice| slice.size * mu)
            .collect::<Vec<_>>();
        let mut global = vec![T::zero(); self.matrix.nrows() * mu];
        self.comm
            .all_gather_varcount(&interleaved, &counts, &mut global)?;
        if overlap.is_empty() {
            return solver.apply(input, output, mu);
        }

        let extended_size = local.size + overlap.len();
        let mut extended_input = Vec::with_capacity(extended_size * mu);
        for vector in 0..mu {
            extended_input.extend_from_slice(&input[vector * local.size..(vector + 1) * local.size]);
            extended_input.extend(overlap.iter().map(|index| global[index * mu + vector]));
        }
        let mut extended_output = vec![T::zero(); extended_size * mu];
        solver.apply(&extended_input, &mut extended_output, mu)?;
        for (owned, extended) in izip!(
            output.chunks_exact_mut(local.size.max(1)),
            extended_output.chunks_exact(extended_size)
        ) {
            owned.copy_from_slice(&extended[..local.size]);
        }
        Ok(())
    }
}

impl<T: RlstScalar, C: Exchange<T>, L: LocalSolver<T>> DistributedOperator<T>
    for HMatrixOperator<'_, T, C, L>
{
    fn local_size(&self) -> usize {
        self.matrix.local_row_count()
    }

    fn gmv(&self, input: &[T], output: &mut [T], mu: usize) -> Result<()> {
        self.matrix.matvec_local(input, output, mu, self.comm)
    }

    fn apply(&self, input: &[T], output: &mut [T], mu: usize) -> Result<()> {
        let expected = self.local_size() * mu;
        if input.len() != expected || output.len() != expected {
            return Err(HMatrixError::InvalidInput(format!(
                "Preconditioner expects {} entries, got {} and {}.",
                expected,
                input.len(),
                output.len()
            )));
        }
        match self.local_solver {
            Some(solver) => self.apply_with_overlap(solver, input, output, mu),
            None => {
                output.copy_from_slice(input);
                Ok(())
            }
        }
    }
}
