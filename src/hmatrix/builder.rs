//! Construction of hierarchical matrices
use super::{HMatrix, HMatrixInfo};
use crate::aca::PartialAca;
use crate::block::{Block, BlockPlanner};
use crate::cluster::{ClusterTree, RegularSplitter};
use crate::geometry::Geometry;
use crate::options::HMatrixOptions;
use crate::traits::{ClusterSplitter, Exchange, KernelMatrix, LowRankCompressor};
use crate::types::{HMatrixError, MasterOffset, Result, Symmetry};
use log::info;
use rayon::prelude::*;
use rlst::RlstScalar;

/// Builder of hierarchical matrices.
///
/// The compressor of admissible blocks and the splitter of the cluster trees
/// are fixed through the type parameters.
pub struct HMatrixBuilder<C = PartialAca, S = RegularSplitter> {
    options: HMatrixOptions,
    compressor: C,
    splitter: S,
}

impl HMatrixBuilder {
    /// Create a builder using partial ACA and balanced cluster splits.
    pub fn new(options: HMatrixOptions) -> Self {
        Self {
            options,
            compressor: PartialAca,
            splitter: RegularSplitter,
        }
    }
}

impl<C, S> HMatrixBuilder<C, S> {
    /// Replace the compressor.
    pub fn with_compressor<C2>(self, compressor: C2) -> HMatrixBuilder<C2, S> {
        HMatrixBuilder {
            options: self.options,
            compressor,
            splitter: self.splitter,
        }
    }

    /// Replace the cluster splitter.
    pub fn with_splitter<S2>(self, splitter: S2) -> HMatrixBuilder<C, S2> {
        HMatrixBuilder {
            options: self.options,
            compressor: self.compressor,
            splitter,
        }
    }

    /// Options
    pub fn options(&self) -> &HMatrixOptions {
        &self.options
    }

    /// Mutable options
    pub fn options_mut(&mut self) -> &mut HMatrixOptions {
        &mut self.options
    }
}

impl<C, S: ClusterSplitter> HMatrixBuilder<C, S> {
    /// Build the matrix of `kernel` with rows carried by `targets` and columns
    /// carried by `sources`.
    ///
    /// Every process of `comm` must call this with the same arguments.
    pub fn build<T, K, Comm>(
        &self,
        kernel: &K,
        targets: &Geometry,
        sources: &Geometry,
        comm: &Comm,
    ) -> Result<HMatrix<T>>
    where
        T: RlstScalar,
        K: KernelMatrix<T = T>,
        C: LowRankCompressor<T>,
        Comm: Exchange<usize> + Exchange<f64>,
    {
        self.options.validate()?;
        if self.options.symmetry() != Symmetry::None {
            return Err(HMatrixError::InvalidInput(
                "Symmetric storage needs one geometry for rows and columns.".to_string(),
            ));
        }
        check_shape(kernel, targets.len(), sources.len())?;
        let min_cluster_size = self.options.min_cluster_size();
        let rows = ClusterTree::new_distributed(targets, &self.splitter, min_cluster_size, comm)?;
        let cols = ClusterTree::new_distributed(sources, &self.splitter, min_cluster_size, comm)?;
        self.assemble(kernel, rows, cols, false, comm)
    }

    /// Build the square matrix of `kernel` with rows and columns carried by
    /// `geometry`, exploiting the symmetry set in the options.
    ///
    /// Every process of `comm` must call this with the same arguments.
    pub fn build_square<T, K, Comm>(
        &self,
        kernel: &K,
        geometry: &Geometry,
        comm: &Comm,
    ) -> Result<HMatrix<T>>
    where
        T: RlstScalar,
        K: KernelMatrix<T = T>,
        C: LowRankCompressor<T>,
        Comm: Exchange<usize> + Exchange<f64>,
    {
        self.options.validate()?;
        check_shape(kernel, geometry.len(), geometry.len())?;
        let tree = ClusterTree::new_distributed(
            geometry,
            &self.splitter,
            self.options.min_cluster_size(),
            comm,
        )?;
        self.assemble(kernel, tree.clone(), tree, true, comm)
    }

    fn assemble<T, K, Comm>(
        &self,
        kernel: &K,
        rows: ClusterTree,
        cols: ClusterTree,
        same_tree: bool,
        comm: &Comm,
    ) -> Result<HMatrix<T>>
    where
        T: RlstScalar,
        K: KernelMatrix<T = T>,
        C: LowRankCompressor<T>,
        Comm: Exchange<usize> + Exchange<f64>,
    {
        let master_offsets = rows.master_offsets(comm.size());
        self.verify_partition(&rows, &cols, &master_offsets, same_tree, comm)?;
        let local = master_offsets[comm.rank()];

        let plan = BlockPlanner::new(&rows, &cols, &self.options, local, same_tree).plan();
        let blocks = plan
            .par_iter()
            .map(|planned| {
                Block::assemble(
                    kernel,
                    &self.compressor,
                    &rows,
                    &cols,
                    planned,
                    &self.options,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let info = HMatrixInfo::gather(rows.npoints(), cols.npoints(), &blocks, comm)?;
        if comm.rank() == 0 {
            info!("Built hierarchical matrix: {}", info);
        }

        Ok(HMatrix {
            rows,
            cols,
            same_tree,
            master_offsets,
            process: comm.rank(),
            blocks,
            symmetry: if same_tree {
                self.options.symmetry()
            } else {
                Symmetry::None
            },
            triangle: self.options.triangle(),
            epsilon: self.options.epsilon(),
            eta: self.options.eta(),
            info,
        })
    }

    /// Check that all processes agree on sizes, options and row slices.
    fn verify_partition<Comm: Exchange<usize>>(
        &self,
        rows: &ClusterTree,
        cols: &ClusterTree,
        master_offsets: &[MasterOffset],
        same_tree: bool,
        comm: &Comm,
    ) -> Result<()> {
        let mut signature = vec![
            rows.npoints(),
            cols.npoints(),
            usize::from(same_tree),
            self.options.symmetry() as usize,
            self.options.triangle() as usize,
            self.options.min_cluster_size(),
            self.options.min_target_depth(),
        ];
        // Split the bit patterns into 32-bit words so they fit any usize.
        for value in [self.options.eta(), self.options.epsilon()] {
            let bits = value.to_bits();
            signature.push((bits & 0xffff_ffff) as usize);
            signature.push((bits >> 32) as usize);
        }
        for slice in master_offsets {
            signature.push(slice.offset);
            signature.push(slice.size);
        }
        let nprocs = comm.size();
        let counts = vec![signature.len(); nprocs];
        let mut all = vec![0; signature.len() * nprocs];
        Exchange::<usize>::all_gather_varcount(comm, &signature, &counts, &mut all)?;
        for (process, other) in all.chunks_exact(signature.len()).enumerate() {
            if other != signature.as_slice() {
                return Err(HMatrixError::PartitionMismatch(format!(
                    "Process {} and process {} disagree on the matrix layout.",
                    comm.rank(),
                    process
                )));
            }
        }
        if master_offsets.iter().map(|m| m.size).sum::<usize>() != rows.npoints() {
            return Err(HMatrixError::PartitionMismatch(
                "Row slices do not cover all rows.".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_shape<K: KernelMatrix>(kernel: &K, nrows: usize, ncols: usize) -> Result<()> {
    if kernel.nrows() != nrows || kernel.ncols() != ncols {
        return Err(HMatrixError::InvalidInput(format!(
            "Kernel of size {}x{} does not match geometries with {} and {} points.",
            kernel.nrows(),
            kernel.ncols(),
            nrows,
            ncols
        )));
    }
    Ok(())
}
