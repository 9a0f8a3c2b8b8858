//! Cluster trees over point clouds
mod splitters;

pub use splitters::{GeometricSplitter, RegularSplitter};

use crate::geometry::{BoundingBox, Geometry};
use crate::traits::{ClusterSplitter, Exchange};
use crate::types::{BatchLayout, HMatrixError, MasterOffset, Result};
use log::warn;

/// A node of a [ClusterTree].
///
/// The node covers the cluster indices `[offset, offset + size)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    /// First cluster index covered by the node
    pub offset: usize,
    /// Number of points in the node
    pub size: usize,
    /// Distance to the root
    pub depth: usize,
    /// Index of the parent node
    pub parent: Option<usize>,
    /// Indices of the two children
    pub children: Option<[usize; 2]>,
    /// Radius-inflated bounding box of the points
    pub bounds: BoundingBox,
}

impl ClusterNode {
    /// Test whether the node has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Diameter of the bounding box
    pub fn diameter(&self) -> f64 {
        self.bounds.diameter()
    }
}

/// Binary tree of clusters stored as an arena; node `0` is the root.
///
/// Every subtree covers a contiguous range of the cluster numbering, and the two
/// children of a node partition the range of their parent.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    nodes: Vec<ClusterNode>,
    /// natural -> cluster
    forward: Vec<usize>,
    /// cluster -> natural
    inverse: Vec<usize>,
}

struct TreeBuilder<'a, S: ClusterSplitter> {
    geometry: &'a Geometry,
    splitter: &'a S,
    min_cluster_size: usize,
    nodes: Vec<ClusterNode>,
    degenerate_splits: usize,
}

impl<'a, S: ClusterSplitter> TreeBuilder<'a, S> {
    fn build_node(
        &mut self,
        indices: &mut [usize],
        offset: usize,
        depth: usize,
        parent: Option<usize>,
    ) -> usize {
        let bounds = self.geometry.bounding_box(indices);
        let id = self.nodes.len();
        self.nodes.push(ClusterNode {
            offset,
            size: indices.len(),
            depth,
            parent,
            children: None,
            bounds,
        });

        if indices.len() <= self.min_cluster_size {
            return id;
        }

        let mut nfirst = if bounds.diameter() > 0.0 {
            self.splitter.split(self.geometry, &bounds, indices)
        } else {
            0
        };
        if nfirst == 0 || nfirst >= indices.len() {
            // Coincident points or a one-sided split: halve by count.
            self.degenerate_splits += 1;
            indices.sort_unstable();
            nfirst = indices.len() / 2;
        }

        let (first, second) = indices.split_at_mut(nfirst);
        let child0 = self.build_node(first, offset, depth + 1, Some(id));
        let child1 = self.build_node(second, offset + nfirst, depth + 1, Some(id));
        self.nodes[id].children = Some([child0, child1]);
        id
    }
}

fn ceil_log2(n: usize) -> usize {
    let mut depth = 0;
    while (1 << depth) < n {
        depth += 1;
    }
    depth
}

impl ClusterTree {
    /// Cluster a point cloud.
    ///
    /// Nodes with at most `min_cluster_size` points become leaves.
    pub fn new<S: ClusterSplitter>(
        geometry: &Geometry,
        splitter: &S,
        min_cluster_size: usize,
    ) -> Result<Self> {
        if geometry.is_empty() {
            return Err(HMatrixError::GeometryDegenerate(
                "Cannot cluster an empty point set.".to_string(),
            ));
        }
        if min_cluster_size == 0 {
            return Err(HMatrixError::InvalidInput(
                "The leaf threshold must be at least one.".to_string(),
            ));
        }

        let mut indices = (0..geometry.len()).collect::<Vec<_>>();
        let mut builder = TreeBuilder {
            geometry,
            splitter,
            min_cluster_size,
            nodes: Vec::new(),
            degenerate_splits: 0,
        };
        builder.build_node(&mut indices, 0, 0, None);

        if builder.degenerate_splits > 0 {
            warn!(
                "{} clusters could not be split geometrically and were halved by count.",
                builder.degenerate_splits
            );
        }

        let inverse = indices
            .iter()
            .map(|point| geometry.tags()[*point])
            .collect::<Vec<_>>();
        Ok(Self::from_parts(builder.nodes, inverse))
    }

    /// Cluster a point cloud on process `0` and broadcast the tree to all processes.
    pub fn new_distributed<S: ClusterSplitter, C: Exchange<usize> + Exchange<f64>>(
        geometry: &Geometry,
        splitter: &S,
        min_cluster_size: usize,
        comm: &C,
    ) -> Result<Self> {
        let mut indices = Vec::<usize>::new();
        let mut bounds = Vec::<f64>::new();
        let mut root_error = None;
        if comm.rank() == 0 {
            match Self::new(geometry, splitter, min_cluster_size) {
                Ok(tree) => (indices, bounds) = tree.encode(),
                Err(e) => root_error = Some(e),
            }
        }
        Exchange::<usize>::broadcast(comm, 0, &mut indices)?;
        Exchange::<f64>::broadcast(comm, 0, &mut bounds)?;
        if let Some(e) = root_error {
            return Err(e);
        }
        if indices.is_empty() {
            return Err(HMatrixError::GeometryDegenerate(
                "Process 0 could not cluster the point set.".to_string(),
            ));
        }
        let tree = Self::decode(&indices, &bounds)?;
        let mut mismatches = vec![usize::from(tree.npoints() != geometry.len())];
        Exchange::<usize>::all_reduce_sum(comm, &mut mismatches)?;
        if mismatches[0] > 0 {
            return Err(HMatrixError::PartitionMismatch(format!(
                "{} process(es) hold a point count different from the {} points of the tree.",
                mismatches[0],
                tree.npoints()
            )));
        }
        Ok(tree)
    }

    fn from_parts(nodes: Vec<ClusterNode>, inverse: Vec<usize>) -> Self {
        let mut forward = vec![0; inverse.len()];
        for (cluster_index, natural_index) in inverse.iter().enumerate() {
            forward[*natural_index] = cluster_index;
        }
        Self {
            nodes,
            forward,
            inverse,
        }
    }

    fn encode(&self) -> (Vec<usize>, Vec<f64>) {
        let mut indices = Vec::with_capacity(2 + 6 * self.nodes.len() + self.npoints());
        let mut bounds = Vec::with_capacity(6 * self.nodes.len());
        indices.push(self.npoints());
        indices.push(self.nodes.len());
        for node in &self.nodes {
            let [child0, child1] = node.children.map_or([0, 0], |c| [c[0] + 1, c[1] + 1]);
            indices.extend_from_slice(&[
                node.offset,
                node.size,
                node.depth,
                node.parent.map_or(0, |p| p + 1),
                child0,
                child1,
            ]);
            bounds.extend_from_slice(&node.bounds.min);
            bounds.extend_from_slice(&node.bounds.max);
        }
        indices.extend_from_slice(&self.inverse);
        (indices, bounds)
    }

    fn decode(indices: &[usize], bounds: &[f64]) -> Result<Self> {
        let npoints = indices[0];
        let nnodes = indices[1];
        if indices.len() != 2 + 6 * nnodes + npoints || bounds.len() != 6 * nnodes {
            return Err(HMatrixError::CollectiveTransportFailure(
                "Received a truncated cluster tree.".to_string(),
            ));
        }
        let nodes = indices[2..2 + 6 * nnodes]
            .chunks_exact(6)
            .zip(bounds.chunks_exact(6))
            .map(|(data, b)| ClusterNode {
                offset: data[0],
                size: data[1],
                depth: data[2],
                parent: data[3].checked_sub(1),
                children: if data[4] == 0 {
                    None
                } else {
                    Some([data[4] - 1, data[5] - 1])
                },
                bounds: BoundingBox {
                    min: [b[0], b[1], b[2]],
                    max: [b[3], b[4], b[5]],
                },
            })
            .collect();
        Ok(Self::from_parts(nodes, indices[2 + 6 * nnodes..].to_vec()))
    }

    /// Index of the root node
    pub fn root(&self) -> usize {
        0
    }

    /// A node of the tree
    pub fn node(&self, id: usize) -> &ClusterNode {
        &self.nodes[id]
    }

    /// All nodes, parents before children
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Number of points
    pub fn npoints(&self) -> usize {
        self.inverse.len()
    }

    /// Largest depth of a node
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Leaves in the order of the cluster numbering
    pub fn leaves(&self) -> Vec<usize> {
        self.frontier(usize::MAX)
    }

    /// Map from natural numbering to cluster numbering
    pub fn forward_permutation(&self) -> &[usize] {
        &self.forward
    }

    /// Map from cluster numbering to natural numbering
    pub fn inverse_permutation(&self) -> &[usize] {
        &self.inverse
    }

    /// Nodes at `depth`, together with the leaves above it, in cluster order.
    pub fn frontier(&self, depth: usize) -> Vec<usize> {
        let mut frontier = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            match node.children {
                Some([child0, child1]) if node.depth < depth => {
                    stack.push(child1);
                    stack.push(child0);
                }
                _ => frontier.push(id),
            }
        }
        frontier
    }

    /// Split the cluster numbering among `nprocs` processes.
    ///
    /// Each range is a union of consecutive nodes at depth `ceil(log2(nprocs))`
    /// so that clusters below that depth never straddle two processes.
    pub fn master_offsets(&self, nprocs: usize) -> Vec<MasterOffset> {
        assert!(nprocs > 0, "At least one process is needed.");
        let frontier = self.frontier(ceil_log2(nprocs));
        let nfrontier = frontier.len();
        if nfrontier < nprocs {
            warn!(
                "{} processes share {} clusters; some processes own no rows.",
                nprocs, nfrontier
            );
        }
        (0..nprocs)
            .map(|p| {
                let start = p * nfrontier / nprocs;
                let end = (p + 1) * nfrontier / nprocs;
                if start == end {
                    let offset = frontier
                        .get(start)
                        .map_or(self.npoints(), |id| self.nodes[*id].offset);
                    MasterOffset { offset, size: 0 }
                } else {
                    let first = &self.nodes[frontier[start]];
                    let last = &self.nodes[frontier[end - 1]];
                    MasterOffset {
                        offset: first.offset,
                        size: last.offset + last.size - first.offset,
                    }
                }
            })
            .collect()
    }

    /// Reorder a batch of `mu` contiguous vectors from natural to cluster numbering.
    pub fn permute_to_cluster<T: Copy>(&self, natural: &[T], cluster: &mut [T], mu: usize) {
        self.to_cluster_with_layout(
            natural,
            BatchLayout::Contiguous,
            cluster,
            BatchLayout::Contiguous,
            mu,
        );
    }

    /// Reorder a batch of `mu` contiguous vectors from cluster to natural numbering.
    pub fn permute_to_natural<T: Copy>(&self, cluster: &[T], natural: &mut [T], mu: usize) {
        self.to_natural_with_layout(
            cluster,
            BatchLayout::Contiguous,
            natural,
            BatchLayout::Contiguous,
            mu,
        );
    }

    pub(crate) fn to_cluster_with_layout<T: Copy>(
        &self,
        natural: &[T],
        natural_layout: BatchLayout,
        cluster: &mut [T],
        cluster_layout: BatchLayout,
        mu: usize,
    ) {
        gather(
            natural,
            natural_layout,
            cluster,
            cluster_layout,
            &self.inverse,
            mu,
        );
    }

    pub(crate) fn to_natural_with_layout<T: Copy>(
        &self,
        cluster: &[T],
        cluster_layout: BatchLayout,
        natural: &mut [T],
        natural_layout: BatchLayout,
        mu: usize,
    ) {
        gather(
            cluster,
            cluster_layout,
            natural,
            natural_layout,
            &self.forward,
            mu,
        );
    }
}

/// `output[k] = input[index[k]]` for every vector of the batch.
fn gather<T: Copy>(
    input: &[T],
    input_layout: BatchLayout,
    output: &mut [T],
    output_layout: BatchLayout,
    index: &[usize],
    mu: usize,
) {
    let n = index.len();
    assert_eq!(input.len(), n * mu, "Input has the wrong length.");
    assert_eq!(output.len(), n * mu, "Output has the wrong length.");
    for vector in 0..mu {
        for (k, source) in index.iter().enumerate() {
            output[output_layout.position(k, vector, n, mu)] =
                input[input_layout.position(*source, vector, n, mu)];
        }
    }
}
