//? mpirun -n {{NPROCESSES}} --features "mpi"

#[cfg(feature = "mpi")]
use hmat::{
    comm::MpiCollective, geometry::fibonacci_sphere, kernels::LaplaceKernelMatrix,
    traits::Collective, HMatrixBuilder, HMatrixOptions,
};

extern crate blas_src;
extern crate lapack_src;

#[cfg(feature = "mpi")]
fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let comm = MpiCollective::new(&world);

    // Every process holds the whole point cloud and builds its rows of the matrix
    let geometry = fibonacci_sphere(5000);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    let mut options = HMatrixOptions::default();
    options
        .set_min_cluster_size(32)
        .set_eta(1.0)
        .set_epsilon(1e-6)
        .set_min_target_depth(4);
    let hmatrix = HMatrixBuilder::new(options)
        .build_square(&kernel, &geometry, &comm)
        .unwrap();

    // All processes pass the full input and receive the full product
    let x = vec![1.0; 5000];
    let mut y = vec![0.0; 5000];
    hmatrix.matvec(&x, &mut y, 1, &comm).unwrap();

    let local = hmatrix.master_offsets()[comm.rank()];
    println!(
        "Process {} owns rows {}..{} and stores {} blocks. y[0] = {:.6}",
        comm.rank(),
        local.offset,
        local.end(),
        hmatrix.local_block_count(),
        y[0]
    );
    if comm.rank() == 0 {
        println!("{}", hmatrix.info());
    }
}

#[cfg(not(feature = "mpi"))]
fn main() {}
