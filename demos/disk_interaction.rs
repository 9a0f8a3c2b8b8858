use hmat::aca::PartialAca;
use hmat::comm::SingleProcess;
use hmat::geometry::{unit_disk, Geometry};
use hmat::kernels::{DenseKernelMatrix, LaplaceKernelMatrix};
use hmat::traits::LowRankCompressor;
use hmat::types::RankRequest;
use hmat::{HMatrixBuilder, HMatrixOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;

extern crate blas_src;
extern crate lapack_src;

fn main() {
    let mut rng = StdRng::seed_from_u64(0);
    let disk = unit_disk(10, 0.0, &mut rng);

    for distance in [10.0, 20.0, 30.0, 40.0] {
        // Put a copy of the disk at height `distance`
        let shifted = disk
            .points()
            .iter()
            .map(|p| [p[0], p[1], p[2] + distance])
            .collect::<Vec<_>>();
        let geometry = Geometry::new([disk.points(), &shifted].concat());
        let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);

        // Compress the interaction block between the two disks
        let rows = (0..10).collect::<Vec<_>>();
        let cols = (10..20).collect::<Vec<_>>();
        let block = PartialAca
            .compress(&kernel, &rows, &cols, 1e-6, RankRequest::Auto { max_rank: None })
            .unwrap();
        println!(
            "distance {distance}: cross block rank {}, error {:.2e}",
            block.rank_of(),
            hmat::aca::relative_error(&block, &kernel, &rows, &cols)
        );

        // Build the hierarchical matrix of both disks
        let mut options = HMatrixOptions::default();
        options.set_eta(1.0).set_epsilon(1e-6).set_min_cluster_size(10);
        let hmatrix = HMatrixBuilder::new(options)
            .build_square(&kernel, &geometry, &SingleProcess)
            .unwrap();
        let error = hmatrix
            .frobenius_error(&DenseKernelMatrix::from_kernel(&kernel), None, &SingleProcess)
            .unwrap();
        println!("    {}", hmatrix.info());
        println!(
            "    compression {:.3}, Frobenius error {:.2e}",
            hmatrix.compression(),
            error
        );
    }
}
