extern crate blas_src;
extern crate lapack_src;

use hmat::aca::{relative_error, PartialAca};
use hmat::block::BlockData;
use hmat::cluster::GeometricSplitter;
use hmat::comm::SingleProcess;
use hmat::geometry::{fibonacci_sphere, unit_disk, Geometry};
use hmat::kernels::{DenseKernelMatrix, HelmholtzKernelMatrix, LaplaceKernelMatrix};
use hmat::traits::LowRankCompressor;
use hmat::types::{BatchLayout, RankRequest, Symmetry, Triangle};
use hmat::{HMatrixBuilder, HMatrixError, HMatrixOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rlst::{c64, RlstScalar};

/// A disk at height 0 and the same disk at height `distance`.
fn two_disks(npoints: usize, distance: f64) -> Geometry {
    let mut rng = StdRng::seed_from_u64(1);
    let disk = unit_disk(npoints, 0.0, &mut rng);
    let shifted = disk
        .points()
        .iter()
        .map(|p| [p[0], p[1], p[2] + distance])
        .collect::<Vec<_>>();
    Geometry::new([disk.points(), &shifted].concat())
}

fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen::<f64>() - 0.5).collect()
}

fn relative_difference<T: RlstScalar>(a: &[T], b: &[T]) -> f64 {
    let (mut diff, mut norm) = (0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let d: f64 = num::cast((*x - *y).abs()).unwrap();
        let n: f64 = num::cast(y.abs()).unwrap();
        diff += d * d;
        norm += n * n;
    }
    (diff / norm).sqrt()
}

#[test]
fn test_disk_cross_block_rank_decreases_with_distance() {
    let rows = (0..10).collect::<Vec<_>>();
    let cols = (10..20).collect::<Vec<_>>();
    let mut ranks = vec![];
    for distance in [10.0, 20.0, 30.0, 40.0] {
        let geometry = two_disks(10, distance);
        let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
        let lr = PartialAca
            .compress(&kernel, &rows, &cols, 1e-6, RankRequest::Auto { max_rank: None })
            .unwrap();
        assert!(lr.is_converged());
        ranks.push(lr.rank_of());
    }
    for pair in ranks.windows(2) {
        assert!(pair[1] <= pair[0], "ranks {ranks:?}");
    }
}

/// Compression of the two-disk matrix at distances 10, 20, 30 and 40.
fn disk_compressions(eta: f64) -> Vec<f64> {
    let mut options = HMatrixOptions::default();
    options.set_eta(eta).set_epsilon(1e-4).set_min_cluster_size(10);
    let builder = HMatrixBuilder::new(options);

    let mut compression = vec![];
    for distance in [10.0, 20.0, 30.0, 40.0] {
        let geometry = two_disks(10, distance);
        let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
        let hmatrix = builder
            .build_square(&kernel, &geometry, &SingleProcess)
            .unwrap();
        assert_eq!(hmatrix.info().low_rank_blocks + hmatrix.info().dense_blocks, 4);
        compression.push(hmatrix.compression());
    }
    for pair in compression.windows(2) {
        assert!(pair[1] >= pair[0], "compression {compression:?}");
    }
    compression
}

#[test]
fn test_disk_compression_grows_with_distance() {
    let compression = disk_compressions(1.0);
    assert!(compression[3] > 0.0);
}

#[test]
fn test_disk_compression_with_small_eta() {
    // The disks are only admissible from distance 30 on.
    let compression = disk_compressions(0.1);
    assert_eq!(compression[0], 0.0);
    assert_eq!(compression[1], 0.0);
    assert!(compression[3] > 0.0, "compression {compression:?}");
}

#[test]
fn test_low_rank_blocks_meet_tolerance() {
    let geometry = fibonacci_sphere(1000);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    for epsilon in [1e-2, 1e-4] {
        let mut options = HMatrixOptions::default();
        options
            .set_eta(2.0)
            .set_epsilon(epsilon)
            .set_min_cluster_size(16);
        let hmatrix = HMatrixBuilder::new(options)
            .build_square(&kernel, &geometry, &SingleProcess)
            .unwrap();

        let mut checked = 0;
        let mut worst: f64 = 0.0;
        hmatrix.for_each_local_block(|block| {
            if let BlockData::LowRank(low_rank) = block.data() {
                let rows = &hmatrix.inverse_permutation()
                    [block.row_offset()..block.row_offset() + block.row_size()];
                let cols = &hmatrix.col_inverse_permutation()
                    [block.col_offset()..block.col_offset() + block.col_size()];
                worst = worst.max(relative_error(low_rank, &kernel, rows, cols));
                checked += 1;
            }
        });
        assert!(checked > 0);
        assert!(worst <= 10.0 * epsilon, "epsilon {epsilon}: worst block error {worst}");
    }
}

#[test]
fn test_compression_grows_with_eta() {
    let geometry = two_disks(50, 5.0);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);

    let mut compression = vec![];
    for eta in [0.1, 0.2, 1.0, 2.0, 10.0] {
        let mut options = HMatrixOptions::default();
        options.set_eta(eta).set_epsilon(1e-3).set_min_cluster_size(50);
        let hmatrix = HMatrixBuilder::new(options)
            .build_square(&kernel, &geometry, &SingleProcess)
            .unwrap();
        let ratio = hmatrix.compression_ratio();
        assert!(ratio > 0.0 && ratio <= 1.0);
        compression.push(hmatrix.compression());
    }
    for pair in compression.windows(2) {
        assert!(pair[1] >= pair[0], "compression {compression:?}");
    }
    assert_eq!(compression[0], 0.0);
    assert!(compression[4] > 0.0);
}

#[test]
fn test_matvec_matches_dense() {
    let geometry = fibonacci_sphere(600);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    let mut options = HMatrixOptions::default();
    options.set_min_cluster_size(20).set_epsilon(1e-6).set_eta(2.0);
    let hmatrix = HMatrixBuilder::new(options)
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();
    assert!(hmatrix.info().low_rank_blocks > 0);
    assert!(hmatrix.compression_ratio() < 1.0);

    let mu = 3;
    let x = random_vector(600 * mu, 5);
    let mut y = vec![0.0; 600 * mu];
    hmatrix.matvec(&x, &mut y, mu, &SingleProcess).unwrap();

    let mut expected = vec![0.0; 600 * mu];
    let dense = DenseKernelMatrix::from_kernel(&kernel);
    dense.matvec(&x, &mut expected, mu);
    assert!(relative_difference(&y, &expected) < 1e-4);

    let error = hmatrix.frobenius_error(&dense, None, &SingleProcess).unwrap();
    assert!(error < 1e-4, "error {error}");
}

#[test]
fn test_interleaved_layout() {
    let geometry = fibonacci_sphere(200);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    let hmatrix = HMatrixBuilder::new(HMatrixOptions::default())
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();

    let mu = 2;
    let x = random_vector(200 * mu, 3);
    let mut contiguous = vec![0.0; 200 * mu];
    hmatrix.matvec(&x, &mut contiguous, mu, &SingleProcess).unwrap();

    let mut x_interleaved = vec![0.0; x.len()];
    hmat::types::convert_layout(
        &x,
        BatchLayout::Contiguous,
        &mut x_interleaved,
        BatchLayout::Interleaved,
        200,
        mu,
    );
    let mut interleaved = vec![0.0; 200 * mu];
    hmatrix
        .matvec_with_layout(
            &x_interleaved,
            &mut interleaved,
            mu,
            BatchLayout::Interleaved,
            &SingleProcess,
        )
        .unwrap();
    for vector in 0..mu {
        for index in 0..200 {
            approx::assert_relative_eq!(
                interleaved[index * mu + vector],
                contiguous[vector * 200 + index],
                epsilon = 1e-12
            );
        }
    }
}

#[test]
fn test_rectangular_matrix() {
    let mut rng = StdRng::seed_from_u64(4);
    let targets = fibonacci_sphere(300);
    let sources = unit_disk(200, 4.0, &mut rng);
    let kernel = LaplaceKernelMatrix::<f64>::new(&targets, &sources);
    let mut options = HMatrixOptions::default();
    options.set_min_cluster_size(16).set_eta(1.0);
    let hmatrix = HMatrixBuilder::new(options)
        .with_splitter(GeometricSplitter)
        .build(&kernel, &targets, &sources, &SingleProcess)
        .unwrap();
    assert_eq!(hmatrix.nrows(), 300);
    assert_eq!(hmatrix.ncols(), 200);
    assert!(!hmatrix.is_square());

    let x = random_vector(200, 8);
    let mut y = vec![0.0; 300];
    hmatrix.matvec(&x, &mut y, 1, &SingleProcess).unwrap();
    let mut expected = vec![0.0; 300];
    DenseKernelMatrix::from_kernel(&kernel).matvec(&x, &mut expected, 1);
    assert!(relative_difference(&y, &expected) < 1e-4);

    let mut wrong = vec![0.0; 200];
    assert!(matches!(
        hmatrix.matvec(&x, &mut wrong, 1, &SingleProcess),
        Err(HMatrixError::InvalidInput(_))
    ));
}

#[test]
fn test_rectangular_matrix_rejects_symmetry() {
    let targets = fibonacci_sphere(50);
    let sources = fibonacci_sphere(40);
    let kernel = LaplaceKernelMatrix::<f64>::new(&targets, &sources);
    let mut options = HMatrixOptions::default();
    options.set_symmetry(Symmetry::Symmetric, Triangle::Lower);
    assert!(matches!(
        HMatrixBuilder::new(options).build(&kernel, &targets, &sources, &SingleProcess),
        Err(HMatrixError::InvalidInput(_))
    ));
}

#[test]
fn test_invalid_options_are_rejected() {
    let geometry = fibonacci_sphere(50);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    let mut zero_leaves = HMatrixOptions::default();
    zero_leaves.set_min_cluster_size(0);
    let mut zero_epsilon = HMatrixOptions::default();
    zero_epsilon.set_epsilon(0.0);
    let mut negative_eta = HMatrixOptions::default();
    negative_eta.set_eta(-1.0);
    for options in [zero_leaves, zero_epsilon, negative_eta] {
        let builder = HMatrixBuilder::new(options);
        assert!(matches!(
            builder.build_square(&kernel, &geometry, &SingleProcess),
            Err(HMatrixError::InvalidInput(_))
        ));
        assert!(matches!(
            builder.build(&kernel, &geometry, &geometry, &SingleProcess),
            Err(HMatrixError::InvalidInput(_))
        ));
    }
}

#[test]
fn test_helmholtz_matvec() {
    let geometry = fibonacci_sphere(400);
    let kernel = HelmholtzKernelMatrix::new(&geometry, &geometry, 2.0);
    let mut options = HMatrixOptions::default();
    options.set_min_cluster_size(20).set_eta(1.0).set_epsilon(1e-6);
    let hmatrix = HMatrixBuilder::new(options)
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();

    let x = random_vector(400, 2)
        .iter()
        .zip(random_vector(400, 9))
        .map(|(re, im)| c64::new(*re, im))
        .collect::<Vec<_>>();
    let mut y = vec![c64::new(0.0, 0.0); 400];
    hmatrix.matvec(&x, &mut y, 1, &SingleProcess).unwrap();
    let mut expected = vec![c64::new(0.0, 0.0); 400];
    DenseKernelMatrix::from_kernel(&kernel).matvec(&x, &mut expected, 1);
    assert!(relative_difference(&y, &expected) < 1e-4);
}

#[test]
fn test_permutation_round_trip() {
    let geometry = fibonacci_sphere(300);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    let hmatrix = HMatrixBuilder::new(HMatrixOptions::default())
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();

    let mu = 4;
    let v = random_vector(300 * mu, 6);
    let mut natural = vec![0.0; v.len()];
    let mut cluster = vec![0.0; v.len()];
    hmatrix.permute_to_natural(&v, &mut natural, mu);
    hmatrix.permute_to_cluster(&natural, &mut cluster, mu);
    assert_eq!(cluster, v);

    for (natural_index, cluster_index) in hmatrix.forward_permutation().iter().enumerate() {
        assert_eq!(hmatrix.inverse_permutation()[*cluster_index], natural_index);
    }
}

#[test]
fn test_fixed_rank_build() {
    let geometry = two_disks(40, 6.0);
    let kernel = LaplaceKernelMatrix::<f64>::new(&geometry, &geometry);
    let mut options = HMatrixOptions::default();
    options
        .set_min_cluster_size(40)
        .set_eta(1.0)
        .set_rank(RankRequest::Fixed(8));
    let hmatrix = HMatrixBuilder::new(options)
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();
    let info = hmatrix.info();
    assert_eq!(info.low_rank_blocks, 2);
    assert_eq!(info.min_rank, 8);
    assert_eq!(info.max_rank, 8);

    let dense = DenseKernelMatrix::from_kernel(&kernel);
    let full = hmatrix.frobenius_error(&dense, None, &SingleProcess).unwrap();
    let truncated = hmatrix
        .frobenius_error(&dense, Some(1), &SingleProcess)
        .unwrap();
    assert!(full < 1e-4, "error {full}");
    assert!(truncated > full);
}
