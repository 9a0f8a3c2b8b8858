extern crate blas_src;
extern crate lapack_src;

use hmat::comm::{SingleProcess, ThreadGroup};
use hmat::geometry::{fibonacci_sphere, Geometry};
use hmat::kernels::{DenseKernelMatrix, FnKernelMatrix};
use hmat::solver::HMatrixOperator;
use hmat::traits::{Collective, DistributedOperator, Exchange, IterativeMethod, LocalSolver};
use hmat::types::{Symmetry, Triangle};
use hmat::{HMatrix, HMatrixBuilder, HMatrixError, HMatrixOptions, Result};

fn run_group<R: Send>(nprocs: usize, f: impl Fn(ThreadGroup) -> R + Sync) -> Vec<R> {
    std::thread::scope(|s| {
        let handles = ThreadGroup::new(nprocs)
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
}

/// Preconditioned conjugate gradients on a batch of independent systems.
struct ConjugateGradient<'a, C: Exchange<f64>> {
    comm: &'a C,
    tolerance: f64,
    max_iterations: usize,
}

impl<C: Exchange<f64>> ConjugateGradient<'_, C> {
    fn dots(&self, a: &[f64], b: &[f64], n: usize, mu: usize) -> Result<Vec<f64>> {
        let mut dots = (0..mu)
            .map(|v| {
                a[v * n..(v + 1) * n]
                    .iter()
                    .zip(&b[v * n..(v + 1) * n])
                    .map(|(x, y)| x * y)
                    .sum()
            })
            .collect::<Vec<f64>>();
        self.comm.all_reduce_sum(&mut dots)?;
        Ok(dots)
    }
}

impl<C: Exchange<f64>> IterativeMethod<f64> for ConjugateGradient<'_, C> {
    fn solve<Op: DistributedOperator<f64>>(
        &mut self,
        operator: &Op,
        rhs: &[f64],
        x: &mut [f64],
        mu: usize,
    ) -> Result<usize> {
        let n = operator.local_size();
        let mut q = vec![0.0; n * mu];
        operator.gmv(x, &mut q, mu)?;
        let mut r = rhs.iter().zip(&q).map(|(b, ax)| b - ax).collect::<Vec<_>>();
        let mut z = vec![0.0; n * mu];
        operator.apply(&r, &mut z, mu)?;
        let mut p = z.clone();
        let mut rz = self.dots(&r, &z, n, mu)?;
        let rhs_norms = self.dots(rhs, rhs, n, mu)?;

        for iteration in 0..self.max_iterations {
            operator.gmv(&p, &mut q, mu)?;
            let pq = self.dots(&p, &q, n, mu)?;
            for v in 0..mu {
                let alpha = rz[v] / pq[v];
                for i in v * n..(v + 1) * n {
                    x[i] += alpha * p[i];
                    r[i] -= alpha * q[i];
                }
            }
            let residuals = self.dots(&r, &r, n, mu)?;
            if residuals
                .iter()
                .zip(&rhs_norms)
                .all(|(res, norm)| res.sqrt() <= self.tolerance * norm.sqrt())
            {
                return Ok(iteration + 1);
            }
            operator.apply(&r, &mut z, mu)?;
            let rz_new = self.dots(&r, &z, n, mu)?;
            for v in 0..mu {
                let beta = rz_new[v] / rz[v];
                for i in v * n..(v + 1) * n {
                    p[i] = z[i] + beta * p[i];
                }
            }
            rz = rz_new;
        }
        Err(HMatrixError::InvalidInput(
            "Conjugate gradients did not converge.".to_string(),
        ))
    }
}

/// Diagonal scaling.
struct Jacobi {
    diagonal: f64,
}

impl LocalSolver<f64> for Jacobi {
    fn apply(&self, input: &[f64], output: &mut [f64], _mu: usize) -> Result<()> {
        for (out, value) in output.iter_mut().zip(input) {
            *out = value / self.diagonal;
        }
        Ok(())
    }
}

/// Adds the sum of the overlap values to every owned entry.
struct OverlapSum {
    owned: usize,
    overlap: Vec<usize>,
}

impl LocalSolver<f64> for OverlapSum {
    fn overlap(&self) -> &[usize] {
        &self.overlap
    }

    fn apply(&self, input: &[f64], output: &mut [f64], mu: usize) -> Result<()> {
        let size = self.owned + self.overlap.len();
        assert_eq!(input.len(), size * mu);
        for v in 0..mu {
            let block = &input[v * size..(v + 1) * size];
            let sum = block[self.owned..].iter().sum::<f64>();
            for i in 0..size {
                output[v * size + i] = if i < self.owned { block[i] + sum } else { -1.0 };
            }
        }
        Ok(())
    }
}

/// `exp(-r) + delta_ij`, a symmetric positive definite matrix.
fn spd_kernel(geometry: &Geometry) -> FnKernelMatrix<f64, impl Fn(usize, usize) -> f64 + Sync> {
    let points = geometry.points().to_vec();
    let n = points.len();
    FnKernelMatrix::new(n, n, move |i, j| {
        let (a, b) = (points[i], points[j]);
        let r = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt();
        (-r).exp() + if i == j { 1.0 } else { 0.0 }
    })
}

fn options() -> HMatrixOptions {
    let mut options = HMatrixOptions::default();
    options
        .set_min_cluster_size(16)
        .set_eta(1.0)
        .set_epsilon(1e-10)
        .set_min_target_depth(2)
        .set_symmetry(Symmetry::Symmetric, Triangle::Lower);
    options
}

fn residual(hmatrix: &HMatrix<f64>, x: &[f64], rhs: &[f64], mu: usize) -> f64 {
    let mut ax = vec![0.0; x.len()];
    hmatrix.matvec(x, &mut ax, mu, &SingleProcess).unwrap();
    let diff = ax
        .iter()
        .zip(rhs)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>();
    (diff / rhs.iter().map(|b| b * b).sum::<f64>()).sqrt()
}

#[test]
fn test_solve_single_process() {
    let geometry = fibonacci_sphere(300);
    let kernel = spd_kernel(&geometry);
    let hmatrix = HMatrixBuilder::new(options())
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();

    let mu = 2;
    let rhs = (0..300 * mu)
        .map(|i| (i as f64 * 0.3).cos())
        .collect::<Vec<_>>();
    let mut x = vec![0.0; 300 * mu];
    let jacobi = Jacobi { diagonal: 2.0 };
    let operator = HMatrixOperator::new(&hmatrix, &SingleProcess)
        .unwrap()
        .with_local_solver(&jacobi)
        .unwrap();
    let mut cg = ConjugateGradient {
        comm: &SingleProcess,
        tolerance: 1e-10,
        max_iterations: 500,
    };
    let iterations = operator.solve(&mut cg, &rhs, &mut x, mu).unwrap();
    assert!(iterations > 0);
    assert!(residual(&hmatrix, &x, &rhs, mu) < 1e-8);

    let mut dense_product = vec![0.0; 300 * mu];
    DenseKernelMatrix::from_kernel(&kernel).matvec(&x, &mut dense_product, mu);
    let error = dense_product
        .iter()
        .zip(&rhs)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(error < 1e-6);
}

#[test]
fn test_solve_independent_of_process_count() {
    let geometry = fibonacci_sphere(300);
    let kernel = spd_kernel(&geometry);
    let rhs = (0..300).map(|i| (i as f64 * 0.7).sin()).collect::<Vec<_>>();

    let serial = HMatrixBuilder::new(options())
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();
    let mut expected = vec![0.0; 300];
    let mut cg = ConjugateGradient {
        comm: &SingleProcess,
        tolerance: 1e-12,
        max_iterations: 500,
    };
    HMatrixOperator::new(&serial, &SingleProcess)
        .unwrap()
        .solve(&mut cg, &rhs, &mut expected, 1)
        .unwrap();

    for nprocs in [2, 3] {
        let solutions = run_group(nprocs, |comm| {
            let hmatrix = HMatrixBuilder::new(options())
                .build_square(&kernel, &geometry, &comm)
                .unwrap();
            let mut x = vec![0.0; 300];
            let mut cg = ConjugateGradient {
                comm: &comm,
                tolerance: 1e-12,
                max_iterations: 500,
            };
            HMatrixOperator::new(&hmatrix, &comm)
                .unwrap()
                .solve(&mut cg, &rhs, &mut x, 1)
                .unwrap();
            x
        });
        for x in solutions {
            for (a, b) in x.iter().zip(&expected) {
                approx::assert_relative_eq!(*a, *b, epsilon = 1e-8);
            }
        }
    }
}

#[test]
fn test_overlap_is_gathered_and_dropped() {
    let geometry = fibonacci_sphere(200);
    let kernel = spd_kernel(&geometry);
    let mu = 2;
    let global = (0..200 * mu)
        .map(|i| (i as f64 * 0.9).sin())
        .collect::<Vec<_>>();

    run_group(2, |comm| {
        let hmatrix = HMatrixBuilder::new(options())
            .build_square(&kernel, &geometry, &comm)
            .unwrap();
        let offsets = hmatrix.master_offsets().to_vec();
        let local = offsets[comm.rank()];
        let other = offsets[1 - comm.rank()];
        let solver = OverlapSum {
            owned: local.size,
            overlap: (other.offset..other.offset + 3).collect(),
        };
        let operator = HMatrixOperator::new(&hmatrix, &comm)
            .unwrap()
            .with_local_solver(&solver)
            .unwrap();

        let input = (0..mu)
            .flat_map(|v| global[v * 200 + local.offset..v * 200 + local.end()].to_vec())
            .collect::<Vec<_>>();
        let mut output = vec![0.0; input.len()];
        operator.apply(&input, &mut output, mu).unwrap();

        for v in 0..mu {
            let sum = (other.offset..other.offset + 3)
                .map(|index| global[v * 200 + index])
                .sum::<f64>();
            for i in 0..local.size {
                approx::assert_relative_eq!(
                    output[v * local.size + i],
                    input[v * local.size + i] + sum,
                    epsilon = 1e-14
                );
            }
        }
    });
}

#[test]
fn test_overlap_on_one_process_only() {
    let geometry = fibonacci_sphere(200);
    let kernel = spd_kernel(&geometry);
    let global = (0..200).map(|i| (i as f64 * 0.4).cos()).collect::<Vec<_>>();

    let results = run_group(2, |comm| {
        let hmatrix = HMatrixBuilder::new(options())
            .build_square(&kernel, &geometry, &comm)
            .unwrap();
        let offsets = hmatrix.master_offsets().to_vec();
        let local = offsets[comm.rank()];
        let overlap = if comm.rank() == 0 {
            vec![offsets[1].offset]
        } else {
            vec![]
        };
        let solver = OverlapSum {
            owned: local.size,
            overlap,
        };
        let operator = HMatrixOperator::new(&hmatrix, &comm)
            .unwrap()
            .with_local_solver(&solver)
            .unwrap();

        let input = global[local.offset..local.end()].to_vec();
        let mut output = vec![0.0; local.size];
        // Apply twice so that a process skipping the gather would desynchronise.
        operator.apply(&input, &mut output, 1).unwrap();
        operator.apply(&input, &mut output, 1).unwrap();
        (comm.rank(), input, output, offsets[1].offset)
    });

    assert_eq!(results.len(), 2);
    for (rank, input, output, first_remote) in results {
        let shift = if rank == 0 { global[first_remote] } else { 0.0 };
        for (out, value) in output.iter().zip(&input) {
            approx::assert_relative_eq!(*out, value + shift, epsilon = 1e-14);
        }
    }
}

#[test]
fn test_invalid_overlap_fails_on_every_process() {
    let geometry = fibonacci_sphere(100);
    let kernel = spd_kernel(&geometry);
    let results = run_group(2, |comm| {
        let hmatrix = HMatrixBuilder::new(options())
            .build_square(&kernel, &geometry, &comm)
            .unwrap();
        let local = hmatrix.master_offsets()[comm.rank()];
        let overlap = if comm.rank() == 1 {
            vec![local.offset]
        } else {
            vec![]
        };
        let solver = OverlapSum {
            owned: local.size,
            overlap,
        };
        HMatrixOperator::new(&hmatrix, &comm)
            .unwrap()
            .with_local_solver(&solver)
            .map(|_| ())
    });
    for result in results {
        assert!(matches!(result, Err(HMatrixError::InvalidInput(_))));
    }
}

#[test]
fn test_owned_overlap_is_rejected() {
    let geometry = fibonacci_sphere(100);
    let kernel = spd_kernel(&geometry);
    let hmatrix = HMatrixBuilder::new(options())
        .build_square(&kernel, &geometry, &SingleProcess)
        .unwrap();
    let solver = OverlapSum {
        owned: 100,
        overlap: vec![5],
    };
    let result = HMatrixOperator::new(&hmatrix, &SingleProcess)
        .unwrap()
        .with_local_solver(&solver);
    assert!(matches!(result, Err(HMatrixError::InvalidInput(_))));
}

#[test]
fn test_rectangular_matrix_is_rejected() {
    let targets = fibonacci_sphere(60);
    let sources = fibonacci_sphere(40);
    let kernel = FnKernelMatrix::new(60, 40, |i, j| 1.0 / (1.0 + (i + j) as f64));
    let mut options = HMatrixOptions::default();
    options.set_min_cluster_size(10);
    let hmatrix = HMatrixBuilder::new(options)
        .build(&kernel, &targets, &sources, &SingleProcess)
        .unwrap();
    assert!(matches!(
        HMatrixOperator::new(&hmatrix, &SingleProcess),
        Err(HMatrixError::InvalidInput(_))
    ));
}
