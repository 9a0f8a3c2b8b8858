//! Low-rank factorisations of matrix blocks
use crate::linalg::distance_squared;
use crate::traits::KernelMatrix;
use rlst::{
    empty_array, rlst_array_from_slice2, rlst_array_from_slice_mut2, rlst_dynamic_array2,
    DynamicArray, MultInto, MultIntoResize, RawAccess, RawAccessMut, RlstScalar, Shape, TransMode,
};

/// A matrix stored as `U V^T` with `U` of size `nrows x rank` and `V` of size
/// `ncols x rank`.
pub struct LowRankMatrix<T: RlstScalar> {
    u: DynamicArray<T, 2>,
    v: DynamicArray<T, 2>,
    converged: bool,
}

impl<T: RlstScalar> LowRankMatrix<T> {
    /// Create from the columns of the two factors.
    pub fn from_columns(
        nrows: usize,
        ncols: usize,
        u_columns: &[Vec<T>],
        v_columns: &[Vec<T>],
        converged: bool,
    ) -> Self {
        assert_eq!(
            u_columns.len(),
            v_columns.len(),
            "Both factors must have the same number of columns."
        );
        let rank = u_columns.len();
        let mut u = rlst_dynamic_array2!(T, [nrows, rank]);
        let mut v = rlst_dynamic_array2!(T, [ncols, rank]);
        for (l, (u_col, v_col)) in u_columns.iter().zip(v_columns).enumerate() {
            assert_eq!(u_col.len(), nrows);
            assert_eq!(v_col.len(), ncols);
            u.data_mut()[l * nrows..(l + 1) * nrows].copy_from_slice(u_col);
            v.data_mut()[l * ncols..(l + 1) * ncols].copy_from_slice(v_col);
        }
        Self { u, v, converged }
    }

    /// The rank zero matrix of the given size.
    pub fn zero(nrows: usize, ncols: usize, converged: bool) -> Self {
        Self::from_columns(nrows, ncols, &[], &[], converged)
    }

    /// Number of rank-one terms
    pub fn rank_of(&self) -> usize {
        self.u.shape()[1]
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.u.shape()[0]
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.v.shape()[0]
    }

    /// Whether the compressor reached its target
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Left factor, `nrows x rank`
    pub fn u(&self) -> &DynamicArray<T, 2> {
        &self.u
    }

    /// Right factor, `ncols x rank`
    pub fn v(&self) -> &DynamicArray<T, 2> {
        &self.v
    }

    /// Number of scalars stored in the factors
    pub fn stored_entries(&self) -> usize {
        self.rank_of() * (self.nrows() + self.ncols())
    }

    /// `1 - rank (nrows + ncols) / (nrows ncols)`
    pub fn compression(&self) -> f64 {
        let dense = self.nrows() * self.ncols();
        if dense == 0 {
            return 0.0;
        }
        1.0 - self.stored_entries() as f64 / dense as f64
    }

    fn effective_rank(&self, truncation: Option<usize>) -> usize {
        truncation.map_or(self.rank_of(), |k| k.min(self.rank_of()))
    }

    /// The entry in row `i` and column `j`
    pub fn entry(&self, i: usize, j: usize) -> T {
        let (m, n) = (self.nrows(), self.ncols());
        (0..self.rank_of()).fold(T::zero(), |acc, l| {
            acc + self.u.data()[l * m + i] * self.v.data()[l * n + j]
        })
    }

    /// Column-major dense matrix built from the first `truncation` terms
    /// (all terms if `None`).
    pub fn to_dense(&self, truncation: Option<usize>) -> DynamicArray<T, 2> {
        let (m, n) = (self.nrows(), self.ncols());
        let rank = self.effective_rank(truncation);
        if m == 0 || n == 0 || rank == 0 {
            return rlst_dynamic_array2!(T, [m, n]);
        }
        let u = self.u.view().into_subview([0, 0], [m, rank]);
        let v = self.v.view().into_subview([0, 0], [n, rank]);
        empty_array::<T, 2>().mult_into_resize(
            TransMode::NoTrans,
            TransMode::Trans,
            T::one(),
            u,
            v,
            T::zero(),
        )
    }

    fn is_empty_product(&self, mu: usize) -> bool {
        self.nrows() == 0 || self.ncols() == 0 || self.rank_of() == 0 || mu == 0
    }

    /// `y += U V^T x` for `mu` interleaved vectors.
    pub fn accumulate_mul(&self, x: &[T], y: &mut [T], mu: usize) {
        if self.is_empty_product(mu) {
            return;
        }
        let (m, n) = (self.nrows(), self.ncols());
        // Interleaved batches are the transposed arrays X^T and Y^T.
        let xt = rlst_array_from_slice2!(x, [mu, n]);
        let coefficients = empty_array::<T, 2>().simple_mult_into_resize(xt, self.v.view());
        rlst_array_from_slice_mut2!(y, [mu, m]).mult_into(
            TransMode::NoTrans,
            TransMode::Trans,
            T::one(),
            coefficients.view(),
            self.u.view(),
            T::one(),
        );
    }

    /// `y += (U V^T)^T x`, or `y += (U V^T)^H x` if `conjugate` is set, for `mu`
    /// interleaved vectors.
    pub fn accumulate_mul_transpose(&self, x: &[T], y: &mut [T], mu: usize, conjugate: bool) {
        if self.is_empty_product(mu) {
            return;
        }
        let (m, n) = (self.nrows(), self.ncols());
        let xt = rlst_array_from_slice2!(x, [mu, m]);
        let yt = rlst_array_from_slice_mut2!(y, [mu, n]);
        if conjugate {
            // C = U^H X, then Y^T += C^T V^H
            let coefficients = empty_array::<T, 2>().mult_into_resize(
                TransMode::ConjTrans,
                TransMode::Trans,
                T::one(),
                self.u.view(),
                xt,
                T::zero(),
            );
            yt.mult_into(
                TransMode::Trans,
                TransMode::ConjTrans,
                T::one(),
                coefficients.view(),
                self.v.view(),
                T::one(),
            );
        } else {
            let coefficients = empty_array::<T, 2>().simple_mult_into_resize(xt, self.u.view());
            yt.mult_into(
                TransMode::NoTrans,
                TransMode::Trans,
                T::one(),
                coefficients.view(),
                self.v.view(),
                T::one(),
            );
        }
    }

    /// Squared Frobenius distance to `kernel[rows, cols]` using the first
    /// `truncation` terms, together with the squared norm of the reference block.
    pub fn frobenius_error_squared<K: KernelMatrix<T = T>>(
        &self,
        kernel: &K,
        rows: &[usize],
        cols: &[usize],
        truncation: Option<usize>,
    ) -> (T::Real, T::Real) {
        let mut reference = vec![T::zero(); rows.len() * cols.len()];
        kernel.submatrix(rows, cols, &mut reference);
        let approximation = self.to_dense(truncation);
        let zeros = vec![T::zero(); reference.len()];
        (
            distance_squared(&reference, approximation.data()),
            distance_squared(&reference, &zeros),
        )
    }

    /// Absolute Frobenius error against `kernel[rows, cols]` using the first
    /// `truncation` terms.
    pub fn frobenius_absolute_error<K: KernelMatrix<T = T>>(
        &self,
        kernel: &K,
        rows: &[usize],
        cols: &[usize],
        truncation: Option<usize>,
    ) -> T::Real {
        let (error, _) = self.frobenius_error_squared(kernel, rows, cols, truncation);
        num::Float::sqrt(error)
    }
}
