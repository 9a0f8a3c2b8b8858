//! BLAS products on batches of interleaved vectors
//!
//! A batch of `mu` interleaved vectors of length `n` has entry `i` of vector
//! `m` at `i * mu + m`. Read as a column-major array this is the `mu x n`
//! matrix `X^T`, so products are taken on the transposed side.
use rlst::{
    empty_array, rlst_array_from_slice2, rlst_array_from_slice_mut2, MultInto, MultIntoResize,
    RawAccess, RlstScalar, TransMode,
};

/// `y += op(A) x` for a column-major `nrows x ncols` matrix `A`.
///
/// `op(A)` is `A`, or `conj(A)` if `conjugate` is set.
pub(crate) fn accumulate<T: RlstScalar>(
    a: &[T],
    nrows: usize,
    ncols: usize,
    x: &[T],
    y: &mut [T],
    mu: usize,
    conjugate: bool,
) {
    debug_assert_eq!(a.len(), nrows * ncols);
    debug_assert_eq!(x.len(), ncols * mu);
    debug_assert_eq!(y.len(), nrows * mu);
    if nrows == 0 || ncols == 0 || mu == 0 {
        return;
    }
    let a = rlst_array_from_slice2!(a, [nrows, ncols]);
    let xt = rlst_array_from_slice2!(x, [mu, ncols]);
    let yt = rlst_array_from_slice_mut2!(y, [mu, nrows]);
    // Y^T += X^T op(A)^T
    let transb = if conjugate {
        TransMode::ConjTrans
    } else {
        TransMode::Trans
    };
    yt.mult_into(TransMode::NoTrans, transb, T::one(), xt, a, T::one());
}

/// `y += op(A)^T x` for a column-major `nrows x ncols` matrix `A`.
///
/// With `conjugate` set this is the conjugate transpose `A^H x`.
pub(crate) fn accumulate_transpose<T: RlstScalar>(
    a: &[T],
    nrows: usize,
    ncols: usize,
    x: &[T],
    y: &mut [T],
    mu: usize,
    conjugate: bool,
) {
    debug_assert_eq!(a.len(), nrows * ncols);
    debug_assert_eq!(x.len(), nrows * mu);
    debug_assert_eq!(y.len(), ncols * mu);
    if nrows == 0 || ncols == 0 || mu == 0 {
        return;
    }
    let a = rlst_array_from_slice2!(a, [nrows, ncols]);
    let xt = rlst_array_from_slice2!(x, [mu, nrows]);
    if conjugate {
        // gemm has no plain conjugate mode, so form A^H X column-major.
        let product = empty_array::<T, 2>().mult_into_resize(
            TransMode::ConjTrans,
            TransMode::Trans,
            T::one(),
            a,
            xt,
            T::zero(),
        );
        add_transposed(product.data(), ncols, y, mu);
    } else {
        let yt = rlst_array_from_slice_mut2!(y, [mu, ncols]);
        yt.mult_into(TransMode::NoTrans, TransMode::NoTrans, T::one(), xt, a, T::one());
    }
}

/// Add a column-major `n x mu` array to `mu` interleaved vectors.
pub(crate) fn add_transposed<T: RlstScalar>(columns: &[T], n: usize, y: &mut [T], mu: usize) {
    for (row, out) in y.chunks_exact_mut(mu).enumerate() {
        for (vector, value) in out.iter_mut().enumerate() {
            *value += columns[vector * n + row];
        }
    }
}

/// `sum_i conj(a_i) b_i`
pub(crate) fn dot_conj<T: RlstScalar>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip(b)
        .fold(T::zero(), |acc, (x, y)| acc + x.conj() * *y)
}

/// Squared Euclidean norm
pub(crate) fn norm_squared<T: RlstScalar>(a: &[T]) -> T::Real {
    a.iter()
        .fold(<T::Real as num::Zero>::zero(), |acc, x| {
            let value = x.abs();
            acc + value * value
        })
}

/// Squared Frobenius norm of `a - b`
pub(crate) fn distance_squared<T: RlstScalar>(a: &[T], b: &[T]) -> T::Real {
    a.iter()
        .zip(b)
        .fold(<T::Real as num::Zero>::zero(), |acc, (x, y)| {
            let value = (*x - *y).abs();
            acc + value * value
        })
}

pub(crate) fn real_to_f64<T: RlstScalar>(value: T::Real) -> f64 {
    num::cast::<T::Real, f64>(value).unwrap_or(f64::NAN)
}

pub(crate) fn f64_to_real<T: RlstScalar>(value: f64) -> T::Real {
    num::cast::<f64, T::Real>(value).unwrap_or_else(<T::Real as num::Float>::nan)
}
