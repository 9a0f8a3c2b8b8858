//! Adaptive cross approximation
//!
//! Three compressors are provided:
//! - [PartialAca] only evaluates one row and one column of the block per step
//!   and estimates the Frobenius norm of the approximation on the fly. Before
//!   it stops adaptively it checks the residual on a few unvisited columns.
//! - [FullAca] evaluates the whole block and pivots on the largest entry of the
//!   explicit residual. It is expensive but does not miss rank.
//! - [SymmetricAca] pivots on the diagonal of square self-interaction blocks of
//!   symmetric or Hermitian kernels.
use crate::linalg::{dot_conj, f64_to_real, norm_squared, real_to_f64};
use crate::low_rank::LowRankMatrix;
use crate::traits::{KernelMatrix, LowRankCompressor};
use crate::types::{HMatrixError, RankRequest, Result, Symmetry};
use num::{Float, One, Zero};
use rlst::RlstScalar;

/// Pivots below this multiple of the machine epsilon, relative to the first
/// pivot, count as zero when stopping adaptively.
const PIVOT_TOLERANCE: f64 = 1e3;

/// Unvisited columns on which an adaptive stop of [PartialAca] is checked.
const CHECK_COLUMNS: usize = 12;

/// Partially pivoted ACA.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialAca;

/// Fully pivoted ACA.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullAca;

/// ACA with diagonal pivoting for symmetric or Hermitian self-interaction blocks.
///
/// Blocks whose rows and columns differ are handed to [PartialAca].
#[derive(Debug, Clone, Copy)]
pub struct SymmetricAca {
    symmetry: Symmetry,
}

impl SymmetricAca {
    /// Create a compressor for kernels with the given structure.
    pub fn new(symmetry: Symmetry) -> Self {
        Self { symmetry }
    }
}

/// Rank target and stopping mode of one compression.
struct Target {
    rank: usize,
    adaptive: bool,
}

impl Target {
    fn new(rank: RankRequest, nrows: usize, ncols: usize) -> Result<Self> {
        let max = nrows.min(ncols);
        match rank {
            RankRequest::Fixed(requested) => {
                if requested > max {
                    Err(HMatrixError::RankExceeded { requested, max })
                } else {
                    Ok(Self {
                        rank: requested,
                        adaptive: false,
                    })
                }
            }
            RankRequest::Auto { max_rank } => Ok(Self {
                rank: max_rank.map_or(max, |budget| budget.min(max)),
                adaptive: true,
            }),
        }
    }

    /// Whether a pivot of size `pivot` stops the iteration.
    fn is_breakdown<R: Float>(&self, pivot: R, first_pivot: R) -> bool {
        if pivot.is_zero() || !pivot.is_finite() {
            return true;
        }
        let tolerance = num::cast::<f64, R>(PIVOT_TOLERANCE).unwrap_or_else(R::nan);
        self.adaptive && pivot <= first_pivot * R::epsilon() * tolerance
    }
}

/// Running squared Frobenius norm of `sum_l u_l v_l^T`.
struct FrobeniusEstimate<T: RlstScalar> {
    value: T::Real,
}

impl<T: RlstScalar> FrobeniusEstimate<T> {
    fn new() -> Self {
        Self {
            value: T::Real::zero(),
        }
    }

    /// Add the term `u v^T` and return `|u| |v|`.
    fn add(&mut self, us: &[Vec<T>], vs: &[Vec<T>], u: &[T], v: &[T]) -> T::Real {
        let mut cross = T::zero();
        for (u_l, v_l) in us.iter().zip(vs) {
            cross += dot_conj(u_l, u) * dot_conj(v_l, v).conj();
        }
        let (u_norm, v_norm) = (norm_squared(u), norm_squared(v));
        let two = T::Real::one() + T::Real::one();
        self.value = self.value + two * cross.re() + u_norm * v_norm;
        Float::sqrt(u_norm * v_norm)
    }

    fn norm(&self) -> T::Real {
        Float::sqrt(Float::max(self.value, T::Real::zero()))
    }
}

fn argmax<T: RlstScalar>(values: &[T], visited: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, T::Real)> = None;
    for (index, (value, seen)) in values.iter().zip(visited).enumerate() {
        if *seen {
            continue;
        }
        let magnitude = value.abs();
        if best.map_or(true, |(_, b)| magnitude > b) {
            best = Some((index, magnitude));
        }
    }
    best.map(|(index, _)| index)
}

/// Column `j` of the residual `K[rows, cols] - sum_l u_l v_l^T`.
fn residual_column<T: RlstScalar, K: KernelMatrix<T = T>>(
    kernel: &K,
    rows: &[usize],
    cols: &[usize],
    j: usize,
    us: &[Vec<T>],
    vs: &[Vec<T>],
) -> Vec<T> {
    let mut column = vec![T::zero(); rows.len()];
    kernel.submatrix(rows, &cols[j..j + 1], &mut column);
    for (u, v) in us.iter().zip(vs) {
        for (value, u_i) in column.iter_mut().zip(u) {
            *value -= *u_i * v[j];
        }
    }
    column
}

/// Unvisited columns spread over the block, at most [CHECK_COLUMNS].
fn check_columns(visited: &[bool]) -> Vec<usize> {
    let n = visited.len();
    let count = CHECK_COLUMNS.min(n);
    let mut columns = Vec::with_capacity(count);
    for t in 0..count {
        let start = (2 * t + 1) * n / (2 * count);
        if let Some(j) = (start..n)
            .chain(0..start)
            .find(|j| !visited[*j] && !columns.contains(j))
        {
            columns.push(j);
        }
    }
    columns
}

/// Outcome of checking an adaptive stop against sampled columns.
enum StopCheck {
    Accept,
    /// Continue from this row.
    Retry(usize),
}

/// Extrapolate the residual of the sampled columns to the whole block and
/// compare it with `epsilon * norm`.
#[allow(clippy::too_many_arguments)]
fn check_stop<T: RlstScalar, K: KernelMatrix<T = T>>(
    kernel: &K,
    rows: &[usize],
    cols: &[usize],
    us: &[Vec<T>],
    vs: &[Vec<T>],
    row_visited: &[bool],
    col_visited: &[bool],
    bound: T::Real,
) -> StopCheck {
    let sampled = check_columns(col_visited);
    if sampled.is_empty() {
        return StopCheck::Accept;
    }
    let mut total = T::Real::zero();
    let mut worst: Option<(Vec<T>, T::Real)> = None;
    for j in &sampled {
        let column = residual_column(kernel, rows, cols, *j, us, vs);
        let squared = norm_squared(&column);
        total = total + squared;
        if worst.as_ref().map_or(true, |(_, w)| squared > *w) {
            worst = Some((column, squared));
        }
    }
    let unvisited = col_visited.iter().filter(|seen| !**seen).count();
    let scale = f64_to_real::<T>(unvisited as f64 / sampled.len() as f64);
    if Float::sqrt(total * scale) <= bound {
        return StopCheck::Accept;
    }
    match worst.and_then(|(column, _)| argmax(&column, row_visited)) {
        Some(i) => StopCheck::Retry(i),
        None => StopCheck::Accept,
    }
}

impl<T: RlstScalar> LowRankCompressor<T> for PartialAca {
    fn compress<K: KernelMatrix<T = T>>(
        &self,
        kernel: &K,
        rows: &[usize],
        cols: &[usize],
        epsilon: f64,
        rank: RankRequest,
    ) -> Result<LowRankMatrix<T>> {
        let (m, n) = (rows.len(), cols.len());
        let target = Target::new(rank, m, n)?;
        if m == 0 || n == 0 {
            return Ok(LowRankMatrix::zero(m, n, true));
        }
        let epsilon = f64_to_real::<T>(epsilon);

        let mut us: Vec<Vec<T>> = Vec::new();
        let mut vs: Vec<Vec<T>> = Vec::new();
        let mut row_visited = vec![false; m];
        let mut col_visited = vec![false; n];
        let mut estimate = FrobeniusEstimate::<T>::new();
        let mut first_pivot = T::Real::zero();
        let mut converged = false;
        let mut next_row = Some(0);

        while us.len() < target.rank {
            let Some(i) = next_row else { break };
            row_visited[i] = true;

            let mut row = vec![T::zero(); n];
            kernel.submatrix(&rows[i..i + 1], cols, &mut row);
            for (u, v) in us.iter().zip(&vs) {
                for (value, v_j) in row.iter_mut().zip(v) {
                    *value -= u[i] * *v_j;
                }
            }

            let Some(j) = argmax(&row, &col_visited) else {
                break;
            };
            let pivot = row[j];
            if us.is_empty() {
                first_pivot = pivot.abs();
            }
            if target.is_breakdown(pivot.abs(), first_pivot) {
                break;
            }
            col_visited[j] = true;

            let column = residual_column(kernel, rows, cols, j, &us, &vs);
            let v = row.iter().map(|value| *value / pivot).collect::<Vec<_>>();

            let term = estimate.add(&us, &vs, &column, &v);
            next_row = argmax(&column, &row_visited);
            us.push(column);
            vs.push(v);

            let bound = epsilon * estimate.norm();
            if target.adaptive && term <= bound {
                match check_stop(
                    kernel,
                    rows,
                    cols,
                    &us,
                    &vs,
                    &row_visited,
                    &col_visited,
                    bound,
                ) {
                    StopCheck::Accept => {
                        converged = true;
                        break;
                    }
                    StopCheck::Retry(i) => next_row = Some(i),
                }
            }
        }

        let rank_reached = us.len();
        if !converged {
            converged = if target.adaptive {
                rank_reached == m.min(n)
            } else {
                rank_reached == target.rank
            };
        }
        Ok(LowRankMatrix::from_columns(m, n, &us, &vs, converged))
    }
}

impl<T: RlstScalar> LowRankCompressor<T> for FullAca {
    fn compress<K: KernelMatrix<T = T>>(
        &self,
        kernel: &K,
        rows: &[usize],
        cols: &[usize],
        epsilon: f64,
        rank: RankRequest,
    ) -> Result<LowRankMatrix<T>> {
        let (m, n) = (rows.len(), cols.len());
        let target = Target::new(rank, m, n)?;
        if m == 0 || n == 0 {
            return Ok(LowRankMatrix::zero(m, n, true));
        }

        let mut residual = vec![T::zero(); m * n];
        kernel.submatrix(rows, cols, &mut residual);
        let norm = Float::sqrt(norm_squared(&residual));
        let tolerance = f64_to_real::<T>(epsilon) * norm;
        let everywhere = vec![false; m * n];

        let mut us: Vec<Vec<T>> = Vec::new();
        let mut vs: Vec<Vec<T>> = Vec::new();
        let mut converged = target.adaptive && norm <= tolerance;
        while !converged && us.len() < target.rank {
            let Some(position) = argmax(&residual, &everywhere) else {
                break;
            };
            let (i, j) = (position % m, position / m);
            let pivot = residual[position];
            if target.is_breakdown(pivot.abs(), norm) {
                break;
            }
            let u = residual[j * m..(j + 1) * m].to_vec();
            let v = (0..n)
                .map(|col| residual[col * m + i] / pivot)
                .collect::<Vec<_>>();
            for (col, v_col) in v.iter().enumerate() {
                for (value, u_row) in residual[col * m..(col + 1) * m].iter_mut().zip(&u) {
                    *value -= *u_row * *v_col;
                }
            }
            us.push(u);
            vs.push(v);
            if target.adaptive {
                converged = Float::sqrt(norm_squared(&residual)) <= tolerance;
            }
        }

        if !target.adaptive {
            converged = us.len() == target.rank;
        } else if us.len() == m.min(n) {
            converged = true;
        }
        Ok(LowRankMatrix::from_columns(m, n, &us, &vs, converged))
    }
}

impl<T: RlstScalar> LowRankCompressor<T> for SymmetricAca {
    fn compress<K: KernelMatrix<T = T>>(
        &self,
        kernel: &K,
        rows: &[usize],
        cols: &[usize],
        epsilon: f64,
        rank: RankRequest,
    ) -> Result<LowRankMatrix<T>> {
        if rows != cols || self.symmetry == Symmetry::None {
            return PartialAca.compress(kernel, rows, cols, epsilon, rank);
        }
        let n = rows.len();
        let target = Target::new(rank, n, n)?;
        if n == 0 {
            return Ok(LowRankMatrix::zero(n, n, true));
        }
        let epsilon = f64_to_real::<T>(epsilon);
        let hermitian = self.symmetry == Symmetry::Hermitian;

        let mut diagonal = rows
            .iter()
            .map(|index| kernel.coefficient(*index, *index))
            .collect::<Vec<_>>();
        let mut visited = vec![false; n];
        let mut us: Vec<Vec<T>> = Vec::new();
        let mut vs: Vec<Vec<T>> = Vec::new();
        let mut estimate = FrobeniusEstimate::<T>::new();
        let mut first_pivot = T::Real::zero();
        let mut converged = false;

        while us.len() < target.rank {
            let Some(i) = argmax(&diagonal, &visited) else {
                break;
            };
            visited[i] = true;

            let mut column = vec![T::zero(); n];
            kernel.submatrix(rows, &cols[i..i + 1], &mut column);
            for (u, v) in us.iter().zip(&vs) {
                for (value, u_k) in column.iter_mut().zip(u) {
                    *value -= *u_k * v[i];
                }
            }
            let pivot = if hermitian {
                T::from_real(column[i].re())
            } else {
                column[i]
            };
            if us.is_empty() {
                first_pivot = pivot.abs();
            }
            if target.is_breakdown(pivot.abs(), first_pivot) {
                break;
            }

            // Row i of the residual is column i transposed (conjugated if Hermitian).
            let v = column
                .iter()
                .map(|value| {
                    if hermitian {
                        value.conj() / pivot
                    } else {
                        *value / pivot
                    }
                })
                .collect::<Vec<_>>();
            for ((d, u_k), v_k) in diagonal.iter_mut().zip(&column).zip(&v) {
                *d -= *u_k * *v_k;
            }

            let term = estimate.add(&us, &vs, &column, &v);
            us.push(column);
            vs.push(v);
            if target.adaptive && term <= epsilon * estimate.norm() {
                converged = true;
                break;
            }
        }

        if !converged {
            converged = if target.adaptive {
                us.len() == n
            } else {
                us.len() == target.rank
            };
        }
        Ok(LowRankMatrix::from_columns(n, n, &us, &vs, converged))
    }
}

/// Relative Frobenius error of a compressed block, as `f64`.
pub fn relative_error<T: RlstScalar, K: KernelMatrix<T = T>>(
    approximation: &LowRankMatrix<T>,
    kernel: &K,
    rows: &[usize],
    cols: &[usize],
) -> f64 {
    let (error, norm) = approximation.frobenius_error_squared(kernel, rows, cols, None);
    let norm = real_to_f64::<T>(norm);
    if norm == 0.0 {
        real_to_f64::<T>(error).sqrt()
    } else {
        (real_to_f64::<T>(error) / norm).sqrt()
    }
}
