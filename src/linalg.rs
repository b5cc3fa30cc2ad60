use faer::linalg::solvers::{self, Solve};
use faer::{MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

/// Pivots of a Cholesky factor smaller than this fraction of the largest pivot
/// mark the system as numerically rank deficient.
pub const RANK_PIVOT_TOL: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
    #[error("Matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("Matrix contains non-finite entries")]
    NonFinite,
    #[error("Matrix is numerically singular (pivot ratio {ratio:.3e})")]
    RankDeficient { ratio: f64 },
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((mat.nrows(), mat.ncols()));
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            out[[i, j]] = mat[(i, j)];
        }
    }
    out
}

/// Borrowed faer view over an ndarray matrix.
pub struct FaerArrayView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        // Negative or zero strides get a compact owned copy.
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.to_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let (ptr, rows, cols, row_stride, col_stride) = if let Some(owned) = &self.owned {
            let strides = owned.strides();
            (
                owned.as_ptr(),
                owned.nrows(),
                owned.ncols(),
                strides[0],
                strides[1],
            )
        } else {
            (
                self.ptr,
                self.rows,
                self.cols,
                self.row_stride,
                self.col_stride,
            )
        };
        // SAFETY: pointer/shape/strides either come directly from a live ndarray
        // view with positive strides, or from an owned compact copy stored inside
        // this wrapper, which guarantees validity for the returned view lifetime.
        unsafe { MatRef::from_raw_parts(ptr, rows, cols, row_stride, col_stride) }
    }
}

pub struct FaerCholeskyFactor {
    factor: solvers::Llt<f64>,
}

impl FaerCholeskyFactor {
    pub fn solve_mat(&self, rhs: &Array2<f64>) -> Array2<f64> {
        let rhs_view = FaerArrayView::new(rhs);
        let solution = self.factor.solve(rhs_view.as_ref());
        mat_to_array(solution.as_ref())
    }

    /// Diagonal of the lower Cholesky factor.
    pub fn diag(&self) -> Array1<f64> {
        let l = self.factor.L();
        Array1::from_shape_fn(l.nrows(), |i| l[(i, i)])
    }

    /// Ratio of the smallest to the largest pivot `l_ii^2`.
    pub fn pivot_ratio(&self) -> f64 {
        let diag = self.diag();
        let mut min_pivot = f64::INFINITY;
        let mut max_pivot = 0.0f64;
        for &l in diag.iter() {
            let pivot = l * l;
            min_pivot = min_pivot.min(pivot);
            max_pivot = max_pivot.max(pivot);
        }
        if max_pivot > 0.0 && min_pivot.is_finite() {
            min_pivot / max_pivot
        } else {
            0.0
        }
    }
}

pub trait FaerCholesky {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError> {
        let faer_view = FaerArrayView::new(self);
        let factor = faer_view
            .as_ref()
            .llt(side)
            .map_err(FaerLinalgError::Cholesky)?;
        Ok(FaerCholeskyFactor { factor })
    }
}

/// Solves the symmetric positive (semi-)definite system `lhs * X = rhs`.
///
/// Rank-deficient systems are rejected instead of returning a solution dominated
/// by rounding noise: the Cholesky factorization must succeed and its pivots must
/// stay within [`RANK_PIVOT_TOL`] of the largest one.
pub fn solve_spd(lhs: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, FaerLinalgError> {
    let (rows, cols) = lhs.dim();
    if rows != cols {
        return Err(FaerLinalgError::NotSquare { rows, cols });
    }
    if lhs.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return Err(FaerLinalgError::NonFinite);
    }

    let factor = lhs.cholesky(Side::Lower)?;
    let ratio = factor.pivot_ratio();
    if ratio < RANK_PIVOT_TOL {
        return Err(FaerLinalgError::RankDeficient { ratio });
    }

    let solution = factor.solve_mat(rhs);
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(FaerLinalgError::NonFinite);
    }
    Ok(solution)
}

/// Solves a general square system `lhs * X = rhs` with partial-pivoting LU.
pub fn solve_general(
    lhs: &Array2<f64>,
    rhs: &Array2<f64>,
) -> Result<Array2<f64>, FaerLinalgError> {
    let (rows, cols) = lhs.dim();
    if rows != cols {
        return Err(FaerLinalgError::NotSquare { rows, cols });
    }
    if lhs.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return Err(FaerLinalgError::NonFinite);
    }

    let lhs_view = FaerArrayView::new(lhs);
    let rhs_view = FaerArrayView::new(rhs);
    let lu = lhs_view.as_ref().partial_piv_lu();
    let solution = mat_to_array(lu.solve(rhs_view.as_ref()).as_ref());
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(FaerLinalgError::NonFinite);
    }

    // LU does not report rank deficiency; check the residual instead.
    let residual = lhs.dot(&solution) - rhs;
    let scale = lhs.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
        * solution.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
        + rhs.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let worst = residual.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if worst > 1e-8 * scale.max(1.0) {
        return Err(FaerLinalgError::RankDeficient {
            ratio: worst / scale.max(f64::MIN_POSITIVE),
        });
    }
    Ok(solution)
}
