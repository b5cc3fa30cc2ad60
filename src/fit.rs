//! Regularized least-squares fitting of tensor-product B-splines.
//!
//! The normal equations `(AᵀWA + αP) C = AᵀWB` are assembled directly from the
//! sparse basis rows of each sample and solved with a Cholesky factorization.

use crate::basis::{
    self, Basis1D, BasisError, KnotSpacing, TensorBasis, tensor_difference_penalty,
};
use crate::bspline::BSpline;
use crate::linalg::{FaerLinalgError, solve_spd};
use crate::table::SampleTable;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error("Normal equations of size {size} are singular; the sampling cannot determine every coefficient")]
    SingularSystem {
        size: usize,
        #[source]
        source: FaerLinalgError,
    },
}

/// Regularization applied to the least-squares objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Smoothing {
    /// Ordinary least squares.
    #[default]
    None,
    /// Tikhonov regularization `α‖c‖²`.
    Ridge,
    /// Second-order difference penalty on the coefficient grid.
    PSpline,
}

const PSPLINE_PENALTY_ORDER: usize = 2;

fn default_dim() -> usize {
    1
}

/// Configuration of a B-spline fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSplineBuilder {
    #[serde(default = "default_dim")]
    pub dim_x: usize,
    #[serde(default = "default_dim")]
    pub dim_y: usize,
    /// Degree per input dimension; empty means cubic everywhere.
    #[serde(default)]
    pub degrees: Vec<usize>,
    #[serde(default)]
    pub num_basis_functions: Option<Vec<usize>>,
    #[serde(default)]
    pub knot_spacing: KnotSpacing,
}

impl Default for BSplineBuilder {
    fn default() -> Self {
        Self::new(default_dim(), default_dim())
    }
}

impl BSplineBuilder {
    /// Cubic in every dimension, natural basis size, knots at the samples.
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self {
            dim_x,
            dim_y,
            degrees: vec![3; dim_x],
            num_basis_functions: None,
            knot_spacing: KnotSpacing::AsSampled,
        }
    }

    pub fn degree(mut self, degree: usize) -> Self {
        self.degrees = vec![degree; self.dim_x];
        self
    }

    pub fn degrees(mut self, degrees: Vec<usize>) -> Self {
        self.degrees = degrees;
        self
    }

    pub fn num_basis_functions(mut self, count: usize) -> Self {
        self.num_basis_functions = Some(vec![count; self.dim_x]);
        self
    }

    pub fn num_basis_functions_per_dim(mut self, counts: Vec<usize>) -> Self {
        self.num_basis_functions = Some(counts);
        self
    }

    pub fn knot_spacing(mut self, spacing: KnotSpacing) -> Self {
        self.knot_spacing = spacing;
        self
    }

    fn resolved_degrees(&self) -> Vec<usize> {
        if self.degrees.is_empty() {
            vec![3; self.dim_x]
        } else {
            self.degrees.clone()
        }
    }

    fn validate(
        &self,
        table: &SampleTable,
        alpha: f64,
        weights: &[f64],
    ) -> Result<(), FitError> {
        if self.dim_x == 0 {
            return Err(FitError::InvalidArgument(
                "dim_x must be at least 1".to_string(),
            ));
        }
        if !self.degrees.is_empty() && self.degrees.len() != self.dim_x {
            return Err(FitError::InvalidArgument(format!(
                "{} degrees configured for dim_x = {}",
                self.degrees.len(),
                self.dim_x
            )));
        }
        if let Some(counts) = &self.num_basis_functions {
            if counts.len() != self.dim_x {
                return Err(FitError::InvalidArgument(format!(
                    "{} basis-function counts configured for dim_x = {}",
                    counts.len(),
                    self.dim_x
                )));
            }
        }
        if table.is_empty() {
            return Err(FitError::InvalidArgument(
                "cannot fit to an empty sample table".to_string(),
            ));
        }
        if table.dim_x() != self.dim_x {
            return Err(FitError::DimensionMismatch(format!(
                "builder expects dim_x = {} but the table has dim_x = {}",
                self.dim_x,
                table.dim_x()
            )));
        }
        if table.dim_y() != self.dim_y {
            return Err(FitError::DimensionMismatch(format!(
                "builder expects dim_y = {} but the table has dim_y = {}",
                self.dim_y,
                table.dim_y()
            )));
        }
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(FitError::InvalidArgument(format!(
                "alpha must be a finite non-negative number, got {alpha}"
            )));
        }
        if !weights.is_empty() {
            if weights.len() != table.num_samples() {
                return Err(FitError::InvalidArgument(format!(
                    "{} weights given for {} samples",
                    weights.len(),
                    table.num_samples()
                )));
            }
            if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(FitError::InvalidArgument(format!(
                    "weights must be finite and non-negative, got {bad}"
                )));
            }
        }
        Ok(())
    }

    /// Builds the tensor basis for `table` without fitting.
    pub fn build_basis(&self, table: &SampleTable) -> Result<TensorBasis, FitError> {
        let degrees = self.resolved_degrees();
        let knot_vectors = basis::build_knot_vectors(
            table.grid(),
            &degrees,
            self.knot_spacing,
            self.num_basis_functions.as_deref(),
        )?;
        let bases = knot_vectors
            .into_iter()
            .enumerate()
            .map(|(dim, knots)| {
                let degree = degrees[dim];
                let natural = knots.len() - degree - 1;
                let target = self
                    .num_basis_functions
                    .as_ref()
                    .map_or(natural, |counts| counts[dim]);
                Basis1D::with_target(degree, knots, target)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TensorBasis::new(bases)?)
    }

    /// Fits a B-spline to `table`.
    ///
    /// `weights` is either empty (unit weights) or holds one non-negative weight
    /// per sample, in the table's iteration order.
    pub fn fit(
        &self,
        table: &SampleTable,
        smoothing: Smoothing,
        alpha: f64,
        weights: &[f64],
    ) -> Result<BSpline, FitError> {
        self.validate(table, alpha, weights)?;
        let basis = self.build_basis(table)?;
        let coefficients = solve_coefficients(&basis, table, smoothing, alpha, weights)?;
        Ok(BSpline::new(basis, coefficients)?)
    }
}

/// Solves the regularized normal equations for the coefficient matrix
/// `[num_basis × dim_y]`.
pub fn solve_coefficients(
    basis: &TensorBasis,
    table: &SampleTable,
    smoothing: Smoothing,
    alpha: f64,
    weights: &[f64],
) -> Result<Array2<f64>, FitError> {
    let n = basis.num_basis_functions();
    let dim_y = table.dim_y();
    let zero_orders = vec![0usize; basis.dim_x()];

    let mut lhs = Array2::<f64>::zeros((n, n));
    let mut rhs = Array2::<f64>::zeros((n, dim_y));
    for (i, sample) in table.iter().enumerate() {
        // Scaling a row of A and B by sqrt(w) scales its normal-equation terms by w.
        let w = weights.get(i).copied().unwrap_or(1.0);
        if w == 0.0 {
            continue;
        }
        let row = basis.evaluate_sparse(sample.x(), &zero_orders)?;
        for &(a, va) in &row {
            let wa = w * va;
            for &(b, vb) in &row {
                lhs[[a, b]] += wa * vb;
            }
            for (k, &y) in sample.y().iter().enumerate() {
                rhs[[a, k]] += wa * y;
            }
        }
    }

    match smoothing {
        Smoothing::None => {}
        Smoothing::Ridge => {
            for i in 0..n {
                lhs[[i, i]] += alpha;
            }
        }
        Smoothing::PSpline => {
            if alpha > 0.0 {
                let penalty = tensor_difference_penalty(basis, PSPLINE_PENALTY_ORDER);
                lhs.scaled_add(alpha, &penalty);
            }
        }
    }

    log::debug!(
        "Solving {n}x{n} normal equations from {} samples ({smoothing:?}, alpha={alpha})",
        table.num_samples()
    );

    solve_spd(&lhs, &rhs).map_err(|source| {
        log::warn!("B-spline normal equations could not be solved: {source}");
        FitError::SingularSystem { size: n, source }
    })
}

/// Interpolating B-spline of the given degree: knots at the samples, no smoothing.
pub fn bspline_interpolator(table: &SampleTable, degree: usize) -> Result<BSpline, FitError> {
    BSplineBuilder::new(table.dim_x(), table.dim_y())
        .degree(degree)
        .fit(table, Smoothing::None, 0.0, &[])
}

/// Ridge-regularized smoother of the given degree.
pub fn bspline_smoother(
    table: &SampleTable,
    degree: usize,
    alpha: f64,
    weights: &[f64],
) -> Result<BSpline, FitError> {
    BSplineBuilder::new(table.dim_x(), table.dim_y())
        .degree(degree)
        .fit(table, Smoothing::Ridge, alpha, weights)
}

/// P-spline smoother: second-order difference penalty of weight `alpha`.
pub fn pspline_smoother(
    table: &SampleTable,
    degree: usize,
    alpha: f64,
    weights: &[f64],
) -> Result<BSpline, FitError> {
    BSplineBuilder::new(table.dim_x(), table.dim_y())
        .degree(degree)
        .fit(table, Smoothing::PSpline, alpha, weights)
}
