use crate::serialize::{CodecError, Decode, Deserializer, Encode, Serializer};
use ndarray::{Array1, Array2, ArrayView1, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A comprehensive error type for all operations within the basis module.
#[derive(Error, Debug)]
pub enum BasisError {
    #[error(
        "Insufficient data for degree {degree} spline in dimension {dimension}: need at least {required} distinct values but only {found} were observed."
    )]
    InsufficientData {
        dimension: usize,
        degree: usize,
        required: usize,
        found: usize,
    },

    #[error(
        "Insufficient knots for degree {degree} spline: need at least {required} knots but only {provided} were provided."
    )]
    InsufficientKnotsForDegree {
        degree: usize,
        required: usize,
        provided: usize,
    },

    #[error(
        "The provided knot vector is invalid: {0}. It must be non-decreasing and contain only finite values."
    )]
    InvalidKnotVector(String),

    #[error(
        "Penalty order ({order}) must be positive and less than the number of basis functions ({num_basis})."
    )]
    InvalidPenaltyOrder { order: usize, num_basis: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

// ============================================================================
// Knot vector construction
// ============================================================================

/// Policy for placing interior knots relative to the sampled coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnotSpacing {
    /// Interior knots sit on sampled coordinates.
    #[default]
    AsSampled,
    /// Interior knots sit on evenly spaced quantiles of the sampled coordinates,
    /// which allows a coarser basis than the sampling density.
    Experimental,
}

fn sorted_unique(values: &[f64], dimension: usize) -> Result<Vec<f64>, BasisError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(BasisError::InvalidKnotVector(format!(
            "dimension {dimension} contains non-finite sample coordinates"
        )));
    }
    let mut unique = values.to_vec();
    unique.sort_by(f64::total_cmp);
    unique.dedup();
    Ok(unique)
}

/// Picks `count` entries of `candidates` at evenly spaced (rounded) positions,
/// always including both ends when `count >= 2`.
fn evenly_spaced_subsequence(candidates: &[f64], count: usize) -> Vec<f64> {
    let c = candidates.len();
    if count == 0 || c == 0 {
        return Vec::new();
    }
    if count >= c {
        return candidates.to_vec();
    }
    if count == 1 {
        return vec![candidates[(c - 1) / 2]];
    }
    let span = c - 1;
    let steps = count - 1;
    (0..count)
        .map(|j| candidates[(2 * j * span + steps) / (2 * steps)])
        .collect()
}

fn sampled_interior_knots(unique: &[f64], degree: usize, count: usize) -> Vec<f64> {
    let candidates: Vec<f64> = if degree == 0 {
        unique.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    } else if unique.len() > 2 {
        unique[1..unique.len() - 1].to_vec()
    } else {
        Vec::new()
    };
    evenly_spaced_subsequence(&candidates, count)
}

fn quantile_interior_knots(unique: &[f64], count: usize) -> Vec<f64> {
    let n = unique.len();
    if count == 0 || n < 2 {
        return Vec::new();
    }
    let last = (n - 1) as f64;
    (1..=count)
        .map(|j| {
            let pos = last * j as f64 / (count + 1) as f64;
            let lo = (pos.floor() as usize).min(n - 2);
            let frac = pos - lo as f64;
            unique[lo] + frac * (unique[lo + 1] - unique[lo])
        })
        .collect()
}

/// Builds a clamped knot vector for one input dimension.
///
/// The natural number of basis functions equals the number of distinct values;
/// `target_num_basis_functions` lowers it (never below `degree + 1`).
pub fn build_knot_vector(
    values: &[f64],
    degree: usize,
    spacing: KnotSpacing,
    target_num_basis_functions: Option<usize>,
    dimension: usize,
) -> Result<Vec<f64>, BasisError> {
    let unique = sorted_unique(values, dimension)?;
    let n = unique.len();
    if n < degree + 1 {
        return Err(BasisError::InsufficientData {
            dimension,
            degree,
            required: degree + 1,
            found: n,
        });
    }

    let num_basis = target_num_basis_functions
        .unwrap_or(n)
        .clamp(degree + 1, n);
    let num_interior = num_basis - degree - 1;
    let interior = match spacing {
        KnotSpacing::AsSampled => sampled_interior_knots(&unique, degree, num_interior),
        KnotSpacing::Experimental => quantile_interior_knots(&unique, num_interior),
    };

    let mut knots = Vec::with_capacity(num_basis + degree + 1);
    knots.extend(std::iter::repeat_n(unique[0], degree + 1));
    knots.extend_from_slice(&interior);
    knots.extend(std::iter::repeat_n(unique[n - 1], degree + 1));
    debug_assert_eq!(knots.len(), num_basis + degree + 1);

    log::debug!(
        "dimension {dimension}: degree {degree}, {num_basis} basis functions from {n} distinct values ({spacing:?})"
    );
    Ok(knots)
}

/// Builds one knot vector per input dimension from the sampling grid.
pub fn build_knot_vectors(
    grid: &[Vec<f64>],
    degrees: &[usize],
    spacing: KnotSpacing,
    target_num_basis_functions: Option<&[usize]>,
) -> Result<Vec<Vec<f64>>, BasisError> {
    if degrees.len() != grid.len() {
        return Err(BasisError::DimensionMismatch(format!(
            "{} degrees given for {} grid dimensions",
            degrees.len(),
            grid.len()
        )));
    }
    if let Some(targets) = target_num_basis_functions {
        if targets.len() != grid.len() {
            return Err(BasisError::DimensionMismatch(format!(
                "{} basis-function targets given for {} grid dimensions",
                targets.len(),
                grid.len()
            )));
        }
    }

    grid.iter()
        .zip(degrees)
        .enumerate()
        .map(|(dim, (values, &degree))| {
            let target = target_num_basis_functions.map(|t| t[dim]);
            build_knot_vector(values, degree, spacing, target, dim)
        })
        .collect()
}

fn validate_knots_for_degree(knots: &[f64], degree: usize) -> Result<(), BasisError> {
    // At least degree + 1 knots on each side of the domain.
    let required_knots = degree.saturating_add(1).saturating_mul(2);
    if knots.len() < required_knots {
        return Err(BasisError::InsufficientKnotsForDegree {
            degree,
            required: required_knots,
            provided: knots.len(),
        });
    }

    if knots.iter().any(|&k| !k.is_finite()) {
        return Err(BasisError::InvalidKnotVector(
            "knot vector contains non-finite (NaN or Infinity) values".to_string(),
        ));
    }

    if knots.windows(2).any(|w| w[0] > w[1]) {
        return Err(BasisError::InvalidKnotVector(
            "knot vector is not non-decreasing".to_string(),
        ));
    }

    Ok(())
}

// ============================================================================
// One-dimensional basis
// ============================================================================

/// Internal module for implementation details not exposed in the public API.
pub(crate) mod internal {
    #[inline]
    fn safe_div(num: f64, den: f64) -> f64 {
        if den.abs() > 1e-12 { num / den } else { 0.0 }
    }

    /// Knot span `mu` with `knots[mu] <= t < knots[mu + 1]`, restricted to the
    /// valid range `degree..num_basis`. The right end of the domain maps to the
    /// last non-empty span so that the final basis function is 1 there.
    #[inline]
    pub fn find_span(t: f64, degree: usize, knots: &[f64]) -> usize {
        let num_basis = knots.len() - degree - 1;
        let upper = knots.partition_point(|&k| k <= t);
        let mut span = upper.saturating_sub(1).clamp(degree, num_basis - 1);
        // Knots repeated more than degree + 1 times at the right end leave the
        // clamped span empty.
        while span > degree && knots[span] == knots[span + 1] {
            span -= 1;
        }
        span
    }

    /// Values of the `degree + 1` basis functions that are non-zero on span
    /// `mu`, following Algorithm A2.2 of "The NURBS Book" (Piegl and Tiller).
    pub fn basis_funs(mu: usize, t: f64, degree: usize, knots: &[f64]) -> Vec<f64> {
        let mut left = vec![0.0; degree + 1];
        let mut right = vec![0.0; degree + 1];
        let mut n = vec![0.0; degree + 1];

        n[0] = 1.0;

        for d in 1..=degree {
            left[d] = t - knots[mu + 1 - d];
            right[d] = knots[mu + d] - t;

            let mut saved = 0.0;

            for r in 0..d {
                let temp = safe_div(n[r], right[r + 1] + left[d - r]);

                n[r] = saved + right[r + 1] * temp;
                saved = left[d - r] * temp;
            }
            n[d] = saved;
        }
        n
    }

    /// Non-zero basis functions and their derivatives up to `order` on span
    /// `mu` (Algorithm A2.3). `ders[k][j]` is the k-th derivative of basis
    /// function `mu - degree + j`; rows beyond `degree` are zero.
    pub fn ders_basis_funs(
        mu: usize,
        t: f64,
        degree: usize,
        knots: &[f64],
        order: usize,
    ) -> Vec<Vec<f64>> {
        let p = degree;
        let n = order.min(p);

        // Upper triangle: basis values by degree. Lower triangle: knot differences.
        let mut ndu = vec![vec![0.0; p + 1]; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        ndu[0][0] = 1.0;
        for j in 1..=p {
            left[j] = t - knots[mu + 1 - j];
            right[j] = knots[mu + j] - t;
            let mut saved = 0.0;
            for r in 0..j {
                ndu[j][r] = right[r + 1] + left[j - r];
                let temp = safe_div(ndu[r][j - 1], ndu[j][r]);
                ndu[r][j] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[j][j] = saved;
        }

        let mut ders = vec![vec![0.0; p + 1]; order + 1];
        for j in 0..=p {
            ders[0][j] = ndu[j][p];
        }

        let mut a = [vec![0.0; p + 1], vec![0.0; p + 1]];
        for r in 0..=p {
            let (mut s1, mut s2) = (0usize, 1usize);
            a[0].fill(0.0);
            a[1].fill(0.0);
            a[0][0] = 1.0;
            for k in 1..=n {
                let mut d = 0.0;
                let rk = r as isize - k as isize;
                let pk = p - k;
                if r >= k {
                    let rk = r - k;
                    a[s2][0] = safe_div(a[s1][0], ndu[pk + 1][rk]);
                    d = a[s2][0] * ndu[rk][pk];
                }
                let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
                let j2 = if r <= pk + 1 { k - 1 } else { p - r };
                for j in j1..=j2 {
                    let idx = (rk + j as isize) as usize;
                    a[s2][j] = safe_div(a[s1][j] - a[s1][j - 1], ndu[pk + 1][idx]);
                    d += a[s2][j] * ndu[idx][pk];
                }
                if r <= pk {
                    a[s2][k] = safe_div(-a[s1][k - 1], ndu[pk + 1][r]);
                    d += a[s2][k] * ndu[r][pk];
                }
                ders[k][r] = d;
                std::mem::swap(&mut s1, &mut s2);
            }
        }

        let mut factor = p as f64;
        for k in 1..=n {
            for value in ders[k].iter_mut() {
                *value *= factor;
            }
            factor *= (p - k) as f64;
        }
        ders
    }
}

/// B-spline basis of one input dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Basis1D {
    degree: usize,
    knots: Vec<f64>,
    target_num_basis_functions: usize,
}

impl Basis1D {
    pub fn new(degree: usize, knots: Vec<f64>) -> Result<Self, BasisError> {
        validate_knots_for_degree(&knots, degree)?;
        let target_num_basis_functions = knots.len() - degree - 1;
        Ok(Self {
            degree,
            knots,
            target_num_basis_functions,
        })
    }

    pub fn with_target(
        degree: usize,
        knots: Vec<f64>,
        target_num_basis_functions: usize,
    ) -> Result<Self, BasisError> {
        let mut basis = Self::new(degree, knots)?;
        basis.target_num_basis_functions = target_num_basis_functions;
        Ok(basis)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn target_num_basis_functions(&self) -> usize {
        self.target_num_basis_functions
    }

    pub fn num_basis_functions(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// Interval on which the basis is a partition of unity.
    pub fn domain(&self) -> (f64, f64) {
        (
            self.knots[self.degree],
            self.knots[self.num_basis_functions()],
        )
    }

    fn clamp_to_domain(&self, t: f64) -> f64 {
        let (lo, hi) = self.domain();
        if t < lo {
            lo
        } else if t > hi {
            hi
        } else {
            t
        }
    }

    /// Non-zero entries of the `order`-th derivative at `t`: the index of the
    /// first supported basis function and `degree + 1` values.
    pub fn evaluate_sparse(&self, t: f64, order: usize) -> (usize, Vec<f64>) {
        let t = self.clamp_to_domain(t);
        let mu = internal::find_span(t, self.degree, &self.knots);
        let start = mu - self.degree;
        if order == 0 {
            return (start, internal::basis_funs(mu, t, self.degree, &self.knots));
        }
        if order > self.degree {
            return (start, vec![0.0; self.degree + 1]);
        }
        let mut ders = internal::ders_basis_funs(mu, t, self.degree, &self.knots, order);
        (start, ders.swap_remove(order))
    }

    /// All basis function values at `t`; `t` outside the domain is clamped.
    pub fn evaluate(&self, t: f64) -> Array1<f64> {
        self.evaluate_derivative(t, 0)
    }

    /// `order`-th derivative of every basis function at `t`. Orders above the
    /// degree give the zero vector.
    pub fn evaluate_derivative(&self, t: f64, order: usize) -> Array1<f64> {
        let mut out = Array1::zeros(self.num_basis_functions());
        let (start, values) = self.evaluate_sparse(t, order);
        for (offset, value) in values.into_iter().enumerate() {
            out[start + offset] = value;
        }
        out
    }

    /// Greville abscissae: the mean of the `degree` interior knots of each basis
    /// function's support (support midpoints for degree 0).
    pub fn knot_averages(&self) -> Array1<f64> {
        let n_basis = self.num_basis_functions();
        let knots = &self.knots;
        if self.degree == 0 {
            return Array1::from_shape_fn(n_basis, |j| 0.5 * (knots[j] + knots[j + 1]));
        }
        let d_inv = 1.0 / self.degree as f64;
        Array1::from_shape_fn(n_basis, |j| {
            let sum: f64 = knots[j + 1..=j + self.degree].iter().sum();
            sum * d_inv
        })
    }
}

// ============================================================================
// Tensor-product basis
// ============================================================================

fn compute_tensor_strides(num_basis: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; num_basis.len()];
    let mut acc = 1usize;
    for i in (0..num_basis.len()).rev() {
        strides[i] = acc;
        acc = acc.saturating_mul(num_basis[i]);
    }
    strides
}

/// Tensor product of one-dimensional bases. Multivariate basis functions are
/// ordered row-major over the per-dimension indices (last dimension fastest).
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBasis {
    bases: Vec<Basis1D>,
}

impl TensorBasis {
    pub fn new(bases: Vec<Basis1D>) -> Result<Self, BasisError> {
        if bases.is_empty() {
            return Err(BasisError::DimensionMismatch(
                "tensor basis needs at least one dimension".to_string(),
            ));
        }
        let total = bases
            .iter()
            .try_fold(1usize, |acc, b| acc.checked_mul(b.num_basis_functions()));
        if total.is_none() {
            return Err(BasisError::DimensionMismatch(
                "tensor basis has more basis functions than can be indexed".to_string(),
            ));
        }
        Ok(Self { bases })
    }

    pub fn from_knot_vectors(
        degrees: &[usize],
        knot_vectors: Vec<Vec<f64>>,
    ) -> Result<Self, BasisError> {
        if degrees.len() != knot_vectors.len() {
            return Err(BasisError::DimensionMismatch(format!(
                "{} degrees given for {} knot vectors",
                degrees.len(),
                knot_vectors.len()
            )));
        }
        let bases = degrees
            .iter()
            .zip(knot_vectors)
            .map(|(&degree, knots)| Basis1D::new(degree, knots))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(bases)
    }

    pub fn bases(&self) -> &[Basis1D] {
        &self.bases
    }

    pub fn dim_x(&self) -> usize {
        self.bases.len()
    }

    pub fn num_basis_functions_per_dim(&self) -> Vec<usize> {
        self.bases.iter().map(Basis1D::num_basis_functions).collect()
    }

    pub fn num_basis_functions(&self) -> usize {
        self.bases.iter().map(Basis1D::num_basis_functions).product()
    }

    pub fn degrees(&self) -> Vec<usize> {
        self.bases.iter().map(Basis1D::degree).collect()
    }

    pub fn domain(&self) -> Vec<(f64, f64)> {
        self.bases.iter().map(Basis1D::domain).collect()
    }

    fn check_point(&self, x: &[f64]) -> Result<(), BasisError> {
        if x.len() != self.dim_x() {
            return Err(BasisError::DimensionMismatch(format!(
                "point has {} coordinates but the basis has {} dimensions",
                x.len(),
                self.dim_x()
            )));
        }
        Ok(())
    }

    /// Non-zero entries `(column, value)` of the tensor basis row at `x`, with
    /// `orders[dim]` the derivative order taken in each dimension.
    pub fn evaluate_sparse(
        &self,
        x: &[f64],
        orders: &[usize],
    ) -> Result<Vec<(usize, f64)>, BasisError> {
        self.check_point(x)?;
        if orders.len() != self.dim_x() {
            return Err(BasisError::DimensionMismatch(format!(
                "{} derivative orders given for {} dimensions",
                orders.len(),
                self.dim_x()
            )));
        }

        let strides = compute_tensor_strides(&self.num_basis_functions_per_dim());
        let per_dim: Vec<(usize, Vec<f64>)> = self
            .bases
            .iter()
            .zip(x.iter().zip(orders))
            .map(|(basis, (&xi, &order))| basis.evaluate_sparse(xi, order))
            .collect();

        let mut entries = Vec::new();
        let mut indices = vec![0usize; per_dim.len()];
        loop {
            let mut product = 1.0f64;
            let mut col = 0usize;
            for (dim, (start, values)) in per_dim.iter().enumerate() {
                product *= values[indices[dim]];
                col += (start + indices[dim]) * strides[dim];
            }
            if product != 0.0 {
                entries.push((col, product));
            }

            let mut carried = true;
            for dim in (0..per_dim.len()).rev() {
                indices[dim] += 1;
                if indices[dim] < per_dim[dim].1.len() {
                    carried = false;
                    break;
                }
                indices[dim] = 0;
            }
            if carried {
                break;
            }
        }
        Ok(entries)
    }

    /// Dense basis vector at `x` with per-dimension derivative orders.
    pub fn evaluate_with_orders(
        &self,
        x: &[f64],
        orders: &[usize],
    ) -> Result<Array1<f64>, BasisError> {
        let mut out = Array1::zeros(self.num_basis_functions());
        for (col, value) in self.evaluate_sparse(x, orders)? {
            out[col] = value;
        }
        Ok(out)
    }

    pub fn evaluate(&self, x: &[f64]) -> Result<Array1<f64>, BasisError> {
        self.evaluate_with_orders(x, &vec![0; self.dim_x()])
    }

    /// Partial derivatives of every basis function: column `k` holds the basis
    /// differentiated once in dimension `k`.
    pub fn evaluate_jacobian(&self, x: &[f64]) -> Result<Array2<f64>, BasisError> {
        let dim_x = self.dim_x();
        let mut jac = Array2::zeros((self.num_basis_functions(), dim_x));
        let mut orders = vec![0usize; dim_x];
        for k in 0..dim_x {
            orders[k] = 1;
            for (col, value) in self.evaluate_sparse(x, &orders)? {
                jac[[col, k]] = value;
            }
            orders[k] = 0;
        }
        Ok(jac)
    }

    /// Tensor grid of per-dimension knot averages, `[num_basis × dim_x]`,
    /// in basis-function order.
    pub fn knot_averages(&self) -> Array2<f64> {
        let per_dim: Vec<Array1<f64>> = self.bases.iter().map(Basis1D::knot_averages).collect();
        let counts = self.num_basis_functions_per_dim();
        let strides = compute_tensor_strides(&counts);
        let total = self.num_basis_functions();
        Array2::from_shape_fn((total, self.dim_x()), |(row, dim)| {
            let idx = (row / strides[dim]) % counts[dim];
            per_dim[dim][idx]
        })
    }
}

// ============================================================================
// Roughness penalties
// ============================================================================

/// `order`-th difference operator over basis index, `[(n - order) × n]`.
///
/// With `knot_averages` the differences are divided differences over the knot
/// averages, rescaled by the mean knot-average spacing: evenly spaced averages
/// give the plain integer differences, and coefficients that are linear in the
/// knot averages (the representation of a linear function) are annihilated for
/// `order >= 2`.
pub fn create_difference_operator(
    num_basis_functions: usize,
    order: usize,
    knot_averages: Option<ArrayView1<f64>>,
) -> Result<Array2<f64>, BasisError> {
    if order == 0 || order >= num_basis_functions {
        return Err(BasisError::InvalidPenaltyOrder {
            order,
            num_basis: num_basis_functions,
        });
    }

    if let Some(g) = knot_averages {
        if g.len() != num_basis_functions {
            return Err(BasisError::DimensionMismatch(format!(
                "knot averages length {} does not match num_basis_functions {}",
                g.len(),
                num_basis_functions
            )));
        }
    }

    let mean_spacing = knot_averages
        .map(|g| (g[num_basis_functions - 1] - g[0]) / (num_basis_functions - 1) as f64)
        .filter(|h| *h > 1e-12);

    // Start with the identity matrix
    let mut d = Array2::<f64>::eye(num_basis_functions);

    // Each `diff` reduces the number of rows by 1.
    for o in 1..=order {
        d = &d.slice(s![1.., ..]) - &d.slice(s![..-1, ..]);

        if let (Some(g), Some(h)) = (knot_averages, mean_spacing) {
            for i in 0..d.nrows() {
                let span = g[i + o] - g[i];
                if span.abs() > 1e-12 {
                    let mut row = d.row_mut(i);
                    row *= o as f64 * h / span;
                }
            }
        }
    }

    Ok(d)
}

/// The penalty `S = D' * D` for a single dimension.
pub fn create_difference_penalty_matrix(
    num_basis_functions: usize,
    order: usize,
    knot_averages: Option<ArrayView1<f64>>,
) -> Result<Array2<f64>, BasisError> {
    let d = create_difference_operator(num_basis_functions, order, knot_averages)?;
    Ok(d.t().dot(&d))
}

/// Roughness penalty over the tensor basis: the sum over dimensions of
/// `I ⊗ … ⊗ S_k ⊗ … ⊗ I`, where `S_k` is the scaled difference penalty of
/// dimension `k`. Dimensions with at most `order` basis functions carry no
/// penalty.
pub fn tensor_difference_penalty(basis: &TensorBasis, order: usize) -> Array2<f64> {
    let counts = basis.num_basis_functions_per_dim();
    let strides = compute_tensor_strides(&counts);
    let total = basis.num_basis_functions();
    let mut penalty = Array2::<f64>::zeros((total, total));

    for (dim, basis_1d) in basis.bases().iter().enumerate() {
        let n = counts[dim];
        let averages = basis_1d.knot_averages();
        let s_dim = match create_difference_penalty_matrix(n, order, Some(averages.view())) {
            Ok(s_dim) => s_dim,
            Err(_) => continue,
        };
        let stride = strides[dim];
        // Every index whose coordinate in `dim` is zero anchors one fibre.
        for base in (0..total).filter(|idx| (idx / stride) % n == 0) {
            for i in 0..n {
                for j in 0..n {
                    let value = s_dim[[i, j]];
                    if value != 0.0 {
                        penalty[[base + i * stride, base + j * stride]] += value;
                    }
                }
            }
        }
    }
    penalty
}

// ============================================================================
// Serialization
// ============================================================================

impl Encode for Basis1D {
    fn encode(&self, out: &mut Serializer) {
        self.degree.encode(out);
        self.knots.encode(out);
        self.target_num_basis_functions.encode(out);
    }
}

impl Decode for Basis1D {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let offset = input.position();
        let degree = usize::decode(input)?;
        let knots = Vec::<f64>::decode(input)?;
        let target = usize::decode(input)?;
        Basis1D::with_target(degree, knots, target).map_err(|e| CodecError::CorruptStream {
            offset,
            reason: format!("invalid basis: {e}"),
        })
    }
}

impl Encode for TensorBasis {
    fn encode(&self, out: &mut Serializer) {
        self.bases.encode(out);
        self.dim_x().encode(out);
    }
}

impl Decode for TensorBasis {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let offset = input.position();
        let bases = Vec::<Basis1D>::decode(input)?;
        let num_variables = usize::decode(input)?;
        if num_variables != bases.len() {
            return Err(CodecError::CorruptStream {
                offset,
                reason: format!(
                    "tensor basis declares {num_variables} variables but holds {} bases",
                    bases.len()
                ),
            });
        }
        TensorBasis::new(bases).map_err(|e| CodecError::CorruptStream {
            offset,
            reason: format!("invalid tensor basis: {e}"),
        })
    }
}
