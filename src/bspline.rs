use crate::basis::{BasisError, TensorBasis};
use crate::serialize::{self, CodecError, Decode, Deserializer, Encode, Serializer};
use ndarray::{Array1, Array2};
use std::path::Path;

/// A fitted tensor-product B-spline `f: ℝ^dim_x → ℝ^dim_y`.
///
/// Evaluation is read-only, so one model can be shared across threads.
#[derive(Clone, Debug, PartialEq)]
pub struct BSpline {
    basis: TensorBasis,
    knot_averages: Array2<f64>,
    coefficients: Array2<f64>,
    dim_x: usize,
    dim_y: usize,
}

impl BSpline {
    /// Wraps a basis and its `[num_basis × dim_y]` coefficient matrix.
    pub fn new(basis: TensorBasis, coefficients: Array2<f64>) -> Result<Self, BasisError> {
        let num_basis = basis.num_basis_functions();
        if coefficients.nrows() != num_basis {
            return Err(BasisError::DimensionMismatch(format!(
                "{} coefficient rows for {} basis functions",
                coefficients.nrows(),
                num_basis
            )));
        }
        let knot_averages = basis.knot_averages();
        let dim_x = basis.dim_x();
        let dim_y = coefficients.ncols();
        Ok(Self {
            basis,
            knot_averages,
            coefficients,
            dim_x,
            dim_y,
        })
    }

    pub fn basis(&self) -> &TensorBasis {
        &self.basis
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn knot_averages(&self) -> &Array2<f64> {
        &self.knot_averages
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    pub fn num_basis_functions(&self) -> usize {
        self.basis.num_basis_functions()
    }

    /// Per-dimension `(lower, upper)` bounds; inputs outside are clamped.
    pub fn domain(&self) -> Vec<(f64, f64)> {
        self.basis.domain()
    }

    /// Control points `[knot averages | coefficients]`, one row per basis function.
    pub fn control_points(&self) -> Array2<f64> {
        let dim_x = self.dim_x;
        Array2::from_shape_fn(
            (self.num_basis_functions(), dim_x + self.dim_y),
            |(row, col)| {
                if col < dim_x {
                    self.knot_averages[[row, col]]
                } else {
                    self.coefficients[[row, col - dim_x]]
                }
            },
        )
    }

    fn contract(&self, entries: &[(usize, f64)], out: &mut [f64]) {
        for &(row, value) in entries {
            for (k, slot) in out.iter_mut().enumerate() {
                *slot += value * self.coefficients[[row, k]];
            }
        }
    }

    pub fn eval(&self, x: &[f64]) -> Result<Array1<f64>, BasisError> {
        let entries = self.basis.evaluate_sparse(x, &vec![0; self.dim_x])?;
        let mut out = Array1::zeros(self.dim_y);
        for (row, value) in entries {
            out.scaled_add(value, &self.coefficients.row(row));
        }
        Ok(out)
    }

    /// Jacobian `[dim_y × dim_x]`.
    pub fn eval_jacobian(&self, x: &[f64]) -> Result<Array2<f64>, BasisError> {
        let mut jac = Array2::zeros((self.dim_y, self.dim_x));
        let mut orders = vec![0usize; self.dim_x];
        let mut column = vec![0.0; self.dim_y];
        for k in 0..self.dim_x {
            orders[k] = 1;
            let entries = self.basis.evaluate_sparse(x, &orders)?;
            orders[k] = 0;
            column.fill(0.0);
            self.contract(&entries, &mut column);
            for (i, &value) in column.iter().enumerate() {
                jac[[i, k]] = value;
            }
        }
        Ok(jac)
    }

    /// Hessian `[dim_x × dim_x]` of a scalar-valued spline.
    pub fn eval_hessian(&self, x: &[f64]) -> Result<Array2<f64>, BasisError> {
        if self.dim_y != 1 {
            return Err(BasisError::DimensionMismatch(format!(
                "the Hessian needs a scalar output but dim_y = {}",
                self.dim_y
            )));
        }
        let mut hess = Array2::zeros((self.dim_x, self.dim_x));
        let mut orders = vec![0usize; self.dim_x];
        let mut value = [0.0];
        for k in 0..self.dim_x {
            for l in k..self.dim_x {
                orders[k] += 1;
                orders[l] += 1;
                let entries = self.basis.evaluate_sparse(x, &orders)?;
                orders[k] = 0;
                orders[l] = 0;
                value[0] = 0.0;
                self.contract(&entries, &mut value);
                hess[[k, l]] = value[0];
                hess[[l, k]] = value[0];
            }
        }
        Ok(hess)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serialize::to_bytes(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        serialize::from_bytes(bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CodecError> {
        serialize::save_to_file(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        serialize::load_from_file(path.as_ref())
    }
}

impl Encode for BSpline {
    fn encode(&self, out: &mut Serializer) {
        self.basis.encode(out);
        self.knot_averages.encode(out);
        self.coefficients.encode(out);
        self.dim_x.encode(out);
        self.dim_y.encode(out);
    }
}

impl Decode for BSpline {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let offset = input.position();
        let basis = TensorBasis::decode(input)?;
        let knot_averages = Array2::<f64>::decode(input)?;
        let coefficients = Array2::<f64>::decode(input)?;
        let dim_x = usize::decode(input)?;
        let dim_y = usize::decode(input)?;

        let num_basis = basis.num_basis_functions();
        let consistent = basis.dim_x() == dim_x
            && knot_averages.dim() == (num_basis, dim_x)
            && coefficients.dim() == (num_basis, dim_y);
        if !consistent {
            return Err(CodecError::CorruptStream {
                offset,
                reason: format!(
                    "B-spline with {num_basis} basis functions, dim_x = {dim_x} and dim_y = {dim_y} \
                     has knot averages {:?} and coefficients {:?}",
                    knot_averages.dim(),
                    coefficients.dim()
                ),
            });
        }
        Ok(Self {
            basis,
            knot_averages,
            coefficients,
            dim_x,
            dim_y,
        })
    }
}
