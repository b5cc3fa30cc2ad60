//! Radial basis function interpolation over the samples of a [`SampleTable`].

use crate::linalg::{FaerLinalgError, solve_general};
use crate::serialize::{self, CodecError, Decode, Deserializer, Encode, Serializer};
use crate::table::SampleTable;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RbfError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Cannot fit a radial basis function to an empty sample table")]
    InsufficientData,

    #[error("Radial basis interpolation system of size {size} is singular")]
    SingularSystem {
        size: usize,
        #[source]
        source: FaerLinalgError,
    },
}

/// Radial kernel `φ(r)`, with shape parameter `e = 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RbfKernel {
    /// `r² ln r`
    #[default]
    ThinPlateSpline,
    /// `sqrt(1 + (er)²)`
    Multiquadric,
    /// `1 / (1 + (er)²)`
    InverseQuadric,
    /// `1 / sqrt(1 + (er)²)`
    InverseMultiquadric,
    /// `exp(-(er)²)`
    Gaussian,
}

const SHAPE: f64 = 1.0;

impl RbfKernel {
    pub fn tag(self) -> u32 {
        match self {
            RbfKernel::ThinPlateSpline => 0,
            RbfKernel::Multiquadric => 1,
            RbfKernel::InverseQuadric => 2,
            RbfKernel::InverseMultiquadric => 3,
            RbfKernel::Gaussian => 4,
        }
    }

    /// Kernel for a serialized tag. Unknown tags decode as the thin plate spline.
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => RbfKernel::ThinPlateSpline,
            1 => RbfKernel::Multiquadric,
            2 => RbfKernel::InverseQuadric,
            3 => RbfKernel::InverseMultiquadric,
            4 => RbfKernel::Gaussian,
            other => {
                log::warn!("Unknown RBF kernel tag {other}; falling back to thin plate spline");
                RbfKernel::ThinPlateSpline
            }
        }
    }

    pub fn eval(self, r: f64) -> f64 {
        let er2 = (SHAPE * r) * (SHAPE * r);
        match self {
            RbfKernel::ThinPlateSpline => {
                if r > 0.0 {
                    r * r * r.ln()
                } else {
                    0.0
                }
            }
            RbfKernel::Multiquadric => (1.0 + er2).sqrt(),
            RbfKernel::InverseQuadric => 1.0 / (1.0 + er2),
            RbfKernel::InverseMultiquadric => 1.0 / (1.0 + er2).sqrt(),
            RbfKernel::Gaussian => (-er2).exp(),
        }
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(u, v)| (u - v) * (u - v))
        .sum::<f64>()
        .sqrt()
}

/// Interpolant `f(x) = Σ_j w_j φ(‖x − x_j‖)` through every stored sample.
///
/// A normalized model divides by `Σ_j φ(‖x − x_j‖)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RadialBasisFunction {
    samples: SampleTable,
    normalized: bool,
    precondition: bool,
    dim_x: usize,
    num_samples: usize,
    kernel: RbfKernel,
    weights: Array2<f64>,
}

impl RadialBasisFunction {
    /// Solves the interpolation system. With `precondition`, each equation is
    /// scaled by its largest kernel entry before the LU solve.
    pub fn fit(
        samples: &SampleTable,
        kernel: RbfKernel,
        normalized: bool,
        precondition: bool,
    ) -> Result<Self, RbfError> {
        if samples.is_empty() {
            return Err(RbfError::InsufficientData);
        }
        let n = samples.num_samples();
        let points: Vec<&[f64]> = samples.iter().map(|s| s.x()).collect();

        let mut lhs = Array2::from_shape_fn((n, n), |(i, j)| {
            kernel.eval(distance(points[i], points[j]))
        });
        let mut rhs = Array2::from_shape_fn((n, samples.dim_y()), |(i, k)| {
            samples.samples()[i].y()[k]
        });

        if normalized {
            for mut row in lhs.rows_mut() {
                let total: f64 = row.sum();
                if total != 0.0 {
                    row /= total;
                }
            }
        }
        if precondition {
            for i in 0..n {
                let scale = lhs.row(i).iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
                if scale > 0.0 {
                    lhs.row_mut(i).mapv_inplace(|v| v / scale);
                    rhs.row_mut(i).mapv_inplace(|v| v / scale);
                }
            }
        }

        log::debug!("Fitting {kernel:?} RBF through {n} samples (normalized={normalized})");
        let weights = solve_general(&lhs, &rhs).map_err(|source| {
            log::warn!("RBF interpolation system could not be solved: {source}");
            RbfError::SingularSystem { size: n, source }
        })?;

        Ok(Self {
            samples: samples.clone(),
            normalized,
            precondition,
            dim_x: samples.dim_x(),
            num_samples: n,
            kernel,
            weights,
        })
    }

    pub fn kernel(&self) -> RbfKernel {
        self.kernel
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn is_preconditioned(&self) -> bool {
        self.precondition
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.weights.ncols()
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn samples(&self) -> &SampleTable {
        &self.samples
    }

    /// Weights `[num_samples × dim_y]`.
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn eval(&self, x: &[f64]) -> Result<Array1<f64>, RbfError> {
        if x.len() != self.dim_x {
            return Err(RbfError::DimensionMismatch(format!(
                "point has {} coordinates but the model has dim_x = {}",
                x.len(),
                self.dim_x
            )));
        }
        let mut out = Array1::<f64>::zeros(self.dim_y());
        let mut total = 0.0;
        for (sample, w) in self.samples.iter().zip(self.weights.rows()) {
            let phi = self.kernel.eval(distance(x, sample.x()));
            total += phi;
            out.scaled_add(phi, &w);
        }
        if self.normalized && total != 0.0 {
            out /= total;
        }
        Ok(out)
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

impl Encode for RbfKernel {
    fn encode(&self, out: &mut Serializer) {
        out.write_u32(self.tag());
    }
}

impl Decode for RbfKernel {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        Ok(RbfKernel::from_tag(input.read_u32()?))
    }
}

impl Encode for RadialBasisFunction {
    fn encode(&self, out: &mut Serializer) {
        self.samples.encode(out);
        self.normalized.encode(out);
        self.precondition.encode(out);
        self.dim_x.encode(out);
        self.num_samples.encode(out);
        self.kernel.encode(out);
        self.weights.encode(out);
    }
}

impl Decode for RadialBasisFunction {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let offset = input.position();
        let samples = SampleTable::decode(input)?;
        let normalized = bool::decode(input)?;
        let precondition = bool::decode(input)?;
        let dim_x = usize::decode(input)?;
        let num_samples = usize::decode(input)?;
        let kernel = RbfKernel::decode(input)?;
        let weights = Array2::<f64>::decode(input)?;

        if samples.dim_x() != dim_x
            || samples.num_samples() != num_samples
            || weights.dim() != (num_samples, samples.dim_y())
        {
            return Err(CodecError::CorruptStream {
                offset,
                reason: format!(
                    "RBF over {num_samples} samples of dimension {dim_x} does not match its table \
                     ({} samples, dim_x = {}) or weights {:?}",
                    samples.num_samples(),
                    samples.dim_x(),
                    weights.dim()
                ),
            });
        }
        Ok(Self {
            samples,
            normalized,
            precondition,
            dim_x,
            num_samples,
            kernel,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn scattered_table() -> SampleTable {
        let mut table = SampleTable::new();
        let points = [
            (0.0, 0.0),
            (1.0, 0.2),
            (0.3, 1.1),
            (1.4, 1.3),
            (0.7, 0.6),
            (2.0, 0.4),
        ];
        for &(a, b) in &points {
            table
                .add_sample(vec![a, b], vec![(a - b).sin() + a * b, a + 2.0 * b])
                .unwrap();
        }
        table
    }

    #[test]
    fn kernel_values() {
        assert_eq!(RbfKernel::ThinPlateSpline.eval(0.0), 0.0);
        assert_abs_diff_eq!(RbfKernel::ThinPlateSpline.eval(2.0), 4.0 * 2f64.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(RbfKernel::Multiquadric.eval(2.0), 5f64.sqrt(), epsilon = 1e-15);
        assert_abs_diff_eq!(RbfKernel::InverseQuadric.eval(2.0), 0.2, epsilon = 1e-15);
        assert_abs_diff_eq!(
            RbfKernel::InverseMultiquadric.eval(2.0),
            1.0 / 5f64.sqrt(),
            epsilon = 1e-15
        );
        assert_abs_diff_eq!(RbfKernel::Gaussian.eval(2.0), (-4f64).exp(), epsilon = 1e-15);
    }

    #[test]
    fn kernel_tags_are_stable_and_unknown_tags_fall_back() {
        for kernel in [
            RbfKernel::ThinPlateSpline,
            RbfKernel::Multiquadric,
            RbfKernel::InverseQuadric,
            RbfKernel::InverseMultiquadric,
            RbfKernel::Gaussian,
        ] {
            assert_eq!(RbfKernel::from_tag(kernel.tag()), kernel);
        }
        assert_eq!(RbfKernel::Gaussian.tag(), 4);
        assert_eq!(RbfKernel::from_tag(17), RbfKernel::ThinPlateSpline);
    }

    #[test]
    fn interpolates_every_sample() {
        let table = scattered_table();
        for kernel in [
            RbfKernel::Multiquadric,
            RbfKernel::InverseQuadric,
            RbfKernel::InverseMultiquadric,
            RbfKernel::Gaussian,
        ] {
            for (normalized, precondition) in [(false, false), (true, false), (false, true)] {
                let rbf = RadialBasisFunction::fit(&table, kernel, normalized, precondition)
                    .unwrap();
                for sample in &table {
                    let y = rbf.eval(sample.x()).unwrap();
                    for k in 0..2 {
                        assert_abs_diff_eq!(y[k], sample.y()[k], epsilon = 1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_empty_tables_and_bad_points() {
        assert!(matches!(
            RadialBasisFunction::fit(&SampleTable::new(), RbfKernel::Gaussian, false, false),
            Err(RbfError::InsufficientData)
        ));
        let rbf =
            RadialBasisFunction::fit(&scattered_table(), RbfKernel::Gaussian, false, false).unwrap();
        assert!(matches!(
            rbf.eval(&[0.5]),
            Err(RbfError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn duplicate_points_make_the_system_singular() {
        let mut table = SampleTable::with_flags(true, true);
        table.add_scalar(0.0, 1.0).unwrap();
        table.add_scalar(1.0, 2.0).unwrap();
        table.add_scalar(1.0, 3.0).unwrap();
        assert!(matches!(
            RadialBasisFunction::fit(&table, RbfKernel::Gaussian, false, false),
            Err(RbfError::SingularSystem { size: 3, .. })
        ));
    }

    #[test]
    fn codec_round_trip_and_unknown_tag() {
        let rbf = RadialBasisFunction::fit(&scattered_table(), RbfKernel::InverseQuadric, true, false)
            .unwrap();
        let bytes = rbf.to_bytes();
        let decoded = RadialBasisFunction::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, rbf);

        let mut out = Serializer::new();
        rbf.samples().encode(&mut out);
        out.write_bool(false);
        out.write_bool(false);
        rbf.dim_x().encode(&mut out);
        rbf.num_samples().encode(&mut out);
        out.write_u32(42);
        rbf.weights().encode(&mut out);
        let decoded = RadialBasisFunction::from_bytes(&out.into_bytes()).unwrap();
        assert_eq!(decoded.kernel(), RbfKernel::ThinPlateSpline);
        assert_eq!(decoded.weights(), rbf.weights());
    }
}
