#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod bspline;
pub mod fit;
pub mod linalg;
pub mod polynomial;
pub mod rbf;
pub mod serialize;
pub mod table;

pub use basis::{
    Basis1D, BasisError, KnotSpacing, TensorBasis, build_knot_vector, build_knot_vectors,
    create_difference_penalty_matrix, tensor_difference_penalty,
};
pub use bspline::BSpline;
pub use fit::{
    BSplineBuilder, FitError, Smoothing, bspline_interpolator, bspline_smoother,
    pspline_smoother,
};
pub use polynomial::{PolynomialError, PolynomialRegression};
pub use rbf::{RadialBasisFunction, RbfError, RbfKernel};
pub use serialize::{CodecError, Decode, Deserializer, Encode, Serializer};
pub use table::{Sample, SampleTable, TableError};
