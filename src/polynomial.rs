use crate::linalg::{FaerLinalgError, solve_spd};
use crate::serialize::{self, CodecError, Decode, Deserializer, Encode, Serializer};
use crate::table::SampleTable;
use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolynomialError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(
        "Polynomial with {coefficients} coefficients cannot be fitted to {samples} samples."
    )]
    InsufficientData { samples: usize, coefficients: usize },

    #[error("Polynomial normal equations of size {size} are singular")]
    SingularSystem {
        size: usize,
        #[source]
        source: FaerLinalgError,
    },
}

/// Least-squares polynomial whose monomials are all products of per-variable
/// powers `x_i^k`, `k <= degrees[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PolynomialRegression {
    num_variables: usize,
    num_coefficients: usize,
    degrees: Vec<usize>,
    coefficients: Array2<f64>,
}

fn count_coefficients(degrees: &[usize]) -> usize {
    degrees.iter().map(|d| d + 1).product()
}

/// Kronecker product of the power vectors `[1, x_i, …, x_i^d_i]`, first
/// variable slowest.
fn monomials(x: &[f64], degrees: &[usize]) -> Vec<f64> {
    let mut terms = vec![1.0];
    for (&xi, &degree) in x.iter().zip(degrees) {
        let mut powers = Vec::with_capacity(degree + 1);
        let mut p = 1.0;
        for _ in 0..=degree {
            powers.push(p);
            p *= xi;
        }
        terms = terms
            .iter()
            .flat_map(|&t| powers.iter().map(move |&q| t * q))
            .collect();
    }
    terms
}

impl PolynomialRegression {
    pub fn fit(table: &SampleTable, degrees: &[usize]) -> Result<Self, PolynomialError> {
        if table.dim_x() != degrees.len() {
            return Err(PolynomialError::DimensionMismatch(format!(
                "{} degrees given for a table with dim_x = {}",
                degrees.len(),
                table.dim_x()
            )));
        }
        let num_coefficients = count_coefficients(degrees);
        if table.num_samples() < num_coefficients {
            return Err(PolynomialError::InsufficientData {
                samples: table.num_samples(),
                coefficients: num_coefficients,
            });
        }

        let mut lhs = Array2::<f64>::zeros((num_coefficients, num_coefficients));
        let mut rhs = Array2::<f64>::zeros((num_coefficients, table.dim_y()));
        for sample in table {
            let row = monomials(sample.x(), degrees);
            for (a, &va) in row.iter().enumerate() {
                for (b, &vb) in row.iter().enumerate() {
                    lhs[[a, b]] += va * vb;
                }
                for (k, &y) in sample.y().iter().enumerate() {
                    rhs[[a, k]] += va * y;
                }
            }
        }

        let coefficients = solve_spd(&lhs, &rhs).map_err(|source| {
            log::warn!("Polynomial normal equations could not be solved: {source}");
            PolynomialError::SingularSystem {
                size: num_coefficients,
                source,
            }
        })?;

        Ok(Self {
            num_variables: degrees.len(),
            num_coefficients,
            degrees: degrees.to_vec(),
            coefficients,
        })
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Coefficients `[num_coefficients × dim_y]`.
    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn eval(&self, x: &[f64]) -> Result<Array1<f64>, PolynomialError> {
        if x.len() != self.num_variables {
            return Err(PolynomialError::DimensionMismatch(format!(
                "point has {} coordinates but the polynomial has {} variables",
                x.len(),
                self.num_variables
            )));
        }
        let terms = Array1::from(monomials(x, &self.degrees));
        Ok(self.coefficients.t().dot(&terms))
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

impl Encode for PolynomialRegression {
    fn encode(&self, out: &mut Serializer) {
        self.num_variables.encode(out);
        self.num_coefficients.encode(out);
        self.degrees.encode(out);
        self.coefficients.encode(out);
    }
}

impl Decode for PolynomialRegression {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let offset = input.position();
        let num_variables = usize::decode(input)?;
        let num_coefficients = usize::decode(input)?;
        let degrees = Vec::<usize>::decode(input)?;
        let coefficients = Array2::<f64>::decode(input)?;
        if degrees.len() != num_variables
            || count_coefficients(&degrees) != num_coefficients
            || coefficients.nrows() != num_coefficients
        {
            return Err(CodecError::CorruptStream {
                offset,
                reason: format!(
                    "polynomial header ({num_variables} variables, {num_coefficients} coefficients) \
                     disagrees with degrees {degrees:?} and coefficients {:?}",
                    coefficients.dim()
                ),
            });
        }
        Ok(Self {
            num_variables,
            num_coefficients,
            degrees,
            coefficients,
        })
    }
}
