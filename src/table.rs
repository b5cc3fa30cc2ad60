//! Ordered sample storage consumed by the fitting routines.
//!
//! A [`SampleTable`] keeps its samples sorted lexicographically by `x` and
//! records, per input dimension, the distinct coordinates observed so far
//! (the sampling "grid").

use crate::serialize::{self, CodecError, Decode, Deserializer, Encode, Serializer};
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(
        "Sampling grid is incomplete: {observed} distinct samples cover a grid requiring {required}."
    )]
    IncompleteGrid { observed: usize, required: usize },

    #[error("Tables cannot be combined: {0}")]
    IncompatibleTables(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A single observation `(x, y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Sample {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    fn cmp_x(&self, other: &[f64]) -> Ordering {
        compare_points(&self.x, other)
    }
}

fn compare_points(a: &[f64], b: &[f64]) -> Ordering {
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        match lhs.total_cmp(rhs) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

#[derive(Clone, Debug, PartialEq)]
pub struct SampleTable {
    allow_duplicates: bool,
    allow_incomplete_grid: bool,
    num_duplicates: usize,
    dim_x: usize,
    dim_y: usize,
    samples: Vec<Sample>,
    grid: Vec<Vec<f64>>,
}

impl Default for SampleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleTable {
    /// Empty table rejecting duplicate `x` and allowing incomplete grids.
    pub fn new() -> Self {
        Self::with_flags(false, true)
    }

    pub fn with_flags(allow_duplicates: bool, allow_incomplete_grid: bool) -> Self {
        Self {
            allow_duplicates,
            allow_incomplete_grid,
            num_duplicates: 0,
            dim_x: 0,
            dim_y: 0,
            samples: Vec::new(),
            grid: Vec::new(),
        }
    }

    /// Inserts a sample, keeping lexicographic order on `x`.
    ///
    /// Returns `Ok(false)` when the sample duplicates an existing `x` and the
    /// table does not allow duplicates; the sample is discarded in that case.
    /// A coordinate of `-0.0` is stored as `0.0`.
    pub fn add_sample(&mut self, x: Vec<f64>, y: Vec<f64>) -> Result<bool, TableError> {
        if self.samples.is_empty() {
            if x.is_empty() || y.is_empty() {
                return Err(TableError::DimensionMismatch(
                    "samples need at least one input and one output".to_string(),
                ));
            }
            self.dim_x = x.len();
            self.dim_y = y.len();
            self.grid = vec![Vec::new(); self.dim_x];
        } else if x.len() != self.dim_x || y.len() != self.dim_y {
            return Err(TableError::DimensionMismatch(format!(
                "expected sample of shape ({}, {}), got ({}, {})",
                self.dim_x,
                self.dim_y,
                x.len(),
                y.len()
            )));
        }

        // Signed zeros would otherwise order as distinct coordinates.
        let x: Vec<f64> = x
            .into_iter()
            .map(|v| if v == 0.0 { 0.0 } else { v })
            .collect();
        let lower = self
            .samples
            .partition_point(|s| s.cmp_x(&x) == Ordering::Less);
        let upper = self
            .samples
            .partition_point(|s| s.cmp_x(&x) != Ordering::Greater);
        if upper > lower {
            if !self.allow_duplicates {
                log::warn!("Discarding duplicate sample at x = {:?}", x);
                return Ok(false);
            }
            self.num_duplicates += 1;
        }

        for (dim, &value) in x.iter().enumerate() {
            let values = &mut self.grid[dim];
            if let Err(pos) = values.binary_search_by(|v| v.total_cmp(&value)) {
                values.insert(pos, value);
            }
        }
        self.samples.insert(upper, Sample::new(x, y));
        Ok(true)
    }

    /// Shorthand for one-dimensional input and output.
    pub fn add_scalar(&mut self, x: f64, y: f64) -> Result<bool, TableError> {
        self.add_sample(vec![x], vec![y])
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn num_duplicates(&self) -> usize {
        self.num_duplicates
    }

    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    pub fn allows_incomplete_grid(&self) -> bool {
        self.allow_incomplete_grid
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in ascending lexicographic order of `x`.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Sorted distinct values observed in each input dimension.
    pub fn grid(&self) -> &[Vec<f64>] {
        &self.grid
    }

    fn num_samples_required(&self) -> usize {
        self.grid
            .iter()
            .map(Vec::len)
            .try_fold(1usize, |acc, n| acc.checked_mul(n))
            .unwrap_or(usize::MAX)
    }

    /// True when every combination of grid values has at least one sample.
    pub fn is_grid_complete(&self) -> bool {
        !self.samples.is_empty()
            && self.samples.len() - self.num_duplicates == self.num_samples_required()
    }

    /// Fails with [`TableError::IncompleteGrid`] unless the grid is complete or
    /// the table was created with `allow_incomplete_grid`.
    pub fn require_complete_grid(&self) -> Result<(), TableError> {
        if self.allow_incomplete_grid || self.is_grid_complete() {
            return Ok(());
        }
        Err(TableError::IncompleteGrid {
            observed: self.samples.len() - self.num_duplicates,
            required: self.num_samples_required(),
        })
    }

    /// Input coordinates by dimension: `table_x()[dim][sample]`.
    pub fn table_x(&self) -> Result<Vec<Vec<f64>>, TableError> {
        self.require_complete_grid()?;
        Ok((0..self.dim_x)
            .map(|dim| self.samples.iter().map(|s| s.x[dim]).collect())
            .collect())
    }

    /// Output values by dimension: `table_y()[dim][sample]`.
    pub fn table_y(&self) -> Result<Vec<Vec<f64>>, TableError> {
        self.require_complete_grid()?;
        Ok((0..self.dim_y)
            .map(|dim| self.samples.iter().map(|s| s.y[dim]).collect())
            .collect())
    }

    fn check_compatible(&self, other: &SampleTable) -> Result<(), TableError> {
        if self.allow_duplicates != other.allow_duplicates
            || self.allow_incomplete_grid != other.allow_incomplete_grid
        {
            return Err(TableError::IncompatibleTables(
                "tables were created with different flags".to_string(),
            ));
        }
        if !self.is_empty()
            && !other.is_empty()
            && (self.dim_x != other.dim_x || self.dim_y != other.dim_y)
        {
            return Err(TableError::IncompatibleTables(format!(
                "shapes ({}, {}) and ({}, {}) differ",
                self.dim_x, self.dim_y, other.dim_x, other.dim_y
            )));
        }
        Ok(())
    }

    /// All samples of `self` followed by all samples of `other`.
    pub fn union(&self, other: &SampleTable) -> Result<SampleTable, TableError> {
        self.check_compatible(other)?;
        let mut out = self.clone();
        for sample in &other.samples {
            out.add_sample(sample.x.clone(), sample.y.clone())?;
        }
        Ok(out)
    }

    /// Samples of `self` that have no exactly equal counterpart in `other`.
    pub fn difference(&self, other: &SampleTable) -> Result<SampleTable, TableError> {
        self.check_compatible(other)?;
        let mut out = SampleTable::with_flags(self.allow_duplicates, self.allow_incomplete_grid);
        for sample in &self.samples {
            if !other.samples.contains(sample) {
                out.add_sample(sample.x.clone(), sample.y.clone())?;
            }
        }
        Ok(out)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        serialize::save_to_file(self, path.as_ref())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Ok(serialize::load_from_file(path.as_ref())?)
    }
}

impl<'a> IntoIterator for &'a SampleTable {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl Encode for Sample {
    fn encode(&self, out: &mut Serializer) {
        self.x.encode(out);
        self.y.encode(out);
    }
}

impl Decode for Sample {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let x = Vec::<f64>::decode(input)?;
        let y = Vec::<f64>::decode(input)?;
        Ok(Self { x, y })
    }
}

impl Encode for SampleTable {
    fn encode(&self, out: &mut Serializer) {
        self.allow_duplicates.encode(out);
        self.allow_incomplete_grid.encode(out);
        self.num_duplicates.encode(out);
        self.dim_x.encode(out);
        self.dim_y.encode(out);
        self.samples.encode(out);
        self.grid.encode(out);
    }
}

impl Decode for SampleTable {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let offset = input.position();
        let table = Self {
            allow_duplicates: bool::decode(input)?,
            allow_incomplete_grid: bool::decode(input)?,
            num_duplicates: usize::decode(input)?,
            dim_x: usize::decode(input)?,
            dim_y: usize::decode(input)?,
            samples: Vec::<Sample>::decode(input)?,
            grid: Vec::<Vec<f64>>::decode(input)?,
        };

        let expected_grid = if table.samples.is_empty() { 0 } else { table.dim_x };
        let consistent = table.grid.len() == expected_grid
            && table.num_duplicates <= table.samples.len()
            && table
                .samples
                .iter()
                .all(|s| s.x.len() == table.dim_x && s.y.len() == table.dim_y);
        if !consistent {
            return Err(CodecError::CorruptStream {
                offset,
                reason: format!(
                    "sample table of shape ({}, {}) holds inconsistent samples or grid",
                    table.dim_x, table.dim_y
                ),
            });
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_grid(nx: usize, ny: usize) -> SampleTable {
        let mut table = SampleTable::with_flags(false, false);
        for i in 0..nx {
            for j in 0..ny {
                let x = vec![i as f64, j as f64];
                table
                    .add_sample(x, vec![(i + j) as f64])
                    .expect("consistent sample shape");
            }
        }
        table
    }

    #[test]
    fn samples_are_sorted_lexicographically() {
        let mut table = SampleTable::new();
        table.add_sample(vec![1.0, 0.0], vec![1.0]).unwrap();
        table.add_sample(vec![0.0, 5.0], vec![2.0]).unwrap();
        table.add_sample(vec![0.0, 1.0], vec![3.0]).unwrap();
        let xs: Vec<&[f64]> = table.iter().map(Sample::x).collect();
        assert_eq!(xs, vec![&[0.0, 1.0][..], &[0.0, 5.0][..], &[1.0, 0.0][..]]);
        assert_eq!(table.grid()[0], vec![0.0, 1.0]);
        assert_eq!(table.grid()[1], vec![0.0, 1.0, 5.0]);
    }

    #[test]
    fn duplicates_are_discarded_unless_allowed() {
        let mut strict = SampleTable::new();
        assert!(strict.add_scalar(1.0, 1.0).unwrap());
        assert!(!strict.add_scalar(1.0, 2.0).unwrap());
        assert_eq!(strict.num_samples(), 1);
        assert_eq!(strict.num_duplicates(), 0);

        let mut lenient = SampleTable::with_flags(true, true);
        lenient.add_scalar(1.0, 1.0).unwrap();
        lenient.add_scalar(1.0, 2.0).unwrap();
        assert_eq!(lenient.num_samples(), 2);
        assert_eq!(lenient.num_duplicates(), 1);
        // Insertion order is kept among equal x.
        assert_eq!(lenient.samples()[0].y(), &[1.0]);
        assert_eq!(lenient.samples()[1].y(), &[2.0]);
        assert!(lenient.is_grid_complete());
    }

    #[test]
    fn negative_zero_is_the_same_coordinate_as_zero() {
        let mut strict = SampleTable::new();
        assert!(strict.add_sample(vec![-0.0, 1.0], vec![1.0]).unwrap());
        assert!(!strict.add_sample(vec![0.0, 1.0], vec![2.0]).unwrap());
        assert_eq!(strict.num_samples(), 1);
        assert_eq!(strict.grid()[0].len(), 1);
        assert!(strict.grid()[0][0].is_sign_positive());
        assert!(strict.samples()[0].x()[0].is_sign_positive());

        let mut lenient = SampleTable::with_flags(true, false);
        lenient.add_sample(vec![0.0, 0.0], vec![1.0]).unwrap();
        lenient.add_sample(vec![-0.0, -0.0], vec![2.0]).unwrap();
        assert_eq!(lenient.num_duplicates(), 1);
        assert_eq!(lenient.grid(), &[vec![0.0], vec![0.0]][..]);
        assert!(lenient.is_grid_complete());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut table = SampleTable::new();
        table.add_sample(vec![0.0, 1.0], vec![1.0]).unwrap();
        assert!(matches!(
            table.add_sample(vec![0.0], vec![1.0]),
            Err(TableError::DimensionMismatch(_))
        ));
        assert!(matches!(
            table.add_sample(vec![0.0, 2.0], vec![1.0, 2.0]),
            Err(TableError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn grid_completeness_is_reported_instead_of_aborting() {
        let mut table = full_grid(3, 2);
        assert!(table.is_grid_complete());
        assert!(table.table_x().is_ok());

        table.add_sample(vec![10.0, 10.0], vec![0.0]).unwrap();
        assert!(!table.is_grid_complete());
        match table.table_x() {
            Err(TableError::IncompleteGrid { observed, required }) => {
                assert_eq!(observed, 7);
                assert_eq!(required, 12);
            }
            other => panic!("expected IncompleteGrid, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_grid_is_tolerated_when_allowed() {
        let mut table = SampleTable::with_flags(false, true);
        table.add_sample(vec![0.0, 0.0], vec![0.0]).unwrap();
        table.add_sample(vec![1.0, 1.0], vec![0.0]).unwrap();
        assert!(!table.is_grid_complete());
        let xs = table.table_x().expect("incomplete grid allowed");
        assert_eq!(xs, vec![vec![0.0, 1.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn union_and_difference() {
        let mut a = SampleTable::new();
        a.add_scalar(0.0, 0.0).unwrap();
        a.add_scalar(1.0, 1.0).unwrap();
        let mut b = SampleTable::new();
        b.add_scalar(2.0, 4.0).unwrap();
        b.add_scalar(1.0, 1.0).unwrap();

        let merged = a.union(&b).unwrap();
        assert_eq!(merged.num_samples(), 3);

        let diff = merged.difference(&b).unwrap();
        assert_eq!(diff.num_samples(), 1);
        assert_eq!(diff.samples()[0].x(), &[0.0]);

        let mut other_shape = SampleTable::new();
        other_shape.add_sample(vec![0.0, 0.0], vec![0.0]).unwrap();
        assert!(matches!(
            a.union(&other_shape),
            Err(TableError::IncompatibleTables(_))
        ));
        let flagged = SampleTable::with_flags(true, true);
        assert!(a.union(&flagged).is_err());
    }

    #[test]
    fn table_round_trips_through_codec() {
        let mut table = SampleTable::with_flags(true, false);
        table.add_sample(vec![0.5, -1.0], vec![1.0, 2.0]).unwrap();
        table.add_sample(vec![0.5, -1.0], vec![3.0, 4.0]).unwrap();
        table.add_sample(vec![-0.0, 1e300], vec![f64::MIN_POSITIVE, 0.0]).unwrap();
        let bytes = serialize::to_bytes(&table);
        let decoded: SampleTable = serialize::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, table);

        let empty = SampleTable::new();
        let decoded: SampleTable = serialize::from_bytes(&serialize::to_bytes(&empty)).unwrap();
        assert_eq!(decoded, empty);
    }
}
