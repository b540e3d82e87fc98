//! Conditional probability tables.
//!
//! A CPT for a variable with parents `p_0 .. p_{n-1}` is a dense table over
//! `[|p_0|, .., |p_{n-1}|, |own|]`, stored flat in row-major order. Because the
//! own-state axis is last (stride 1), the distribution for one parent
//! configuration is the contiguous row `table[k * own .. (k + 1) * own]`, where
//! `k` is the row-major number of that configuration. Normalization, validity
//! checks and configuration decoding all use this one convention.

use crate::error::{NetworkError, Result};
use crate::odometer::{self, StateOdometer};

/// Per-configuration sums at or below this are treated as "no distribution".
pub const NORMALIZATION_EPSILON: f64 = 1e-10;

/// Default tolerance of [`ConditionalProbabilityTable::is_valid`].
pub const VALIDITY_TOLERANCE: f64 = 1e-6;

/// Dense P(own state | parent configuration) store.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalProbabilityTable {
    dimensions: Vec<usize>,
    strides: Vec<usize>,
    table: Vec<f64>,
}

impl ConditionalProbabilityTable {
    /// Allocate a zero-filled table. The last dimension is the variable's own
    /// state count; a parentless variable has exactly one dimension.
    pub fn new(dimensions: Vec<usize>) -> Result<Self> {
        let size = table_size(&dimensions)?;
        let strides = row_major_strides(&dimensions);
        Ok(Self {
            dimensions,
            strides,
            table: vec![0.0; size],
        })
    }

    /// Build a table from a flat row-major value list. The shape is checked
    /// against `values` before anything is allocated.
    pub fn from_table(dimensions: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let size = table_size(&dimensions)?;
        if values.len() != size {
            return Err(NetworkError::IndexError(format!(
                "table of shape {dimensions:?} needs {size} values, got {}",
                values.len()
            )));
        }
        for &value in &values {
            check_probability(value)?;
        }
        let strides = row_major_strides(&dimensions);
        Ok(Self {
            dimensions,
            strides,
            table: values,
        })
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Total number of stored entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Flat row-major view of every entry.
    pub fn values(&self) -> &[f64] {
        &self.table
    }

    /// Size of the own-state axis.
    pub fn num_states(&self) -> usize {
        self.dimensions[self.dimensions.len() - 1]
    }

    fn parent_dimensions(&self) -> &[usize] {
        &self.dimensions[..self.dimensions.len() - 1]
    }

    /// Number of parent configurations (1 for a parentless table).
    pub fn num_configurations(&self) -> usize {
        self.parent_dimensions().iter().product()
    }

    pub fn set_probability(
        &mut self,
        parent_states: &[usize],
        own_state: usize,
        value: f64,
    ) -> Result<()> {
        check_probability(value)?;
        let idx = self.flat_index(parent_states, own_state)?;
        self.table[idx] = value;
        Ok(())
    }

    pub fn get_probability(&self, parent_states: &[usize], own_state: usize) -> Result<f64> {
        let idx = self.flat_index(parent_states, own_state)?;
        Ok(self.table[idx])
    }

    /// Overwrite the whole own-state distribution for one parent configuration.
    pub fn set_distribution(&mut self, parent_states: &[usize], values: &[f64]) -> Result<()> {
        if values.len() != self.num_states() {
            return Err(NetworkError::IndexError(format!(
                "distribution needs {} values, got {}",
                self.num_states(),
                values.len()
            )));
        }
        for &value in values {
            check_probability(value)?;
        }
        let start = self.flat_index(parent_states, 0)?;
        self.table[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    /// The own-state distribution for one parent configuration.
    pub fn distribution(&self, parent_states: &[usize]) -> Result<&[f64]> {
        let start = self.flat_index(parent_states, 0)?;
        Ok(&self.table[start..start + self.num_states()])
    }

    /// Rescale every parent configuration to sum to 1. Configurations whose
    /// sum is at most [`NORMALIZATION_EPSILON`] are left as they are.
    pub fn normalize(&mut self) {
        let own = self.num_states();
        for row in self.table.chunks_mut(own) {
            normalize_in_place(row);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_with_tolerance(VALIDITY_TOLERANCE)
    }

    pub fn is_valid_with_tolerance(&self, tolerance: f64) -> bool {
        self.table
            .chunks(self.num_states())
            .all(|row| (row.iter().sum::<f64>() - 1.0).abs() <= tolerance)
    }

    /// Parent multi-index of configuration number `config` (row-major, last
    /// parent least significant, consistent with the stride encoding).
    pub fn decode_configuration(&self, config: usize) -> Result<Vec<usize>> {
        if config >= self.num_configurations() {
            return Err(NetworkError::IndexError(format!(
                "configuration {config} out of range for {} configurations",
                self.num_configurations()
            )));
        }
        Ok(odometer::decode(config, self.parent_dimensions()))
    }

    /// Iterate `(parent multi-index, own-state row)` in configuration order.
    pub fn configurations<'a>(&'a self) -> impl Iterator<Item = (Vec<usize>, &'a [f64])> + 'a {
        StateOdometer::new(self.parent_dimensions().to_vec())
            .zip(self.table.chunks(self.num_states()))
    }

    fn flat_index(&self, parent_states: &[usize], own_state: usize) -> Result<usize> {
        if parent_states.len() + 1 != self.dimensions.len() {
            return Err(NetworkError::IndexError(format!(
                "expected {} parent indices, got {}",
                self.dimensions.len() - 1,
                parent_states.len()
            )));
        }
        let indices = parent_states.iter().chain(std::iter::once(&own_state));
        let mut flat = 0;
        for (axis, (&index, (&bound, &stride))) in indices
            .zip(self.dimensions.iter().zip(&self.strides))
            .enumerate()
        {
            if index >= bound {
                return Err(NetworkError::IndexError(format!(
                    "index {index} out of bounds for axis {axis} of size {bound}"
                )));
            }
            flat += index * stride;
        }
        Ok(flat)
    }
}

/// Scale `values` to sum to 1. Returns false, leaving them untouched, when
/// the sum is at most [`NORMALIZATION_EPSILON`].
pub(crate) fn normalize_in_place(values: &mut [f64]) -> bool {
    let sum: f64 = values.iter().sum();
    if sum <= NORMALIZATION_EPSILON {
        return false;
    }
    for value in values.iter_mut() {
        *value /= sum;
    }
    true
}

fn check_probability(value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(NetworkError::OutOfRange { value })
    }
}

/// Number of entries of a table of shape `dimensions`. Empty shapes, zero
/// axes and sizes that overflow `usize` are rejected.
pub(crate) fn table_size(dimensions: &[usize]) -> Result<usize> {
    if dimensions.is_empty() || dimensions.contains(&0) {
        return Err(NetworkError::InvalidShape {
            dimensions: dimensions.to_vec(),
        });
    }
    dimensions
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| NetworkError::InvalidShape {
            dimensions: dimensions.to_vec(),
        })
}

fn row_major_strides(dimensions: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dimensions.len()];
    for i in (0..dimensions.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dimensions[i + 1];
    }
    strides
}
