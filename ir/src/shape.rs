//! Static shapes and physical layouts.
//!
//! Shapes are logical dimension sizes. A [`Layout`] fixes the physical order of
//! those dimensions in memory, listed minor-to-major: `minor_to_major[0]` is the
//! contiguous dimension.

use smallvec::{SmallVec, smallvec};
use snafu::ensure;

use crate::{Result, error::*};

/// Logical dimension sizes.
///
/// Inline capacity of 4 covers the ranks seen in reduction fusions without
/// heap allocation.
pub type Shape = SmallVec<[usize; 4]>;

/// Number of elements in a shape (1 for scalars).
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Validate that all dimensions are non-zero.
///
/// # Examples
/// ```rust
/// # use strider_ir::shape::validate_shape;
/// assert!(validate_shape(&[1, 2, 3]).is_ok());
/// assert!(validate_shape(&[4, 0]).is_err());
/// ```
pub fn validate_shape(shape: &[usize]) -> Result<()> {
    ensure!(shape.iter().all(|&s| s > 0), ZeroSizedDimensionSnafu { shape: Shape::from_slice(shape) });
    Ok(())
}

/// Row-major strides of `shape` (last dimension has stride 1).
pub fn strides(shape: &[usize]) -> Shape {
    let mut strides: Shape = smallvec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Row-major multi-index of `linear` within `shape`.
pub fn delinearize(linear: usize, shape: &[usize]) -> Shape {
    strides(shape).iter().zip(shape).map(|(stride, size)| (linear / stride) % size).collect()
}

/// Row-major linear index of `index` within `shape`.
pub fn linearize(index: &[usize], shape: &[usize]) -> usize {
    index.iter().zip(strides(shape)).map(|(i, stride)| i * stride).sum()
}

/// Physical dimension order of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    minor_to_major: SmallVec<[usize; 4]>,
}

impl Layout {
    /// Layout from an explicit minor-to-major order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] if the order is not a permutation of `0..rank`.
    pub fn new(minor_to_major: impl Into<SmallVec<[usize; 4]>>) -> Result<Self> {
        let minor_to_major = minor_to_major.into();
        let rank = minor_to_major.len();
        let mut seen: SmallVec<[bool; 4]> = smallvec![false; rank];
        for &dim in &minor_to_major {
            ensure!(dim < rank && !seen[dim], InvalidLayoutSnafu { minor_to_major: minor_to_major.clone(), rank });
            seen[dim] = true;
        }
        Ok(Self { minor_to_major })
    }

    /// Default layout: the last logical dimension is minor-most.
    pub fn row_major(rank: usize) -> Self {
        Self { minor_to_major: (0..rank).rev().collect() }
    }

    pub fn rank(&self) -> usize {
        self.minor_to_major.len()
    }

    pub fn minor_to_major(&self) -> &[usize] {
        &self.minor_to_major
    }

    /// Logical dimensions ordered from major-most to minor-most.
    pub fn major_to_minor(&self) -> SmallVec<[usize; 4]> {
        self.minor_to_major.iter().rev().copied().collect()
    }

    /// The contiguous logical dimension, if the tensor is not a scalar.
    pub fn minor_most(&self) -> Option<usize> {
        self.minor_to_major.first().copied()
    }

    /// Dimension sizes in physical (major-to-minor) order.
    pub fn physical_shape(&self, shape: &[usize]) -> Shape {
        self.major_to_minor().iter().map(|&dim| shape[dim]).collect()
    }
}
