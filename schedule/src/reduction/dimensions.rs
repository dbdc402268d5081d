use std::fmt;

/// Collapsed physical shape of a reduction.
///
/// Row reductions are stored as `[batch, kept, reduced]` where the batch is
/// the major reduced extent; column reductions as `[batch, reduced, kept]`
/// where the batch is the major kept extent. Index 2 is always minor-most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReductionDimensions {
    pub is_row_reduction: bool,
    pub dimensions: [usize; 3],
}

impl ReductionDimensions {
    pub const ROW_MAJOR_REDUCED: usize = 0;
    pub const ROW_KEPT: usize = 1;
    pub const ROW_MINOR_REDUCED: usize = 2;

    pub const COLUMN_MAJOR_KEPT: usize = 0;
    pub const COLUMN_REDUCED: usize = 1;
    pub const COLUMN_MINOR_KEPT: usize = 2;

    pub const fn row(batch: usize, kept: usize, reduced: usize) -> Self {
        Self { is_row_reduction: true, dimensions: [batch, kept, reduced] }
    }

    pub const fn column(batch: usize, reduced: usize, kept: usize) -> Self {
        Self { is_row_reduction: false, dimensions: [batch, reduced, kept] }
    }

    pub const fn batch_size(&self) -> usize {
        self.dimensions[0]
    }

    /// Minor reduced extent (row) or the reduced extent (column).
    pub const fn reduced_size(&self) -> usize {
        if self.is_row_reduction { self.dimensions[2] } else { self.dimensions[1] }
    }

    /// Kept extent of one batch entry.
    pub const fn kept_size(&self) -> usize {
        if self.is_row_reduction { self.dimensions[1] } else { self.dimensions[2] }
    }

    /// Contiguous extent.
    pub const fn minor_size(&self) -> usize {
        self.dimensions[2]
    }

    /// Number of reduced input elements.
    pub const fn input_elements(&self) -> usize {
        self.dimensions[0] * self.dimensions[1] * self.dimensions[2]
    }

    /// Number of results.
    pub const fn output_elements(&self) -> usize {
        if self.is_row_reduction { self.dimensions[1] } else { self.dimensions[0] * self.dimensions[2] }
    }

    /// Extents of the projected output: `[kept]` for rows, `[batch, kept]` for columns.
    pub fn output_shape(&self) -> Vec<usize> {
        if self.is_row_reduction { vec![self.kept_size()] } else { vec![self.batch_size(), self.kept_size()] }
    }
}

impl fmt::Display for ReductionDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.dimensions;
        if self.is_row_reduction {
            write!(f, "row(batch={a}, kept={b}, reduced={c})")
        } else {
            write!(f, "column(batch={a}, reduced={b}, kept={c})")
        }
    }
}
