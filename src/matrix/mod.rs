use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectionError};

/// Which axis of the design matrix is being reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SelectionAxis {
    /// Pick rows (samples); the Gram matrix is `X·Xᵀ`.
    #[default]
    Samples,
    /// Pick columns (features); the Gram matrix is `Xᵀ·X`.
    Features,
}

impl SelectionAxis {
    pub fn ndarray_axis(&self) -> Axis {
        match self {
            SelectionAxis::Samples => Axis(0),
            SelectionAxis::Features => Axis(1),
        }
    }
}

/// Read-only wrapper around the design matrix.
///
/// All accessors borrow from the caller's array; nothing is copied unless an
/// owned result is returned (Gram products, slices for `transform`).
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a> {
    data: ArrayView2<'a, f64>,
    axis: SelectionAxis,
}

impl<'a> MatrixView<'a> {
    /// Wraps `data`, rejecting empty matrices and non-finite entries.
    pub fn new(data: ArrayView2<'a, f64>, axis: SelectionAxis) -> Result<Self> {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(SelectionError::Dimension(format!(
                "design matrix must be non-empty, got {} x {}",
                rows, cols
            )));
        }
        ensure_finite(data, "design matrix")?;
        Ok(MatrixView { data, axis })
    }

    pub fn data(&self) -> ArrayView2<'a, f64> {
        self.data
    }

    pub fn axis(&self) -> SelectionAxis {
        self.axis
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Number of candidates along the selection axis.
    pub fn axis_len(&self) -> usize {
        self.data.len_of(self.axis.ndarray_axis())
    }

    /// The `index`-th candidate: a row for samples, a column for features.
    pub fn candidate(&self, index: usize) -> ArrayView1<'a, f64> {
        self.data.index_axis_move(self.axis.ndarray_axis(), index)
    }

    pub fn dot(&self, i: usize, j: usize) -> f64 {
        self.candidate(i).dot(&self.candidate(j))
    }

    /// Euclidean norms of every candidate.
    pub fn norms(&self) -> Array1<f64> {
        let lanes: Vec<ArrayView1<f64>> = self
            .data
            .axis_iter(self.axis.ndarray_axis())
            .collect();
        let norms: Vec<f64> = lanes
            .par_iter()
            .map(|lane| lane.dot(lane).sqrt())
            .collect();
        Array1::from(norms)
    }

    /// Pairwise inner products along the selection axis.
    pub fn gram(&self) -> Array2<f64> {
        match self.axis {
            SelectionAxis::Samples => self.data.dot(&self.data.t()),
            SelectionAxis::Features => self.data.t().dot(&self.data),
        }
    }

    /// Copies the candidates at `indices` (in that order) out of the matrix.
    pub fn take(&self, indices: &[usize]) -> Array2<f64> {
        self.data.select(self.axis.ndarray_axis(), indices)
    }
}

pub(crate) fn ensure_finite(data: ArrayView2<f64>, what: &str) -> Result<()> {
    if let Some(((r, c), v)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(SelectionError::Dimension(format!(
            "{} has a non-finite entry {} at ({}, {})",
            what, v, r, c
        )));
    }
    Ok(())
}

/// Forces exact symmetry by averaging mirrored entries.
pub(crate) fn symmetrize(g: &mut Array2<f64>) {
    let n = g.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (g[[i, j]] + g[[j, i]]);
            g[[i, j]] = avg;
            g[[j, i]] = avg;
        }
    }
}
