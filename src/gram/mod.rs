//! # Gram tracking and deflation
//!
//! [`GramTracker`] owns the square similarity matrix of a selection run
//! (`X·Xᵀ` for samples, `Xᵀ·X` for features) together with the candidacy
//! mask of the selection axis. After an index is picked the tracker removes
//! the direction of that index from every remaining row and column,
//!
//! ```text
//! G ← G − G[:, i] ⊗ G[i, :] / G[i, i]
//! ```
//!
//! so later scores only see residual structure. The matrix stays symmetric
//! (it is re-symmetrized after every update) and positive semi-definite up to
//! the tracker's tolerance.

use log::warn;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

use crate::error::{Result, SelectionError};
use crate::matrix::{symmetrize, MatrixView, SelectionAxis};

/// Outcome of a [`GramTracker::deflate`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Deflation {
    /// The update was applied. `retired` lists the other candidates whose
    /// residual self-similarity fell below tolerance as a consequence.
    Applied { retired: Vec<usize> },
    /// `G[i, i]` was already below tolerance; the matrix was left untouched
    /// and the index was removed from candidacy.
    DegeneratePivot,
}

#[derive(Debug, Clone)]
pub struct GramTracker {
    gram: Array2<f64>,
    active: Vec<bool>,
    threshold: f64,
    scale: f64,
    deflations: usize,
}

impl GramTracker {
    /// Builds the Gram matrix of `x` along `axis`.
    ///
    /// `tolerance` is relative: the absolute threshold below which a diagonal
    /// entry counts as zero is `tolerance · max(diag(G))`.
    pub fn initialize(x: ArrayView2<f64>, axis: SelectionAxis, tolerance: f64) -> Result<Self> {
        let view = MatrixView::new(x, axis)?;
        Self::from_gram(view.gram(), tolerance)
    }

    /// Wraps an already computed square similarity matrix.
    pub fn from_gram(mut gram: Array2<f64>, tolerance: f64) -> Result<Self> {
        let (n, m) = gram.dim();
        if n == 0 || n != m {
            return Err(SelectionError::Dimension(format!(
                "gram matrix must be square and non-empty, got {} x {}",
                n, m
            )));
        }
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(SelectionError::InvalidParameter(format!(
                "tolerance must be a positive finite number, got {}",
                tolerance
            )));
        }
        crate::matrix::ensure_finite(gram.view(), "gram matrix")?;
        symmetrize(&mut gram);

        let scale = gram.diag().iter().fold(0.0_f64, |acc, &v| acc.max(v));
        let threshold = if scale > 0.0 { tolerance * scale } else { tolerance };

        Ok(GramTracker {
            active: vec![true; n],
            gram,
            threshold,
            scale,
            deflations: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.gram.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.gram.is_empty()
    }

    pub fn gram(&self) -> ArrayView2<'_, f64> {
        self.gram.view()
    }

    /// Absolute numerical tolerance for diagonal entries and pivots.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Level at or below which a diagonal entry or pivot counts as zero: the
    /// threshold, widened to the rounding error that `n` rank-one updates can
    /// accumulate on the largest initial diagonal entry.
    pub fn cutoff(&self) -> f64 {
        let rounding = 10.0 * self.len() as f64 * f64::EPSILON * self.scale;
        self.threshold.max(rounding)
    }

    pub fn deflations(&self) -> usize {
        self.deflations
    }

    pub fn diagonal(&self) -> Array1<f64> {
        self.gram.diag().to_owned()
    }

    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.gram.column(index)
    }

    pub fn entry(&self, i: usize, j: usize) -> f64 {
        self.gram[[i, j]]
    }

    pub fn trace(&self) -> f64 {
        self.gram.diag().sum()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    pub fn active_mask(&self) -> &[bool] {
        &self.active
    }

    pub fn n_active(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Removes `index` from candidacy without touching the matrix.
    pub fn retire(&mut self, index: usize) {
        if let Some(slot) = self.active.get_mut(index) {
            *slot = false;
        }
    }

    /// Divides the matrix by its trace so that differently scaled Gram
    /// matrices can be blended. Returns the trace that was divided out.
    pub fn normalize_trace(&mut self) -> f64 {
        let trace = self.trace();
        if trace > 0.0 {
            self.gram.mapv_inplace(|v| v / trace);
            self.threshold /= trace;
            self.scale /= trace;
        }
        trace
    }

    /// Projects the direction of `index` out of the matrix.
    ///
    /// A residual diagonal entry that would fall below `-cutoff()` is
    /// reported as [`SelectionError::IndefiniteGram`] and the matrix is left
    /// untouched.
    pub fn deflate(&mut self, index: usize) -> Result<Deflation> {
        if index >= self.len() {
            return Err(SelectionError::InvariantViolation(format!(
                "deflation index {} outside a gram matrix of size {}",
                index,
                self.len()
            )));
        }

        let cutoff = self.cutoff();
        let pivot = self.gram[[index, index]];
        if pivot <= cutoff {
            self.retire(index);
            return Ok(Deflation::DegeneratePivot);
        }

        let direction = self.gram.column(index).to_owned();
        if let Some(eigenvalue) = (0..self.len())
            .filter(|&j| j != index)
            .map(|j| self.gram[[j, j]] - direction[j] * direction[j] / pivot)
            .find(|&d| d < -cutoff)
        {
            return Err(SelectionError::IndefiniteGram { eigenvalue });
        }

        Zip::indexed(&mut self.gram).par_for_each(|(r, c), value| {
            *value -= direction[r] * direction[c] / pivot;
        });
        symmetrize(&mut self.gram);
        self.gram.row_mut(index).fill(0.0);
        self.gram.column_mut(index).fill(0.0);

        self.retire(index);
        self.deflations += 1;

        let mut retired = Vec::new();
        for j in 0..self.len() {
            if self.active[j] && self.gram[[j, j]] <= cutoff {
                self.active[j] = false;
                retired.push(j);
            }
        }
        if !retired.is_empty() {
            warn!(
                "deflating index {} left {} candidate(s) without residual structure: {:?}",
                index,
                retired.len(),
                retired
            );
        }

        Ok(Deflation::Applied { retired })
    }
}
