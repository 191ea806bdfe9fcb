//! # Symmetric spectral decomposition
//!
//! The Gram and covariance matrices handled by this crate are symmetric and
//! positive semi-definite, so their eigendecomposition doubles as the singular
//! value decomposition of the underlying data: the eigenvectors of `X·Xᵀ` are
//! the left singular vectors of `X`, those of `Xᵀ·X` the right ones, and the
//! eigenvalues are the squared singular values.
//!
//! The decomposition itself is delegated to nalgebra's `SymmetricEigen`.

use nalgebra::SymmetricEigen;
use ndarray::{s, Array1, Array2, ArrayView2};
use nshare::{IntoNalgebra, IntoNdarray2};

use crate::error::{Result, SelectionError};

/// Eigenpairs of a symmetric matrix, sorted by descending eigenvalue.
#[derive(Debug, Clone)]
pub struct SymmetricSpectrum {
    values: Array1<f64>,
    vectors: Array2<f64>,
}

impl SymmetricSpectrum {
    pub fn compute(matrix: ArrayView2<f64>) -> Result<Self> {
        let (n, m) = matrix.dim();
        if n != m {
            return Err(SelectionError::Dimension(format!(
                "spectral decomposition needs a square matrix, got {} x {}",
                n, m
            )));
        }
        if n == 0 {
            return Ok(SymmetricSpectrum {
                values: Array1::zeros(0),
                vectors: Array2::zeros((0, 0)),
            });
        }

        let owned = matrix.as_standard_layout().into_owned();
        let eigen = SymmetricEigen::try_new(owned.into_nalgebra(), f64::EPSILON, 0)
            .ok_or_else(|| {
                SelectionError::Decomposition("symmetric eigensolver did not converge".into())
            })?;

        let raw_values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
        if raw_values.iter().any(|v| !v.is_finite()) {
            return Err(SelectionError::Decomposition(
                "eigensolver produced non-finite eigenvalues".into(),
            ));
        }
        let raw_vectors = eigen.eigenvectors.into_ndarray2();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| raw_values[b].total_cmp(&raw_values[a]).then(a.cmp(&b)));

        let values = Array1::from_iter(order.iter().map(|&k| raw_values[k]));
        let mut vectors = Array2::zeros((n, n));
        for (dst, &src) in order.iter().enumerate() {
            vectors.column_mut(dst).assign(&raw_vectors.column(src));
        }

        Ok(SymmetricSpectrum { values, vectors })
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Eigenvectors stored as columns, matching the order of [`values`](Self::values).
    pub fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    pub fn largest(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn smallest(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Number of eigenvalues strictly above `threshold`.
    pub fn rank(&self, threshold: f64) -> usize {
        self.values.iter().take_while(|&&v| v > threshold).count()
    }

    /// Sum of squared components of each row across the first `k` eigenvectors.
    ///
    /// With orthonormal eigenvectors this is the statistical leverage of every
    /// index with respect to the leading `k`-dimensional subspace.
    pub fn leverage(&self, k: usize) -> Array1<f64> {
        let k = k.min(self.vectors.ncols());
        self.vectors
            .slice(s![.., ..k])
            .map_axis(ndarray::Axis(1), |row| row.dot(&row))
    }

    /// Moore–Penrose inverse, discarding eigenvalues at or below `threshold`.
    pub fn pseudo_inverse(&self, threshold: f64) -> Array2<f64> {
        let k = self.rank(threshold);
        let basis = self.vectors.slice(s![.., ..k]);
        let inv = self.values.slice(s![..k]).mapv(|v| 1.0 / v);
        let scaled = &basis * &inv;
        scaled.dot(&basis.t())
    }
}
