//! # Property-covariance (PCov) mixing
//!
//! Blends the structural Gram matrix of `X` with a Gram-like matrix built from
//! `Ŷ`, the projection of the property matrix `Y` onto the column space of
//! `X`:
//!
//! ```text
//! W = (XᵀX + λI)⁺ XᵀY        Ŷ = X·W
//! samples:   G_P = Ŷ·Ŷᵀ
//! features:  G_P = (X̂ᵀŶ)(X̂ᵀŶ)ᵀ     X̂ = X with unit-norm columns
//! ```
//!
//! With mixing `α < 1` both matrices are trace-normalized and every score is
//! `α·S + (1−α)·P`. At `α = 1` no property matrix is built and the structural
//! Gram matrix is used as-is, so the unsupervised selectors are reproduced
//! exactly.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::error::{Result, SelectionError};
use crate::gram::{Deflation, GramTracker};
use crate::matrix::{ensure_finite, MatrixView, SelectionAxis};
use crate::svd::SymmetricSpectrum;

/// Relative cut-off for the pseudo-inverse used by the property regression.
const REGRESSION_RCOND: f64 = 1e-12;

/// Smallest relative tolerance of the property tracker. `G_P` is usually of
/// low rank, and once that rank is used up its diagonal holds regression
/// round-off that must never be taken as a pivot.
const PROPERTY_TOLERANCE: f64 = 1e-8;

/// Owns the structural tracker and, for `α < 1`, a property tracker deflated
/// in lockstep with it.
#[derive(Debug, Clone)]
pub struct PCovMixer {
    mixing: f64,
    structure: GramTracker,
    property: Option<GramTracker>,
}

impl PCovMixer {
    /// # Parameters
    /// - `x`: validated design matrix view
    /// - `y`: property matrix, required when `mixing < 1`
    /// - `mixing`: α in `[0, 1]`
    /// - `tolerance`: relative tolerance handed to both trackers
    /// - `regularization`: ridge parameter λ of the property regression
    pub fn new(
        x: &MatrixView,
        y: Option<ArrayView2<f64>>,
        mixing: f64,
        tolerance: f64,
        regularization: f64,
    ) -> Result<Self> {
        validate_mixing(mixing)?;
        if !(regularization.is_finite() && regularization >= 0.0) {
            return Err(SelectionError::InvalidParameter(format!(
                "regularization must be finite and non-negative, got {}",
                regularization
            )));
        }
        let target = match y {
            Some(y) => {
                validate_target(x, y)?;
                Some(y)
            }
            None if mixing < 1.0 => return Err(SelectionError::MissingTarget { mixing }),
            None => None,
        };

        let mut structure = GramTracker::from_gram(x.gram(), tolerance)?;
        let y = match target {
            Some(y) if mixing < 1.0 => y,
            _ => {
                return Ok(PCovMixer {
                    mixing,
                    structure,
                    property: None,
                })
            }
        };

        let y_hat = project_target(x.data(), y, regularization)?;
        let mut property = GramTracker::from_gram(
            property_gram(x, &y_hat),
            tolerance.max(PROPERTY_TOLERANCE),
        )?;

        structure.normalize_trace();
        if property.normalize_trace() <= 0.0 {
            warn!("property matrix has no component in the span of X; property scores are zero");
        }
        debug!(
            "pcov mixer ready: alpha={}, property gram {}x{}",
            mixing,
            property.len(),
            property.len()
        );

        Ok(PCovMixer {
            mixing,
            structure,
            property: Some(property),
        })
    }

    pub fn mixing(&self) -> f64 {
        self.mixing
    }

    pub fn structure(&self) -> &GramTracker {
        &self.structure
    }

    pub fn property(&self) -> Option<&GramTracker> {
        self.property.as_ref()
    }

    pub fn len(&self) -> usize {
        self.structure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
    }

    /// Candidacy is decided by the structural tracker alone.
    pub fn is_candidate(&self, index: usize) -> bool {
        self.structure.is_active(index)
    }

    pub fn candidate_mask(&self) -> &[bool] {
        self.structure.active_mask()
    }

    pub fn n_candidates(&self) -> usize {
        self.structure.n_active()
    }

    /// `α·S + (1−α)·P`, or `S` untouched when there is no property term.
    pub fn blend(&self, structural: Array1<f64>, property: Option<&Array1<f64>>) -> Array1<f64> {
        match property {
            Some(p) if self.property.is_some() => {
                let alpha = self.mixing;
                let mut mixed = structural;
                Zip::from(&mut mixed)
                    .and(p)
                    .par_for_each(|s, &p| *s = alpha * *s + (1.0 - alpha) * p);
                mixed
            }
            _ => structural,
        }
    }

    pub fn blended_diagonal(&self) -> Array1<f64> {
        let p = self.property.as_ref().map(|t| t.diagonal());
        self.blend(self.structure.diagonal(), p.as_ref())
    }

    pub fn blended_column(&self, index: usize) -> Array1<f64> {
        let p = self.property.as_ref().map(|t| t.column(index).to_owned());
        self.blend(self.structure.column(index).to_owned(), p.as_ref())
    }

    pub fn blended_threshold(&self) -> f64 {
        match &self.property {
            Some(p) => self.mixing * self.structure.cutoff() + (1.0 - self.mixing) * p.cutoff(),
            None => self.structure.cutoff(),
        }
    }

    pub fn retire(&mut self, index: usize) {
        self.structure.retire(index);
        if let Some(p) = self.property.as_mut() {
            p.retire(index);
        }
    }

    /// Deflates both trackers with the same pivot.
    ///
    /// The structural outcome is returned. The property side never fails a
    /// run: once its trace is spent, or when the picked index carries no
    /// property information, or when the update would only amplify round-off
    /// into negative entries, that tracker is left as is for this step.
    pub fn deflate(&mut self, index: usize) -> Result<Deflation> {
        let outcome = self.structure.deflate(index)?;
        if let Some(p) = self.property.as_mut() {
            if p.trace() <= p.cutoff() {
                p.retire(index);
                debug!("property gram exhausted, skipping pivot {}", index);
                return Ok(outcome);
            }
            match p.deflate(index) {
                Ok(Deflation::DegeneratePivot) => {
                    debug!("property pivot {} is degenerate, property gram unchanged", index)
                }
                Ok(Deflation::Applied { .. }) => {}
                Err(SelectionError::IndefiniteGram { eigenvalue }) => {
                    p.retire(index);
                    debug!(
                        "property pivot {} would leave a residual of {:e}, property gram unchanged",
                        index, eigenvalue
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }
}

pub(crate) fn validate_mixing(mixing: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&mixing) {
        return Err(SelectionError::InvalidParameter(format!(
            "mixing must lie in [0, 1], got {}",
            mixing
        )));
    }
    Ok(())
}

pub(crate) fn validate_target(x: &MatrixView, y: ArrayView2<f64>) -> Result<()> {
    if y.nrows() != x.nrows() {
        return Err(SelectionError::Dimension(format!(
            "property matrix has {} rows but the design matrix has {}",
            y.nrows(),
            x.nrows()
        )));
    }
    if y.ncols() == 0 {
        return Err(SelectionError::Dimension(
            "property matrix has no columns".into(),
        ));
    }
    ensure_finite(y, "property matrix")
}

/// Least-squares (or ridge, for `regularization > 0`) projection of `y` onto
/// the column space of `x`.
pub fn project_target(
    x: ArrayView2<f64>,
    y: ArrayView2<f64>,
    regularization: f64,
) -> Result<Array2<f64>> {
    let mut xtx = x.t().dot(&x);
    if regularization > 0.0 {
        xtx.diag_mut().mapv_inplace(|v| v + regularization);
    }
    let spectrum = SymmetricSpectrum::compute(xtx.view())?;
    let cutoff = REGRESSION_RCOND * spectrum.largest().max(0.0);
    let weights = spectrum.pseudo_inverse(cutoff).dot(&x.t().dot(&y));
    Ok(x.dot(&weights))
}

fn property_gram(x: &MatrixView, y_hat: &Array2<f64>) -> Array2<f64> {
    match x.axis() {
        SelectionAxis::Samples => y_hat.dot(&y_hat.t()),
        SelectionAxis::Features => {
            let mut unit = x.data().to_owned();
            unit.axis_iter_mut(Axis(1)).for_each(|mut col| {
                let norm = col.dot(&col).sqrt();
                if norm > 0.0 {
                    col /= norm;
                }
            });
            let loadings = unit.t().dot(y_hat);
            loadings.dot(&loadings.t())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn design() -> Array2<f64> {
        array![
            [1.0, 0.0, 2.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [2.0, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_project_target_recovers_column_space() {
        let x = design();
        let y = x.column(1).to_owned().insert_axis(Axis(1));
        let y_hat = project_target(x.view(), y.view(), 0.0).unwrap();
        for i in 0..4 {
            assert_abs_diff_eq!(y_hat[[i, 0]], y[[i, 0]], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ridge_shrinks_projection() {
        let x = design();
        let y = x.column(0).to_owned().insert_axis(Axis(1));
        let y_hat = project_target(x.view(), y.view(), 10.0).unwrap();
        let exact: f64 = y.iter().map(|v| v * v).sum();
        let shrunk: f64 = y_hat.iter().map(|v| v * v).sum();
        assert!(shrunk < exact);
    }

    #[test]
    fn test_unit_mixing_skips_property() {
        let x = design();
        let view = MatrixView::new(x.view(), SelectionAxis::Samples).unwrap();
        let mixer = PCovMixer::new(&view, None, 1.0, 1e-12, 0.0).unwrap();
        assert!(mixer.property().is_none());
        assert_eq!(mixer.blended_diagonal(), view.gram().diag().to_owned());
    }

    #[test]
    fn test_missing_target_and_bad_shapes() {
        let x = design();
        let view = MatrixView::new(x.view(), SelectionAxis::Samples).unwrap();
        assert_eq!(
            PCovMixer::new(&view, None, 0.5, 1e-12, 0.0).unwrap_err(),
            SelectionError::MissingTarget { mixing: 0.5 }
        );

        let short = Array2::<f64>::ones((3, 1));
        assert!(matches!(
            PCovMixer::new(&view, Some(short.view()), 0.5, 1e-12, 0.0),
            Err(SelectionError::Dimension(_))
        ));

        assert!(matches!(
            PCovMixer::new(&view, None, 1.5, 1e-12, 0.0),
            Err(SelectionError::InvalidParameter(_))
        ));

        // raised before the trackers are built, so a bad tolerance is not reached
        assert_eq!(
            PCovMixer::new(&view, None, 0.5, 0.0, 0.0).unwrap_err(),
            SelectionError::MissingTarget { mixing: 0.5 }
        );
    }

    #[test]
    fn test_spent_property_gram_is_left_alone() {
        // y lies in the span of X, so G_P has rank one
        let x = design();
        let y = x.column(0).to_owned().insert_axis(Axis(1));
        let view = MatrixView::new(x.view(), SelectionAxis::Samples).unwrap();
        let mut mixer = PCovMixer::new(&view, Some(y.view()), 0.5, 1e-12, 0.0).unwrap();

        for i in 0..3 {
            let outcome = mixer.deflate(i).unwrap();
            assert!(matches!(outcome, Deflation::Applied { .. }));
        }
        assert_eq!(mixer.structure().deflations(), 3);

        let property = mixer.property().unwrap();
        assert_eq!(property.deflations(), 1);
        assert!(property.trace() <= property.cutoff());
        // diag(G_P) = (1, 0, 1, 4) before trace normalization
        assert_abs_diff_eq!(property.threshold(), PROPERTY_TOLERANCE * 4.0 / 6.0, epsilon = 1e-18);
    }

    #[test]
    fn test_indefinite_property_update_is_skipped() {
        let x = design();
        let y = array![[1.0], [0.0], [2.0], [1.0]];
        let view = MatrixView::new(x.view(), SelectionAxis::Samples).unwrap();
        let mut mixer = PCovMixer::new(&view, Some(y.view()), 0.5, 1e-12, 0.0).unwrap();
        // replace the property side with an indefinite matrix
        let bad = array![
            [1.0, 2.0, 0.0, 0.0],
            [2.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        mixer.property = Some(GramTracker::from_gram(bad.clone(), 1e-12).unwrap());

        mixer.deflate(0).unwrap();
        assert_eq!(mixer.structure().deflations(), 1);
        let property = mixer.property().unwrap();
        assert_eq!(property.gram(), bad.view());
        assert!(!property.is_active(0));
    }

    #[test]
    fn test_blend_and_lockstep_deflation() {
        let x = design();
        let y = array![[1.0], [0.0], [2.0], [1.0]];
        let view = MatrixView::new(x.view(), SelectionAxis::Samples).unwrap();
        let mut mixer = PCovMixer::new(&view, Some(y.view()), 0.25, 1e-12, 0.0).unwrap();

        // both parts are trace-normalized
        assert_abs_diff_eq!(mixer.structure().trace(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mixer.property().unwrap().trace(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mixer.blended_diagonal().sum(), 1.0, epsilon = 1e-12);

        let s = mixer.structure().diagonal();
        let p = mixer.property().unwrap().diagonal();
        let mixed = mixer.blended_diagonal();
        for i in 0..4 {
            assert_abs_diff_eq!(mixed[i], 0.25 * s[i] + 0.75 * p[i], epsilon = 1e-14);
        }

        mixer.deflate(2).unwrap();
        assert!(!mixer.is_candidate(2));
        assert_eq!(mixer.structure().deflations(), 1);
        assert_eq!(mixer.property().unwrap().deflations(), 1);
        assert_abs_diff_eq!(mixer.property().unwrap().entry(2, 2), 0.0);
    }

    #[test]
    fn test_feature_property_gram_prefers_predictive_feature() {
        let x = design();
        let y = x.column(2).to_owned().insert_axis(Axis(1));
        let view = MatrixView::new(x.view(), SelectionAxis::Features).unwrap();
        let mixer = PCovMixer::new(&view, Some(y.view()), 0.0, 1e-12, 0.0).unwrap();

        let diag = mixer.blended_diagonal();
        assert!(diag[2] > diag[0]);
        assert!(diag[2] > diag[1]);
    }
}
