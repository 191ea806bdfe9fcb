use log::{trace, warn};
use ndarray::Array1;

use crate::error::{Result, SelectionError};
use crate::gram::{Deflation, GramTracker};
use crate::pcov::PCovMixer;
use crate::svd::SymmetricSpectrum;

/// Iterative CUR selection.
///
/// The score of an index is its leverage with respect to the leading `rank`
/// eigenvectors of the current *residual* Gram matrix. After each pick the
/// mixer deflates the Gram matrices, so the next leverage computation only
/// sees variance not yet covered by the selection.
#[derive(Debug, Clone)]
pub struct CurScore {
    rank: usize,
    tolerance: f64,
    last: Option<Array1<f64>>,
}

impl CurScore {
    /// # Parameters
    /// - `rank`: number of leading eigenvectors entering the leverage score
    /// - `tolerance`: relative tolerance, also the score floor
    pub fn new(rank: usize, tolerance: f64) -> Self {
        CurScore {
            rank: rank.max(1),
            tolerance,
            last: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Leverage scores of the most recent iteration.
    pub fn last_scores(&self) -> Option<&Array1<f64>> {
        self.last.as_ref()
    }

    /// Indices without any initial structure can never be deflated.
    pub(crate) fn prepare(&mut self, mixer: &mut PCovMixer) {
        let threshold = mixer.structure().cutoff();
        let diagonal = mixer.structure().diagonal();
        let empty: Vec<usize> = diagonal
            .iter()
            .enumerate()
            .filter(|(_, &d)| d <= threshold)
            .map(|(i, _)| i)
            .collect();
        if !empty.is_empty() {
            warn!("{} candidate(s) have no structure and are excluded: {:?}", empty.len(), empty);
        }
        for i in empty {
            mixer.retire(i);
        }
        self.last = None;
    }

    pub(crate) fn scores(&mut self, mixer: &PCovMixer) -> Result<Array1<f64>> {
        let structure = mixer.structure();
        let spectrum = SymmetricSpectrum::compute(structure.gram())?;
        let cutoff = eigen_cutoff(structure, &spectrum);

        if spectrum.smallest() < -cutoff {
            return Err(SelectionError::IndefiniteGram {
                eigenvalue: spectrum.smallest(),
            });
        }
        let available = spectrum.rank(cutoff);
        if available == 0 {
            return Err(SelectionError::RankExhausted {
                selected: structure.deflations(),
            });
        }
        let k = self.rank.min(available);
        trace!("cur leverage over {} of {} residual directions", k, available);
        let structural = spectrum.leverage(k);

        let property = match mixer.property() {
            Some(p) => Some(property_leverage(p, self.rank)?),
            None => None,
        };
        let scores = mixer.blend(structural, property.as_ref());
        self.last = Some(scores.clone());
        Ok(scores)
    }

    pub(crate) fn update(&mut self, mixer: &mut PCovMixer, index: usize) -> Result<()> {
        match mixer.deflate(index)? {
            Deflation::Applied { .. } => Ok(()),
            Deflation::DegeneratePivot => Err(SelectionError::InvariantViolation(format!(
                "selected index {} had no residual structure to deflate",
                index
            ))),
        }
    }
}

/// Eigenvalues at or below this are treated as zero: the tracker cutoff,
/// widened by the expected rounding error of the eigensolver.
fn eigen_cutoff(tracker: &GramTracker, spectrum: &SymmetricSpectrum) -> f64 {
    let rounding = 10.0 * tracker.len() as f64 * f64::EPSILON * spectrum.largest().abs();
    tracker.cutoff().max(rounding)
}

/// Property leverage; a property matrix with nothing left contributes zeros.
fn property_leverage(tracker: &GramTracker, rank: usize) -> Result<Array1<f64>> {
    let spectrum = SymmetricSpectrum::compute(tracker.gram())?;
    let available = spectrum.rank(eigen_cutoff(tracker, &spectrum));
    if available == 0 {
        return Ok(Array1::zeros(tracker.len()));
    }
    Ok(spectrum.leverage(rank.min(available)))
}
