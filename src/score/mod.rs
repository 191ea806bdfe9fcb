//! Candidate scoring for the greedy loop.
//!
//! A selection run picks exactly one [`ScoreFunction`] variant at `fit`
//! entry. Each variant reads the current state of the [`PCovMixer`] and
//! produces one score per index of the selection axis; the selector only
//! considers indices the mixer still reports as candidates.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pcov::PCovMixer;

mod cur;
mod fps;

pub use cur::CurScore;
pub use fps::FpsScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreKind {
    /// Farthest point sampling.
    Fps,
    /// Iterative CUR leverage scores.
    Cur,
}

impl std::fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreKind::Fps => write!(f, "FPS"),
            ScoreKind::Cur => write!(f, "CUR"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScoreFunction {
    Fps(FpsScore),
    Cur(CurScore),
}

impl ScoreFunction {
    pub fn kind(&self) -> ScoreKind {
        match self {
            ScoreFunction::Fps(_) => ScoreKind::Fps,
            ScoreFunction::Cur(_) => ScoreKind::Cur,
        }
    }

    /// Called once before the first iteration.
    pub fn prepare(&mut self, mixer: &mut PCovMixer) {
        match self {
            ScoreFunction::Fps(f) => f.prepare(mixer),
            ScoreFunction::Cur(c) => c.prepare(mixer),
        }
    }

    pub fn scores(&mut self, mixer: &PCovMixer) -> Result<Array1<f64>> {
        match self {
            ScoreFunction::Fps(f) => Ok(f.scores()),
            ScoreFunction::Cur(c) => c.scores(mixer),
        }
    }

    /// Scores at or below this value count as degenerate.
    pub fn floor(&self, mixer: &PCovMixer) -> f64 {
        match self {
            ScoreFunction::Fps(_) => mixer.blended_threshold(),
            ScoreFunction::Cur(c) => c.tolerance(),
        }
    }

    /// Incorporates a freshly selected index into the running state.
    pub fn update(&mut self, mixer: &mut PCovMixer, index: usize) -> Result<()> {
        match self {
            ScoreFunction::Fps(f) => {
                f.update(mixer, index);
                Ok(())
            }
            ScoreFunction::Cur(c) => c.update(mixer, index),
        }
    }
}

/// Index of the largest finite score among candidates; ties go to the lowest index.
pub fn argmax_candidate(scores: &Array1<f64>, candidates: &[bool]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (&score, &ok)) in scores.iter().zip(candidates.iter()).enumerate() {
        if !ok || !score.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if score <= b => {}
            _ => best = Some((i, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_skips_non_candidates_and_breaks_ties_low() {
        let scores = array![3.0, 5.0, 5.0, 9.0, f64::NAN];
        let mask = [true, true, true, false, true];
        assert_eq!(argmax_candidate(&scores, &mask), Some((1, 5.0)));

        let none = [false; 5];
        assert_eq!(argmax_candidate(&scores, &none), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ScoreKind::Fps.to_string(), "FPS");
        assert_eq!(ScoreKind::Cur.to_string(), "CUR");
    }
}
