use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectionError};
use crate::matrix::SelectionAxis;
use crate::score::ScoreKind;

/// Lifecycle of a [`GreedySelector`](crate::GreedySelector) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Exhausted,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Exhausted | RunState::Failed)
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStatus {
    /// Exactly the requested number of indices was selected.
    Completed,
    /// Candidates ran out of usable structure first; the selection is partial.
    Exhausted,
}

/// Ordered selection accumulated during a run.
#[derive(Debug, Clone)]
pub struct SelectionState {
    indices: Vec<usize>,
    scores: Vec<f64>,
    taken: Vec<bool>,
    run: RunState,
}

impl SelectionState {
    pub fn new(axis_len: usize) -> Self {
        SelectionState {
            indices: Vec::new(),
            scores: Vec::new(),
            taken: vec![false; axis_len],
            run: RunState::Idle,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.run != RunState::Idle {
            return Err(SelectionError::InvariantViolation(format!(
                "cannot start a run from state {:?}",
                self.run
            )));
        }
        self.run = RunState::Running;
        Ok(())
    }

    pub fn push(&mut self, index: usize, score: f64) -> Result<()> {
        if self.run != RunState::Running {
            return Err(SelectionError::InvariantViolation(format!(
                "cannot record a selection in state {:?}",
                self.run
            )));
        }
        match self.taken.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => {
                return Err(SelectionError::InvariantViolation(format!(
                    "index {} selected twice",
                    index
                )))
            }
            None => {
                return Err(SelectionError::InvariantViolation(format!(
                    "index {} outside an axis of size {}",
                    index,
                    self.taken.len()
                )))
            }
        }
        self.indices.push(index);
        self.scores.push(score);
        Ok(())
    }

    pub fn finish(&mut self, status: SelectionStatus) {
        self.run = match status {
            SelectionStatus::Completed => RunState::Completed,
            SelectionStatus::Exhausted => RunState::Exhausted,
        };
    }

    pub fn fail(&mut self) {
        self.run = RunState::Failed;
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub(crate) fn into_parts(self) -> (Vec<usize>, Vec<f64>) {
        (self.indices, self.scores)
    }
}

/// Outcome of a successful selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub selected_indices: Vec<usize>,
    /// Score of each pick at the moment it was selected.
    pub scores: Vec<f64>,
    pub status: SelectionStatus,
    pub kind: ScoreKind,
    pub axis: SelectionAxis,
    pub mixing: f64,
    pub axis_len: usize,
    /// FPS only: squared distance of every index to the final selection.
    pub hausdorff: Option<Array1<f64>>,
    /// CUR only: leverage scores of the last iteration.
    pub last_scores: Option<Array1<f64>>,
}

impl SelectionResult {
    pub fn len(&self) -> usize {
        self.selected_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_indices.is_empty()
    }

    /// Boolean mask over the selection axis.
    pub fn support_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.axis_len];
        for &i in &self.selected_indices {
            mask[i] = true;
        }
        mask
    }

    pub fn record(&self) -> SelectionRecord {
        SelectionRecord {
            selected_indices: self.selected_indices.clone(),
            mixing: self.mixing,
            kind: self.kind,
            axis: self.axis,
        }
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        slice_axis(x, self.axis, &self.selected_indices)
    }
}

/// Minimal persisted form of a selection: enough to reproduce `transform`
/// and to resume a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub selected_indices: Vec<usize>,
    pub mixing: f64,
    pub kind: ScoreKind,
    pub axis: SelectionAxis,
}

impl SelectionRecord {
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        slice_axis(x, self.axis, &self.selected_indices)
    }
}

fn slice_axis(x: ArrayView2<f64>, axis: SelectionAxis, indices: &[usize]) -> Result<Array2<f64>> {
    let len = x.len_of(axis.ndarray_axis());
    if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
        return Err(SelectionError::Dimension(format!(
            "selected index {} out of range for an axis of size {}",
            bad, len
        )));
    }
    Ok(x.select(axis.ndarray_axis(), indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_state_lifecycle() {
        let mut state = SelectionState::new(4);
        assert_eq!(state.run_state(), RunState::Idle);
        assert!(state.push(0, 1.0).is_err());

        state.start().unwrap();
        state.push(2, 3.0).unwrap();
        state.push(0, 1.0).unwrap();
        assert!(matches!(
            state.push(2, 0.5),
            Err(SelectionError::InvariantViolation(_))
        ));
        assert!(state.push(7, 0.5).is_err());
        assert_eq!(state.indices(), &[2, 0]);
        assert_eq!(state.scores(), &[3.0, 1.0]);
        assert_eq!(state.len(), 2);

        state.finish(SelectionStatus::Exhausted);
        assert_eq!(state.run_state(), RunState::Exhausted);
        assert!(state.run_state().is_terminal());
        assert!(state.push(1, 0.1).is_err());
        assert!(state.start().is_err());
    }

    #[test]
    fn test_result_mask_and_transform() {
        let result = SelectionResult {
            selected_indices: vec![2, 0],
            scores: vec![1.0, 0.5],
            status: SelectionStatus::Completed,
            kind: ScoreKind::Fps,
            axis: SelectionAxis::Features,
            mixing: 1.0,
            axis_len: 3,
            hausdorff: None,
            last_scores: None,
        };
        assert_eq!(result.support_mask(), vec![true, false, true]);

        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let reduced = result.transform(x.view()).unwrap();
        assert_eq!(reduced, array![[3.0, 1.0], [6.0, 4.0]]);
        assert_eq!(result.record().transform(x.view()).unwrap(), reduced);

        let narrow = array![[1.0, 2.0]];
        assert!(matches!(
            result.transform(narrow.view()),
            Err(SelectionError::Dimension(_))
        ));
    }

    #[test]
    fn test_record_serde() {
        let record = SelectionRecord {
            selected_indices: vec![4, 1, 3],
            mixing: 0.5,
            kind: ScoreKind::Cur,
            axis: SelectionAxis::Samples,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: SelectionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
