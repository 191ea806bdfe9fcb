//! # Greedy selection
//!
//! [`GreedySelector`] drives the selection loop shared by all four
//! strategies (FPS, CUR and their PCov flavours):
//!
//! 1. score every remaining candidate,
//! 2. pick the best one (ties go to the lowest index),
//! 3. record it,
//! 4. fold it into the running state (distance update for FPS, Gram
//!    deflation for CUR),
//!
//! until the requested count is reached (`Completed`) or no candidate has a
//! score above tolerance (`Exhausted`). Numerical breakdowns end the run in
//! the `Failed` state and are returned as errors.
//!
//! Selectors are configured through [`SelectorBuilder`]:
//!
//! ```no_run
//! use greedy_select::{GreedySelector, SelectionAxis};
//! use ndarray::array;
//!
//! let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]];
//! let mut fps = GreedySelector::fps(3).initial_index(0).build();
//! let result = fps.fit(x.view(), None).unwrap();
//! assert_eq!(result.selected_indices[..2], [0, 3]);
//!
//! let mut cur = GreedySelector::cur(1).axis(SelectionAxis::Features).build();
//! let reduced = cur.fit_transform(x.view(), None).unwrap();
//! assert_eq!(reduced.ncols(), 1);
//! ```

use log::{debug, trace, warn};
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, SelectionError};
use crate::matrix::{MatrixView, SelectionAxis};
use crate::pcov::{validate_mixing, PCovMixer};
use crate::score::{argmax_candidate, CurScore, FpsScore, ScoreFunction, ScoreKind};

mod state;

pub use state::{RunState, SelectionRecord, SelectionResult, SelectionState, SelectionStatus};

pub const DEFAULT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub kind: ScoreKind,
    pub axis: SelectionAxis,
    pub n_to_select: usize,
    pub initial_index: Option<usize>,
    pub mixing: f64,
    pub rank_cap: Option<usize>,
    pub tolerance: f64,
    pub regularization: f64,
    pub score_threshold: Option<f64>,
}

pub struct SelectorBuilder {
    config: SelectorConfig,
}

impl SelectorBuilder {
    pub fn new(kind: ScoreKind, n_to_select: usize) -> Self {
        SelectorBuilder {
            config: SelectorConfig {
                kind,
                axis: SelectionAxis::Samples,
                n_to_select,
                initial_index: None,
                mixing: 1.0,
                rank_cap: None,
                tolerance: DEFAULT_TOLERANCE,
                regularization: 0.0,
                score_threshold: None,
            },
        }
    }

    pub fn axis(mut self, axis: SelectionAxis) -> Self {
        self.config.axis = axis;
        self
    }

    /// FPS seed. Without it the index of largest norm goes first.
    pub fn initial_index(mut self, index: usize) -> Self {
        self.config.initial_index = Some(index);
        self
    }

    /// α in `[0, 1]`; values below 1 require a property matrix at fit time.
    pub fn mixing(mut self, mixing: f64) -> Self {
        self.config.mixing = mixing;
        self
    }

    /// Number of leading eigenvectors in the CUR leverage score. Defaults to
    /// `n_to_select`.
    pub fn rank_cap(mut self, rank: usize) -> Self {
        self.config.rank_cap = Some(rank);
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Ridge parameter of the property regression (0 = plain least squares).
    pub fn regularization(mut self, regularization: f64) -> Self {
        self.config.regularization = regularization;
        self
    }

    /// Stops the run as `Exhausted` once the best score falls below this.
    pub fn score_threshold(mut self, threshold: f64) -> Self {
        self.config.score_threshold = Some(threshold);
        self
    }

    pub fn build(self) -> GreedySelector {
        GreedySelector {
            config: self.config,
            run_state: RunState::Idle,
            result: None,
        }
    }
}

pub struct GreedySelector {
    config: SelectorConfig,
    run_state: RunState,
    result: Option<SelectionResult>,
}

impl GreedySelector {
    pub fn builder(kind: ScoreKind, n_to_select: usize) -> SelectorBuilder {
        SelectorBuilder::new(kind, n_to_select)
    }

    pub fn fps(n_to_select: usize) -> SelectorBuilder {
        SelectorBuilder::new(ScoreKind::Fps, n_to_select)
    }

    pub fn cur(n_to_select: usize) -> SelectorBuilder {
        SelectorBuilder::new(ScoreKind::Cur, n_to_select)
    }

    pub fn pcov_fps(n_to_select: usize, mixing: f64) -> SelectorBuilder {
        Self::fps(n_to_select).mixing(mixing)
    }

    pub fn pcov_cur(n_to_select: usize, mixing: f64) -> SelectorBuilder {
        Self::cur(n_to_select).mixing(mixing)
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn result(&self) -> Option<&SelectionResult> {
        self.result.as_ref()
    }

    /// Runs a fresh selection on `x`. Any previous result is discarded.
    pub fn fit(&mut self, x: ArrayView2<f64>, y: Option<ArrayView2<f64>>) -> Result<&SelectionResult> {
        self.run(x, y, &[], None)
    }

    /// Like [`fit`](Self::fit), reporting `(selected, n_to_select)` after every pick.
    pub fn fit_with_progress(
        &mut self,
        x: ArrayView2<f64>,
        y: Option<ArrayView2<f64>>,
        progress: &dyn Fn(usize, usize),
    ) -> Result<&SelectionResult> {
        self.run(x, y, &[], Some(progress))
    }

    /// Rebuilds the state of a previous run from `record` and keeps selecting
    /// up to the configured `n_to_select`.
    ///
    /// The recorded indices are replayed in order, exactly as a live run
    /// would have processed them, so the continuation matches an
    /// uninterrupted run with the same configuration.
    pub fn fit_resume(
        &mut self,
        x: ArrayView2<f64>,
        y: Option<ArrayView2<f64>>,
        record: &SelectionRecord,
    ) -> Result<&SelectionResult> {
        if record.kind != self.config.kind
            || record.axis != self.config.axis
            || record.mixing != self.config.mixing
        {
            return Err(SelectionError::InvalidParameter(format!(
                "record ({}, {:?}, mixing {}) does not match selector ({}, {:?}, mixing {})",
                record.kind,
                record.axis,
                record.mixing,
                self.config.kind,
                self.config.axis,
                self.config.mixing
            )));
        }
        if record.selected_indices.len() > self.config.n_to_select {
            return Err(SelectionError::InvalidParameter(format!(
                "record holds {} indices, more than the {} requested",
                record.selected_indices.len(),
                self.config.n_to_select
            )));
        }
        let indices = record.selected_indices.clone();
        self.run(x, y, &indices, None)
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        match &self.result {
            Some(result) => result.transform(x),
            None => Err(SelectionError::NotFitted),
        }
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>, y: Option<ArrayView2<f64>>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    pub fn support_mask(&self) -> Result<Vec<bool>> {
        self.result
            .as_ref()
            .map(|r| r.support_mask())
            .ok_or(SelectionError::NotFitted)
    }

    fn validate(&self, view: &MatrixView, replay: &[usize]) -> Result<()> {
        let cfg = &self.config;
        let available = view.axis_len();
        if cfg.n_to_select == 0 || cfg.n_to_select > available {
            return Err(SelectionError::InvalidCount {
                requested: cfg.n_to_select,
                available,
            });
        }
        validate_mixing(cfg.mixing)?;
        if let Some(seed) = cfg.initial_index {
            if cfg.kind != ScoreKind::Fps {
                return Err(SelectionError::InvalidParameter(
                    "initial_index only applies to FPS".into(),
                ));
            }
            if seed >= available {
                return Err(SelectionError::InvalidParameter(format!(
                    "initial_index {} out of range for an axis of size {}",
                    seed, available
                )));
            }
        }
        if cfg.rank_cap == Some(0) {
            return Err(SelectionError::InvalidParameter("rank_cap must be positive".into()));
        }
        if let Some(t) = cfg.score_threshold {
            if !t.is_finite() {
                return Err(SelectionError::InvalidParameter(format!(
                    "score_threshold must be finite, got {}",
                    t
                )));
            }
        }
        let mut seen = vec![false; available];
        for &i in replay {
            if i >= available || seen[i] {
                return Err(SelectionError::InvalidParameter(format!(
                    "recorded index {} is out of range or repeated",
                    i
                )));
            }
            seen[i] = true;
        }
        Ok(())
    }

    fn run(
        &mut self,
        x: ArrayView2<f64>,
        y: Option<ArrayView2<f64>>,
        replay: &[usize],
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> Result<&SelectionResult> {
        self.result = None;
        self.run_state = RunState::Idle;

        let view = MatrixView::new(x, self.config.axis)?;
        self.validate(&view, replay)?;
        let mut mixer = PCovMixer::new(
            &view,
            y,
            self.config.mixing,
            self.config.tolerance,
            self.config.regularization,
        )?;

        let mut function = match self.config.kind {
            ScoreKind::Fps => ScoreFunction::Fps(FpsScore::new()),
            ScoreKind::Cur => {
                let rank = self
                    .config
                    .rank_cap
                    .unwrap_or(self.config.n_to_select)
                    .min(view.axis_len());
                ScoreFunction::Cur(CurScore::new(rank, self.config.tolerance))
            }
        };

        let mut state = SelectionState::new(view.axis_len());
        state.start()?;
        self.run_state = RunState::Running;
        debug!(
            "starting {} selection of {} out of {} ({:?}, mixing {})",
            self.config.kind,
            self.config.n_to_select,
            view.axis_len(),
            self.config.axis,
            self.config.mixing
        );

        let status = match self.select_loop(&mut mixer, &mut function, &mut state, replay, progress) {
            Ok(status) => status,
            Err(err) => {
                state.fail();
                self.run_state = RunState::Failed;
                if err.is_fatal() {
                    warn!("{} selection failed after {} picks: {}", self.config.kind, state.len(), err);
                } else {
                    debug!("{} selection rejected after {} picks: {}", self.config.kind, state.len(), err);
                }
                return Err(err);
            }
        };
        state.finish(status);
        self.run_state = state.run_state();
        debug!(
            "{} selection finished: {:?} with {} of {} picks",
            self.config.kind,
            status,
            state.len(),
            self.config.n_to_select
        );

        let (hausdorff, last_scores) = match &function {
            ScoreFunction::Fps(f) => (f.hausdorff().cloned(), None),
            ScoreFunction::Cur(c) => (None, c.last_scores().cloned()),
        };
        let (selected_indices, scores) = state.into_parts();
        let result = SelectionResult {
            selected_indices,
            scores,
            status,
            kind: self.config.kind,
            axis: self.config.axis,
            mixing: self.config.mixing,
            axis_len: view.axis_len(),
            hausdorff,
            last_scores,
        };
        let stored: &SelectionResult = self.result.insert(result);
        Ok(stored)
    }

    fn select_loop(
        &self,
        mixer: &mut PCovMixer,
        function: &mut ScoreFunction,
        state: &mut SelectionState,
        replay: &[usize],
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> Result<SelectionStatus> {
        let total = self.config.n_to_select;
        function.prepare(mixer);

        while state.len() < total {
            let iteration = state.len();
            let forced = match replay.get(iteration) {
                Some(&i) => Some(i),
                None if iteration == 0 => self.config.initial_index,
                None => None,
            };

            if forced.is_none() && mixer.n_candidates() == 0 {
                debug!("no candidates left after {} picks", iteration);
                return Ok(SelectionStatus::Exhausted);
            }

            let scores = function.scores(mixer)?;
            let (index, score) = match forced {
                Some(i) => {
                    if !mixer.is_candidate(i) {
                        return Err(SelectionError::InvalidParameter(format!(
                            "index {} is not a selectable candidate",
                            i
                        )));
                    }
                    (i, scores[i])
                }
                None => {
                    let floor = function.floor(mixer);
                    match argmax_candidate(&scores, mixer.candidate_mask()) {
                        Some((i, s)) if s > floor => {
                            if self.config.score_threshold.is_some_and(|t| s < t) {
                                debug!("best score {} below threshold, stopping", s);
                                return Ok(SelectionStatus::Exhausted);
                            }
                            (i, s)
                        }
                        _ => {
                            debug!("all remaining scores degenerate after {} picks", iteration);
                            return Ok(SelectionStatus::Exhausted);
                        }
                    }
                }
            };

            trace!("pick {}: index {} (score {:e})", iteration, index, score);
            state.push(index, score)?;
            function.update(mixer, index)?;

            if let Some(report) = progress {
                report(state.len(), total);
            }
        }

        Ok(SelectionStatus::Completed)
    }
}
