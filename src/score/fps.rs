use ndarray::{Array1, Zip};

use crate::pcov::PCovMixer;

/// Farthest point sampling.
///
/// Keeps the squared distance of every index to its nearest selected index,
/// measured in the (possibly blended) kernel:
///
/// ```text
/// d(j, i) = K[j, j] − 2·K[j, i] + K[i, i]
/// ```
///
/// Each selection costs one kernel column and a linear pass over the running
/// distances. Before the first pick the score is the self-similarity `K[j, j]`.
#[derive(Debug, Clone, Default)]
pub struct FpsScore {
    diagonal: Array1<f64>,
    distances: Array1<f64>,
    picks: usize,
}

impl FpsScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn prepare(&mut self, mixer: &PCovMixer) {
        self.diagonal = mixer.blended_diagonal();
        self.distances = Array1::from_elem(mixer.len(), f64::INFINITY);
        self.picks = 0;
    }

    pub(crate) fn scores(&self) -> Array1<f64> {
        if self.picks == 0 {
            self.diagonal.clone()
        } else {
            self.distances.clone()
        }
    }

    pub(crate) fn update(&mut self, mixer: &mut PCovMixer, index: usize) {
        let column = mixer.blended_column(index);
        let k_ii = self.diagonal[index];
        Zip::from(&mut self.distances)
            .and(&self.diagonal)
            .and(&column)
            .par_for_each(|d, &k_jj, &k_ji| {
                let candidate = (k_jj - 2.0 * k_ji + k_ii).max(0.0);
                if candidate < *d {
                    *d = candidate;
                }
            });
        self.distances[index] = 0.0;
        self.picks += 1;
        mixer.retire(index);
    }

    /// Squared distance of every index to the selected set, `None` before the
    /// first pick.
    pub fn hausdorff(&self) -> Option<&Array1<f64>> {
        (self.picks > 0).then_some(&self.distances)
    }

    pub fn picks(&self) -> usize {
        self.picks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{MatrixView, SelectionAxis};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_distance_updates() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]];
        let view = MatrixView::new(x.view(), SelectionAxis::Samples).unwrap();
        let mut mixer = PCovMixer::new(&view, None, 1.0, 1e-12, 0.0).unwrap();

        let mut fps = FpsScore::new();
        fps.prepare(&mixer);
        assert!(fps.hausdorff().is_none());
        assert_eq!(fps.scores(), array![0.0, 1.0, 1.0, 50.0]);

        fps.update(&mut mixer, 0);
        assert_eq!(fps.scores(), array![0.0, 1.0, 1.0, 50.0]);
        assert!(!mixer.is_candidate(0));

        fps.update(&mut mixer, 3);
        let d = fps.hausdorff().unwrap();
        assert_abs_diff_eq!(d[1], 1.0);
        assert_abs_diff_eq!(d[2], 1.0);
        assert_abs_diff_eq!(d[3], 0.0);
        assert_eq!(fps.picks(), 2);
    }

    #[test]
    fn test_feature_axis_distances() {
        // columns (1, 0), (0, 2), (1, 0)
        let x = array![[1.0, 0.0, 1.0], [0.0, 2.0, 0.0]];
        let view = MatrixView::new(x.view(), SelectionAxis::Features).unwrap();
        let mut mixer = PCovMixer::new(&view, None, 1.0, 1e-12, 0.0).unwrap();

        let mut fps = FpsScore::new();
        fps.prepare(&mixer);
        fps.update(&mut mixer, 1);
        let d = fps.hausdorff().unwrap();
        assert_abs_diff_eq!(d[0], 5.0);
        assert_abs_diff_eq!(d[2], 5.0);

        fps.update(&mut mixer, 0);
        // duplicate column collapses to zero distance
        assert_abs_diff_eq!(fps.hausdorff().unwrap()[2], 0.0);
    }
}
