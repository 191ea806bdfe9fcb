use criterion::measurement::Measurement;
use criterion::{criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion};
use greedy_select::{GreedySelector, SelectionAxis};
use ndarray::Array2;
use rand::distr::{Distribution, Uniform};
use rand::{rngs::StdRng, SeedableRng};
use std::time::Duration;

#[derive(Clone)]
pub struct SelectionBenchConfig {
    seed: u64,
    matrix_sizes: Vec<(usize, usize)>,
    select_fractions: Vec<f64>,
    measurement_time: u64,
    sample_size: usize,
}

impl Default for SelectionBenchConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            matrix_sizes: vec![(100, 20), (500, 50), (1000, 100)],
            select_fractions: vec![0.05, 0.2],
            measurement_time: 10,
            sample_size: 10,
        }
    }
}

fn create_test_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let value_dist = Uniform::try_from(-1.0..1.0).unwrap();
    Array2::from_shape_fn((rows, cols), |_| value_dist.sample(&mut rng))
}

fn configure_group<'a, M: Measurement>(
    c: &'a mut Criterion<M>,
    name: &str,
    config: &SelectionBenchConfig,
) -> BenchmarkGroup<'a, M> {
    let mut group = c.benchmark_group(name);
    group.measurement_time(Duration::from_secs(config.measurement_time));
    group.sample_size(config.sample_size);
    group
}

pub fn bench_fps(c: &mut Criterion) {
    let config = SelectionBenchConfig::default();
    let mut group = configure_group(c, "FPS_Selection", &config);

    for &(rows, cols) in config.matrix_sizes.iter() {
        let matrix = create_test_matrix(rows, cols, config.seed + (rows * cols) as u64);
        for &fraction in config.select_fractions.iter() {
            let n = ((rows as f64 * fraction) as usize).max(1);
            group.bench_with_input(
                BenchmarkId::new("samples", format!("{}x{}_n{}", rows, cols, n)),
                &n,
                |b, &n| {
                    b.iter(|| {
                        let mut selector = GreedySelector::fps(n).build();
                        selector.fit(matrix.view(), None).unwrap().len()
                    });
                },
            );
        }
    }
    group.finish();
}

pub fn bench_cur(c: &mut Criterion) {
    let config = SelectionBenchConfig::default();
    let mut group = configure_group(c, "CUR_Selection", &config);

    for &(rows, cols) in config.matrix_sizes.iter() {
        let matrix = create_test_matrix(rows, cols, config.seed + (rows * cols) as u64);
        for &fraction in config.select_fractions.iter() {
            let n = ((cols as f64 * fraction) as usize).max(1);
            group.bench_with_input(
                BenchmarkId::new("features", format!("{}x{}_n{}", rows, cols, n)),
                &n,
                |b, &n| {
                    b.iter(|| {
                        let mut selector = GreedySelector::cur(n)
                            .rank_cap(1)
                            .axis(SelectionAxis::Features)
                            .build();
                        selector.fit(matrix.view(), None).unwrap().len()
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(selection_benches, bench_fps, bench_cur);
criterion_main!(selection_benches);
