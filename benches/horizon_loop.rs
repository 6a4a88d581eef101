use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use stackcast::data::TimeSeries;
use stackcast::ensemble::{StackingConfig, StackingRegressor};
use stackcast::forecast::{CovariateSet, ForecastConfig, StackingForecaster, TargetConfig, TestBoundary};
use stackcast::timeseries::{FeatureConfig, FeatureExtractor, WindowConfig, WindowIndexer};
use stackcast::training::BaseModelPool;

fn create_series(len: usize, n_covariates: usize) -> TimeSeries {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let start = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();

    let mut series = TimeSeries::hourly(start, len).unwrap();
    for c in 0..n_covariates {
        let values: Array1<f64> = (0..len).map(|_| rng.gen::<f64>() * 10.0).collect();
        series.insert_column(format!("cov_{}", c), values).unwrap();
    }

    let target: Array1<f64> = (0..len)
        .map(|i| 100.0 + 20.0 * ((i % 24) as f64 / 24.0 * std::f64::consts::TAU).sin() + rng.gen::<f64>())
        .collect();
    let reference = target.mapv(|v| v + 2.0);
    series.insert_column("target", target).unwrap();
    series.insert_column("reference", reference).unwrap();
    series
}

fn covariates(n: usize) -> Vec<String> {
    (0..n).map(|c| format!("cov_{}", c)).collect()
}

fn bench_feature_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("features");

    for len in [2_000, 8_000].iter() {
        let series = create_series(*len, 20);
        let covs = covariates(20);
        let plan = WindowIndexer::new(WindowConfig::default())
            .unwrap()
            .plan(*len, len * 4 / 5);
        let extractor = FeatureExtractor::new(&series, "target", &covs, FeatureConfig::default()).unwrap();

        group.bench_with_input(BenchmarkId::new("matrix", len), &plan, |b, plan| {
            b.iter(|| extractor.matrix(black_box(&plan.train_starts), 12).unwrap())
        });
    }

    group.finish();
}

fn bench_stacking_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("stacking");
    group.sample_size(10);

    let series = create_series(8_000, 20);
    let covs = covariates(20);
    let plan = WindowIndexer::new(WindowConfig::default()).unwrap().plan(8_000, 6_400);
    let extractor = FeatureExtractor::new(&series, "target", &covs, FeatureConfig::default()).unwrap();
    let x = extractor.matrix(&plan.train_starts, 0).unwrap();
    let y = extractor.targets(&plan.train_starts, 0);
    let reference: Array1<f64> = plan
        .train_starts
        .iter()
        .map(|&s| series.column("reference").unwrap()[s])
        .collect();

    group.bench_function("fit_default_pool", |b| {
        b.iter(|| {
            let mut stack = StackingRegressor::new(StackingConfig::default(), BaseModelPool::default_energy());
            stack.fit(black_box(&x), black_box(&y), &[&reference]).unwrap()
        })
    });

    group.finish();
}

fn bench_horizon_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("horizon_loop");
    group.sample_size(10);

    let series = create_series(4_000, 10);
    let target = TargetConfig::new(
        "target",
        "target",
        "reference",
        CovariateSet::Custom { columns: covariates(10) },
    );

    for parallel in [false, true] {
        let config = ForecastConfig::default()
            .with_targets(vec![target.clone()])
            .with_base_models(
                BaseModelPool::mean_only().with_model("ridge", stackcast::training::ModelSpec::Ridge { alpha: 1.0 }),
            )
            .with_test_start(TestBoundary::Index(3_200))
            .with_parallel_horizons(parallel);
        let forecaster = StackingForecaster::new(&series, config).unwrap();

        group.bench_with_input(BenchmarkId::new("forecast_target", parallel), &target, |b, target| {
            b.iter(|| forecaster.forecast_target(black_box(target), None).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_feature_matrix, bench_stacking_step, bench_horizon_loop);
criterion_main!(benches);
