//! Criterion benchmarks for churn-rf: forest training and prediction on a
//! customer-table-sized problem.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use churn_rf::RandomForestConfig;

fn make_customers(n_samples: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let churned = i % 4 == 0;
        let base = if churned { 0.0 } else { 30.0 };
        let mut row = vec![base + rng.gen_range(0.0..40.0), rng.gen_range(20.0..110.0)];
        row.extend((0..17).map(|_| f64::from(rng.gen_range(0..3u8))));
        features.push(row);
        labels.push(usize::from(churned));
    }
    let names = (0..19).map(|f| format!("f{f}")).collect();
    (features, labels, names)
}

fn bench_rf_train(c: &mut Criterion) {
    let (features, labels, names) = make_customers(2000, 42);
    let cfg = RandomForestConfig::new(100).unwrap().with_seed(42);

    c.bench_function("rf_train_2000x19_100trees", |b| {
        b.iter(|| cfg.fit(&features, &labels, &names).unwrap());
    });
}

fn bench_rf_predict_batch(c: &mut Criterion) {
    let (features, labels, names) = make_customers(2000, 42);
    let forest = RandomForestConfig::new(100)
        .unwrap()
        .fit(&features, &labels, &names)
        .unwrap()
        .into_forest();

    c.bench_function("rf_predict_proba_batch_2000x19", |b| {
        b.iter(|| forest.predict_proba_batch(&features).unwrap());
    });
}

criterion_group!(benches, bench_rf_train, bench_rf_predict_batch);
criterion_main!(benches);
