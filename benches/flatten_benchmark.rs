use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meeg_dataset::{flatten, unflatten_samples, DimValues};
use ndarray::Array;

// 50 trials x 306 channels x 200 time points, roughly one Neuromag session
fn sensor_array() -> (ndarray::ArrayD<f64>, Vec<DimValues>) {
    let data = Array::from_shape_fn((50, 306, 200), |(r, c, t)| (r + c + t) as f64).into_dyn();
    let labels: Vec<String> = (0..306).map(|i| format!("MEG{:04}", i + 1)).collect();
    let times: Vec<f64> = (0..200).map(|t| t as f64 / 1000.0).collect();
    (data, vec![DimValues::Labels(labels), DimValues::Numeric(times)])
}

pub fn bench_flatten(c: &mut Criterion) {
    let (data, values) = sensor_array();

    c.bench_function("flatten_trial_chan_time", |b| {
        b.iter(|| {
            let ds = flatten(black_box(data.view()), &["chan", "time"], values.clone());
            black_box(ds.is_ok())
        });
    });
}

pub fn bench_unflatten(c: &mut Criterion) {
    let (data, values) = sensor_array();
    let ds = match flatten(data.view(), &["chan", "time"], values) {
        Ok(ds) => ds,
        Err(e) => {
            println!("Skipping benchmark: {}", e);
            return;
        }
    };

    c.bench_function("unflatten_trial_chan_time", |b| {
        b.iter(|| black_box(unflatten_samples(black_box(&ds)).is_ok()));
    });

    // reversed column order forces the scatter path
    let reversed: Vec<usize> = (0..ds.nfeatures()).rev().collect();
    if let Ok(shuffled) = ds.slice_features(&reversed) {
        c.bench_function("unflatten_reordered_features", |b| {
            b.iter(|| black_box(unflatten_samples(black_box(&shuffled)).is_ok()));
        });
    }
}

criterion_group!(benches, bench_flatten, bench_unflatten);
criterion_main!(benches);
