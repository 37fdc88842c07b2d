use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hyperion_clustering::{Ahc, Criterion as Cut, Linkage, Metric};
use hyperion_pdfs::{FitOptions, PldaModel, SPlda};
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

fn speakers(num_spks: usize, per_spk: usize, dim: usize, seed: u64) -> (DMatrix<f64>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let between = Normal::new(0.0, 2.0).unwrap();
    let within = Normal::new(0.0, 1.0).unwrap();
    let centers = DMatrix::from_fn(num_spks, dim, |_, _| between.sample(&mut rng));
    let n = num_spks * per_spk;
    let ids: Vec<usize> = (0..n).map(|i| i / per_spk).collect();
    let x = DMatrix::from_fn(n, dim, |i, j| centers[(ids[i], j)] + within.sample(&mut rng));
    (x, ids)
}

fn bench_scoring(c: &mut Criterion) {
    let (x, ids) = speakers(50, 8, 20, 1);
    let mut plda = SPlda::new(10, "plda");
    plda.fit(&x, &ids, &FitOptions::with_epochs(5)).unwrap();

    c.bench_function("splda_llr_1vs1_400x400", |b| {
        b.iter(|| plda.llr_1vs1(black_box(&x), black_box(&x)).unwrap())
    });
}

fn bench_ahc(c: &mut Criterion) {
    let (x, ids) = speakers(50, 8, 20, 2);
    let mut plda = SPlda::new(10, "plda");
    plda.fit(&x, &ids, &FitOptions::with_epochs(5)).unwrap();
    let scores = plda.llr_1vs1(&x, &x).unwrap();

    c.bench_function("ahc_average_llr_400", |b| {
        b.iter(|| {
            let mut ahc = Ahc::new(Linkage::Average, Metric::Llr);
            ahc.fit(black_box(&scores)).unwrap();
            ahc.get_flat_clusters(Cut::NumClusters(50)).unwrap()
        })
    });
}

criterion_group!(benches, bench_scoring, bench_ahc);
criterion_main!(benches);
