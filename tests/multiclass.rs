use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use rust_nn::{
    Adam, CategoricalCrossEntropy, Dense, FitConfig, Matrix, ReLU, Sequential, Sgd, Shuffle,
    Softmax, accuracy,
};

const CENTERS: [(f64, f64); 3] = [(0.0, 0.0), (3.0, 0.0), (0.0, 3.0)];

/// Three Gaussian blobs, one-hot labels.
fn clusters(per_class: usize, seed: u64) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.4).unwrap();

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    // Classes are interleaved so contiguous batches stay balanced.
    for _ in 0..per_class {
        for (class, &(cx, cy)) in CENTERS.iter().enumerate() {
            xs.push(vec![cx + noise.sample(&mut rng), cy + noise.sample(&mut rng)]);
            let mut one_hot = vec![0.0; CENTERS.len()];
            one_hot[class] = 1.0;
            ys.push(one_hot);
        }
    }
    (Matrix::from_rows(&xs).unwrap(), Matrix::from_rows(&ys).unwrap())
}

fn classifier(seed: u64) -> Sequential {
    let mut model = Sequential::new();
    model
        .add(Dense::new_with_seed(2, 16, seed).unwrap())
        .add(ReLU::new())
        .add(Dense::new_with_seed(16, 8, seed + 1).unwrap())
        .add(ReLU::new())
        .add(Dense::new_with_seed(8, 3, seed + 2).unwrap())
        .add(Softmax::new());
    model
}

#[test]
fn softmax_classifier_separates_three_clusters() {
    let (x, y) = clusters(30, 7);

    let mut model = classifier(0);
    model.compile(CategoricalCrossEntropy::new(), Adam::new(0.01).unwrap());
    let report = model.fit_with(&x, &y, 300, 10, false).unwrap();

    let first = report.epoch_losses[0];
    let last = report.final_loss().unwrap();
    assert!(last < first, "{first} -> {last}");

    let pred = model.predict(&x).unwrap();
    for r in 0..pred.rows() {
        let sum: f64 = pred.row(r).iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
    let acc = accuracy(&pred, &y).unwrap();
    assert!(acc >= 0.95, "accuracy {acc}");
}

#[test]
fn shuffled_sgd_training_also_learns() {
    let (x, y) = clusters(20, 11);

    let mut model = classifier(5);
    model.compile(
        CategoricalCrossEntropy::new(),
        Sgd::new(0.1, 0.9).unwrap(),
    );
    let cfg = FitConfig {
        epochs: 200,
        batch_size: 8,
        verbose: false,
        shuffle: Shuffle::Seeded(3),
    };
    let before = model.evaluate(&x, &y).unwrap();
    model.fit(&x, &y, &cfg).unwrap();
    let after = model.evaluate(&x, &y).unwrap();

    assert!(after < before, "{before} -> {after}");
}

#[test]
fn pass_through_softmax_does_not_learn_with_raw_cross_entropy() {
    // The identity backward leaves the raw −y/p gradient uncorrected, so only the
    // true-class logit of each sample is ever pushed.
    let (x, y) = clusters(20, 13);

    let train = |softmax: Softmax| {
        let mut model = Sequential::new();
        model
            .add(Dense::new_with_seed(2, 16, 1).unwrap())
            .add(ReLU::new())
            .add(Dense::new_with_seed(16, 3, 2).unwrap())
            .add(softmax)
            .compile(CategoricalCrossEntropy::new(), Adam::new(0.01).unwrap());
        model.fit_with(&x, &y, 200, 10, false).unwrap();
        model.evaluate(&x, &y).unwrap()
    };

    let jacobian = train(Softmax::new());
    let identity = train(Softmax::pass_through());
    assert!(jacobian < identity, "jacobian {jacobian} vs identity {identity}");
}
