use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rust_nn::{
    Adam, CategoricalCrossEntropy, Dense, FitConfig, Matrix, ReLU, Sequential, Shuffle, Softmax,
    accuracy,
};

fn main() -> rust_nn::Result<()> {
    // Tiny synthetic 3-class dataset in 2D, one blob per class.
    let mut rng = StdRng::seed_from_u64(0);

    let centers = [[-1.0_f64, -1.0], [1.0, -1.0], [0.0, 1.0]];
    let n_per_class = 128;
    let mut xs = Vec::with_capacity(3 * n_per_class);
    let mut ys = Vec::with_capacity(3 * n_per_class);

    for (class, center) in centers.iter().enumerate() {
        for _ in 0..n_per_class {
            let x0 = center[0] + rng.gen_range(-0.3..0.3);
            let x1 = center[1] + rng.gen_range(-0.3..0.3);
            xs.push(vec![x0, x1]);

            let mut one_hot = vec![0.0; 3];
            one_hot[class] = 1.0;
            ys.push(one_hot);
        }
    }

    let x = Matrix::from_rows(&xs)?;
    let y = Matrix::from_rows(&ys)?;

    let mut model = Sequential::new();
    model
        .add(Dense::new_with_seed(2, 16, 0)?)
        .add(ReLU::new())
        .add(Dense::new_with_seed(16, 3, 1)?)
        .add(Softmax::new())
        .compile(CategoricalCrossEntropy::new(), Adam::new(0.01)?);

    // Samples are grouped by class, so shuffle every epoch.
    let report = model.fit(
        &x,
        &y,
        &FitConfig {
            epochs: 50,
            batch_size: 32,
            verbose: false,
            shuffle: Shuffle::Seeded(0),
        },
    )?;
    println!("train_loss={:?}", report.final_loss());

    let pred = model.predict(&x)?;
    println!(
        "evaluate: loss={} accuracy={}",
        model.evaluate(&x, &y)?,
        accuracy(&pred, &y)?
    );

    Ok(())
}
