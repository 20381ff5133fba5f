use rust_nn::{Dense, Matrix, MeanSquaredError, ReLU, Sequential, Sgd};

fn main() -> rust_nn::Result<()> {
    // y = sin(x) on [-3, 3].
    let n = 64;
    let xs: Vec<Vec<f64>> = (0..n)
        .map(|i| vec![-3.0 + 6.0 * i as f64 / (n - 1) as f64])
        .collect();
    let ys: Vec<Vec<f64>> = xs.iter().map(|x| vec![x[0].sin()]).collect();
    let x = Matrix::from_rows(&xs)?;
    let y = Matrix::from_rows(&ys)?;

    let mut model = Sequential::new();
    model
        .add(Dense::new_with_seed(1, 32, 0)?)
        .add(ReLU::new())
        .add(Dense::new_with_seed(32, 1, 1)?)
        .compile(MeanSquaredError, Sgd::new(0.1, 0.9)?);

    let report = model.fit_with(&x, &y, 500, 16, false)?;
    println!("final loss={:?}", report.final_loss());

    let pred = model.predict(&x)?;
    for r in (0..n).step_by(8) {
        println!(
            "x={:+.3} sin={:+.3} pred={:+.3}",
            x[(r, 0)],
            y[(r, 0)],
            pred[(r, 0)]
        );
    }
    Ok(())
}
