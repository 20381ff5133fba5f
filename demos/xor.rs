use rust_nn::{Adam, BinaryCrossEntropy, Dense, Matrix, ReLU, Sequential, Sigmoid, accuracy};

fn main() -> rust_nn::Result<()> {
    let x = Matrix::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ])?;
    let y = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;

    let mut model = Sequential::new();
    model
        .add(Dense::new_with_seed(2, 8, 0)?)
        .add(ReLU::new())
        .add(Dense::new_with_seed(8, 1, 1)?)
        .add(Sigmoid::new())
        .compile(BinaryCrossEntropy::new(), Adam::new(0.01)?);

    let report = model.fit_with(&x, &y, 1000, 4, false)?;
    for (epoch, loss) in report.epoch_losses.iter().enumerate().step_by(100) {
        println!("epoch {:4} loss={loss:.6}", epoch + 1);
    }

    let pred = model.predict(&x)?;
    for r in 0..x.rows() {
        println!("{:?} -> {:.4}", x.row(r), pred[(r, 0)]);
    }
    println!("accuracy={}", accuracy(&pred, &y)?);

    Ok(())
}
