use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rust_nn::{
    Adam, CategoricalCrossEntropy, Conv2D, Dense, Matrix, MaxPool2D, ReLU, Sequential, Softmax,
    Tensor3D, accuracy,
};

const SIZE: usize = 8;

fn main() -> rust_nn::Result<()> {
    // Vertical vs horizontal bars on a noisy 8x8 canvas.
    let mut rng = StdRng::seed_from_u64(0);
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for i in 0..200 {
        let vertical = i % 2 == 0;
        let line = rng.gen_range(0..SIZE);
        let mut img = Tensor3D::new(1, SIZE, SIZE);
        for k in 0..SIZE {
            let (h, w) = if vertical { (k, line) } else { (line, k) };
            img.set(0, h, w, 1.0)?;
        }
        for v in img.as_mut_slice() {
            *v += rng.gen_range(-0.1..0.1);
        }
        xs.push(img.into_vec());
        ys.push(if vertical { vec![1.0, 0.0] } else { vec![0.0, 1.0] });
    }
    let x = Matrix::from_rows(&xs)?;
    let y = Matrix::from_rows(&ys)?;

    // 1x8x8 -> conv 3x3 pad 1 -> 6x8x8 -> pool 2x2 -> 6x4x4 -> dense -> 2
    let mut model = Sequential::new();
    model
        .add(Conv2D::new_with_seed(6, 1, 3, 1, 1, 0)?.with_input_size(SIZE, SIZE))
        .add(ReLU::new())
        .add(MaxPool2D::new(2, 2)?.with_input_shape(6, SIZE, SIZE))
        .add(Dense::new_with_seed(6 * 4 * 4, 2, 1)?)
        .add(Softmax::new())
        .compile(CategoricalCrossEntropy::new(), Adam::new(0.005)?);
    println!("parameters={}", model.num_parameters());

    let report = model.fit_with(&x, &y, 20, 16, false)?;
    for (epoch, loss) in report.epoch_losses.iter().enumerate() {
        println!("epoch {:2} loss={loss:.4}", epoch + 1);
    }

    let pred = model.predict(&x)?;
    println!("accuracy={}", accuracy(&pred, &y)?);
    Ok(())
}
