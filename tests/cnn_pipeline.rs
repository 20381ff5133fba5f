use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rust_nn::{
    Adam, CategoricalCrossEntropy, Conv2D, Dense, Error, Layer, Loss, Matrix, MaxPool2D, Pass,
    ReLU, Sequential, Softmax, Tensor3D, accuracy,
};

const SIZE: usize = 6;

/// Vertical bars are class 0, horizontal bars class 1.
fn bars(n: usize, seed: u64) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let vertical = i % 2 == 0;
        let line = rng.gen_range(0..SIZE);
        let mut img = Tensor3D::new(1, SIZE, SIZE);
        for k in 0..SIZE {
            let (h, w) = if vertical { (k, line) } else { (line, k) };
            img[(0, h, w)] = 1.0;
        }
        for v in img.as_mut_slice() {
            *v += rng.gen_range(-0.05..0.05);
        }
        xs.push(img.into_vec());
        ys.push(if vertical { vec![1.0, 0.0] } else { vec![0.0, 1.0] });
    }
    (Matrix::from_rows(&xs).unwrap(), Matrix::from_rows(&ys).unwrap())
}

/// conv 3x3 (4 filters) → ReLU → maxpool 2x2 → dense → softmax.
fn cnn(seed: u64) -> Sequential {
    let mut model = Sequential::new();
    model
        .add(
            Conv2D::new_with_seed(4, 1, 3, 1, 0, seed)
                .unwrap()
                .with_input_size(SIZE, SIZE),
        )
        .add(ReLU::new())
        .add(MaxPool2D::new(2, 2).unwrap().with_input_shape(4, 4, 4))
        .add(Dense::new_with_seed(4 * 2 * 2, 2, seed + 1).unwrap())
        .add(Softmax::new());
    model
}

#[test]
fn conv_pipeline_trains_inside_sequential() {
    let (x, y) = bars(40, 1);
    let mut model = cnn(0);
    model.compile(CategoricalCrossEntropy::new(), Adam::new(0.01).unwrap());
    assert_eq!(model.num_parameters(), 4 * 9 + 4 + 16 * 2 + 2);

    let report = model.fit_with(&x, &y, 60, 8, false).unwrap();
    let first = report.epoch_losses[0];
    let last = report.final_loss().unwrap();
    assert!(last < first, "{first} -> {last}");

    let pred = model.predict(&x).unwrap();
    assert_eq!(pred.shape(), (40, 2));
    assert!(accuracy(&pred, &y).unwrap() > 0.5);
}

fn loss_at(model: &mut Sequential, x: &Matrix, y: &Matrix) -> f64 {
    let pred = model.forward(x).unwrap();
    CategoricalCrossEntropy::new().forward(&pred, y).unwrap()
}

fn nudge(model: &mut Sequential, layer: usize, param: usize, idx: usize, delta: f64) {
    let layer = model.layer_mut(layer).unwrap();
    let mut params = layer.parameters_mut();
    params[param].value.as_mut_slice()[idx] += delta;
}

#[test]
fn pipeline_gradients_match_finite_differences() {
    // A single sample, so batch averaging does not rescale the parameter gradients.
    let (x, y) = bars(1, 9);
    let mut model = cnn(4);

    let pred = model.forward(&x).unwrap();
    let grad = CategoricalCrossEntropy::new().backward(&pred, &y).unwrap();
    model.backward(&grad).unwrap();

    let eps = 1e-6;
    for (layer, param) in [(0, 0), (0, 1), (3, 0), (3, 1)] {
        let analytic = model.layer(layer).unwrap().gradients()[param].clone();
        for idx in 0..analytic.len() {
            nudge(&mut model, layer, param, idx, eps);
            let plus = loss_at(&mut model, &x, &y);
            nudge(&mut model, layer, param, idx, -2.0 * eps);
            let minus = loss_at(&mut model, &x, &y);
            nudge(&mut model, layer, param, idx, eps);

            let numeric = (plus - minus) / (2.0 * eps);
            assert_abs_diff_eq!(analytic.as_slice()[idx], numeric, epsilon = 1e-5);
        }
    }
}

#[test]
fn shape_errors_report_the_failing_layer() {
    let mut model = cnn(0);
    let err = model.forward(&Matrix::new(2, 35)).unwrap_err();
    assert!(matches!(
        err,
        Error::Layer {
            index: 0,
            layer: "Conv2D",
            pass: Pass::Forward,
            ..
        }
    ));
    assert!(err.to_string().contains("layer 0"));

    // A pool sized for the wrong conv output fails at its own index.
    let mut model = Sequential::new();
    model
        .add(Conv2D::new_with_seed(2, 1, 3, 1, 0, 0).unwrap().with_input_size(SIZE, SIZE))
        .add(MaxPool2D::new(2, 2).unwrap().with_input_shape(4, 4, 4));
    let err = model.forward(&Matrix::new(1, SIZE * SIZE)).unwrap_err();
    assert!(matches!(
        err.root(),
        Error::InputShapeMismatch {
            layer: "MaxPool2D",
            expected: 64,
            got: 32,
        }
    ));
    assert!(matches!(err, Error::Layer { index: 1, .. }));
}
