//! Epoch training, prediction and evaluation for [`Sequential`].

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Matrix, Result, Sequential};

/// Sample order within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shuffle {
    /// Contiguous batches in dataset order.
    #[default]
    None,
    /// Permute samples before every epoch using an RNG seeded once per `fit` call.
    Seeded(u64),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Log every epoch at info level instead of debug.
    pub verbose: bool,
    pub shuffle: Shuffle,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            verbose: false,
            shuffle: Shuffle::None,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(())
    }

    /// Parse a config from JSON. Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("invalid fit config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Average batch loss of every epoch, in order.
    pub epoch_losses: Vec<f64>,
}

impl FitReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

fn validate_pair(x: &Matrix, y: &Matrix) -> Result<()> {
    if x.rows() != y.rows() {
        return Err(Error::InvalidData(format!(
            "x has {} samples but y has {}",
            x.rows(),
            y.rows()
        )));
    }
    if x.rows() == 0 {
        return Err(Error::InvalidData("dataset must not be empty".to_owned()));
    }
    Ok(())
}

impl Sequential {
    /// Trains for `cfg.epochs` epochs of mini-batches.
    ///
    /// Each epoch is split into batches of `cfg.batch_size` samples (the last batch may be
    /// shorter). The epoch loss is the plain mean of the batch losses, so a short final
    /// batch weighs as much as a full one.
    pub fn fit(&mut self, x: &Matrix, y: &Matrix, cfg: &FitConfig) -> Result<FitReport> {
        if !self.is_compiled() {
            return Err(Error::NotCompiled);
        }
        cfg.validate()?;
        validate_pair(x, y)?;

        let n = x.rows();
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = match cfg.shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
        };

        let mut epoch_losses = Vec::with_capacity(cfg.epochs);
        for epoch in 0..cfg.epochs {
            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }

            let mut total = 0.0;
            let mut batches = 0_usize;
            for chunk in order.chunks(cfg.batch_size) {
                let (bx, by) = match cfg.shuffle {
                    Shuffle::None => {
                        let start = chunk[0];
                        let end = start + chunk.len();
                        (x.slice_rows(start, end)?, y.slice_rows(start, end)?)
                    }
                    Shuffle::Seeded(_) => (x.select_rows(chunk)?, y.select_rows(chunk)?),
                };
                total += self.train_on_batch(&bx, &by)?;
                batches += 1;
            }

            let loss = total / batches as f64;
            if cfg.verbose {
                log::info!("epoch {}/{} - loss: {loss:.6}", epoch + 1, cfg.epochs);
            } else {
                log::debug!("epoch {}/{} - loss: {loss:.6}", epoch + 1, cfg.epochs);
            }
            epoch_losses.push(loss);
        }

        Ok(FitReport { epoch_losses })
    }

    /// `fit` with contiguous batches.
    pub fn fit_with(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        epochs: usize,
        batch_size: usize,
        verbose: bool,
    ) -> Result<FitReport> {
        let cfg = FitConfig {
            epochs,
            batch_size,
            verbose,
            shuffle: Shuffle::None,
        };
        self.fit(x, y, &cfg)
    }

    /// Forward pass without a loss. Works on an uncompiled model.
    pub fn predict(&mut self, x: &Matrix) -> Result<Matrix> {
        self.forward(x)
    }

    /// Loss on `(x, y)` without touching any parameter.
    pub fn evaluate(&mut self, x: &Matrix, y: &Matrix) -> Result<f64> {
        if !self.is_compiled() {
            return Err(Error::NotCompiled);
        }
        let pred = self.forward(x)?;
        let loss = self.loss().ok_or(Error::NotCompiled)?;
        loss.forward(&pred, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Adam, Dense, MeanSquaredError, Sgd};

    fn linear_data() -> (Matrix, Matrix) {
        // y = 2x - 1
        let xs: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 / 10.0]).collect();
        let ys: Vec<Vec<f64>> = xs.iter().map(|x| vec![2.0 * x[0] - 1.0]).collect();
        (Matrix::from_rows(&xs).unwrap(), Matrix::from_rows(&ys).unwrap())
    }

    fn linear_model() -> Sequential {
        let mut model = Sequential::new();
        model
            .add(Dense::new_with_seed(1, 1, 0).unwrap())
            .compile(MeanSquaredError, Sgd::new(1.0, 0.0).unwrap());
        model
    }

    #[test]
    fn fit_validates_inputs() {
        let (x, y) = linear_data();
        let mut model = linear_model();

        let bad = FitConfig {
            epochs: 0,
            ..FitConfig::default()
        };
        assert!(matches!(
            model.fit(&x, &y, &bad).unwrap_err(),
            Error::InvalidConfig(_)
        ));
        assert!(matches!(
            model.fit_with(&x, &y, 1, 0, false).unwrap_err(),
            Error::InvalidConfig(_)
        ));
        assert!(matches!(
            model
                .fit_with(&x, &y.slice_rows(0, 9).unwrap(), 1, 4, false)
                .unwrap_err(),
            Error::InvalidData(_)
        ));
        assert!(matches!(
            model
                .fit_with(&Matrix::new(0, 1), &Matrix::new(0, 1), 1, 4, false)
                .unwrap_err(),
            Error::InvalidData(_)
        ));

        let mut uncompiled = Sequential::new();
        uncompiled.add(Dense::new_with_seed(1, 1, 0).unwrap());
        assert_eq!(
            uncompiled.fit_with(&x, &y, 1, 4, false).unwrap_err(),
            Error::NotCompiled
        );
        assert_eq!(uncompiled.evaluate(&x, &y).unwrap_err(), Error::NotCompiled);
        assert_eq!(uncompiled.predict(&x).unwrap().shape(), (10, 1));
    }

    #[test]
    fn epoch_loss_is_unweighted_mean_of_batch_losses() {
        let (x, y) = linear_data();

        // Replay the first epoch by hand on an identical model: batches of 4, 4, 2.
        let mut manual = linear_model();
        let mut losses = Vec::new();
        for (start, end) in [(0, 4), (4, 8), (8, 10)] {
            let bx = x.slice_rows(start, end).unwrap();
            let by = y.slice_rows(start, end).unwrap();
            losses.push(manual.train_on_batch(&bx, &by).unwrap());
        }
        let expected = losses.iter().sum::<f64>() / 3.0;

        let mut model = linear_model();
        let report = model.fit_with(&x, &y, 1, 4, false).unwrap();
        assert_eq!(report.epoch_losses, vec![expected]);
        assert_eq!(report.final_loss(), Some(expected));
    }

    #[test]
    fn fit_learns_a_line() {
        let (x, y) = linear_data();
        let mut model = linear_model();

        let before = model.evaluate(&x, &y).unwrap();
        let report = model.fit_with(&x, &y, 500, 5, false).unwrap();
        let after = model.evaluate(&x, &y).unwrap();

        assert_eq!(report.epoch_losses.len(), 500);
        assert!(after < before);
        assert!(after < 1e-4, "loss after training: {after}");
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let (x, y) = linear_data();
        let cfg = FitConfig {
            epochs: 5,
            batch_size: 3,
            verbose: false,
            shuffle: Shuffle::Seeded(42),
        };

        let run = || {
            let mut model = Sequential::new();
            model
                .add(Dense::new_with_seed(1, 1, 0).unwrap())
                .compile(MeanSquaredError, Adam::new(0.05).unwrap());
            model.fit(&x, &y, &cfg).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn evaluate_does_not_change_parameters() {
        let (x, y) = linear_data();
        let mut model = linear_model();
        let before = model.layer(0).unwrap().parameters()[0].clone();
        model.evaluate(&x, &y).unwrap();
        model.predict(&x).unwrap();
        assert_eq!(&before, model.layer(0).unwrap().parameters()[0]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn fit_config_from_json_fills_defaults() {
        let cfg = FitConfig::from_json_str(r#"{"epochs": 3, "shuffle": {"Seeded": 7}}"#).unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.shuffle, Shuffle::Seeded(7));

        assert!(FitConfig::from_json_str(r#"{"batch_size": 0}"#).is_err());
        assert!(FitConfig::from_json_str("not json").is_err());
    }
}
