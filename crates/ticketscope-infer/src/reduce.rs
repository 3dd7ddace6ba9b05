//! Seeded random projection to a small number of components.

use ndarray::{Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

use ticketscope_core::{Error, ReductionParams, Result};

/// Gaussian random projection. The same seed and input dimension always
/// produce the same matrix.
pub struct RandomProjection {
    matrix: Array2<f32>,
}

impl RandomProjection {
    pub fn new(input_dim: usize, params: &ReductionParams) -> Result<Self> {
        if params.n_components == 0 || input_dim == 0 {
            return Err(Error::Inference(format!(
                "Invalid projection {} -> {}",
                input_dim, params.n_components
            )));
        }
        let mut rng = StdRng::seed_from_u64(params.seed);
        let scale = 1.0 / (params.n_components as f32).sqrt();
        let matrix = Array2::from_shape_fn((input_dim, params.n_components), |_| {
            gaussian(&mut rng) * scale
        });
        Ok(Self { matrix })
    }

    /// Project rows and L2-normalize them.
    pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.matrix.nrows() {
            return Err(Error::Inference(format!(
                "Projection expects {} columns, got {}",
                self.matrix.nrows(),
                x.ncols()
            )));
        }
        let mut out = x.dot(&self.matrix);
        for mut row in out.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }
        Ok(out)
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f32 {
    // `random` is uniform in [0, 1); flip it so the log never sees zero.
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}
