//! Window predictors for the battery residual detector
//!
//! A [`WindowPredictor`] maps the previous `W` battery readings to a
//! prediction of the next one. The residual detector only needs that
//! behaviour; how the predictor was obtained is not its concern.

use serde::{Deserialize, Serialize};

use crate::{MLError, MLResult};

/// Predicts the next value of a series from a fixed-width window
pub trait WindowPredictor: Send + Sync {
    /// Window width `W` this predictor expects
    fn window(&self) -> usize;

    /// Predict one value per window; every window must have `window()` values
    fn predict(&self, windows: &[&[f32]]) -> MLResult<Vec<f32>>;
}

impl<P: WindowPredictor + ?Sized> WindowPredictor for Box<P> {
    fn window(&self) -> usize {
        (**self).window()
    }

    fn predict(&self, windows: &[&[f32]]) -> MLResult<Vec<f32>> {
        (**self).predict(windows)
    }
}

fn check_windows(windows: &[&[f32]], expected: usize) -> MLResult<()> {
    match windows.iter().find(|w| w.len() != expected) {
        Some(w) => Err(MLError::ShapeMismatch {
            expected,
            actual: w.len(),
        }),
        None => Ok(()),
    }
}

/// Ordinary least squares over the window lags, with intercept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Vec<f32>,
    intercept: f32,
}

impl LinearRegression {
    /// Build from known parameters
    pub fn from_parameters(coefficients: Vec<f32>, intercept: f32) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    /// Fit `targets[k] ≈ intercept + coefficients · windows[k]`
    ///
    /// Solves the normal equations in f64. A tiny ridge term on the lag
    /// coefficients keeps near-collinear windows (a flat battery trace)
    /// solvable.
    pub fn fit(windows: &[&[f32]], targets: &[f32]) -> MLResult<Self> {
        let width = windows.first().map(|w| w.len()).unwrap_or(0);
        if windows.is_empty() || width == 0 {
            return Err(MLError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        check_windows(windows, width)?;
        if targets.len() != windows.len() {
            return Err(MLError::ShapeMismatch {
                expected: windows.len(),
                actual: targets.len(),
            });
        }

        // Design columns: [1, x_0 .. x_{W-1}]
        let dim = width + 1;
        let mut xtx = vec![vec![0.0f64; dim]; dim];
        let mut xty = vec![0.0f64; dim];
        let mut row = vec![0.0f64; dim];

        for (window, &target) in windows.iter().zip(targets) {
            row[0] = 1.0;
            for (slot, &x) in row[1..].iter_mut().zip(window.iter()) {
                *slot = x as f64;
            }
            for i in 0..dim {
                xty[i] += row[i] * target as f64;
                for j in 0..dim {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }

        const RIDGE: f64 = 1e-8;
        for (i, r) in xtx.iter_mut().enumerate().skip(1) {
            r[i] += RIDGE;
        }

        let beta = solve(xtx, xty)?;
        Ok(Self {
            intercept: beta[0] as f32,
            coefficients: beta[1..].iter().map(|b| *b as f32).collect(),
        })
    }

    /// Lag coefficients, oldest first
    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Intercept term
    pub fn intercept(&self) -> f32 {
        self.intercept
    }
}

impl WindowPredictor for LinearRegression {
    fn window(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, windows: &[&[f32]]) -> MLResult<Vec<f32>> {
        check_windows(windows, self.window())?;
        Ok(windows
            .iter()
            .map(|w| {
                self.intercept
                    + w.iter()
                        .zip(self.coefficients.iter())
                        .map(|(x, c)| x * c)
                        .sum::<f32>()
            })
            .collect())
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> MLResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .ok_or(MLError::Singular)?;
        if a[pivot][col].abs() < 1e-12 {
            return Err(MLError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for r in (col + 1)..n {
            let factor = a[r][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[r][c] -= factor * a[col][c];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for r in (0..n).rev() {
        let tail: f64 = ((r + 1)..n).map(|c| a[r][c] * x[c]).sum();
        x[r] = (b[r] - tail) / a[r][r];
    }
    Ok(x)
}

/// Predicts that the next value equals the last one in the window
///
/// Needs no artifact, so the residual detector can run without a trained
/// regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistencePredictor {
    window: usize,
}

impl PersistencePredictor {
    /// Create for windows of width `window`
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl WindowPredictor for PersistencePredictor {
    fn window(&self) -> usize {
        self.window
    }

    fn predict(&self, windows: &[&[f32]]) -> MLResult<Vec<f32>> {
        check_windows(windows, self.window)?;
        Ok(windows
            .iter()
            .map(|w| w.last().copied().unwrap_or(0.0))
            .collect())
    }
}
