//! Weighted ridge regression with an unpenalized intercept, solved in closed form.

use std::time::Instant;

use thiserror::Error;

/// Row-major 0/1 design matrix: one row per perturbed sample, one column per token.
pub struct DesignMatrix {
    data: Vec<f64>,
    cols: usize,
}

impl DesignMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        if self.cols == 0 {
            0
        } else {
            self.data.len() / self.cols
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    /// One coefficient per requested column, in request order.
    pub coef: Vec<f64>,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RidgeError {
    #[error("no samples to fit")]
    NoSamples,
    #[error("all sample weights are zero")]
    ZeroWeight,
    #[error("targets or weights are not finite")]
    NotFinite,
    #[error("normal equations are not positive definite")]
    Singular,
    #[error("deadline passed before the fit finished")]
    DeadlineExceeded,
}

impl RidgeFit {
    /// Weighted coefficient of determination on the fitted columns.
    /// A constant target scores 0.
    pub fn r_squared(
        &self,
        x: &DesignMatrix,
        columns: &[usize],
        y: &[f64],
        weights: &[f64],
    ) -> f64 {
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let y_mean = y.iter().zip(weights).map(|(y, w)| y * w).sum::<f64>() / total;
        let mut rss = 0.0;
        let mut tss = 0.0;
        for (i, (&yi, &w)) in y.iter().zip(weights).enumerate() {
            let predicted = self.intercept
                + columns
                    .iter()
                    .zip(&self.coef)
                    .map(|(&c, b)| b * x.get(i, c))
                    .sum::<f64>();
            rss += w * (yi - predicted).powi(2);
            tss += w * (yi - y_mean).powi(2);
        }
        if tss <= 0.0 {
            0.0
        } else {
            1.0 - rss / tss
        }
    }
}

/// Fits `y ≈ X[:, columns] · coef + intercept`, minimizing
/// `Σ wᵢ (yᵢ - ŷᵢ)² + alpha · ‖coef‖²`.
///
/// Centers by weighted means so the intercept is not penalized, then solves the
/// normal equations by Cholesky decomposition. With a `deadline`, the row and
/// factorization loops stop with `DeadlineExceeded` once it has passed.
pub fn fit_weighted(
    x: &DesignMatrix,
    columns: &[usize],
    y: &[f64],
    weights: &[f64],
    alpha: f64,
    deadline: Option<Instant>,
) -> Result<RidgeFit, RidgeError> {
    let n = x.rows();
    if n == 0 || y.len() != n || weights.len() != n {
        return Err(RidgeError::NoSamples);
    }
    if y.iter().chain(weights).any(|v| !v.is_finite()) {
        return Err(RidgeError::NotFinite);
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(RidgeError::ZeroWeight);
    }

    let p = columns.len();
    let y_mean = y.iter().zip(weights).map(|(y, w)| y * w).sum::<f64>() / total;
    let x_mean: Vec<f64> = columns
        .iter()
        .map(|&c| (0..n).map(|i| x.get(i, c) * weights[i]).sum::<f64>() / total)
        .collect();

    let mut gram = vec![0.0; p * p];
    let mut rhs = vec![0.0; p];
    let mut centered = vec![0.0; p];
    for i in 0..n {
        check_deadline(deadline)?;
        let w = weights[i];
        if w == 0.0 {
            continue;
        }
        for (j, &c) in columns.iter().enumerate() {
            centered[j] = x.get(i, c) - x_mean[j];
        }
        let dy = y[i] - y_mean;
        for j in 0..p {
            let wj = w * centered[j];
            rhs[j] += wj * dy;
            for k in j..p {
                gram[j * p + k] += wj * centered[k];
            }
        }
    }
    for j in 0..p {
        gram[j * p + j] += alpha;
        for k in 0..j {
            gram[j * p + k] = gram[k * p + j];
        }
    }

    let coef = solve_cholesky(&mut gram, rhs, p, deadline)?;
    let intercept = y_mean - coef.iter().zip(&x_mean).map(|(b, m)| b * m).sum::<f64>();
    Ok(RidgeFit { coef, intercept })
}

/// Solves `A x = b` for symmetric positive-definite `A` (row-major, `n × n`), in place.
fn solve_cholesky(
    a: &mut [f64],
    mut b: Vec<f64>,
    n: usize,
    deadline: Option<Instant>,
) -> Result<Vec<f64>, RidgeError> {
    // Lower-triangular factor overwrites the lower half of `a`.
    for j in 0..n {
        check_deadline(deadline)?;
        let mut diag = a[j * n + j];
        for k in 0..j {
            diag -= a[j * n + k] * a[j * n + k];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return Err(RidgeError::Singular);
        }
        let diag = diag.sqrt();
        a[j * n + j] = diag;
        for i in (j + 1)..n {
            let mut v = a[i * n + j];
            for k in 0..j {
                v -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = v / diag;
        }
    }
    // Forward substitution: L z = b
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= a[i * n + k] * b[k];
        }
        b[i] = v / a[i * n + i];
    }
    // Back substitution: Lᵀ x = z
    for i in (0..n).rev() {
        let mut v = b[i];
        for k in (i + 1)..n {
            v -= a[k * n + i] * b[k];
        }
        b[i] = v / a[i * n + i];
    }
    Ok(b)
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), RidgeError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(RidgeError::DeadlineExceeded),
        _ => Ok(()),
    }
}
