//! Least squares fit of high against low resolution values with an F-test
//! quality gate.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::consts::{FISHER_ACCEPTANCE, MAX_REGRESSION_SLOPE, REGRESSION_DET_EPSILON};

/// Ordinary least squares line `y = intercept + slope * x`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    /// Regression F statistic with (1, n - 2) degrees of freedom.
    pub f_statistic: f64,
    /// CDF of `f_statistic`; the confidence that the fit explains the data.
    pub fisher: f64,
}

/// Fit a line through the pairs `(x[i], y[i])`.
///
/// Returns `None` for fewer than three samples or if the normal equations
/// are singular (determinant `n * sum((x - mean)^2)` below 1e-14).
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let n = x.len().min(y.len());
    if n <= 2 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let nf = n as f64;
    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_y = y.iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        let dx = a - mean_x;
        sxx += dx * dx;
        sxy += dx * (b - mean_y);
    }

    let det = nf * sxx;
    if det.is_nan() || det < REGRESSION_DET_EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let ssr = slope * slope * sxx;
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(&a, &b)| {
            let r = b - intercept - slope * a;
            r * r
        })
        .sum();
    let dof = (n - 2) as f64;
    let f_statistic = ssr / (sse / dof);
    let fisher = fisher_cdf(f_statistic, 1.0, dof);

    Some(LineFit {
        intercept,
        slope,
        f_statistic,
        fisher,
    })
}

/// Regression coefficient used to scale the low resolution change.
///
/// Falls back to 1 (no regression effect) when the fit is impossible, the
/// slope leaves `[0, 5]` or the F statistic is undefined. Without quality
/// weighting a fit must reach 95% confidence; with it, the slope is blended
/// towards 1 by the missing confidence.
pub fn regress(x: &[f64], y: &[f64], quality_weighted: bool) -> f64 {
    let Some(fit) = fit_line(x, y) else {
        return 1.0;
    };
    if !(0.0..=MAX_REGRESSION_SLOPE).contains(&fit.slope) || fit.fisher.is_nan() {
        return 1.0;
    }
    if quality_weighted {
        fit.slope * fit.fisher + (1.0 - fit.fisher)
    } else if fit.fisher >= FISHER_ACCEPTANCE {
        fit.slope
    } else {
        1.0
    }
}

/// CDF of the F distribution with `d1` and `d2` degrees of freedom.
///
/// NaN for NaN input or invalid degrees of freedom.
pub fn fisher_cdf(f: f64, d1: f64, d2: f64) -> f64 {
    if f.is_nan() {
        return f64::NAN;
    }
    let Ok(dist) = FisherSnedecor::new(d1, d2) else {
        return f64::NAN;
    };
    if f <= 0.0 {
        return 0.0;
    }
    if f.is_infinite() {
        return 1.0;
    }
    dist.cdf(f)
}
