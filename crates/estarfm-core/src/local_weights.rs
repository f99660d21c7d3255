use ndarray::Array2;
use tracing::debug;

use crate::error::{FusionError, Result};
use crate::image::{FusionSources, MaskView, Pixel, Rect};

/// Pearson correlation coefficient of two equally long samples.
///
/// Returns NaN if either sample has zero variance or fewer than two elements.
pub fn correlate(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Spectral similarity of the high and low resolution signals at every pixel
/// of `area` (absolute image coordinates).
///
/// Per pixel, the valid channel values of both dates are stacked into one
/// high and one low resolution sample and correlated. Pixels where either
/// sample is constant get weight 1.
pub fn local_weights<H: Pixel, L: Pixel>(
    sources: &FusionSources<'_, H, L>,
    mask: &MaskView<'_>,
    area: Rect,
) -> Result<Array2<f64>> {
    let size = area.size();
    let channels = sources.channels();
    let mut weights = Array2::<f64>::zeros((size.height, size.width));

    let mut high = Vec::with_capacity(2 * channels);
    let mut low = Vec::with_capacity(2 * channels);

    for (row, y) in area.rows().enumerate() {
        for (col, x) in area.cols().enumerate() {
            high.clear();
            low.clear();
            for c in 0..channels {
                if mask.is_valid(x, y, c) {
                    high.push(sources.high1[[y, x, c]].to_f64());
                    low.push(sources.low1[[y, x, c]].to_f64());
                }
            }
            for c in 0..channels {
                if mask.is_valid(x, y, c) {
                    high.push(sources.high3[[y, x, c]].to_f64());
                    low.push(sources.low3[[y, x, c]].to_f64());
                }
            }

            weights[[row, col]] = if is_constant(&high) || is_constant(&low) {
                1.0
            } else {
                let r = correlate(&low, &high);
                if r.is_nan() {
                    return Err(FusionError::Logic(format!(
                        "correlation at pixel ({x}, {y}) is NaN for non-constant samples \
                         high={high:?} low={low:?}"
                    )));
                }
                r
            };
        }
    }

    debug!(area = %area, "Local weights computed");
    Ok(weights)
}
