use std::f64::consts::SQRT_2;

use ndarray::{ArrayView1, ArrayView2};

use crate::consts::{MIN_CANDIDATES, TEMPORAL_EPSILON, WEIGHT_EPSILON};
use crate::image::{FusionSources, MaskView, Pixel};
use crate::options::EstarfmOptions;
use crate::regression::regress;

/// Everything needed to predict one output pixel. All 2D views cover the
/// same window, clipped at the image border.
#[derive(Clone, Debug)]
pub struct PixelInputs<'a, H, L> {
    pub window: FusionSources<'a, H, L>,
    pub mask: MaskView<'a>,
    pub local_weights: ArrayView2<'a, f64>,
    pub distance_weights: ArrayView2<'a, f64>,
    /// (col, row) of the predicted pixel inside the window.
    pub center: (usize, usize),
    pub tol1: ArrayView1<'a, f64>,
    pub tol3: ArrayView1<'a, f64>,
    pub sum_low1: ArrayView1<'a, f64>,
    pub sum_low2: ArrayView1<'a, f64>,
    pub sum_low3: ArrayView1<'a, f64>,
}

/// Normalized weights of the date 1 and date 3 anchors.
///
/// The anchor whose low resolution window changed less towards date 2 gets
/// the larger weight.
pub fn temporal_weights(sum_low1: f64, sum_low2: f64, sum_low3: f64) -> (f64, f64) {
    let t1 = 1.0 / ((sum_low1 - sum_low2).abs() + TEMPORAL_EPSILON);
    let t3 = 1.0 / ((sum_low3 - sum_low2).abs() + TEMPORAL_EPSILON);
    let total = t1 + t3;
    (t1 / total, t3 / total)
}

/// Predicts single pixels. Holds scratch buffers reused across calls; the
/// result of a call depends only on its inputs.
#[derive(Debug, Default)]
pub struct PixelPredictor {
    candidates: Vec<(usize, usize)>,
    lows: Vec<f64>,
    highs: Vec<f64>,
}

impl PixelPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of similar pixels found by the last call to [`predict`](Self::predict).
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Predict every channel of the center pixel. `out[c]` is `None` where
    /// the center is invalid for channel `c`.
    pub fn predict<H: Pixel, L: Pixel>(
        &mut self,
        px: &PixelInputs<'_, H, L>,
        options: &EstarfmOptions,
        out: &mut [Option<f64>],
    ) {
        let (cx, cy) = px.center;
        self.select_candidates(px);
        for (c, slot) in out.iter_mut().enumerate().take(px.window.channels()) {
            *slot = if px.mask.is_valid(cx, cy, c) {
                Some(self.predict_channel(px, options, c))
            } else {
                None
            };
        }
    }

    /// A window pixel is a candidate if it is valid and similar to the
    /// center at both dates, in every channel.
    fn select_candidates<H: Pixel, L: Pixel>(&mut self, px: &PixelInputs<'_, H, L>) {
        self.candidates.clear();
        let w = &px.window;
        let (cx, cy) = px.center;
        let channels = w.channels();

        for y in 0..w.height() {
            for x in 0..w.width() {
                let similar = (0..channels).all(|c| {
                    px.mask.is_valid(x, y, c)
                        && (w.high1[[cy, cx, c]].to_f64() - w.high1[[y, x, c]].to_f64()).abs()
                            <= px.tol1[c]
                        && (w.high3[[cy, cx, c]].to_f64() - w.high3[[y, x, c]].to_f64()).abs()
                            <= px.tol3[c]
                });
                if similar {
                    self.candidates.push((x, y));
                }
            }
        }
    }

    fn predict_channel<H: Pixel, L: Pixel>(
        &mut self,
        px: &PixelInputs<'_, H, L>,
        options: &EstarfmOptions,
        c: usize,
    ) -> f64 {
        let w = &px.window;
        let (cx, cy) = px.center;
        let center_high1 = w.high1[[cy, cx, c]].to_f64();
        let center_high3 = w.high3[[cy, cx, c]].to_f64();
        let (t1, t3) = temporal_weights(px.sum_low1[c], px.sum_low2[c], px.sum_low3[c]);

        if self.candidates.len() < MIN_CANDIDATES {
            return t1 * center_high1 + t3 * center_high3;
        }

        self.lows.clear();
        self.highs.clear();
        let mut sum_weight = 0.0;
        let mut sum_delta1 = 0.0;
        let mut sum_delta3 = 0.0;
        let mut sum_high1 = 0.0;
        let mut sum_high3 = 0.0;

        for &(x, y) in &self.candidates {
            let r = px.local_weights[[y, x]];
            let d = px.distance_weights[[y, x]];
            let weight = 1.0 / ((1.0 - r) * d + WEIGHT_EPSILON);

            let low1 = w.low1[[y, x, c]].to_f64();
            let low2 = w.low2[[y, x, c]].to_f64();
            let low3 = w.low3[[y, x, c]].to_f64();
            let high1 = w.high1[[y, x, c]].to_f64();
            let high3 = w.high3[[y, x, c]].to_f64();

            sum_weight += weight;
            sum_delta1 += (low2 - low1) * weight;
            sum_delta3 += (low2 - low3) * weight;
            sum_high1 += high1 * weight;
            sum_high3 += high3 * weight;

            self.lows.push(low1);
            self.highs.push(high1);
            self.lows.push(low3);
            self.highs.push(high3);
        }

        let b = self.regression_coefficient(options);
        let pred1 = center_high1 + b * sum_delta1 / sum_weight;
        let pred3 = center_high3 + b * sum_delta3 / sum_weight;
        let value = t1 * pred1 + t3 * pred3;

        match options.data_range {
            Some(range) if !range.contains(value) => {
                t1 * (sum_high1 / sum_weight) + t3 * (sum_high3 / sum_weight)
            }
            _ => value,
        }
    }

    /// Regression coefficient over the collected (low, high) candidate pairs.
    ///
    /// With a data range set, candidates whose low resolution spread already
    /// exceeds the sensor uncertainty skip the fit and use 1.
    fn regression_coefficient(&self, options: &EstarfmOptions) -> f64 {
        if let Some(range) = options.data_range {
            let uncertainty = range.max * options.uncertainty_factor * SQRT_2;
            if sample_stddev(&self.lows) > uncertainty {
                return 1.0;
            }
        }
        regress(&self.lows, &self.highs, options.use_quality_weighted_regression)
    }
}

/// Bessel-corrected standard deviation, `sqrt(n / (n - 1))` times the
/// population value.
fn sample_stddev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / nf;
    var.sqrt() * (nf / (nf - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal_weights_symmetric() {
        let (t1, t3) = temporal_weights(10.0, 12.0, 14.0);
        assert_eq!(t1, 0.5);
        assert_eq!(t3, 0.5);
    }

    #[test]
    fn test_temporal_weights_prefer_smaller_change() {
        let (t1, t3) = temporal_weights(10.0, 11.0, 14.0);
        assert!(t1 > t3);
        assert!((t1 + t3 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_stddev() {
        assert_eq!(sample_stddev(&[5.0]), 0.0);
        // population variance 1, n = 2 -> sample variance 2
        assert!((sample_stddev(&[1.0, 3.0]) - 2f64.sqrt()).abs() < 1e-12);
    }
}
