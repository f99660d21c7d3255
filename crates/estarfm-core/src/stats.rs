//! Running window statistics and the moving-window pass computing per-pixel
//! low resolution sums and similarity tolerances.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use ndarray::{s, Array3, ArrayView1};
use tracing::debug;

use crate::image::{FusionSources, MaskView, Pixel, Rect};
use crate::window::window_around;

/// Sum, sum of squares and count of the valid samples of one channel.
///
/// Forms a commutative group under `+` with `-` as inverse, which is what
/// makes the sliding window update possible.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub sum: f64,
    pub sum_sq: f64,
    pub count: f64,
}

impl Moments {
    #[inline]
    pub fn push(&mut self, v: f64) {
        self.sum += v;
        self.sum_sq += v * v;
        self.count += 1.0;
    }

    /// Add (`sign = 1`) or remove (`sign = -1`) one sample.
    #[inline]
    fn push_signed(&mut self, v: f64, sign: f64) {
        self.sum += sign * v;
        self.sum_sq += sign * v * v;
        self.count += sign;
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        }
    }

    /// Population standard deviation, `sqrt(E[x^2] - E[x]^2)`.
    pub fn stddev(&self) -> f64 {
        if self.count <= 0.0 {
            return 0.0;
        }
        let mean = self.sum / self.count;
        (self.sum_sq / self.count - mean * mean).max(0.0).sqrt()
    }
}

impl Add for Moments {
    type Output = Moments;
    fn add(self, rhs: Moments) -> Moments {
        Moments {
            sum: self.sum + rhs.sum,
            sum_sq: self.sum_sq + rhs.sum_sq,
            count: self.count + rhs.count,
        }
    }
}

impl Neg for Moments {
    type Output = Moments;
    fn neg(self) -> Moments {
        Moments {
            sum: -self.sum,
            sum_sq: -self.sum_sq,
            count: -self.count,
        }
    }
}

impl Sub for Moments {
    type Output = Moments;
    fn sub(self, rhs: Moments) -> Moments {
        self + (-rhs)
    }
}

/// One of the five images contributing to window statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    High1,
    High3,
    Low1,
    Low2,
    Low3,
}

impl Source {
    const ALL: [Source; 5] = [
        Source::High1,
        Source::High3,
        Source::Low1,
        Source::Low2,
        Source::Low3,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-channel [`Moments`] of all five images over one window.
///
/// Subtracting a region that was never added is a contract violation: the
/// result no longer describes any window, even if it happens to look valid.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowStats {
    channels: usize,
    moments: Vec<Moments>,
}

impl WindowStats {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            moments: vec![Moments::default(); Source::ALL.len() * channels],
        }
    }

    /// Statistics over `region` (absolute coordinates, inside the image),
    /// counting only pixels valid per `mask`.
    pub fn from_region<H: Pixel, L: Pixel>(
        sources: &FusionSources<'_, H, L>,
        mask: &MaskView<'_>,
        region: Rect,
    ) -> Self {
        let mut stats = Self::new(sources.channels());
        stats.accumulate(sources, mask, region, 1.0);
        stats
    }

    /// Add (`sign = 1`) or subtract (`sign = -1`) the valid pixels of
    /// `region` in place. `region` must lie inside the image.
    pub fn accumulate<H: Pixel, L: Pixel>(
        &mut self,
        sources: &FusionSources<'_, H, L>,
        mask: &MaskView<'_>,
        region: Rect,
        sign: f64,
    ) {
        debug_assert_eq!(self.channels, sources.channels());
        if region.is_empty() {
            return;
        }
        for y in region.rows() {
            for x in region.cols() {
                for c in 0..self.channels {
                    if !mask.is_valid(x, y, c) {
                        continue;
                    }
                    let idx = [y, x, c];
                    self.at_mut(Source::High1, c)
                        .push_signed(sources.high1[idx].to_f64(), sign);
                    self.at_mut(Source::High3, c)
                        .push_signed(sources.high3[idx].to_f64(), sign);
                    self.at_mut(Source::Low1, c)
                        .push_signed(sources.low1[idx].to_f64(), sign);
                    self.at_mut(Source::Low2, c)
                        .push_signed(sources.low2[idx].to_f64(), sign);
                    self.at_mut(Source::Low3, c)
                        .push_signed(sources.low3[idx].to_f64(), sign);
                }
            }
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn at(&self, source: Source, channel: usize) -> Moments {
        self.moments[source.index() * self.channels + channel]
    }

    fn at_mut(&mut self, source: Source, channel: usize) -> &mut Moments {
        &mut self.moments[source.index() * self.channels + channel]
    }
}

impl AddAssign<&WindowStats> for WindowStats {
    fn add_assign(&mut self, rhs: &WindowStats) {
        debug_assert_eq!(self.channels, rhs.channels);
        for (a, &b) in self.moments.iter_mut().zip(&rhs.moments) {
            *a = *a + b;
        }
    }
}

impl SubAssign<&WindowStats> for WindowStats {
    fn sub_assign(&mut self, rhs: &WindowStats) {
        debug_assert_eq!(self.channels, rhs.channels);
        for (a, &b) in self.moments.iter_mut().zip(&rhs.moments) {
            *a = *a - b;
        }
    }
}

/// Similarity tolerances for the high resolution images at dates 1 and 3.
#[derive(Clone, Debug)]
pub enum Tolerance {
    /// One tolerance per channel and prediction pixel, shape (rows, cols, channels).
    Local { tol1: Array3<f64>, tol3: Array3<f64> },
    /// One tolerance per channel for the whole image.
    Global { tol1: Vec<f64>, tol3: Vec<f64> },
}

impl Tolerance {
    /// Image-wide tolerances from the masked mean and stddev of the full
    /// high resolution images.
    pub fn global<H: Pixel, L: Pixel>(
        sources: &FusionSources<'_, H, L>,
        mask: &MaskView<'_>,
        number_classes: f64,
    ) -> Self {
        let full = Rect::new(0, 0, sources.width() as i64, sources.height() as i64);
        let stats = WindowStats::from_region(sources, mask, full);
        let per_channel = |source: Source| -> Vec<f64> {
            (0..stats.channels())
                .map(|c| tolerance_from(stats.at(source, c), number_classes))
                .collect()
        };
        Tolerance::Global {
            tol1: per_channel(Source::High1),
            tol3: per_channel(Source::High3),
        }
    }

    /// Tolerances for the prediction pixel at (`col`, `row`) relative to the
    /// prediction area.
    pub fn at(&self, col: usize, row: usize) -> (ArrayView1<'_, f64>, ArrayView1<'_, f64>) {
        match self {
            Tolerance::Local { tol1, tol3 } => {
                (tol1.slice(s![row, col, ..]), tol3.slice(s![row, col, ..]))
            }
            Tolerance::Global { tol1, tol3 } => (
                ArrayView1::from(tol1.as_slice()),
                ArrayView1::from(tol3.as_slice()),
            ),
        }
    }
}

/// Similarity tolerance of a window: its standard deviation scaled by
/// `2 / number_classes`.
pub fn tolerance_from(moments: Moments, number_classes: f64) -> f64 {
    moments.stddev() * 2.0 / number_classes
}

/// Output of the moving-window pass, all fields shaped
/// (prediction rows, prediction cols, channels).
#[derive(Clone, Debug)]
pub struct SumsAndTolerance {
    pub sum_low1: Array3<f64>,
    pub sum_low2: Array3<f64>,
    pub sum_low3: Array3<f64>,
    pub tolerance: Tolerance,
}

/// Add or subtract a horizontal or vertical strip. The part of the strip
/// outside the image contributes nothing.
fn apply_strip<H: Pixel, L: Pixel>(
    stats: &mut WindowStats,
    sources: &FusionSources<'_, H, L>,
    mask: &MaskView<'_>,
    strip: Rect,
    bounds: &Rect,
    sign: f64,
) {
    stats.accumulate(sources, mask, strip.intersect(bounds), sign);
}

/// Window statistics for every pixel of `pred_area` (absolute coordinates),
/// updated incrementally.
///
/// The first window is summed in full. Moving down one row subtracts the row
/// leaving the window and adds the row entering it; within a row, moving
/// right does the same with columns, starting from that row's baseline.
/// Rows and columns outside the image contribute nothing.
///
/// With `local_tolerance` off, `tolerance` is computed from the full images.
pub fn sums_and_tolerance<H: Pixel, L: Pixel>(
    sources: &FusionSources<'_, H, L>,
    mask: &MaskView<'_>,
    pred_area: Rect,
    window_size: usize,
    local_tolerance: bool,
    number_classes: f64,
) -> SumsAndTolerance {
    let size = pred_area.size();
    let channels = sources.channels();
    let shape = (size.height, size.width, channels);
    let mut sum_low1 = Array3::<f64>::zeros(shape);
    let mut sum_low2 = Array3::<f64>::zeros(shape);
    let mut sum_low3 = Array3::<f64>::zeros(shape);
    let (mut tol1, mut tol3) = if local_tolerance {
        (Array3::<f64>::zeros(shape), Array3::<f64>::zeros(shape))
    } else {
        (Array3::<f64>::zeros((0, 0, 0)), Array3::<f64>::zeros((0, 0, 0)))
    };

    let bounds = Rect::new(0, 0, sources.width() as i64, sources.height() as i64);
    let half = (window_size / 2) as i64;
    let span = window_size as i64;

    let mut row_baseline = WindowStats::from_region(
        sources,
        mask,
        window_around(pred_area.x, pred_area.y, window_size, &bounds),
    );
    let mut stats = WindowStats::new(channels);

    for row in 0..size.height {
        let y = pred_area.y + row as i64;
        if row > 0 {
            let x = pred_area.x;
            let leaving = Rect::new(x - half, y - half - 1, span, 1);
            let entering = Rect::new(x - half, y + half, span, 1);
            apply_strip(&mut row_baseline, sources, mask, leaving, &bounds, -1.0);
            apply_strip(&mut row_baseline, sources, mask, entering, &bounds, 1.0);
        }

        stats.moments.copy_from_slice(&row_baseline.moments);
        for col in 0..size.width {
            let x = pred_area.x + col as i64;
            if col > 0 {
                let leaving = Rect::new(x - half - 1, y - half, 1, span);
                let entering = Rect::new(x + half, y - half, 1, span);
                apply_strip(&mut stats, sources, mask, leaving, &bounds, -1.0);
                apply_strip(&mut stats, sources, mask, entering, &bounds, 1.0);
            }

            for c in 0..channels {
                sum_low1[[row, col, c]] = stats.at(Source::Low1, c).sum;
                sum_low2[[row, col, c]] = stats.at(Source::Low2, c).sum;
                sum_low3[[row, col, c]] = stats.at(Source::Low3, c).sum;
                if local_tolerance {
                    tol1[[row, col, c]] =
                        tolerance_from(stats.at(Source::High1, c), number_classes);
                    tol3[[row, col, c]] =
                        tolerance_from(stats.at(Source::High3, c), number_classes);
                }
            }
        }
    }

    let tolerance = if local_tolerance {
        Tolerance::Local { tol1, tol3 }
    } else {
        Tolerance::global(sources, mask, number_classes)
    };

    debug!(
        area = %pred_area,
        window_size,
        local_tolerance,
        "Moving window sums computed"
    );

    SumsAndTolerance {
        sum_low1,
        sum_low2,
        sum_low3,
        tolerance,
    }
}
