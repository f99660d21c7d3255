use ndarray::Array2;

use crate::image::{Rect, Size};

/// Region that must be read to predict `pred_area`: the prediction area grown
/// by half a window on every side, clipped to the image.
pub fn sample_area(full_size: Size, pred_area: Rect, window_size: usize) -> Rect {
    let half = (window_size / 2) as i64;
    pred_area.expand(half).clipped_to(full_size)
}

/// Window of `window_size` centered at (x, y), clipped to `bounds`.
pub fn window_around(x: i64, y: i64, window_size: usize, bounds: &Rect) -> Rect {
    let half = (window_size / 2) as i64;
    let size = window_size as i64;
    Rect::new(x - half, y - half, size, size).intersect(bounds)
}

/// Relative distance kernel, indexed `[[row, col]]`.
///
/// Cell (x, y) holds `1 + 2 * dist / window_size`, where `dist` is the
/// Euclidean distance to the center. Only one octant is evaluated; the rest
/// is mirrored. `window_size` must be odd.
pub fn distance_weights(window_size: usize) -> Array2<f64> {
    let mut weights = Array2::<f64>::zeros((window_size, window_size));
    if window_size == 0 {
        return weights;
    }
    let c = window_size / 2;
    let scale = 2.0 / window_size as f64;

    for dy in 0..=c {
        for dx in dy..=c {
            let d = 1.0 + scale * ((dx * dx + dy * dy) as f64).sqrt();
            let (lo_x, hi_x) = (c - dx, c + dx);
            let (lo_y, hi_y) = (c - dy, c + dy);
            for &(row, col) in &[
                (lo_y, lo_x),
                (lo_y, hi_x),
                (hi_y, lo_x),
                (hi_y, hi_x),
                (lo_x, lo_y),
                (lo_x, hi_y),
                (hi_x, lo_y),
                (hi_x, hi_y),
            ] {
                weights[[row, col]] = d;
            }
        }
    }

    weights
}
