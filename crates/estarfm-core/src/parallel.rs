use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{FusionError, Result};
use crate::fusor::EstarfmFusor;
use crate::image::{Image, MultiResImages, Rect};
use crate::options::EstarfmOptions;

/// Split `area` into at most `bands` horizontal bands of near-equal height.
///
/// `bands == 0` uses one band per rayon worker thread. The result never has
/// more bands than `area` has rows.
pub fn split_rows(area: Rect, bands: usize) -> Vec<Rect> {
    if area.is_empty() {
        return Vec::new();
    }
    let bands = if bands == 0 {
        rayon::current_num_threads()
    } else {
        bands
    };
    let rows = area.height as usize;
    let bands = bands.clamp(1, rows);
    let base = rows / bands;
    let extra = rows % bands;

    let mut y = area.y;
    (0..bands)
        .map(|i| {
            let height = (base + usize::from(i < extra)) as i64;
            let band = Rect::new(area.x, y, area.width, height);
            y += height;
            band
        })
        .collect()
}

/// Predict with one [`EstarfmFusor`] per row band, running bands in parallel.
///
/// Every band recomputes its own window statistics, so the stitched result
/// matches a single sequential prediction (exactly for integer inputs).
pub fn predict_parallel(
    images: Arc<MultiResImages>,
    options: &EstarfmOptions,
    date2: i32,
    valid_mask: Option<&Image>,
    pred_mask: Option<&Image>,
    bands: usize,
) -> Result<Image> {
    let mut probe = EstarfmFusor::new();
    probe.set_src_images(images.clone());
    probe.set_options(options.clone())?;
    let area = probe.resolve_prediction_area(date2, valid_mask, pred_mask)?;

    let band_rects = split_rows(area, bands);
    info!(area = %area, bands = band_rects.len(), "Parallel ESTARFM prediction");

    let results: Vec<Result<(Rect, Image)>> = band_rects
        .par_iter()
        .map(|&band| {
            let mut fusor = EstarfmFusor::new();
            fusor.set_src_images(images.clone());
            fusor.set_options(options.clone().with_prediction_area(band))?;
            fusor.predict(date2, valid_mask, pred_mask)?;
            let image = fusor.take_output().ok_or_else(|| {
                FusionError::Logic(format!("band {band} finished without output"))
            })?;
            debug!(band = %band, "Band predicted");
            Ok((band, image))
        })
        .collect();

    let mut merged: Option<Image> = None;
    for result in results {
        let (band, image) = result?;
        let target = merged.get_or_insert_with(|| {
            Image::zeros(image.pixel_type(), area.size(), image.channels())
        });
        target.paste(&image, (band.x - area.x) as usize, (band.y - area.y) as usize)?;
    }
    merged.ok_or_else(|| FusionError::Logic("prediction area produced no bands".into()))
}
