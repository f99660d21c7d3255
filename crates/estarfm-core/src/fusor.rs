use std::sync::Arc;

use ndarray::{s, Array3};
use tracing::{debug, info};

use crate::error::{FusionError, Result};
use crate::image::{FusionSources, Image, MaskView, MultiResImages, Pixel, PixelType, Rect, Size};
use crate::local_weights::local_weights;
use crate::options::EstarfmOptions;
use crate::predictor::{PixelInputs, PixelPredictor};
use crate::stats::sums_and_tolerance;
use crate::window::{distance_weights, sample_area, window_around};

/// The five images one prediction reads.
struct Inputs<'a> {
    high1: &'a Image,
    high3: &'a Image,
    low1: &'a Image,
    low2: &'a Image,
    low3: &'a Image,
}

impl<'a> Inputs<'a> {
    fn gather(images: &'a MultiResImages, options: &EstarfmOptions, date2: i32) -> Result<Self> {
        let high = options.high_res_tag.as_str();
        let low = options.low_res_tag.as_str();
        let slots = [
            (high, options.date1),
            (high, options.date3),
            (low, options.date1),
            (low, date2),
            (low, options.date3),
        ];
        let found: Vec<Option<&Image>> = slots
            .iter()
            .map(|&(tag, date)| images.get(tag, date))
            .collect();

        let missing: Vec<String> = slots
            .iter()
            .zip(&found)
            .filter(|(_, image)| image.is_none())
            .map(|((tag, date), _)| format!("'{tag}' at date {date}"))
            .collect();
        if !missing.is_empty() {
            return Err(FusionError::NotFound(format!(
                "ESTARFM needs high resolution images at dates {} and {} and low resolution \
                 images at dates {}, {date2} and {}; missing: {}",
                options.date1,
                options.date3,
                options.date1,
                options.date3,
                missing.join(", ")
            )));
        }

        match *found.as_slice() {
            [Some(high1), Some(high3), Some(low1), Some(low2), Some(low3)] => Ok(Self {
                high1,
                high3,
                low1,
                low2,
                low3,
            }),
            _ => Err(FusionError::Logic("image lookup changed during validation".into())),
        }
    }

    fn check(&self, valid_mask: Option<&Image>, pred_mask: Option<&Image>) -> Result<()> {
        if self.high1.pixel_type() != self.high3.pixel_type() {
            return Err(FusionError::ImageType(format!(
                "high resolution images differ in type: {} at date 1, {} at date 3",
                self.high1.pixel_type(),
                self.high3.pixel_type()
            )));
        }
        let low_type = self.low1.pixel_type();
        if self.low2.pixel_type() != low_type || self.low3.pixel_type() != low_type {
            return Err(FusionError::ImageType(format!(
                "low resolution images differ in type: {}, {} and {} at dates 1, 2 and 3",
                low_type,
                self.low2.pixel_type(),
                self.low3.pixel_type()
            )));
        }

        let all = [self.high1, self.high3, self.low1, self.low2, self.low3];
        let channels = self.high1.channels();
        if all.iter().any(|img| img.channels() != channels) {
            let counts: Vec<String> = all.iter().map(|img| img.channels().to_string()).collect();
            return Err(FusionError::ImageType(format!(
                "all images need the same number of channels, got {}",
                counts.join(", ")
            )));
        }

        let size = self.high1.size();
        if all.iter().any(|img| img.size() != size) {
            let sizes: Vec<String> = all.iter().map(|img| img.size().to_string()).collect();
            return Err(FusionError::Size(format!(
                "all images need the same size, got {}",
                sizes.join(", ")
            )));
        }

        for (name, mask) in [("validity", valid_mask), ("prediction", pred_mask)] {
            let Some(mask) = mask.filter(|m| !m.is_empty()) else {
                continue;
            };
            if mask.pixel_type() != PixelType::U8 {
                return Err(FusionError::ImageType(format!(
                    "{name} mask must have type {}, got {}",
                    PixelType::U8,
                    mask.pixel_type()
                )));
            }
            if mask.channels() != 1 && mask.channels() != channels {
                return Err(FusionError::ImageType(format!(
                    "{name} mask must have 1 or {channels} channels, got {}",
                    mask.channels()
                )));
            }
            if mask.size() != size {
                return Err(FusionError::Size(format!(
                    "{name} mask size {} does not match image size {size}",
                    mask.size()
                )));
            }
        }
        Ok(())
    }
}

/// Everything the typed kernel needs for one prediction.
struct PredictJob<'a> {
    inputs: Inputs<'a>,
    valid_mask: Option<&'a Image>,
    pred_mask: Option<&'a Image>,
    options: &'a EstarfmOptions,
    pred_area: Rect,
    sample_area: Rect,
}

/// ESTARFM prediction controller.
///
/// Predicts a high resolution image at date 2 from high/low resolution pairs
/// at dates 1 and 3 and a low resolution image at date 2. The output buffer
/// is kept between calls and reused when size and type still match.
#[derive(Debug, Default)]
pub struct EstarfmFusor {
    options: EstarfmOptions,
    images: Option<Arc<MultiResImages>>,
    output: Option<Image>,
}

impl EstarfmFusor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_src_images(&mut self, images: Arc<MultiResImages>) {
        self.images = Some(images);
    }

    pub fn src_images(&self) -> Option<&Arc<MultiResImages>> {
        self.images.as_ref()
    }

    /// Validate and store options. Invalid options leave the previous ones in place.
    pub fn set_options(&mut self, options: EstarfmOptions) -> Result<()> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn options(&self) -> &EstarfmOptions {
        &self.options
    }

    /// Result of the last successful prediction, sized like the prediction area.
    pub fn output_image(&self) -> Option<&Image> {
        self.output.as_ref()
    }

    pub fn take_output(&mut self) -> Option<Image> {
        self.output.take()
    }

    /// Validate options and all inputs for a prediction at `date2` and return the
    /// prediction area in image coordinates.
    pub fn resolve_prediction_area(
        &self,
        date2: i32,
        valid_mask: Option<&Image>,
        pred_mask: Option<&Image>,
    ) -> Result<Rect> {
        self.options.validate()?;
        let images = self.attached_images()?;
        let inputs = Inputs::gather(images, &self.options, date2)?;
        inputs.check(valid_mask, pred_mask)?;
        self.prediction_area(inputs.high1.size())
    }

    /// Predict the high resolution image at `date2` into the output buffer.
    ///
    /// Only pixels valid in `valid_mask` and selected by `pred_mask` are
    /// written; all other output pixels keep unspecified values. Validation
    /// errors are raised before the output buffer is touched.
    pub fn predict(
        &mut self,
        date2: i32,
        valid_mask: Option<&Image>,
        pred_mask: Option<&Image>,
    ) -> Result<()> {
        self.options.validate()?;
        let images = self.attached_images()?.clone();
        let inputs = Inputs::gather(&images, &self.options, date2)?;
        inputs.check(valid_mask, pred_mask)?;

        let full_size = inputs.high1.size();
        let pred_area = self.prediction_area(full_size)?;
        let sample_area = sample_area(full_size, pred_area, self.options.window_size);

        info!(
            date2,
            pred_area = %pred_area,
            sample_area = %sample_area,
            window_size = self.options.window_size,
            high_type = %inputs.high1.pixel_type(),
            low_type = %inputs.low1.pixel_type(),
            "Predicting ESTARFM image"
        );

        let job = PredictJob {
            inputs,
            valid_mask,
            pred_mask,
            options: &self.options,
            pred_area,
            sample_area,
        };
        dispatch_high(&job, &mut self.output)
    }

    fn attached_images(&self) -> Result<&Arc<MultiResImages>> {
        self.images.as_ref().ok_or_else(|| {
            FusionError::Logic("no source images attached; call set_src_images first".into())
        })
    }

    fn prediction_area(&self, full_size: Size) -> Result<Rect> {
        let full = Rect::from_size(full_size);
        if self.options.predicts_full_image() {
            return Ok(full);
        }
        let area = self.options.prediction_area;
        if !full.contains_rect(&area) {
            return Err(FusionError::Size(format!(
                "prediction area {area} exceeds image bounds {full_size}"
            )));
        }
        Ok(area)
    }
}

fn dispatch_high(job: &PredictJob<'_>, output: &mut Option<Image>) -> Result<()> {
    match job.inputs.high1.pixel_type() {
        PixelType::U8 => dispatch_low::<u8>(job, output),
        PixelType::I8 => dispatch_low::<i8>(job, output),
        PixelType::U16 => dispatch_low::<u16>(job, output),
        PixelType::I16 => dispatch_low::<i16>(job, output),
        PixelType::I32 => dispatch_low::<i32>(job, output),
        PixelType::F32 => dispatch_low::<f32>(job, output),
        PixelType::F64 => dispatch_low::<f64>(job, output),
    }
}

fn dispatch_low<H: Pixel>(job: &PredictJob<'_>, output: &mut Option<Image>) -> Result<()> {
    match job.inputs.low1.pixel_type() {
        PixelType::U8 => predict_typed::<H, u8>(job, output),
        PixelType::I8 => predict_typed::<H, i8>(job, output),
        PixelType::U16 => predict_typed::<H, u16>(job, output),
        PixelType::I16 => predict_typed::<H, i16>(job, output),
        PixelType::I32 => predict_typed::<H, i32>(job, output),
        PixelType::F32 => predict_typed::<H, f32>(job, output),
        PixelType::F64 => predict_typed::<H, f64>(job, output),
    }
}

/// Reuse the output image if it matches, otherwise allocate a new one.
fn output_buffer<H: Pixel>(
    output: &mut Option<Image>,
    size: Size,
    channels: usize,
) -> Result<&mut Array3<H>> {
    let reusable = output.as_ref().is_some_and(|img| {
        img.pixel_type() == H::TYPE && img.size() == size && img.channels() == channels
    });
    if !reusable {
        debug!(size = %size, channels, pixel_type = %H::TYPE, "Allocating output image");
        *output = Some(Image::zeros(H::TYPE, size, channels));
    }
    output
        .as_mut()
        .and_then(|img| img.as_array_mut::<H>())
        .ok_or_else(|| FusionError::Logic("output buffer has unexpected pixel type".into()))
}

fn predict_typed<H: Pixel, L: Pixel>(
    job: &PredictJob<'_>,
    output: &mut Option<Image>,
) -> Result<()> {
    let inputs = &job.inputs;
    let options = job.options;
    let sources = FusionSources::<H, L>::from_images(
        inputs.high1,
        inputs.high3,
        inputs.low1,
        inputs.low2,
        inputs.low3,
    )?;
    let valid = MaskView::new(job.valid_mask)?;
    let selected = MaskView::new(job.pred_mask)?;
    let channels = sources.channels();
    let window_size = options.window_size;
    let half = options.half_window() as i64;
    let bounds = Rect::new(0, 0, sources.width() as i64, sources.height() as i64);

    let distance = distance_weights(window_size);
    let local = local_weights(&sources, &valid, job.sample_area)?;
    let sums = sums_and_tolerance(
        &sources,
        &valid,
        job.pred_area,
        window_size,
        options.use_local_tolerance,
        options.number_classes,
    );

    let pred_size = job.pred_area.size();
    let out = output_buffer::<H>(output, pred_size, channels)?;

    let mut predictor = PixelPredictor::new();
    let mut values = vec![None; channels];
    let mut written = 0usize;

    for row in 0..pred_size.height {
        let y = job.pred_area.y + row as i64;
        for col in 0..pred_size.width {
            let x = job.pred_area.x + col as i64;
            let (ux, uy) = (x as usize, y as usize);
            if (0..channels).all(|c| !selected.is_valid(ux, uy, c) || !valid.is_valid(ux, uy, c)) {
                continue;
            }

            let window = window_around(x, y, window_size, &bounds);
            let local_rect = window.translate(-job.sample_area.x, -job.sample_area.y);
            let kernel_rect = window.translate(half - x, half - y);
            let (tol1, tol3) = sums.tolerance.at(col, row);

            let px = PixelInputs {
                window: sources.window(window),
                mask: valid.window(window),
                local_weights: local.slice(s![local_rect.rows(), local_rect.cols()]),
                distance_weights: distance.slice(s![kernel_rect.rows(), kernel_rect.cols()]),
                center: ((x - window.x) as usize, (y - window.y) as usize),
                tol1,
                tol3,
                sum_low1: sums.sum_low1.slice(s![row, col, ..]),
                sum_low2: sums.sum_low2.slice(s![row, col, ..]),
                sum_low3: sums.sum_low3.slice(s![row, col, ..]),
            };
            predictor.predict(&px, options, &mut values);

            for (c, value) in values.iter().enumerate() {
                if let Some(v) = value {
                    if selected.is_valid(ux, uy, c) {
                        out[[row, col, c]] = H::from_f64(*v);
                        written += 1;
                    }
                }
            }
        }
    }

    debug!(written, "Prediction loop finished");
    Ok(())
}
