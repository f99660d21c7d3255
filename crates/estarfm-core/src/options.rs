use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_NUMBER_CLASSES, DEFAULT_UNCERTAINTY_FACTOR, DEFAULT_WINDOW_SIZE};
use crate::error::{FusionError, Result};
use crate::image::Rect;

/// Inclusive range of physically meaningful pixel values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataRange {
    pub min: f64,
    pub max: f64,
}

impl DataRange {
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Configuration of an ESTARFM prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstarfmOptions {
    /// Resolution tag of the high resolution images (dates 1 and 3).
    pub high_res_tag: String,
    /// Resolution tag of the low resolution images (dates 1, 2 and 3).
    pub low_res_tag: String,
    /// Date of the first input pair.
    pub date1: i32,
    /// Date of the second input pair.
    pub date3: i32,
    /// Area to predict. The all-zero rect means the full image.
    pub prediction_area: Rect,
    /// Side length of the moving window, odd (default: 51).
    pub window_size: usize,
    /// Number of classes used to scale the similarity tolerance (default: 4).
    pub number_classes: f64,
    /// Derive tolerances from each window instead of the whole image.
    pub use_local_tolerance: bool,
    /// Valid value range; enables the range fallback and the uncertainty check.
    pub data_range: Option<DataRange>,
    /// Fraction of the data range maximum treated as sensor uncertainty.
    pub uncertainty_factor: f64,
    /// Blend the regression slope by its F-test confidence instead of
    /// accepting or rejecting it at 95%.
    pub use_quality_weighted_regression: bool,
}

impl Default for EstarfmOptions {
    fn default() -> Self {
        Self {
            high_res_tag: "high".into(),
            low_res_tag: "low".into(),
            date1: 0,
            date3: 0,
            prediction_area: Rect::default(),
            window_size: DEFAULT_WINDOW_SIZE,
            number_classes: DEFAULT_NUMBER_CLASSES,
            use_local_tolerance: false,
            data_range: None,
            uncertainty_factor: DEFAULT_UNCERTAINTY_FACTOR,
            use_quality_weighted_regression: false,
        }
    }
}

impl EstarfmOptions {
    /// Parse options from a TOML document and validate them.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: EstarfmOptions = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_tags(mut self, high: impl Into<String>, low: impl Into<String>) -> Self {
        self.high_res_tag = high.into();
        self.low_res_tag = low.into();
        self
    }

    pub fn with_dates(mut self, date1: i32, date3: i32) -> Self {
        self.date1 = date1;
        self.date3 = date3;
        self
    }

    pub fn with_prediction_area(mut self, area: Rect) -> Self {
        self.prediction_area = area;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_number_classes(mut self, number_classes: f64) -> Self {
        self.number_classes = number_classes;
        self
    }

    pub fn with_local_tolerance(mut self, enabled: bool) -> Self {
        self.use_local_tolerance = enabled;
        self
    }

    pub fn with_data_range(mut self, min: f64, max: f64) -> Self {
        self.data_range = Some(DataRange { min, max });
        self
    }

    pub fn with_uncertainty_factor(mut self, factor: f64) -> Self {
        self.uncertainty_factor = factor;
        self
    }

    pub fn with_quality_weighted_regression(mut self, enabled: bool) -> Self {
        self.use_quality_weighted_regression = enabled;
        self
    }

    /// True if no explicit prediction area is configured.
    pub fn predicts_full_image(&self) -> bool {
        self.prediction_area == Rect::default()
    }

    pub fn half_window(&self) -> usize {
        self.window_size / 2
    }

    /// Check cross-field consistency. Called by the fusor before storing.
    pub fn validate(&self) -> Result<()> {
        if self.date1 == self.date3 {
            return Err(FusionError::InvalidArgument(format!(
                "date1 and date3 must differ, both are {}",
                self.date1
            )));
        }
        if self.high_res_tag == self.low_res_tag {
            return Err(FusionError::InvalidArgument(format!(
                "high and low resolution tags must differ, both are '{}'",
                self.high_res_tag
            )));
        }
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return Err(FusionError::InvalidArgument(format!(
                "window size must be odd and positive, got {}",
                self.window_size
            )));
        }
        if !(self.number_classes.is_finite() && self.number_classes > 0.0) {
            return Err(FusionError::InvalidArgument(format!(
                "number of classes must be positive, got {}",
                self.number_classes
            )));
        }
        if let Some(range) = &self.data_range {
            if !(range.min < range.max) {
                return Err(FusionError::InvalidArgument(format!(
                    "data range minimum {} must be below maximum {}",
                    range.min, range.max
                )));
            }
        }
        if !(self.uncertainty_factor.is_finite() && self.uncertainty_factor >= 0.0) {
            return Err(FusionError::InvalidArgument(format!(
                "uncertainty factor must be non-negative, got {}",
                self.uncertainty_factor
            )));
        }
        if !self.predicts_full_image() && self.prediction_area.is_empty() {
            return Err(FusionError::InvalidArgument(format!(
                "prediction area {} is empty",
                self.prediction_area
            )));
        }
        Ok(())
    }
}
