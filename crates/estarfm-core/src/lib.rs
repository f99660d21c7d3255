//! ESTARFM (Enhanced Spatial and Temporal Adaptive Reflectance Fusion Model).
//!
//! Predicts a high resolution image at an intermediate date from two
//! high/low resolution image pairs and a low resolution image at the
//! prediction date.

pub mod consts;
pub mod error;
pub mod fusor;
pub mod image;
pub mod local_weights;
pub mod options;
pub mod parallel;
pub mod predictor;
pub mod regression;
pub mod stats;
pub mod window;

pub use error::{FusionError, Result};
pub use fusor::EstarfmFusor;
pub use image::{Image, MultiResImages, PixelType, Rect, Size};
pub use options::{DataRange, EstarfmOptions};
pub use parallel::predict_parallel;
