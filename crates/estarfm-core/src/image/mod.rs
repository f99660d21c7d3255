//! Multi-channel raster container with a runtime pixel type.

mod pixel;
mod rect;
mod registry;
mod view;

use ndarray::{s, Array3};

use crate::error::{FusionError, Result};

pub use pixel::{Pixel, PixelBuffer, PixelType};
pub use rect::{Rect, Size};
pub use registry::MultiResImages;
pub use view::{FusionSources, MaskView};

/// A 2D grid of pixels, each with a fixed number of channels.
#[derive(Clone, Debug)]
pub struct Image {
    data: PixelBuffer,
}

impl Image {
    /// Wrap an array of shape (height, width, channels).
    pub fn from_array<T: Pixel>(data: Array3<T>) -> Self {
        Self { data: T::wrap(data) }
    }

    /// Build an image from row-major, channel-interleaved samples.
    pub fn from_shape_vec<T: Pixel>(
        width: usize,
        height: usize,
        channels: usize,
        values: Vec<T>,
    ) -> Result<Self> {
        let data = Array3::from_shape_vec((height, width, channels), values).map_err(|e| {
            FusionError::Size(format!(
                "cannot build {width}x{height}x{channels} image: {e}"
            ))
        })?;
        Ok(Self::from_array(data))
    }

    /// Build an image by evaluating `f(x, y, channel)` for every sample.
    pub fn from_fn<T: Pixel>(
        width: usize,
        height: usize,
        channels: usize,
        f: impl Fn(usize, usize, usize) -> T,
    ) -> Self {
        let data = Array3::from_shape_fn((height, width, channels), |(y, x, c)| f(x, y, c));
        Self::from_array(data)
    }

    /// Zero-filled image of the given type.
    pub fn zeros(pixel_type: PixelType, size: Size, channels: usize) -> Self {
        let shape = (size.height, size.width, channels);
        let data = match pixel_type {
            PixelType::U8 => PixelBuffer::U8(Array3::zeros(shape)),
            PixelType::I8 => PixelBuffer::I8(Array3::zeros(shape)),
            PixelType::U16 => PixelBuffer::U16(Array3::zeros(shape)),
            PixelType::I16 => PixelBuffer::I16(Array3::zeros(shape)),
            PixelType::I32 => PixelBuffer::I32(Array3::zeros(shape)),
            PixelType::F32 => PixelBuffer::F32(Array3::zeros(shape)),
            PixelType::F64 => PixelBuffer::F64(Array3::zeros(shape)),
        };
        Self { data }
    }

    pub fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn is_empty(&self) -> bool {
        let (h, w, c) = self.data.dim();
        h == 0 || w == 0 || c == 0
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.data
    }

    /// Typed access; `None` if `T` is not the storage type.
    pub fn as_array<T: Pixel>(&self) -> Option<&Array3<T>> {
        T::buffer(&self.data)
    }

    pub fn as_array_mut<T: Pixel>(&mut self) -> Option<&mut Array3<T>> {
        T::buffer_mut(&mut self.data)
    }

    /// Read one sample as `f64`. Panics if out of bounds.
    pub fn get_f64(&self, x: usize, y: usize, channel: usize) -> f64 {
        let idx = [y, x, channel];
        match &self.data {
            PixelBuffer::U8(a) => a[idx].to_f64(),
            PixelBuffer::I8(a) => a[idx].to_f64(),
            PixelBuffer::U16(a) => a[idx].to_f64(),
            PixelBuffer::I16(a) => a[idx].to_f64(),
            PixelBuffer::I32(a) => a[idx].to_f64(),
            PixelBuffer::F32(a) => a[idx].to_f64(),
            PixelBuffer::F64(a) => a[idx].to_f64(),
        }
    }

    /// Copy `src` into this image with its top-left corner at (x, y).
    pub fn paste(&mut self, src: &Image, x: usize, y: usize) -> Result<()> {
        if src.pixel_type() != self.pixel_type() || src.channels() != self.channels() {
            return Err(FusionError::ImageType(format!(
                "cannot paste {} image with {} channels into {} image with {} channels",
                src.pixel_type(),
                src.channels(),
                self.pixel_type(),
                self.channels()
            )));
        }
        let target = Rect::new(x as i64, y as i64, src.width() as i64, src.height() as i64);
        if !Rect::from_size(self.size()).contains_rect(&target) {
            return Err(FusionError::Size(format!(
                "paste region {target} exceeds image bounds {}",
                self.size()
            )));
        }

        macro_rules! paste_typed {
            ($($variant:ident),*) => {
                match (&mut self.data, &src.data) {
                    $((PixelBuffer::$variant(dst), PixelBuffer::$variant(from)) => {
                        dst.slice_mut(s![target.rows(), target.cols(), ..]).assign(from);
                    })*
                    _ => unreachable!("pixel types checked above"),
                }
            };
        }
        paste_typed!(U8, I8, U16, I16, I32, F32, F64);
        Ok(())
    }
}
