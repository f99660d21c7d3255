use ndarray::{s, ArrayView3};

use super::{Image, Pixel, PixelType, Rect};
use crate::error::{FusionError, Result};

fn typed_view<'a, T: Pixel>(image: &'a Image, role: &str) -> Result<ArrayView3<'a, T>> {
    image.as_array::<T>().map(|a| a.view()).ok_or_else(|| {
        FusionError::ImageType(format!(
            "{role} image has type {}, expected {}",
            image.pixel_type(),
            T::TYPE
        ))
    })
}

fn window_slice<'a, T>(view: &ArrayView3<'a, T>, rect: Rect) -> ArrayView3<'a, T> {
    view.clone().slice_move(s![rect.rows(), rect.cols(), ..])
}

/// Typed, read-only views of the five images taking part in one prediction:
/// high resolution at dates 1 and 3, low resolution at dates 1, 2 and 3.
///
/// `window` produces sub-views sharing the same storage; no pixel data is
/// copied.
#[derive(Clone, Debug)]
pub struct FusionSources<'a, H, L> {
    pub high1: ArrayView3<'a, H>,
    pub high3: ArrayView3<'a, H>,
    pub low1: ArrayView3<'a, L>,
    pub low2: ArrayView3<'a, L>,
    pub low3: ArrayView3<'a, L>,
}

impl<'a, H: Pixel, L: Pixel> FusionSources<'a, H, L> {
    pub fn from_images(
        high1: &'a Image,
        high3: &'a Image,
        low1: &'a Image,
        low2: &'a Image,
        low3: &'a Image,
    ) -> Result<Self> {
        Ok(Self {
            high1: typed_view(high1, "high resolution date 1")?,
            high3: typed_view(high3, "high resolution date 3")?,
            low1: typed_view(low1, "low resolution date 1")?,
            low2: typed_view(low2, "low resolution date 2")?,
            low3: typed_view(low3, "low resolution date 3")?,
        })
    }

    /// Sub-view over `rect`, given relative to the current view. The rect
    /// must lie within the current bounds.
    pub fn window(&self, rect: Rect) -> FusionSources<'a, H, L> {
        FusionSources {
            high1: window_slice(&self.high1, rect),
            high3: window_slice(&self.high3, rect),
            low1: window_slice(&self.low1, rect),
            low2: window_slice(&self.low2, rect),
            low3: window_slice(&self.low3, rect),
        }
    }

    pub fn width(&self) -> usize {
        self.high1.dim().1
    }

    pub fn height(&self) -> usize {
        self.high1.dim().0
    }

    pub fn channels(&self) -> usize {
        self.high1.dim().2
    }
}

/// Validity mask view. Absent means every pixel is valid; a single-channel
/// mask applies to all channels; otherwise validity is per channel.
#[derive(Clone, Debug, Default)]
pub struct MaskView<'a> {
    data: Option<ArrayView3<'a, u8>>,
}

impl<'a> MaskView<'a> {
    pub fn all_valid() -> Self {
        Self { data: None }
    }

    /// An empty image counts as an absent mask.
    pub fn new(mask: Option<&'a Image>) -> Result<Self> {
        let Some(mask) = mask.filter(|m| !m.is_empty()) else {
            return Ok(Self::all_valid());
        };
        if mask.pixel_type() != PixelType::U8 {
            return Err(FusionError::ImageType(format!(
                "mask must have type {}, got {}",
                PixelType::U8,
                mask.pixel_type()
            )));
        }
        Ok(Self {
            data: Some(typed_view::<u8>(mask, "mask")?),
        })
    }

    pub fn is_present(&self) -> bool {
        self.data.is_some()
    }

    /// Sub-view over `rect`, relative to the current view.
    pub fn window(&self, rect: Rect) -> MaskView<'a> {
        MaskView {
            data: self.data.as_ref().map(|d| window_slice(d, rect)),
        }
    }

    #[inline]
    pub fn is_valid(&self, x: usize, y: usize, channel: usize) -> bool {
        match &self.data {
            None => true,
            Some(d) => {
                let c = if d.dim().2 == 1 { 0 } else { channel };
                d[[y, x, c]] != 0
            }
        }
    }
}
