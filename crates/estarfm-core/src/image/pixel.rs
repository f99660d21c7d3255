use ndarray::Array3;
use num_traits::{Bounded, NumCast};
use serde::{Deserialize, Serialize};

/// Storage type of the pixels of an [`Image`](super::Image).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    I32,
    F32,
    F64,
}

impl PixelType {
    pub fn is_integer(&self) -> bool {
        !matches!(self, PixelType::F32 | PixelType::F64)
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::I8 => write!(f, "int8"),
            Self::U16 => write!(f, "uint16"),
            Self::I16 => write!(f, "int16"),
            Self::I32 => write!(f, "int32"),
            Self::F32 => write!(f, "float32"),
            Self::F64 => write!(f, "float64"),
        }
    }
}

/// Owned pixel storage, shape = (height, width, channels).
#[derive(Clone, Debug)]
pub enum PixelBuffer {
    U8(Array3<u8>),
    I8(Array3<i8>),
    U16(Array3<u16>),
    I16(Array3<i16>),
    I32(Array3<i32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
}

impl PixelBuffer {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            Self::U8(_) => PixelType::U8,
            Self::I8(_) => PixelType::I8,
            Self::U16(_) => PixelType::U16,
            Self::I16(_) => PixelType::I16,
            Self::I32(_) => PixelType::I32,
            Self::F32(_) => PixelType::F32,
            Self::F64(_) => PixelType::F64,
        }
    }

    /// (height, width, channels)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::U8(a) => a.dim(),
            Self::I8(a) => a.dim(),
            Self::U16(a) => a.dim(),
            Self::I16(a) => a.dim(),
            Self::I32(a) => a.dim(),
            Self::F32(a) => a.dim(),
            Self::F64(a) => a.dim(),
        }
    }
}

/// A numeric pixel storage type.
///
/// All fusion arithmetic happens in `f64`; values only pass through the
/// storage type when read from the inputs and when written to the output.
pub trait Pixel: Copy + Default + Send + Sync + 'static {
    const TYPE: PixelType;

    fn to_f64(self) -> f64;

    /// Convert back to storage. Integers are rounded to nearest and
    /// saturated at the type bounds; NaN maps to zero.
    fn from_f64(v: f64) -> Self;

    fn buffer(buf: &PixelBuffer) -> Option<&Array3<Self>>;

    fn buffer_mut(buf: &mut PixelBuffer) -> Option<&mut Array3<Self>>;

    fn wrap(data: Array3<Self>) -> PixelBuffer;
}

fn saturate<T: Bounded + NumCast + Default>(v: f64) -> T {
    let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
    <T as NumCast>::from(v.round().clamp(lo, hi)).unwrap_or_default()
}

macro_rules! impl_integer_pixel {
    ($t:ty, $variant:ident) => {
        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                saturate::<$t>(v)
            }

            fn buffer(buf: &PixelBuffer) -> Option<&Array3<Self>> {
                match buf {
                    PixelBuffer::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn buffer_mut(buf: &mut PixelBuffer) -> Option<&mut Array3<Self>> {
                match buf {
                    PixelBuffer::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn wrap(data: Array3<Self>) -> PixelBuffer {
                PixelBuffer::$variant(data)
            }
        }
    };
}

macro_rules! impl_float_pixel {
    ($t:ty, $variant:ident) => {
        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn buffer(buf: &PixelBuffer) -> Option<&Array3<Self>> {
                match buf {
                    PixelBuffer::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn buffer_mut(buf: &mut PixelBuffer) -> Option<&mut Array3<Self>> {
                match buf {
                    PixelBuffer::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn wrap(data: Array3<Self>) -> PixelBuffer {
                PixelBuffer::$variant(data)
            }
        }
    };
}

impl_integer_pixel!(u8, U8);
impl_integer_pixel!(i8, I8);
impl_integer_pixel!(u16, U16);
impl_integer_pixel!(i16, I16);
impl_integer_pixel!(i32, I32);
impl_float_pixel!(f32, F32);
impl_float_pixel!(f64, F64);
