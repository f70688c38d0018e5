//! Detection crops and their retrieval.
//!
//! Pixel storage and decoding belong to the caller: the engine only needs a
//! way to turn (image name, bounding box) into an RGB buffer it can hand to
//! the matching oracles. Implement [`CropSource`] over whatever image store
//! the deployment uses.

use thiserror::Error;

use crate::PixelBox;

/// Owned RGB8 crop of a detection's bounding box, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crop {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Why a crop could not be produced. Never fatal to a run: pairs touching a
/// failed crop are skipped as distinct.
#[derive(Debug, Error)]
pub enum CropError {
    #[error("image '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("box {x_min},{y_min}..{x_max},{y_max} exceeds the source image")]
    OutOfBounds {
        x_min: u32,
        y_min: u32,
        x_max: u32,
        y_max: u32,
    },

    #[error("pixel buffer holds {got} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        width: u32,
        height: u32,
        got: usize,
        expected: usize,
    },

    #[error("box has zero area")]
    EmptyBox,
}

impl Crop {
    /// Wrap a row-major RGB8 buffer.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CropError> {
        if width == 0 || height == 0 {
            return Err(CropError::EmptyBox);
        }
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(CropError::BufferSize {
                width,
                height,
                got: pixels.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A crop of one uniform color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, CropError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgb);
        }
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Channel-wise mean color.
    pub fn mean_rgb(&self) -> [u8; 3] {
        let mut sums = [0u64; 3];
        for px in self.pixels.chunks_exact(3) {
            sums[0] += u64::from(px[0]);
            sums[1] += u64::from(px[1]);
            sums[2] += u64::from(px[2]);
        }
        let n = (self.pixels.len() / 3) as u64;
        [
            (sums[0] / n) as u8,
            (sums[1] / n) as u8,
            (sums[2] / n) as u8,
        ]
    }

    /// Upscale with nearest-neighbor sampling until the shorter side reaches
    /// `min_side`, preserving aspect ratio. Returns an unchanged clone when
    /// the crop is already large enough. Never downscales.
    pub fn scale_to_min_side(&self, min_side: u32) -> Crop {
        let short = self.width.min(self.height);
        if short >= min_side {
            return self.clone();
        }

        let scale = f64::from(min_side) / f64::from(short);
        let width = (f64::from(self.width) * scale).round() as u32;
        let height = (f64::from(self.height) * scale).round() as u32;

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            let sy = ((f64::from(y) / scale) as u32).min(self.height - 1);
            for x in 0..width {
                let sx = ((f64::from(x) / scale) as u32).min(self.width - 1);
                let offset = (sy as usize * self.width as usize + sx as usize) * 3;
                pixels.extend_from_slice(&self.pixels[offset..offset + 3]);
            }
        }

        Crop {
            width,
            height,
            pixels,
        }
    }
}

/// Crop-retrieval capability over the deployment's image store.
///
/// Called from matching worker threads, hence `Send + Sync`.
pub trait CropSource: Send + Sync {
    /// Extract `bbox` from the stored image `name` as an RGB8 crop.
    fn crop(&self, image: &str, bbox: &PixelBox) -> Result<Crop, CropError>;
}
