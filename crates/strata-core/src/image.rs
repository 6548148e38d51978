//! Pooled image buffers.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StrataError};
use crate::format::ImageFormat;
use crate::pool::{MemoryPool, PoolBuffer};

/// What a caller asks of `Frame::get_image`.
///
/// A `None` format or a zero dimension leaves the choice to whoever
/// produces the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRequest {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// The caller intends to write to the returned buffer.
    pub writable: bool,
}

impl ImageRequest {
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            writable: false,
        }
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}

/// An image held in a pool block.
///
/// Clones share the block. [`Image::data_mut`] copies it first when it is
/// shared, so a cached image is never modified behind its holders' backs.
#[derive(Clone)]
pub struct Image {
    format: ImageFormat,
    width: u32,
    height: u32,
    buffer: Arc<PoolBuffer>,
}

impl Image {
    /// Allocate an image with undefined contents.
    pub fn alloc(pool: &MemoryPool, format: ImageFormat, width: u32, height: u32) -> Result<Self> {
        let size = format.buffer_size(width, height);
        if size == 0 {
            return Err(StrataError::UnsupportedFormat(format!(
                "{} image of {}x{}",
                format, width, height
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            buffer: Arc::new(pool.alloc(size)?),
        })
    }

    /// Wrap an existing buffer; it must hold at least one full image.
    pub fn from_buffer(format: ImageFormat, width: u32, height: u32, buffer: PoolBuffer) -> Result<Self> {
        let size = format.buffer_size(width, height);
        if size == 0 || buffer.len() < size {
            return Err(StrataError::Image(format!(
                "{} bytes cannot hold a {}x{} {} image",
                buffer.len(),
                width,
                height,
                format
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            buffer: Arc::new(buffer),
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.format.buffer_size(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per row of a packed format; the luma row for planar ones.
    pub fn stride(&self) -> usize {
        match self.format {
            ImageFormat::Yuv420p => self.width as usize,
            other => self.width as usize * other.bytes_per_pixel(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.len()]
    }

    /// Writable bytes, copying the block first if another holder shares it.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        self.make_unique()?;
        let len = self.len();
        Arc::get_mut(&mut self.buffer)
            .map(|buffer| &mut buffer.as_mut_slice()[..len])
            .ok_or_else(|| StrataError::Internal("image buffer still shared".into()))
    }

    /// Ensure no other holder shares this image's block.
    pub fn make_unique(&mut self) -> Result<()> {
        if Arc::get_mut(&mut self.buffer).is_none() {
            self.buffer = Arc::new(self.buffer.try_clone()?);
        }
        Ok(())
    }

    /// Whether another image shares this block.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.buffer) > 1
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    /// Paint the whole image one colour.
    pub fn fill_colour(&mut self, r: u8, g: u8, b: u8, a: u8) -> Result<()> {
        let format = self.format;
        let luma = self.width as usize * self.height as usize;
        let (y, u, v) = rgb_to_yuv(r, g, b);
        let data = self.data_mut()?;
        match format {
            ImageFormat::Rgb24 => {
                for px in data.chunks_exact_mut(3) {
                    px.copy_from_slice(&[r, g, b]);
                }
            }
            ImageFormat::Rgb24a => {
                for px in data.chunks_exact_mut(4) {
                    px.copy_from_slice(&[r, g, b, a]);
                }
            }
            ImageFormat::Yuv422 => {
                let mut pairs = data.chunks_exact_mut(4);
                for px in &mut pairs {
                    px.copy_from_slice(&[y, u, y, v]);
                }
                let rest = pairs.into_remainder();
                if rest.len() == 2 {
                    rest.copy_from_slice(&[y, u]);
                }
            }
            ImageFormat::Yuv420p => {
                let (luma_plane, chroma) = data.split_at_mut(luma);
                luma_plane.fill(y);
                let half = chroma.len() / 2;
                chroma[..half].fill(u);
                chroma[half..].fill(v);
            }
            ImageFormat::None => {
                return Err(StrataError::UnsupportedFormat("fill of format none".into()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Studio-range BT.601 conversion: luma scaled into 16..=235, chroma into 16..=240.
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((263 * r + 516 * g + 100 * b) >> 10) + 16;
    let u = ((-152 * r - 298 * g + 450 * b) >> 10) + 128;
    let v = ((450 * r - 377 * g - 73 * b) >> 10) + 128;
    (
        y.clamp(16, 235) as u8,
        u.clamp(16, 240) as u8,
        v.clamp(16, 240) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_rejects_none() {
        let pool = MemoryPool::new();
        assert!(matches!(
            Image::alloc(&pool, ImageFormat::None, 4, 4),
            Err(StrataError::UnsupportedFormat(_))
        ));
        assert!(Image::alloc(&pool, ImageFormat::Rgb24, 0, 4).is_err());
    }

    #[test]
    fn test_copy_on_write() {
        let pool = MemoryPool::new();
        let mut image = Image::alloc(&pool, ImageFormat::Rgb24, 2, 2).unwrap();
        image.fill_colour(10, 20, 30, 255).unwrap();
        let shared = image.clone();
        assert!(image.is_shared());
        image.data_mut().unwrap()[0] = 99;
        assert_eq!(shared.data()[0], 10);
        assert_eq!(image.data()[0], 99);
        assert_ne!(image.as_ptr(), shared.as_ptr());
        assert!(!shared.is_shared());
    }

    #[test]
    fn test_fill_yuv() {
        let pool = MemoryPool::new();
        let mut packed = Image::alloc(&pool, ImageFormat::Yuv422, 3, 1).unwrap();
        packed.fill_colour(0, 0, 0, 255).unwrap();
        assert_eq!(packed.data(), &[16, 128, 16, 128, 16, 128]);

        let mut planar = Image::alloc(&pool, ImageFormat::Yuv420p, 4, 2).unwrap();
        planar.fill_colour(255, 255, 255, 255).unwrap();
        let (y, _, _) = rgb_to_yuv(255, 255, 255);
        assert!(planar.data()[..8].iter().all(|&p| p == y));
        assert!(planar.data()[8..].iter().all(|&p| p == 128));
    }

    #[test]
    fn test_from_buffer_checks_size() {
        let pool = MemoryPool::new();
        let small = pool.alloc(10).unwrap();
        assert!(Image::from_buffer(ImageFormat::Rgb24, 4, 4, small).is_err());
        let exact = pool.alloc(48).unwrap();
        let image = Image::from_buffer(ImageFormat::Rgb24, 4, 4, exact).unwrap();
        assert_eq!(image.stride(), 12);
    }
}
