//! Pixel buffers for video frames in CPU memory.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel format of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel).
    #[default]
    Rgba8,
    /// 8-bit grayscale.
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }
}

/// An owned pixel buffer with stride information.
///
/// Rows are padded to a 64-byte stride so row slices stay SIMD-friendly
/// regardless of width.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Image {
    /// Create a new zeroed image.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let min_stride = width as usize * format.bytes_per_pixel();
        let stride = (min_stride + 63) & !63;
        Self {
            format,
            width,
            height,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row including padding.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get one row of pixel data, padding excluded.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..end]
    }

    /// Get one row of pixel data mutably, padding excluded.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..end]
    }

    /// Split the image into per-row mutable slices, padding excluded.
    /// Lets callers iterate rows in parallel.
    pub fn rows_mut(&mut self) -> Vec<&mut [u8]> {
        let width_bytes = self.width as usize * self.format.bytes_per_pixel();
        self.data
            .chunks_exact_mut(self.stride)
            .map(|chunk| &mut chunk[..width_bytes])
            .collect()
    }

    /// Zero out every pixel (transparent black for RGBA).
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Fill every pixel with the given RGBA color.
    pub fn fill(&mut self, color: [u8; 4]) {
        debug_assert_eq!(self.format, PixelFormat::Rgba8);
        for y in 0..self.height {
            let row = self.row_mut(y);
            for px in row.chunks_exact_mut(4) {
                px.copy_from_slice(&color);
            }
        }
    }

    /// Create a solid-color RGBA image.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut image = Self::new(width, height, PixelFormat::Rgba8);
        image.fill(color);
        image
    }

    /// Total memory usage in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    /// Create a color-bars test pattern, used by synthetic sources and tests.
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let mut image = Self::new(width, height, PixelFormat::Rgba8);
        let colors: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];
        for y in 0..height {
            let row = image.row_mut(y);
            for x in 0..width {
                let bar = (x * 8 / width) as usize;
                let i = x as usize * 4;
                row[i..i + 4].copy_from_slice(&colors[bar]);
            }
        }
        image
    }
}

/// A video frame: pixel data plus its position in stream ticks.
///
/// The image is shared so a fifo slot can hand frames out without copying
/// pixel data; a frame stays valid after its slot is overwritten because the
/// consumer's `Arc` keeps the old pixels alive.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data.
    pub image: Arc<Image>,
    /// Position in stream ticks, or [`VideoFrame::EMPTY_TIMECODE`].
    pub timecode: i64,
}

impl VideoFrame {
    /// Timecode of a slot that has never been written.
    pub const EMPTY_TIMECODE: i64 = -1;

    /// Create a frame at the given tick.
    pub fn new(image: Arc<Image>, timecode: i64) -> Self {
        Self { image, timecode }
    }

    /// An empty placeholder frame.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: Arc::new(Image::new(width, height, PixelFormat::Rgba8)),
            timecode: Self::EMPTY_TIMECODE,
        }
    }

    /// Whether this slot has ever been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timecode == Self::EMPTY_TIMECODE
    }
}
