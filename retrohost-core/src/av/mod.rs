//! Audio/Video conversion for retrohost-core.
//!
//! This module implements the "core pushes, host repacks, sink consumes" model.
//!
//! - Video: the core hands a strided, format-tagged buffer to the video-refresh upcall. The
//!   [`FrameConverter`] packs it row by row (dropping stride padding) and applies the per-format
//!   channel fixup, then the [`FrameSink`] borrows the packed [`Frame`] for the duration of the call.
//!
//! - Audio: the core emits single stereo samples or batches of interleaved stereo frames. The
//!   [`AudioBatcher`] turns either shape into little-endian 16-bit stereo bytes and the
//!   [`AudioSink`] receives each chunk as it is produced.
//!
//! Notes:
//! - Nothing is retained across upcalls; both converters reuse one scratch buffer.
//! - 16-bit pixel formats are passed through untouched; bit-layout interpretation is the sink's job.

mod audio;
mod video;

#[cfg(test)]
mod tests;

pub use audio::{AudioBatcher, BYTES_PER_STEREO_FRAME};
pub use video::{FormatSpec, FormatTable, FrameConverter, FrameGeometry, swap_red_blue_opaque};

use crate::abi::PixelFormat;

/// A packed frame: `height` rows of exactly `width * bytes_per_pixel` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Frame<'_> {
    pub fn bytes_per_pixel(&self) -> usize {
        if self.height == 0 || self.width == 0 {
            return 0;
        }
        self.data.len() / (self.width as usize * self.height as usize)
    }

    /// Row `y` of the packed data, or `None` past the last row.
    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.height as usize {
            return None;
        }
        let stride = self.data.len() / self.height as usize;
        self.data.get(y * stride..(y + 1) * stride)
    }
}

/// Consumes converted frames.
pub trait FrameSink {
    fn on_frame(&mut self, frame: &Frame<'_>);
}

impl<F: FnMut(&Frame<'_>)> FrameSink for F {
    fn on_frame(&mut self, frame: &Frame<'_>) {
        self(frame)
    }
}

/// Consumes interleaved little-endian 16-bit stereo audio; `samples.len()` is a multiple of 4.
pub trait AudioSink {
    fn on_samples(&mut self, samples: &[u8]);
}

impl<F: FnMut(&[u8])> AudioSink for F {
    fn on_samples(&mut self, samples: &[u8]) {
        self(samples)
    }
}

/// Reasons a video upcall could not be converted.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// The row stride is shorter than one row of pixels.
    PitchTooSmall { pitch: usize, row_bytes: usize },
    /// The buffer ends before the last row does.
    BufferTooShort { needed: usize, len: usize },
    /// `width * height * bytes_per_pixel` does not fit in memory.
    TooLarge,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::PitchTooSmall { pitch, row_bytes } => {
                write!(f, "pitch {pitch} is smaller than a {row_bytes}-byte row")
            }
            FrameError::BufferTooShort { needed, len } => {
                write!(f, "frame needs {needed} bytes but only {len} were provided")
            }
            FrameError::TooLarge => write!(f, "frame dimensions overflow"),
        }
    }
}

impl std::error::Error for FrameError {}
