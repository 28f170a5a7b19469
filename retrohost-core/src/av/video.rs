use std::ffi::c_void;

use crate::abi::{HW_FRAME_BUFFER_VALID, PixelFormat};

use super::{Frame, FrameError};

/// Storage layout and fixup for one pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatSpec {
    pub bytes_per_pixel: usize,
    /// Applied to every packed pixel (a `bytes_per_pixel`-long slice).
    pub fixup: Option<fn(&mut [u8])>,
}

impl FormatSpec {
    /// Plain 16-bit storage, used for every format not in the table.
    pub const PASSTHROUGH_16: FormatSpec = FormatSpec {
        bytes_per_pixel: 2,
        fixup: None,
    };
}

/// Swap bytes 0 and 2 and force byte 3 to 255.
///
/// For little-endian XRGB8888 this turns `B G R X` into `R G B 0xFF`.
pub fn swap_red_blue_opaque(pixel: &mut [u8]) {
    pixel.swap(0, 2);
    pixel[3] = 0xFF;
}

/// Pixel format tag -> storage layout.
#[derive(Clone, Debug)]
pub struct FormatTable {
    entries: Vec<(PixelFormat, FormatSpec)>,
}

impl FormatTable {
    /// The published formats; `swap_xrgb8888` installs [`swap_red_blue_opaque`] for XRGB8888.
    pub fn new(swap_xrgb8888: bool) -> Self {
        let xrgb = FormatSpec {
            bytes_per_pixel: 4,
            fixup: swap_xrgb8888.then_some(swap_red_blue_opaque as fn(&mut [u8])),
        };
        Self {
            entries: vec![
                (PixelFormat::Rgb565, FormatSpec::PASSTHROUGH_16),
                (PixelFormat::Argb1555, FormatSpec::PASSTHROUGH_16),
                (PixelFormat::Xrgb8888, xrgb),
            ],
        }
    }

    pub fn lookup(&self, format: PixelFormat) -> FormatSpec {
        self.entries
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, spec)| *spec)
            .unwrap_or(FormatSpec::PASSTHROUGH_16)
    }

    /// Add or replace the layout for `format`.
    pub fn insert(&mut self, format: PixelFormat, spec: FormatSpec) {
        match self.entries.iter_mut().find(|(f, _)| *f == format) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((format, spec)),
        }
    }
}

impl Default for FormatTable {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Dimensions of a raw frame as reported by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub pitch: usize,
}

impl FrameGeometry {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn row_bytes(&self, bytes_per_pixel: usize) -> Result<usize, FrameError> {
        (self.width as usize)
            .checked_mul(bytes_per_pixel)
            .ok_or(FrameError::TooLarge)
    }

    /// Source bytes actually read: every full pitch but the last row, which may be unpadded.
    pub fn source_len(&self, bytes_per_pixel: usize) -> Result<usize, FrameError> {
        let row_bytes = self.row_bytes(bytes_per_pixel)?;
        if self.is_empty() {
            return Ok(0);
        }
        if self.pitch < row_bytes {
            return Err(FrameError::PitchTooSmall {
                pitch: self.pitch,
                row_bytes,
            });
        }
        self.pitch
            .checked_mul(self.height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or(FrameError::TooLarge)
    }
}

/// Packs strided core frames into tightly packed rows.
#[derive(Debug, Default)]
pub struct FrameConverter {
    table: FormatTable,
    packed: Vec<u8>,
}

impl FrameConverter {
    pub fn new(table: FormatTable) -> Self {
        Self {
            table,
            packed: Vec::new(),
        }
    }

    pub fn table(&self) -> &FormatTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut FormatTable {
        &mut self.table
    }

    /// Convert one frame.
    ///
    /// `None` or an empty buffer/geometry means "repeat the previous frame" and yields `Ok(None)`.
    pub fn convert<'a>(
        &'a mut self,
        raw: Option<&[u8]>,
        geometry: FrameGeometry,
        format: PixelFormat,
    ) -> Result<Option<Frame<'a>>, FrameError> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        if geometry.is_empty() {
            return Ok(None);
        }

        let spec = self.table.lookup(format);
        let bpp = spec.bytes_per_pixel;
        let row_bytes = geometry.row_bytes(bpp)?;
        let needed = geometry.source_len(bpp)?;
        if raw.len() < needed {
            return Err(FrameError::BufferTooShort {
                needed,
                len: raw.len(),
            });
        }
        let packed_len = row_bytes
            .checked_mul(geometry.height as usize)
            .ok_or(FrameError::TooLarge)?;

        self.packed.clear();
        self.packed.reserve(packed_len);
        for row in 0..geometry.height as usize {
            let start = row * geometry.pitch;
            self.packed.extend_from_slice(&raw[start..start + row_bytes]);
        }

        if let Some(fixup) = spec.fixup {
            for pixel in self.packed.chunks_exact_mut(bpp) {
                fixup(pixel);
            }
        }

        Ok(Some(Frame {
            data: &self.packed,
            width: geometry.width,
            height: geometry.height,
            format,
        }))
    }

    /// Convert a frame straight from the video-refresh upcall arguments.
    ///
    /// Null and the hardware-render sentinel are treated as "repeat previous frame".
    ///
    /// # Safety
    /// Unless null or the sentinel, `data` must be readable for
    /// `pitch * (height - 1) + width * bytes_per_pixel(format)` bytes.
    pub unsafe fn convert_raw(
        &mut self,
        data: *const c_void,
        geometry: FrameGeometry,
        format: PixelFormat,
    ) -> Result<Option<Frame<'_>>, FrameError> {
        if data.is_null() || data as usize == HW_FRAME_BUFFER_VALID || geometry.is_empty() {
            return Ok(None);
        }
        let len = geometry.source_len(self.table.lookup(format).bytes_per_pixel)?;
        // SAFETY: length derived from the geometry exactly as the caller guarantees.
        let raw = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) };
        self.convert(Some(raw), geometry, format)
    }
}
