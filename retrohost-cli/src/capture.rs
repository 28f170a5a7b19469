//! Frame and audio capture for the headless runner.
//!
//! Pixel interpretation lives here, on the sink side: the host hands over packed frames in the
//! core's own format and only this module knows how to turn them into RGBA.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result, bail};
use retrohost_core::{Frame, PixelFormat};

/// Owned copy of the most recent frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl From<&Frame<'_>> for CapturedFrame {
    fn from(frame: &Frame<'_>) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            data: frame.data.to_vec(),
        }
    }
}

fn expand5(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

fn expand6(v: u16) -> u8 {
    let v = (v & 0x3F) as u8;
    (v << 2) | (v >> 4)
}

/// Convert a packed frame to RGBA8.
///
/// `swapped` says whether the host already reordered XRGB8888 pixels to `R G B 0xFF`.
pub fn to_rgba(frame: &CapturedFrame, swapped: bool) -> Result<Vec<u8>> {
    let pixels = frame.width as usize * frame.height as usize;
    let mut out = Vec::with_capacity(pixels * 4);

    match frame.format {
        PixelFormat::Rgb565 => {
            for px in frame.data.chunks_exact(2) {
                let v = u16::from_le_bytes([px[0], px[1]]);
                out.extend_from_slice(&[expand5(v >> 11), expand6(v >> 5), expand5(v), 0xFF]);
            }
        }
        PixelFormat::Argb1555 => {
            for px in frame.data.chunks_exact(2) {
                let v = u16::from_le_bytes([px[0], px[1]]);
                out.extend_from_slice(&[expand5(v >> 10), expand5(v >> 5), expand5(v), 0xFF]);
            }
        }
        PixelFormat::Xrgb8888 => {
            for px in frame.data.chunks_exact(4) {
                if swapped {
                    out.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
                } else {
                    out.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
                }
            }
        }
        PixelFormat::Unknown(code) => bail!("cannot interpret pixel format code {code}"),
    }

    if out.len() != pixels * 4 {
        bail!(
            "frame holds {} bytes, expected {} pixels of {:?}",
            frame.data.len(),
            pixels,
            frame.format
        );
    }
    Ok(out)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

pub fn write_png(path: &Path, frame: &CapturedFrame, swapped: bool) -> Result<()> {
    let rgba = to_rgba(frame, swapped)?;
    create_parent(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&rgba)?;
    writer.finish()?;
    Ok(())
}

/// Write interleaved little-endian 16-bit stereo bytes as a WAV file.
pub fn write_wav(path: &Path, samples: &[u8], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    create_parent(path)?;
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for s in samples.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([s[0], s[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(format: PixelFormat, data: Vec<u8>) -> CapturedFrame {
        let bpp = if format == PixelFormat::Xrgb8888 { 4 } else { 2 };
        CapturedFrame {
            width: (data.len() / bpp) as u32,
            height: 1,
            format,
            data,
        }
    }

    #[test]
    fn rgb565_expands_to_full_range() {
        // Pure red, pure green, pure blue, white.
        let data = [0xF800u16, 0x07E0, 0x001F, 0xFFFF]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let rgba = to_rgba(&frame(PixelFormat::Rgb565, data), true).unwrap();
        assert_eq!(
            rgba,
            [
                255, 0, 0, 255, //
                0, 255, 0, 255, //
                0, 0, 255, 255, //
                255, 255, 255, 255,
            ]
        );
    }

    #[test]
    fn argb1555_ignores_the_top_bit() {
        let data = [0x7C00u16, 0x83E0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let rgba = to_rgba(&frame(PixelFormat::Argb1555, data), true).unwrap();
        assert_eq!(rgba, [255, 0, 0, 255, 0, 255, 0, 255]);
    }

    #[test]
    fn xrgb8888_honours_host_swap() {
        let swapped = frame(PixelFormat::Xrgb8888, vec![1, 2, 3, 255]);
        assert_eq!(to_rgba(&swapped, true).unwrap(), [1, 2, 3, 255]);

        let native = frame(PixelFormat::Xrgb8888, vec![3, 2, 1, 0]);
        assert_eq!(to_rgba(&native, false).unwrap(), [1, 2, 3, 255]);
    }

    #[test]
    fn unknown_formats_are_refused() {
        assert!(to_rgba(&frame(PixelFormat::Unknown(9), vec![0, 0]), true).is_err());
    }

    #[test]
    fn writes_png_and_wav() {
        let dir = tempfile::tempdir().unwrap();
        let png_path = dir.path().join("out").join("frame.png");
        let wav_path = dir.path().join("audio.wav");

        write_png(&png_path, &frame(PixelFormat::Rgb565, vec![0xFF; 8]), true).unwrap();
        assert!(fs::metadata(&png_path).unwrap().len() > 0);

        let samples: Vec<u8> = [1i16, -1, 300, -300]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        write_wav(&wav_path, &samples, 32768).unwrap();

        let mut reader = hound::WavReader::open(&wav_path).unwrap();
        assert_eq!(reader.spec().sample_rate, 32768);
        assert_eq!(reader.spec().channels, 2);
        let read: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(read, vec![1, -1, 300, -300]);
    }
}
