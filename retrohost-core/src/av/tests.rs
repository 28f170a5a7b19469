use super::*;
use crate::abi::PixelFormat;

fn geometry(width: u32, height: u32, pitch: usize) -> FrameGeometry {
    FrameGeometry {
        width,
        height,
        pitch,
    }
}

/// Rows filled with `row index * 16 + column`, followed by 0xEE padding.
fn strided_rgb565(width: usize, height: usize, pitch: usize) -> Vec<u8> {
    let mut raw = vec![0xEE; pitch * height];
    for y in 0..height {
        for x in 0..width * 2 {
            raw[y * pitch + x] = (y * 16 + x) as u8;
        }
    }
    raw
}

#[test]
fn padding_is_dropped_row_by_row() {
    let raw = strided_rgb565(3, 2, 10);
    let mut conv = FrameConverter::default();

    let frame = conv
        .convert(Some(&raw), geometry(3, 2, 10), PixelFormat::Rgb565)
        .unwrap()
        .unwrap();

    assert_eq!(frame.width, 3);
    assert_eq!(frame.height, 2);
    assert_eq!(frame.bytes_per_pixel(), 2);
    assert_eq!(frame.data.len(), 3 * 2 * 2);
    assert_eq!(frame.row(0), Some(&[0, 1, 2, 3, 4, 5][..]));
    assert_eq!(frame.row(1), Some(&[16, 17, 18, 19, 20, 21][..]));
    assert_eq!(frame.row(2), None);
    assert!(!frame.data.contains(&0xEE));
}

#[test]
fn last_row_may_be_unpadded() {
    let mut raw = strided_rgb565(2, 3, 8);
    // Cut the final row down to exactly width * bpp bytes.
    raw.truncate(8 * 2 + 4);
    let mut conv = FrameConverter::default();

    let frame = conv
        .convert(Some(&raw), geometry(2, 3, 8), PixelFormat::Rgb565)
        .unwrap()
        .unwrap();

    assert_eq!(frame.row(2), Some(&[32, 33, 34, 35][..]));
}

#[test]
fn tight_pitch_passes_16_bit_formats_through() {
    let raw: Vec<u8> = (0..16).collect();
    let mut conv = FrameConverter::default();

    for format in [PixelFormat::Rgb565, PixelFormat::Argb1555] {
        let frame = conv
            .convert(Some(&raw), geometry(4, 2, 8), format)
            .unwrap()
            .unwrap();
        assert_eq!(frame.data, raw.as_slice());
        assert_eq!(frame.format, format);
    }
}

#[test]
fn xrgb8888_swaps_red_blue_and_forces_alpha() {
    // Little-endian XRGB8888 in memory: B G R X.
    let raw = [0x10, 0x20, 0x30, 0x00, 0xAA, 0xBB, 0xCC, 0x7F];
    let mut conv = FrameConverter::default();

    let frame = conv
        .convert(Some(&raw), geometry(2, 1, 8), PixelFormat::Xrgb8888)
        .unwrap()
        .unwrap();

    assert_eq!(frame.data, &[0x30, 0x20, 0x10, 0xFF, 0xCC, 0xBB, 0xAA, 0xFF]);
}

#[test]
fn xrgb8888_without_swap_is_copied_verbatim() {
    let raw = [0x10, 0x20, 0x30, 0x00];
    let mut conv = FrameConverter::new(FormatTable::new(false));

    let frame = conv
        .convert(Some(&raw), geometry(1, 1, 4), PixelFormat::Xrgb8888)
        .unwrap()
        .unwrap();

    assert_eq!(frame.data, &raw);
}

#[test]
fn unknown_formats_use_two_bytes_per_pixel() {
    let table = FormatTable::default();
    assert_eq!(
        table.lookup(PixelFormat::Unknown(42)),
        FormatSpec::PASSTHROUGH_16
    );

    let raw = [1, 2, 3, 4, 9, 9];
    let mut conv = FrameConverter::default();
    let frame = conv
        .convert(Some(&raw), geometry(2, 1, 6), PixelFormat::Unknown(42))
        .unwrap()
        .unwrap();
    assert_eq!(frame.data, &[1, 2, 3, 4]);
}

#[test]
fn inserted_formats_are_honoured() {
    fn invert(px: &mut [u8]) {
        px.iter_mut().for_each(|b| *b = !*b);
    }

    let mut conv = FrameConverter::default();
    conv.table_mut().insert(
        PixelFormat::Unknown(7),
        FormatSpec {
            bytes_per_pixel: 3,
            fixup: Some(invert),
        },
    );

    let raw = [0x00, 0x0F, 0xF0];
    let frame = conv
        .convert(Some(&raw), geometry(1, 1, 3), PixelFormat::Unknown(7))
        .unwrap()
        .unwrap();
    assert_eq!(frame.data, &[0xFF, 0xF0, 0x0F]);
}

#[test]
fn null_and_empty_inputs_are_skipped() {
    let mut conv = FrameConverter::default();
    let g = geometry(2, 2, 4);

    assert_eq!(conv.convert(None, g, PixelFormat::Rgb565), Ok(None));
    assert_eq!(conv.convert(Some(&[]), g, PixelFormat::Rgb565), Ok(None));
    assert_eq!(
        conv.convert(Some(&[0; 8]), geometry(0, 2, 4), PixelFormat::Rgb565),
        Ok(None)
    );

    let raw = unsafe {
        conv.convert_raw(std::ptr::null(), g, PixelFormat::Rgb565)
    };
    assert_eq!(raw, Ok(None));

    let sentinel = crate::abi::HW_FRAME_BUFFER_VALID as *const std::ffi::c_void;
    let hw = unsafe { conv.convert_raw(sentinel, g, PixelFormat::Rgb565) };
    assert_eq!(hw, Ok(None));
}

#[test]
fn raw_pointer_conversion_reads_only_what_geometry_needs() {
    // Exactly pitch * (height - 1) + row_bytes; one byte more would be out of bounds.
    let raw = strided_rgb565(2, 2, 6);
    let visible = &raw[..6 + 4];
    let mut conv = FrameConverter::default();

    let frame = unsafe {
        conv.convert_raw(
            visible.as_ptr().cast(),
            geometry(2, 2, 6),
            PixelFormat::Rgb565,
        )
    }
    .unwrap()
    .unwrap();

    assert_eq!(frame.data, &[0, 1, 2, 3, 16, 17, 18, 19]);
}

#[test]
fn malformed_geometry_is_an_error() {
    let mut conv = FrameConverter::default();

    assert_eq!(
        conv.convert(Some(&[0; 16]), geometry(4, 2, 6), PixelFormat::Rgb565),
        Err(FrameError::PitchTooSmall {
            pitch: 6,
            row_bytes: 8
        })
    );
    assert_eq!(
        conv.convert(Some(&[0; 10]), geometry(4, 2, 8), PixelFormat::Rgb565),
        Err(FrameError::BufferTooShort { needed: 16, len: 10 })
    );
}

#[test]
fn swap_helper_touches_one_pixel() {
    let mut px = [1, 2, 3, 4];
    swap_red_blue_opaque(&mut px);
    assert_eq!(px, [3, 2, 1, 255]);
}

#[test]
fn single_sample_is_four_little_endian_bytes() {
    let mut batcher = AudioBatcher::new();
    let out = batcher.sample(0x0102, -2);
    assert_eq!(out.len(), BYTES_PER_STEREO_FRAME);
    assert_eq!(out, &[0x02, 0x01, 0xFE, 0xFF]);
}

#[test]
fn batch_preserves_interleaving() {
    let mut batcher = AudioBatcher::new();
    let samples = [1i16, -1, 256, i16::MIN];

    let out = batcher.batch(&samples);

    assert_eq!(out.len(), 2 * BYTES_PER_STEREO_FRAME);
    assert_eq!(out, &[1, 0, 0xFF, 0xFF, 0, 1, 0x00, 0x80]);
    assert_eq!(AudioBatcher::frames_in(&samples), 2);
}

#[test]
fn batch_drops_a_trailing_half_frame() {
    let mut batcher = AudioBatcher::new();
    assert_eq!(batcher.batch(&[5, 6, 7]).len(), BYTES_PER_STEREO_FRAME);
    assert!(batcher.batch(&[]).is_empty());
}

#[test]
fn sinks_accept_closures() {
    let mut frames = 0;
    let mut bytes = 0;
    {
        let mut on_frame = |f: &Frame<'_>| {
            frames += 1;
            assert_eq!(f.width, 1);
        };
        let mut on_audio = |s: &[u8]| bytes += s.len();

        let mut conv = FrameConverter::default();
        let frame = conv
            .convert(Some(&[0, 0]), geometry(1, 1, 2), PixelFormat::Rgb565)
            .unwrap()
            .unwrap();
        on_frame.on_frame(&frame);

        let mut batcher = AudioBatcher::new();
        on_audio.on_samples(batcher.sample(0, 0));
    }
    assert_eq!(frames, 1);
    assert_eq!(bytes, 4);
}

#[test]
fn rows_of_an_empty_frame_are_absent() {
    let frame = Frame {
        data: &[],
        width: 4,
        height: 0,
        format: PixelFormat::Rgb565,
    };
    assert_eq!(frame.bytes_per_pixel(), 0);
    assert_eq!(frame.row(0), None);
}
