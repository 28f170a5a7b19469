//! retrohost-core ABI module
//!
//! This module defines the binary contract between:
//! - **Host**: `retrohost-core` (the frontend side)
//! - **Core**: a third-party libretro plugin loaded at runtime
//!
//! Everything here must match the published libretro header byte-for-byte: cores are compiled
//! against it and never see our Rust types.
//!
//! ## Entry points (host -> core)
//! Resolved by name from the loaded module, see [`entry_points`].
//!
//! ## Upcalls (core -> host)
//! Plain C function pointers handed to the core through the `retro_set_*` entry points, plus the
//! log and frame-time shims installed through the environment protocol. Their signatures are the
//! `*Fn` aliases below; the host side of each lives in `crate::runtime::imports`.
//!
//! ## Struct layouts
//! `retro_system_info`, `retro_game_info` and `retro_system_av_info` come from `libretro-sys`.
//! The few structs the environment protocol writes into are declared here.

use std::ffi::{c_char, c_uint, c_void};

pub use libretro_sys::{GameGeometry, GameInfo, SystemAvInfo, SystemInfo, SystemTiming};

/// `RETRO_API_VERSION` the host was written against.
pub const API_VERSION: c_uint = 1;

/// Sentinel frame address used by hardware-rendered cores (`RETRO_HW_FRAME_BUFFER_VALID`).
pub const HW_FRAME_BUFFER_VALID: usize = usize::MAX;

/// Core export names.
pub mod entry_points {
    pub const SET_ENVIRONMENT: &str = "retro_set_environment";
    pub const SET_VIDEO_REFRESH: &str = "retro_set_video_refresh";
    pub const SET_INPUT_POLL: &str = "retro_set_input_poll";
    pub const SET_INPUT_STATE: &str = "retro_set_input_state";
    pub const SET_AUDIO_SAMPLE: &str = "retro_set_audio_sample";
    pub const SET_AUDIO_SAMPLE_BATCH: &str = "retro_set_audio_sample_batch";
    pub const INIT: &str = "retro_init";
    pub const DEINIT: &str = "retro_deinit";
    pub const GET_SYSTEM_INFO: &str = "retro_get_system_info";
    pub const LOAD_GAME: &str = "retro_load_game";
    pub const GET_SYSTEM_AV_INFO: &str = "retro_get_system_av_info";
    pub const RUN: &str = "retro_run";

    // Optional.
    pub const API_VERSION: &str = "retro_api_version";
    pub const RESET: &str = "retro_reset";
    pub const UNLOAD_GAME: &str = "retro_unload_game";
    pub const SERIALIZE_SIZE: &str = "retro_serialize_size";
    pub const SERIALIZE: &str = "retro_serialize";
    pub const UNSERIALIZE: &str = "retro_unserialize";

    /// Every entry point whose absence aborts loading, in resolution order.
    pub const REQUIRED: [&str; 12] = [
        SET_ENVIRONMENT,
        SET_VIDEO_REFRESH,
        SET_INPUT_POLL,
        SET_INPUT_STATE,
        SET_AUDIO_SAMPLE,
        SET_AUDIO_SAMPLE_BATCH,
        INIT,
        DEINIT,
        GET_SYSTEM_INFO,
        LOAD_GAME,
        GET_SYSTEM_AV_INFO,
        RUN,
    ];
}

/// Environment command codes (`RETRO_ENVIRONMENT_*`).
///
/// Only the subset the host answers is listed; every other code is unhandled.
pub mod environment {
    use std::ffi::c_uint;

    pub const GET_CAN_DUPE: c_uint = 3;
    pub const GET_SYSTEM_DIRECTORY: c_uint = 9;
    pub const SET_PIXEL_FORMAT: c_uint = 10;
    pub const SET_FRAME_TIME_CALLBACK: c_uint = 21;
    pub const GET_LOG_INTERFACE: c_uint = 27;
    pub const GET_SAVE_DIRECTORY: c_uint = 31;

    /// Flag OR-ed into commands that are not part of the stable API.
    pub const EXPERIMENTAL: c_uint = 0x10000;
}

/// Device types passed to the input-state upcall (`RETRO_DEVICE_*`).
pub mod device {
    use std::ffi::c_uint;

    pub const NONE: c_uint = 0;
    pub const JOYPAD: c_uint = 1;
    pub const MOUSE: c_uint = 2;
    pub const KEYBOARD: c_uint = 3;
    pub const LIGHTGUN: c_uint = 4;
    pub const ANALOG: c_uint = 5;
    pub const POINTER: c_uint = 6;
}

/// Joypad button ids (`RETRO_DEVICE_ID_JOYPAD_*`).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoypadButton {
    B = 0,
    Y = 1,
    Select = 2,
    Start = 3,
    Up = 4,
    Down = 5,
    Left = 6,
    Right = 7,
    A = 8,
    X = 9,
    L1 = 10,
    R1 = 11,
    L2 = 12,
    R2 = 13,
    L3 = 14,
    R3 = 15,
}

impl JoypadButton {
    pub const ALL: [JoypadButton; 16] = [
        JoypadButton::B,
        JoypadButton::Y,
        JoypadButton::Select,
        JoypadButton::Start,
        JoypadButton::Up,
        JoypadButton::Down,
        JoypadButton::Left,
        JoypadButton::Right,
        JoypadButton::A,
        JoypadButton::X,
        JoypadButton::L1,
        JoypadButton::R1,
        JoypadButton::L2,
        JoypadButton::R2,
        JoypadButton::L3,
        JoypadButton::R3,
    ];

    pub fn from_id(id: c_uint) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

/// Pixel format negotiated through `SET_PIXEL_FORMAT`.
///
/// The native enum is `retro_pixel_format`; codes are stored without validation, so an unknown
/// code is kept verbatim rather than rejected.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    /// `RETRO_PIXEL_FORMAT_0RGB1555`, 2 bytes per pixel.
    Argb1555,
    /// `RETRO_PIXEL_FORMAT_XRGB8888`, 4 bytes per pixel.
    Xrgb8888,
    /// `RETRO_PIXEL_FORMAT_RGB565`, 2 bytes per pixel.
    #[default]
    Rgb565,
    /// Any code outside the published set (including `RETRO_PIXEL_FORMAT_UNKNOWN`).
    Unknown(c_uint),
}

impl PixelFormat {
    pub const fn from_code(code: c_uint) -> Self {
        match code {
            0 => PixelFormat::Argb1555,
            1 => PixelFormat::Xrgb8888,
            2 => PixelFormat::Rgb565,
            other => PixelFormat::Unknown(other),
        }
    }

    pub const fn code(self) -> c_uint {
        match self {
            PixelFormat::Argb1555 => 0,
            PixelFormat::Xrgb8888 => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Unknown(code) => code,
        }
    }
}

/// `enum retro_log_level`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Out-of-range levels are reported as errors so they are never silently dropped.
    pub const fn from_code(code: c_uint) -> Self {
        match code {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

// --- Upcall signatures (core -> host) ---

pub type EnvironmentFn = unsafe extern "C" fn(cmd: c_uint, data: *mut c_void) -> bool;
pub type VideoRefreshFn =
    unsafe extern "C" fn(data: *const c_void, width: c_uint, height: c_uint, pitch: usize);
pub type InputPollFn = unsafe extern "C" fn();
pub type InputStateFn =
    unsafe extern "C" fn(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16;
pub type AudioSampleFn = unsafe extern "C" fn(left: i16, right: i16);
pub type AudioSampleBatchFn = unsafe extern "C" fn(data: *const i16, frames: usize) -> usize;

/// `retro_log_printf_t` as the core sees it. It is variadic; the host side only ever reads the
/// two named arguments (see `runtime::imports::log_printf`).
pub type LogPrintfFn = unsafe extern "C" fn(level: c_uint, fmt: *const c_char, ...);
/// The non-variadic shape of the host's log shim.
pub type LogShimFn = unsafe extern "C" fn(level: c_uint, fmt: *const c_char);

pub type FrameTimeCallbackFn = unsafe extern "C" fn(usec: i64);

/// `struct retro_log_callback`.
#[repr(C)]
pub struct LogCallback {
    pub log: LogPrintfFn,
}

/// `struct retro_frame_time_callback`.
#[repr(C)]
pub struct FrameTimeCallback {
    pub callback: Option<FrameTimeCallbackFn>,
    pub reference: i64,
}

/// Reinterpret the two-argument log shim as the variadic `retro_log_printf_t`.
///
/// Callers of a variadic pointer pass the named arguments exactly as for a non-variadic
/// function on every supported C ABI; the shim never touches the variadic tail.
pub fn log_shim_as_printf(shim: LogShimFn) -> LogPrintfFn {
    // SAFETY: both are `extern "C"` function pointers of identical size; see above.
    unsafe { std::mem::transmute::<LogShimFn, LogPrintfFn>(shim) }
}

/// Entry-point table resolved from a core.
///
/// Required entries are plain function pointers; optional ones are `None` when the core does not
/// export them.
#[derive(Clone, Copy)]
pub struct CoreApi {
    pub retro_set_environment: unsafe extern "C" fn(EnvironmentFn),
    pub retro_set_video_refresh: unsafe extern "C" fn(VideoRefreshFn),
    pub retro_set_input_poll: unsafe extern "C" fn(InputPollFn),
    pub retro_set_input_state: unsafe extern "C" fn(InputStateFn),
    pub retro_set_audio_sample: unsafe extern "C" fn(AudioSampleFn),
    pub retro_set_audio_sample_batch: unsafe extern "C" fn(AudioSampleBatchFn),
    pub retro_init: unsafe extern "C" fn(),
    pub retro_deinit: unsafe extern "C" fn(),
    pub retro_get_system_info: unsafe extern "C" fn(*mut SystemInfo),
    pub retro_load_game: unsafe extern "C" fn(*const GameInfo) -> bool,
    pub retro_get_system_av_info: unsafe extern "C" fn(*mut SystemAvInfo),
    pub retro_run: unsafe extern "C" fn(),

    pub retro_api_version: Option<unsafe extern "C" fn() -> c_uint>,
    pub retro_reset: Option<unsafe extern "C" fn()>,
    pub retro_unload_game: Option<unsafe extern "C" fn()>,
    pub retro_serialize_size: Option<unsafe extern "C" fn() -> usize>,
    pub retro_serialize: Option<unsafe extern "C" fn(*mut c_void, usize) -> bool>,
    pub retro_unserialize: Option<unsafe extern "C" fn(*const c_void, usize) -> bool>,
}

impl std::fmt::Debug for CoreApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreApi")
            .field("retro_api_version", &self.retro_api_version.is_some())
            .field("retro_reset", &self.retro_reset.is_some())
            .field("retro_unload_game", &self.retro_unload_game.is_some())
            .field("serialization", &self.supports_serialization())
            .finish_non_exhaustive()
    }
}

impl CoreApi {
    /// Whether the whole serialize/serialize_size/unserialize family is present.
    pub fn supports_serialization(&self) -> bool {
        self.retro_serialize_size.is_some()
            && self.retro_serialize.is_some()
            && self.retro_unserialize.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_codes_match_retro_pixel_format() {
        assert_eq!(PixelFormat::from_code(0), PixelFormat::Argb1555);
        assert_eq!(PixelFormat::from_code(1), PixelFormat::Xrgb8888);
        assert_eq!(PixelFormat::from_code(2), PixelFormat::Rgb565);
        assert_eq!(PixelFormat::from_code(0x7fff_ffff), PixelFormat::Unknown(0x7fff_ffff));
        assert_eq!(PixelFormat::Unknown(9).code(), 9);
        assert_eq!(PixelFormat::default(), PixelFormat::Rgb565);
    }

    #[test]
    fn joypad_ids_follow_header_order() {
        assert_eq!(JoypadButton::from_id(0), Some(JoypadButton::B));
        assert_eq!(JoypadButton::from_id(8), Some(JoypadButton::A));
        assert_eq!(JoypadButton::from_id(15), Some(JoypadButton::R3));
        assert_eq!(JoypadButton::from_id(16), None);
        for button in JoypadButton::ALL {
            assert_eq!(JoypadButton::from_id(button as c_uint), Some(button));
        }
    }

    #[test]
    fn log_levels_clamp_to_error() {
        assert_eq!(LogLevel::from_code(0), LogLevel::Debug);
        assert_eq!(LogLevel::from_code(3), LogLevel::Error);
        assert_eq!(LogLevel::from_code(42), LogLevel::Error);
    }

    #[test]
    fn required_entry_points_are_unique() {
        let mut names = entry_points::REQUIRED.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), entry_points::REQUIRED.len());
    }
}
