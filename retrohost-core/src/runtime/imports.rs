//! Host upcall definitions.
//!
//! These are the only addresses ever handed to a core. Each one forwards to the matching closure in
//! the active [`CallbackRegistry`](super::CallbackRegistry) and falls back to a neutral answer
//! when no session is active on the calling thread (a core calling from a thread of its own, or
//! after dispose).

use std::ffi::{CStr, c_char, c_uint, c_void};

use log::{trace, warn};

use crate::abi::LogLevel;

use super::registry::active_handler;

pub(crate) unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    match active_handler(|s| s.environment.clone()) {
        Some(handler) => handler(cmd, data),
        None => {
            warn!("environment command {cmd} received with no active session");
            false
        }
    }
}

pub(crate) unsafe extern "C" fn video_refresh(
    data: *const c_void,
    width: c_uint,
    height: c_uint,
    pitch: usize,
) {
    if let Some(handler) = active_handler(|s| s.video_refresh.clone()) {
        handler(data, width, height, pitch);
    }
}

pub(crate) unsafe extern "C" fn input_poll() {
    if let Some(handler) = active_handler(|s| s.input_poll.clone()) {
        handler();
    }
}

pub(crate) unsafe extern "C" fn input_state(
    port: c_uint,
    device: c_uint,
    index: c_uint,
    id: c_uint,
) -> i16 {
    active_handler(|s| s.input_state.clone())
        .map(|handler| handler(port, device, index, id))
        .unwrap_or(0)
}

pub(crate) unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    if let Some(handler) = active_handler(|s| s.audio_sample.clone()) {
        handler(left, right);
    }
}

/// `data` holds `frames` interleaved stereo frames, i.e. `frames * 2` samples.
pub(crate) unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    if data.is_null() {
        return 0;
    }
    let Some(samples) = frames.checked_mul(2) else {
        return 0;
    };
    let Some(handler) = active_handler(|s| s.audio_sample_batch.clone()) else {
        return 0;
    };

    // SAFETY: the core guarantees `data` points at `frames` stereo frames for this call.
    let samples = unsafe { std::slice::from_raw_parts(data, samples) };
    handler(samples)
}

/// Installed through `GET_LOG_INTERFACE` as a variadic `retro_log_printf_t`; only the level and
/// format string are read.
pub(crate) unsafe extern "C" fn log_printf(level: c_uint, fmt: *const c_char) {
    if fmt.is_null() {
        return;
    }
    let Some(handler) = active_handler(|s| s.log.clone()) else {
        trace!("dropping core log message with no active session");
        return;
    };

    // SAFETY: the core passes a NUL-terminated format string.
    let message = unsafe { CStr::from_ptr(fmt) };
    handler(LogLevel::from_code(level), message);
}

pub(crate) unsafe extern "C" fn frame_time(usec: i64) {
    if let Some(handler) = active_handler(|s| s.frame_time.clone()) {
        handler(usec);
    }
}
