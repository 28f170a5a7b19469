//! Per-session state.
//!
//! This module owns the host-side state that the upcall closures and the session facade share.
//! Each `RetroHost` has its own `SharedSession`; nothing here is process-global, so the negotiated
//! pixel format travels explicitly from the environment handler to the frame converter.

use std::cell::RefCell;
use std::ffi::{CStr, c_char};
use std::rc::Rc;

use crate::abi::{PixelFormat, SystemAvInfo, SystemInfo};

/// Shared handle used by upcall closures and the session facade.
pub type SharedSession = Rc<RefCell<SessionState>>;

/// Static description of a core, read once right after loading it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoreDescriptor {
    pub name: String,
    pub version: String,
    /// Whether the core must be given a path instead of an in-memory image.
    pub need_fullpath: bool,
    pub block_extract: bool,
    /// Supported file extensions, lower-case, without dots.
    pub extensions: Vec<String>,
}

impl CoreDescriptor {
    /// Copy the strings out of a native `retro_system_info`.
    ///
    /// # Safety
    /// Every non-null string pointer in `info` must be NUL-terminated and valid for reads.
    pub unsafe fn from_native(info: &SystemInfo) -> Self {
        // SAFETY: forwarded to the caller.
        let (name, version, extensions) = unsafe {
            (
                owned_string(info.library_name),
                owned_string(info.library_version),
                owned_string(info.valid_extensions),
            )
        };
        Self {
            name,
            version,
            need_fullpath: info.need_fullpath,
            block_extract: info.block_extract,
            extensions: split_extensions(&extensions),
        }
    }

    pub fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: caller guarantees a valid NUL-terminated string.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn split_extensions(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Nominal geometry and timing reported after a game is loaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvInfo {
    pub width: u32,
    pub height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// Core-reported display aspect; `<= 0` means "use width / height".
    pub aspect_ratio: f32,
    pub fps: f64,
    pub sample_rate: f64,
}

impl AvInfo {
    /// Effective display aspect ratio.
    pub fn display_aspect(&self) -> f32 {
        if self.aspect_ratio > 0.0 || self.height == 0 {
            self.aspect_ratio
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl From<&SystemAvInfo> for AvInfo {
    fn from(info: &SystemAvInfo) -> Self {
        Self {
            width: info.geometry.base_width,
            height: info.geometry.base_height,
            max_width: info.geometry.max_width,
            max_height: info.geometry.max_height,
            aspect_ratio: info.geometry.aspect_ratio,
            fps: info.timing.fps,
            sample_rate: info.timing.sample_rate,
        }
    }
}

/// Mutable session state.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Current pixel format. RGB565 until the core negotiates another one.
    pub pixel_format: PixelFormat,
    /// Whether `SET_PIXEL_FORMAT` has been received at least once.
    pub pixel_format_negotiated: bool,
    pub descriptor: Option<CoreDescriptor>,
    /// Populated after a successful game load.
    pub av_info: Option<AvInfo>,
    pub game_loaded: bool,
}

impl SessionState {
    pub fn new_shared() -> SharedSession {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Core name used for quirk lookups (empty before the descriptor is read).
    pub fn core_name(&self) -> &str {
        self.descriptor.as_ref().map(|d| d.name.as_str()).unwrap_or("")
    }

    /// Forget everything tied to the loaded game, keeping the core descriptor.
    pub fn clear_on_unload(&mut self) {
        self.av_info = None;
        self.game_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn descriptor_copies_native_strings() {
        // SAFETY: all-zero is a valid `retro_system_info` (null strings, false flags).
        let mut info: SystemInfo = unsafe { mem::zeroed() };
        info.library_name = c"Test Core".as_ptr();
        info.library_version = c"1.2.3".as_ptr();
        info.valid_extensions = c"gb|GBC| sgb |".as_ptr();
        info.need_fullpath = true;

        let descriptor = unsafe { CoreDescriptor::from_native(&info) };

        assert_eq!(descriptor.name, "Test Core");
        assert_eq!(descriptor.version, "1.2.3");
        assert!(descriptor.need_fullpath);
        assert!(!descriptor.block_extract);
        assert_eq!(descriptor.extensions, vec!["gb", "gbc", "sgb"]);
        assert!(descriptor.supports_extension(".GBC"));
        assert!(!descriptor.supports_extension("nes"));
    }

    #[test]
    fn descriptor_tolerates_null_strings() {
        let info: SystemInfo = unsafe { mem::zeroed() };
        let descriptor = unsafe { CoreDescriptor::from_native(&info) };
        assert_eq!(descriptor, CoreDescriptor::default());
    }

    #[test]
    fn display_aspect_falls_back_to_geometry() {
        let mut av = AvInfo {
            width: 240,
            height: 160,
            max_width: 240,
            max_height: 160,
            aspect_ratio: 0.0,
            fps: 59.7275,
            sample_rate: 32768.0,
        };
        assert_eq!(av.display_aspect(), 1.5);
        av.aspect_ratio = 4.0 / 3.0;
        assert_eq!(av.display_aspect(), 4.0 / 3.0);
    }

    #[test]
    fn unload_keeps_descriptor() {
        let mut state = SessionState {
            descriptor: Some(CoreDescriptor {
                name: "x".into(),
                ..Default::default()
            }),
            game_loaded: true,
            ..Default::default()
        };
        state.clear_on_unload();
        assert!(!state.game_loaded);
        assert_eq!(state.core_name(), "x");
    }
}
