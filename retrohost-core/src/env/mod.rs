//! Environment negotiation.
//!
//! The core queries and configures the host through a single upcall,
//! `environment(cmd, data) -> bool`, at any point during `set_environment`, `init`, `load_game`
//! or `run`. The payload's type depends on the command. Only the commands in
//! [`EnvironmentNegotiator::supported_commands`] are answered; everything else returns `false`
//! and leaves the session untouched.

use std::collections::HashMap;
use std::ffi::{CString, c_char, c_uint, c_void};
use std::path::Path;

use log::{debug, info, trace};

use crate::abi::{
    EnvironmentFn, FrameTimeCallback, LogCallback, PixelFormat, environment as cmd,
    log_shim_as_printf,
};
use crate::config::HostConfig;
use crate::error::HostError;
use crate::logging::{SharedLogSink, sanitize_format};
use crate::runtime::CallbackRegistry;
use crate::state::SharedSession;

/// Handles one command. `data` is non-null and points at that command's payload.
type Handler = unsafe fn(&EnvironmentNegotiator, *mut c_void) -> bool;

/// Answers the core's environment upcall for one session.
pub struct EnvironmentNegotiator {
    session: SharedSession,
    registry: CallbackRegistry,
    log_sink: SharedLogSink,
    // Handed to the core by address; must outlive every call.
    system_directory: CString,
    save_directory: CString,
    handlers: HashMap<c_uint, Handler>,
}

/// The path's raw OS bytes as a C string. Non-Unix paths go through UTF-8.
pub(crate) fn path_to_cstring(path: &Path) -> Result<CString, HostError> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path.to_string_lossy().into_owned().into_bytes();

    CString::new(bytes).map_err(|_| HostError::InvalidPath(path.to_path_buf()))
}

impl EnvironmentNegotiator {
    pub(crate) fn new(
        config: &HostConfig,
        session: SharedSession,
        registry: CallbackRegistry,
        log_sink: SharedLogSink,
    ) -> Result<Self, HostError> {
        let mut handlers: HashMap<c_uint, Handler> = HashMap::new();
        handlers.insert(cmd::GET_SYSTEM_DIRECTORY, Self::get_system_directory);
        handlers.insert(cmd::GET_SAVE_DIRECTORY, Self::get_save_directory);
        handlers.insert(cmd::SET_PIXEL_FORMAT, Self::set_pixel_format);
        handlers.insert(cmd::GET_LOG_INTERFACE, Self::get_log_interface);
        handlers.insert(cmd::GET_CAN_DUPE, Self::get_can_dupe);
        handlers.insert(cmd::SET_FRAME_TIME_CALLBACK, Self::set_frame_time_callback);

        Ok(Self {
            session,
            registry,
            log_sink,
            system_directory: path_to_cstring(&config.system_directory)?,
            save_directory: path_to_cstring(config.effective_save_directory())?,
            handlers,
        })
    }

    /// Command codes this negotiator answers, ascending.
    pub fn supported_commands(&self) -> Vec<c_uint> {
        let mut codes: Vec<c_uint> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Register this negotiator as the session's environment upcall.
    pub(crate) fn install(self) -> EnvironmentFn {
        let registry = self.registry.clone();
        // SAFETY: the core passes the payload type documented for each command.
        registry.register_environment(move |command, data| unsafe { self.handle(command, data) })
    }

    /// Dispatch one environment command.
    ///
    /// # Safety
    /// Unless null, `data` must point at the payload type libretro defines for `command`.
    pub unsafe fn handle(&self, command: c_uint, data: *mut c_void) -> bool {
        let Some(handler) = self.handlers.get(&command) else {
            if command & cmd::EXPERIMENTAL != 0 {
                debug!(
                    "unhandled experimental environment command {}",
                    command & !cmd::EXPERIMENTAL
                );
            } else {
                debug!("unhandled environment command {command}");
            }
            return false;
        };
        if data.is_null() {
            debug!("environment command {command} with null payload");
            return false;
        }
        // SAFETY: non-null and typed per the caller's contract.
        unsafe { handler(self, data) }
    }

    unsafe fn get_system_directory(&self, data: *mut c_void) -> bool {
        // SAFETY: payload is `const char **`.
        unsafe { *data.cast::<*const c_char>() = self.system_directory.as_ptr() };
        true
    }

    unsafe fn get_save_directory(&self, data: *mut c_void) -> bool {
        // SAFETY: payload is `const char **`.
        unsafe { *data.cast::<*const c_char>() = self.save_directory.as_ptr() };
        true
    }

    unsafe fn set_pixel_format(&self, data: *mut c_void) -> bool {
        // SAFETY: payload is `const enum retro_pixel_format *`.
        let code = unsafe { *data.cast::<c_uint>() };
        let format = PixelFormat::from_code(code);

        let mut session = self.session.borrow_mut();
        if session.pixel_format_negotiated && session.pixel_format != format {
            info!(
                "core switched pixel format from {:?} to {format:?}",
                session.pixel_format
            );
        } else {
            info!("core pixel format: {format:?}");
        }
        session.pixel_format = format;
        session.pixel_format_negotiated = true;
        true
    }

    unsafe fn get_log_interface(&self, data: *mut c_void) -> bool {
        let sink = self.log_sink.clone();
        let shim = self.registry.register_log(move |level, fmt| {
            let message = sanitize_format(&fmt.to_string_lossy());
            // A sink that logs from inside its own callback is not re-entered.
            if let Ok(mut sink) = sink.try_borrow_mut() {
                sink.log(level, &message);
            }
        });
        // SAFETY: payload is `struct retro_log_callback *`.
        unsafe {
            data.cast::<LogCallback>().write(LogCallback {
                log: log_shim_as_printf(shim),
            })
        };
        true
    }

    unsafe fn get_can_dupe(&self, data: *mut c_void) -> bool {
        // SAFETY: payload is `bool *`.
        unsafe { *data.cast::<bool>() = true };
        true
    }

    unsafe fn set_frame_time_callback(&self, data: *mut c_void) -> bool {
        let shim = self
            .registry
            .register_frame_time(|usec| trace!("frame time {usec}us"));
        // SAFETY: payload is `struct retro_frame_time_callback *`.
        let callback = unsafe { &mut *data.cast::<FrameTimeCallback>() };
        debug!(
            "core requested frame timing (reference {}us)",
            callback.reference
        );
        callback.callback = Some(shim);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::LogLevel;
    use crate::logging::LogSink;
    use crate::state::SessionState;
    use std::cell::RefCell;
    use std::ffi::CStr;
    use std::mem::MaybeUninit;
    use std::ptr;
    use std::rc::Rc;

    struct Fixture {
        session: SharedSession,
        registry: CallbackRegistry,
        messages: Rc<RefCell<Vec<(LogLevel, String)>>>,
        negotiator: EnvironmentNegotiator,
    }

    fn fixture(config: HostConfig) -> Fixture {
        let session = SessionState::new_shared();
        let registry = CallbackRegistry::new();
        let messages = Rc::new(RefCell::new(Vec::new()));
        let seen = messages.clone();
        let sink: Box<dyn LogSink> = Box::new(move |level: LogLevel, msg: &str| {
            seen.borrow_mut().push((level, msg.to_owned()));
        });
        let negotiator = EnvironmentNegotiator::new(
            &config,
            session.clone(),
            registry.clone(),
            Rc::new(RefCell::new(sink)),
        )
        .unwrap();
        Fixture {
            session,
            registry,
            messages,
            negotiator,
        }
    }

    fn read_dir(f: &Fixture, command: c_uint) -> String {
        let mut out: *const c_char = ptr::null();
        assert!(unsafe { f.negotiator.handle(command, (&raw mut out).cast()) });
        unsafe { CStr::from_ptr(out) }.to_str().unwrap().to_owned()
    }

    #[test]
    fn directories_come_from_config() {
        let f = fixture(HostConfig::default().with_system_directory("/bios"));
        assert_eq!(read_dir(&f, cmd::GET_SYSTEM_DIRECTORY), "/bios");
        assert_eq!(read_dir(&f, cmd::GET_SAVE_DIRECTORY), "/bios");

        let f = fixture(HostConfig::default().with_save_directory("/saves"));
        assert_eq!(read_dir(&f, cmd::GET_SYSTEM_DIRECTORY), ".");
        assert_eq!(read_dir(&f, cmd::GET_SAVE_DIRECTORY), "/saves");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_directories_keep_their_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = b"/bios/caf\xE9";
        let f = fixture(HostConfig::default().with_system_directory(OsStr::from_bytes(raw)));

        let mut out: *const c_char = ptr::null();
        assert!(unsafe { f.negotiator.handle(cmd::GET_SYSTEM_DIRECTORY, (&raw mut out).cast()) });
        assert_eq!(unsafe { CStr::from_ptr(out) }.to_bytes(), raw);
    }

    #[test]
    fn interior_nul_in_directory_is_rejected() {
        let config = HostConfig::default().with_system_directory("bad\0dir");
        let result = EnvironmentNegotiator::new(
            &config,
            SessionState::new_shared(),
            CallbackRegistry::new(),
            crate::logging::default_log_sink(),
        );
        assert!(matches!(result, Err(HostError::InvalidPath(_))));
    }

    #[test]
    fn pixel_format_is_stored_without_validation() {
        let f = fixture(HostConfig::default());
        assert_eq!(f.session.borrow().pixel_format, PixelFormat::Rgb565);

        let mut code: c_uint = 1;
        assert!(unsafe { f.negotiator.handle(cmd::SET_PIXEL_FORMAT, (&raw mut code).cast()) });
        assert_eq!(f.session.borrow().pixel_format, PixelFormat::Xrgb8888);
        assert!(f.session.borrow().pixel_format_negotiated);

        code = 77;
        assert!(unsafe { f.negotiator.handle(cmd::SET_PIXEL_FORMAT, (&raw mut code).cast()) });
        assert_eq!(f.session.borrow().pixel_format, PixelFormat::Unknown(77));
    }

    #[test]
    fn unknown_commands_and_null_payloads_change_nothing() {
        let f = fixture(HostConfig::default());
        let mut payload = [0u8; 64];

        assert!(!unsafe { f.negotiator.handle(0xDEAD, payload.as_mut_ptr().cast()) });
        assert!(!unsafe {
            f.negotiator
                .handle(cmd::EXPERIMENTAL | 42, payload.as_mut_ptr().cast())
        });
        assert!(!unsafe { f.negotiator.handle(cmd::SET_PIXEL_FORMAT, ptr::null_mut()) });

        let session = f.session.borrow();
        assert_eq!(session.pixel_format, PixelFormat::Rgb565);
        assert!(!session.pixel_format_negotiated);
        assert!(session.av_info.is_none());
        assert_eq!(payload, [0u8; 64]);
        assert!(f.registry.is_empty());
    }

    #[test]
    fn can_dupe_is_declared() {
        let f = fixture(HostConfig::default());
        let mut dupe = false;
        assert!(unsafe { f.negotiator.handle(cmd::GET_CAN_DUPE, (&raw mut dupe).cast()) });
        assert!(dupe);
    }

    #[test]
    fn log_interface_sanitizes_and_forwards() {
        let f = fixture(HostConfig::default());
        let mut cb = MaybeUninit::<LogCallback>::uninit();
        assert!(unsafe {
            f.negotiator
                .handle(cmd::GET_LOG_INTERFACE, cb.as_mut_ptr().cast())
        });
        let cb = unsafe { cb.assume_init() };

        let _guard = f.registry.enter();
        unsafe { (cb.log)(2, c"bank %d of %s\n".as_ptr(), 3i32, c"rom".as_ptr()) };

        assert_eq!(
            *f.messages.borrow(),
            vec![(LogLevel::Warn, "bank <?> of <?>".to_owned())]
        );
    }

    #[test]
    fn frame_time_callback_gets_a_shim() {
        let f = fixture(HostConfig::default());
        let mut cb = FrameTimeCallback {
            callback: None,
            reference: 16_666,
        };
        assert!(unsafe {
            f.negotiator
                .handle(cmd::SET_FRAME_TIME_CALLBACK, (&raw mut cb).cast())
        });
        assert!(cb.callback.is_some());
        assert_eq!(cb.reference, 16_666);
    }

    #[test]
    fn installed_negotiator_routes_through_registry() {
        let f = fixture(HostConfig::default());
        assert_eq!(
            f.negotiator.supported_commands(),
            vec![3, 9, 10, 21, 27, 31]
        );
        let Fixture {
            session,
            registry,
            negotiator,
            ..
        } = f;
        let env = negotiator.install();

        let mut code: c_uint = 0;
        let _guard = registry.enter();
        assert!(unsafe { env(cmd::SET_PIXEL_FORMAT, (&raw mut code).cast()) });
        assert_eq!(session.borrow().pixel_format, PixelFormat::Argb1555);
    }
}
