//! Core loading and entry-point access.
//!
//! Responsibilities:
//! - Map a libretro core from disk and resolve its entry points into a [`CoreApi`].
//! - Fail fast, naming the symbol, when a required entry point is absent.
//! - Wrap every call into the core so it runs with the session's [`CallbackRegistry`] active.
//! - Tear down in order (unload game, deinit, unmap) exactly once.
//!
//! Notes:
//! - A loaded core is trusted: once mapped, its entry points are called as safe functions.
//! - [`CoreLibrary::from_api`] accepts a table built from statically linked functions; such a
//!   handle owns no module.

use std::ffi::c_uint;
use std::mem;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::{debug, warn};

use crate::abi::{
    API_VERSION, AudioSampleBatchFn, AudioSampleFn, CoreApi, EnvironmentFn, GameInfo,
    InputPollFn, InputStateFn, SystemAvInfo, SystemInfo, VideoRefreshFn, entry_points,
};
use crate::error::HostError;
use crate::runtime::CallbackRegistry;
use crate::state::{AvInfo, CoreDescriptor};

/// The six upcall addresses handed to a core before `retro_init`.
#[derive(Clone, Copy)]
pub struct Upcalls {
    pub environment: EnvironmentFn,
    pub video_refresh: VideoRefreshFn,
    pub input_poll: InputPollFn,
    pub input_state: InputStateFn,
    pub audio_sample: AudioSampleFn,
    pub audio_sample_batch: AudioSampleBatchFn,
}

/// A loaded core: module, entry points and the closures it may call back into.
pub struct CoreLibrary {
    api: CoreApi,
    registry: CallbackRegistry,
    path: Option<PathBuf>,
    initialized: bool,
    game_loaded: bool,
    disposed: bool,
    library: Option<Library>,
}

impl std::fmt::Debug for CoreLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreLibrary")
            .field("path", &self.path)
            .field("api", &self.api)
            .field("initialized", &self.initialized)
            .field("game_loaded", &self.game_loaded)
            .field("disposed", &self.disposed)
            .finish()
    }
}

fn required<T: Copy>(lib: &Library, name: &'static str) -> Result<T, HostError> {
    // SAFETY: `T` is the fn-pointer type the libretro header declares for `name`.
    let symbol = unsafe { lib.get::<T>(name.as_bytes()) }
        .map_err(|_| HostError::SymbolResolutionFailure { symbol: name })?;
    Ok(*symbol)
}

fn optional<T: Copy>(lib: &Library, name: &'static str) -> Option<T> {
    // SAFETY: as for `required`.
    let symbol = unsafe { lib.get::<T>(name.as_bytes()) }.ok()?;
    Some(*symbol)
}

/// Resolve the entry-point table; required symbols in [`entry_points::REQUIRED`] order.
fn resolve(lib: &Library) -> Result<CoreApi, HostError> {
    use entry_points as ep;
    Ok(CoreApi {
        retro_set_environment: required(lib, ep::SET_ENVIRONMENT)?,
        retro_set_video_refresh: required(lib, ep::SET_VIDEO_REFRESH)?,
        retro_set_input_poll: required(lib, ep::SET_INPUT_POLL)?,
        retro_set_input_state: required(lib, ep::SET_INPUT_STATE)?,
        retro_set_audio_sample: required(lib, ep::SET_AUDIO_SAMPLE)?,
        retro_set_audio_sample_batch: required(lib, ep::SET_AUDIO_SAMPLE_BATCH)?,
        retro_init: required(lib, ep::INIT)?,
        retro_deinit: required(lib, ep::DEINIT)?,
        retro_get_system_info: required(lib, ep::GET_SYSTEM_INFO)?,
        retro_load_game: required(lib, ep::LOAD_GAME)?,
        retro_get_system_av_info: required(lib, ep::GET_SYSTEM_AV_INFO)?,
        retro_run: required(lib, ep::RUN)?,

        retro_api_version: optional(lib, ep::API_VERSION),
        retro_reset: optional(lib, ep::RESET),
        retro_unload_game: optional(lib, ep::UNLOAD_GAME),
        retro_serialize_size: optional(lib, ep::SERIALIZE_SIZE),
        retro_serialize: optional(lib, ep::SERIALIZE),
        retro_unserialize: optional(lib, ep::UNSERIALIZE),
    })
}

impl CoreLibrary {
    /// Map the core at `path` and resolve its entry points.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        // SAFETY: loading a core runs its initializers; the path is trusted by the caller.
        let library = unsafe { Library::new(path) }.map_err(|e| HostError::LoadFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let api = resolve(&library)?;
        debug!("loaded core {} ({api:?})", path.display());

        Ok(Self::new(api, Some(path.to_path_buf()), Some(library)))
    }

    /// Wrap an already-resolved entry-point table. No module is owned.
    pub fn from_api(api: CoreApi) -> Self {
        Self::new(api, None, None)
    }

    fn new(api: CoreApi, path: Option<PathBuf>, library: Option<Library>) -> Self {
        Self {
            api,
            registry: CallbackRegistry::new(),
            path,
            initialized: false,
            game_loaded: false,
            disposed: false,
            library,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closures reachable from this core's upcalls.
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_game_loaded(&self) -> bool {
        self.game_loaded
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn supports_serialization(&self) -> bool {
        self.api.supports_serialization()
    }

    /// Run `f` against the entry-point table with this core's registry active.
    pub fn call<R>(&self, f: impl FnOnce(&CoreApi) -> R) -> Result<R, HostError> {
        if self.disposed {
            return Err(HostError::Disposed);
        }
        let _active = self.registry.enter();
        Ok(f(&self.api))
    }

    /// `retro_api_version`, or `None` when the core does not export it.
    pub fn api_version(&self) -> Result<Option<c_uint>, HostError> {
        self.call(|api| api.retro_api_version.map(|f| unsafe { f() }))
    }

    /// Warn when the core was built against another API version.
    pub fn check_api_version(&self) -> Result<(), HostError> {
        match self.api_version()? {
            Some(v) if v != API_VERSION => {
                warn!("core reports libretro API version {v}, host expects {API_VERSION}");
            }
            Some(_) => {}
            None => debug!("core does not export retro_api_version"),
        }
        Ok(())
    }

    pub fn system_info(&self) -> Result<CoreDescriptor, HostError> {
        self.call(|api| {
            // SAFETY: all-zero is a valid `retro_system_info`.
            let mut info: SystemInfo = unsafe { mem::zeroed() };
            unsafe {
                (api.retro_get_system_info)(&mut info);
                CoreDescriptor::from_native(&info)
            }
        })
    }

    /// Hand the upcall addresses to the core, environment first.
    pub fn set_upcalls(&self, upcalls: Upcalls) -> Result<(), HostError> {
        self.call(|api| unsafe {
            (api.retro_set_environment)(upcalls.environment);
            (api.retro_set_video_refresh)(upcalls.video_refresh);
            (api.retro_set_input_poll)(upcalls.input_poll);
            (api.retro_set_input_state)(upcalls.input_state);
            (api.retro_set_audio_sample)(upcalls.audio_sample);
            (api.retro_set_audio_sample_batch)(upcalls.audio_sample_batch);
        })
    }

    pub fn init(&mut self) -> Result<(), HostError> {
        self.call(|api| unsafe { (api.retro_init)() })?;
        self.initialized = true;
        Ok(())
    }

    /// Returns the core's verdict; a previously loaded game is unloaded first.
    pub fn load_game(&mut self, game: &GameInfo) -> Result<bool, HostError> {
        self.unload_game()?;
        let loaded = self.call(|api| unsafe { (api.retro_load_game)(game) })?;
        self.game_loaded = loaded;
        Ok(loaded)
    }

    pub fn unload_game(&mut self) -> Result<(), HostError> {
        if !self.game_loaded {
            return Ok(());
        }
        self.call(|api| {
            if let Some(unload) = api.retro_unload_game {
                unsafe { unload() };
            }
        })?;
        self.game_loaded = false;
        Ok(())
    }

    pub fn system_av_info(&self) -> Result<AvInfo, HostError> {
        self.call(|api| {
            // SAFETY: all-zero is a valid `retro_system_av_info`.
            let mut info: SystemAvInfo = unsafe { mem::zeroed() };
            unsafe { (api.retro_get_system_av_info)(&mut info) };
            AvInfo::from(&info)
        })
    }

    pub fn run(&self) -> Result<(), HostError> {
        self.call(|api| unsafe { (api.retro_run)() })
    }

    /// Returns `false` when the core has no reset entry point.
    pub fn reset(&self) -> Result<bool, HostError> {
        self.call(|api| match api.retro_reset {
            Some(reset) => {
                unsafe { reset() };
                true
            }
            None => false,
        })
    }

    /// Serialized state size; 0 when the core cannot serialize.
    pub fn serialize_size(&self) -> Result<usize, HostError> {
        self.call(|api| {
            if !api.supports_serialization() {
                return 0;
            }
            api.retro_serialize_size.map_or(0, |f| unsafe { f() })
        })
    }

    pub fn serialize(&self, buf: &mut [u8]) -> Result<bool, HostError> {
        self.call(|api| {
            api.retro_serialize
                .is_some_and(|f| unsafe { f(buf.as_mut_ptr().cast(), buf.len()) })
        })
    }

    pub fn unserialize(&self, buf: &[u8]) -> Result<bool, HostError> {
        self.call(|api| {
            api.retro_unserialize
                .is_some_and(|f| unsafe { f(buf.as_ptr().cast(), buf.len()) })
        })
    }

    /// Unload the game, deinit, unmap the module and drop every registered closure.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        {
            let _active = self.registry.enter();
            if self.game_loaded {
                if let Some(unload) = self.api.retro_unload_game {
                    unsafe { unload() };
                }
                self.game_loaded = false;
            }
            if self.initialized {
                unsafe { (self.api.retro_deinit)() };
                self.initialized = false;
            }
        }
        self.disposed = true;
        // Unmap before clearing: the core can no longer call anything it was given.
        drop(self.library.take());
        self.registry.clear();
        debug!(
            "disposed core {}",
            self.path
                .as_deref()
                .map_or_else(|| "<static>".into(), |p| p.display().to_string())
        );
    }
}

impl Drop for CoreLibrary {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_module_is_a_load_failure() {
        let err = CoreLibrary::load("/definitely/not/here/core.so").unwrap_err();
        match err {
            HostError::LoadFailure { path, reason } => {
                assert_eq!(path, PathBuf::from("/definitely/not/here/core.so"));
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_core_module_names_the_first_missing_symbol() {
        let err = CoreLibrary::load("libc.so.6").unwrap_err();
        match err {
            HostError::SymbolResolutionFailure { symbol } => {
                assert_eq!(symbol, entry_points::SET_ENVIRONMENT)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
