//! retrohost-core: hosts a libretro core and pumps it frame by frame.
//!
//! The host side of the libretro ABI:
//! - The core is loaded from a native module (or given as a resolved entry-point table).
//! - The host hands the core six upcall addresses, answers its environment queries and calls
//!   `retro_run` once per tick.
//! - During `run` the core pushes video and audio through the upcalls; the host repacks both and
//!   forwards them to caller-supplied sinks, and answers input queries from an input source.
//!
//! Lifecycle (see [`RetroHost`]):
//! - `load_core` / `from_api`: read system info, check the API version, install upcalls, `retro_init`
//! - `load_game`: build the game image, `retro_load_game`, read AV info
//! - `run` / `reset` / save states
//! - `dispose` (or drop): `retro_unload_game`, `retro_deinit`, unmap
//!
//! A session is single-threaded: every upcall arrives on the thread that called into the core.

pub mod abi;
pub mod av;
pub mod config;
pub mod env;
pub mod error;
pub mod input;
pub mod loader;
pub mod logging;
pub mod runtime;
pub mod savestate;
pub mod state;

use std::cell::RefCell;
use std::ffi::{c_uint, c_void};
use std::fs;
use std::path::Path;
use std::ptr;
use std::rc::Rc;

use log::{debug, info, trace, warn};

pub use crate::abi::{CoreApi, PixelFormat};
pub use crate::av::{AudioSink, Frame, FrameSink};
pub use crate::config::{ChannelSwap, HostConfig};
pub use crate::error::HostError;
pub use crate::input::InputSource;
pub use crate::loader::CoreLibrary;
pub use crate::logging::LogSink;
pub use crate::state::{AvInfo, CoreDescriptor};

use crate::abi::GameInfo;
use crate::av::{AudioBatcher, FormatTable, FrameConverter, FrameGeometry};
use crate::env::{EnvironmentNegotiator, path_to_cstring};
use crate::input::to_input_state;
use crate::loader::Upcalls;
use crate::logging::SharedLogSink;
use crate::state::{SessionState, SharedSession};

/// Converters and collaborators behind the media upcalls.
struct Pipeline {
    session: SharedSession,
    converter: RefCell<FrameConverter>,
    batcher: RefCell<AudioBatcher>,
    frame_sink: RefCell<Option<Box<dyn FrameSink>>>,
    audio_sink: RefCell<Option<Box<dyn AudioSink>>>,
    input: RefCell<Option<Box<dyn InputSource>>>,
}

impl Pipeline {
    fn new(session: SharedSession, table: FormatTable) -> Self {
        Self {
            session,
            converter: RefCell::new(FrameConverter::new(table)),
            batcher: RefCell::new(AudioBatcher::new()),
            frame_sink: RefCell::new(None),
            audio_sink: RefCell::new(None),
            input: RefCell::new(None),
        }
    }

    fn video_refresh(&self, data: *const c_void, width: c_uint, height: c_uint, pitch: usize) {
        let format = self.session.borrow().pixel_format;
        let geometry = FrameGeometry {
            width,
            height,
            pitch,
        };
        let mut converter = self.converter.borrow_mut();
        // SAFETY: the core guarantees `data` covers `height` rows of `pitch` bytes in `format`.
        match unsafe { converter.convert_raw(data, geometry, format) } {
            Ok(Some(frame)) => {
                if let Some(sink) = self.frame_sink.borrow_mut().as_mut() {
                    sink.on_frame(&frame);
                }
            }
            Ok(None) => trace!("core repeated the previous frame"),
            Err(e) => warn!("dropping {width}x{height} {format:?} frame: {e}"),
        }
    }

    fn audio_sample(&self, left: i16, right: i16) {
        let mut batcher = self.batcher.borrow_mut();
        let chunk = batcher.sample(left, right);
        if let Some(sink) = self.audio_sink.borrow_mut().as_mut() {
            sink.on_samples(chunk);
        }
    }

    fn audio_sample_batch(&self, samples: &[i16]) -> usize {
        let mut batcher = self.batcher.borrow_mut();
        let chunk = batcher.batch(samples);
        if let Some(sink) = self.audio_sink.borrow_mut().as_mut() {
            sink.on_samples(chunk);
        }
        AudioBatcher::frames_in(samples)
    }

    fn input_poll(&self) {
        if let Some(input) = self.input.borrow_mut().as_mut() {
            input.poll();
        }
    }

    fn input_state(&self, port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16 {
        self.input
            .borrow_mut()
            .as_mut()
            .map_or(0, |input| to_input_state(input.is_pressed(port, device, index, id)))
    }
}

/// One hosted core and everything the upcalls reach.
///
/// Not `Send`: all core calls and upcalls happen on the owning thread.
pub struct RetroHost {
    config: HostConfig,
    session: SharedSession,
    pipeline: Rc<Pipeline>,
    log_sink: SharedLogSink,
    core: CoreLibrary,
}

impl RetroHost {
    /// Load the core at `path` and initialize it.
    pub fn load_core(path: impl AsRef<Path>, config: HostConfig) -> Result<Self, HostError> {
        Self::start(CoreLibrary::load(path)?, config)
    }

    /// Host a core given as an entry-point table (e.g. statically linked).
    pub fn from_api(api: CoreApi, config: HostConfig) -> Result<Self, HostError> {
        Self::start(CoreLibrary::from_api(api), config)
    }

    fn start(mut core: CoreLibrary, config: HostConfig) -> Result<Self, HostError> {
        let descriptor = core.system_info()?;
        info!(
            "core: {} {} (extensions: {}, need_fullpath: {})",
            descriptor.name,
            descriptor.version,
            descriptor.extensions.join("|"),
            descriptor.need_fullpath
        );
        core.check_api_version()?;

        let swap = config.channel_swap.applies_to(&descriptor.name);
        debug!("XRGB8888 channel swap for {}: {swap}", descriptor.name);

        let session = SessionState::new_shared();
        session.borrow_mut().descriptor = Some(descriptor);
        let log_sink = logging::default_log_sink();
        let pipeline = Rc::new(Pipeline::new(session.clone(), FormatTable::new(swap)));

        let registry = core.registry().clone();
        let environment =
            EnvironmentNegotiator::new(&config, session.clone(), registry.clone(), log_sink.clone())?
                .install();

        let p = pipeline.clone();
        let video_refresh =
            registry.register_video_refresh(move |data, w, h, pitch| p.video_refresh(data, w, h, pitch));
        let p = pipeline.clone();
        let input_poll = registry.register_input_poll(move || p.input_poll());
        let p = pipeline.clone();
        let input_state = registry
            .register_input_state(move |port, device, index, id| p.input_state(port, device, index, id));
        let p = pipeline.clone();
        let audio_sample = registry.register_audio_sample(move |l, r| p.audio_sample(l, r));
        let p = pipeline.clone();
        let audio_sample_batch =
            registry.register_audio_sample_batch(move |samples| p.audio_sample_batch(samples));

        core.set_upcalls(Upcalls {
            environment,
            video_refresh,
            input_poll,
            input_state,
            audio_sample,
            audio_sample_batch,
        })?;
        core.init()?;
        debug!("core initialized");

        Ok(Self {
            config,
            session,
            pipeline,
            log_sink,
            core,
        })
    }

    /// Load a game image. Returns the core's verdict; `Ok(false)` means the core refused it.
    ///
    /// The file is read into memory unless the core asked for a path (`need_fullpath`).
    pub fn load_game(&mut self, path: impl AsRef<Path>) -> Result<bool, HostError> {
        let path = path.as_ref();
        let need_fullpath = self
            .session
            .borrow()
            .descriptor
            .as_ref()
            .is_some_and(|d| d.need_fullpath);

        let length = fs::metadata(path)?.len() as usize;
        let data = if need_fullpath {
            None
        } else {
            Some(fs::read(path)?)
        };
        let c_path = path_to_cstring(path)?;

        let game = GameInfo {
            path: c_path.as_ptr(),
            data: data.as_ref().map_or(ptr::null(), |d| d.as_ptr().cast()),
            size: data.as_ref().map_or(length, Vec::len),
            meta: ptr::null(),
        };

        self.session.borrow_mut().clear_on_unload();
        let loaded = self.core.load_game(&game)?;
        if !loaded {
            warn!("core refused {}", path.display());
            return Ok(false);
        }

        let av = self.core.system_av_info()?;
        info!(
            "game loaded: {}x{} @ {:.4} fps, {} Hz audio, {:?}",
            av.width,
            av.height,
            av.fps,
            av.sample_rate,
            self.session.borrow().pixel_format
        );
        let mut session = self.session.borrow_mut();
        session.av_info = Some(av);
        session.game_loaded = true;
        Ok(true)
    }

    /// Advance the core by one frame. Upcalls reach the sinks before this returns.
    pub fn run(&mut self) -> Result<(), HostError> {
        self.core.run()
    }

    /// `retro_reset`; a no-op for cores without one.
    pub fn reset(&mut self) -> Result<(), HostError> {
        if !self.core.reset()? {
            debug!("core has no reset entry point");
        }
        Ok(())
    }

    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<(), HostError> {
        savestate::save_state(&self.core, path.as_ref())
    }

    /// Returns the core's verdict on the file's contents.
    pub fn load_state(&mut self, path: impl AsRef<Path>) -> Result<bool, HostError> {
        savestate::load_state(&self.core, path.as_ref())
    }

    pub fn snapshot(&self) -> Result<Vec<u8>, HostError> {
        savestate::snapshot(&self.core)
    }

    pub fn restore(&mut self, blob: &[u8]) -> Result<bool, HostError> {
        savestate::restore(&self.core, blob)
    }

    /// Tear the core down. Later calls do nothing; any other call fails with `Disposed`.
    pub fn dispose(&mut self) {
        self.core.dispose();
        self.session.borrow_mut().clear_on_unload();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    pub fn set_frame_sink(&mut self, sink: impl FrameSink + 'static) {
        *self.pipeline.frame_sink.borrow_mut() = Some(Box::new(sink));
    }

    pub fn set_audio_sink(&mut self, sink: impl AudioSink + 'static) {
        *self.pipeline.audio_sink.borrow_mut() = Some(Box::new(sink));
    }

    pub fn set_input_source(&mut self, source: impl InputSource + 'static) {
        *self.pipeline.input.borrow_mut() = Some(Box::new(source));
    }

    /// Replace the destination of core log messages (by default the `log` crate).
    pub fn set_log_sink(&mut self, sink: impl LogSink + 'static) {
        *self.log_sink.borrow_mut() = Box::new(sink);
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn core(&self) -> &CoreLibrary {
        &self.core
    }

    pub fn descriptor(&self) -> Option<CoreDescriptor> {
        self.session.borrow().descriptor.clone()
    }

    pub fn av_info(&self) -> Option<AvInfo> {
        self.session.borrow().av_info
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.session.borrow().pixel_format
    }

    pub fn is_game_loaded(&self) -> bool {
        self.session.borrow().game_loaded
    }

    /// Nominal width; 0 before a game is loaded.
    pub fn width(&self) -> u32 {
        self.av_info().map_or(0, |av| av.width)
    }

    pub fn height(&self) -> u32 {
        self.av_info().map_or(0, |av| av.height)
    }

    pub fn fps(&self) -> f64 {
        self.av_info().map_or(0.0, |av| av.fps)
    }

    pub fn sample_rate(&self) -> f64 {
        self.av_info().map_or(0.0, |av| av.sample_rate)
    }

    /// Display aspect ratio, derived from the geometry when the core reports none.
    pub fn aspect_ratio(&self) -> f32 {
        self.av_info().map_or(0.0, |av| av.display_aspect())
    }
}

impl std::fmt::Debug for RetroHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session.borrow();
        f.debug_struct("RetroHost")
            .field("core", &self.core)
            .field("descriptor", &session.descriptor)
            .field("av_info", &session.av_info)
            .field("pixel_format", &session.pixel_format)
            .finish_non_exhaustive()
    }
}
