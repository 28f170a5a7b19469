//! Callback registry: host closures behind stable native addresses.
//!
//! libretro upcalls carry no user-data pointer, so the address handed to the core is always one of
//! the fixed trampolines in [`super::imports`]. What varies per session is the closure behind it.
//! A session activates its registry for the dynamic extent of every entry-point call
//! ([`CallbackRegistry::enter`]); trampolines look the closure up in whichever registry is active on
//! the calling thread.
//!
//! The registry holds a strong reference to every registered closure until [`CallbackRegistry::clear`]
//! (called on dispose), so the core can invoke any address it was given for as long as the module
//! is loaded.

use std::cell::RefCell;
use std::ffi::{CStr, c_uint, c_void};
use std::rc::Rc;

use crate::abi::{
    AudioSampleBatchFn, AudioSampleFn, EnvironmentFn, FrameTimeCallbackFn, InputPollFn,
    InputStateFn, LogLevel, LogShimFn, VideoRefreshFn,
};

use super::imports;

pub(crate) type EnvironmentHandler = Rc<dyn Fn(c_uint, *mut c_void) -> bool>;
pub(crate) type VideoRefreshHandler = Rc<dyn Fn(*const c_void, c_uint, c_uint, usize)>;
pub(crate) type InputPollHandler = Rc<dyn Fn()>;
pub(crate) type InputStateHandler = Rc<dyn Fn(c_uint, c_uint, c_uint, c_uint) -> i16>;
pub(crate) type AudioSampleHandler = Rc<dyn Fn(i16, i16)>;
pub(crate) type AudioSampleBatchHandler = Rc<dyn Fn(&[i16]) -> usize>;
pub(crate) type LogHandler = Rc<dyn Fn(LogLevel, &CStr)>;
pub(crate) type FrameTimeHandler = Rc<dyn Fn(i64)>;

/// One slot per upcall kind.
#[derive(Default)]
pub(crate) struct Slots {
    pub environment: Option<EnvironmentHandler>,
    pub video_refresh: Option<VideoRefreshHandler>,
    pub input_poll: Option<InputPollHandler>,
    pub input_state: Option<InputStateHandler>,
    pub audio_sample: Option<AudioSampleHandler>,
    pub audio_sample_batch: Option<AudioSampleBatchHandler>,
    pub log: Option<LogHandler>,
    pub frame_time: Option<FrameTimeHandler>,
}

impl Slots {
    fn occupied(&self) -> usize {
        [
            self.environment.is_some(),
            self.video_refresh.is_some(),
            self.input_poll.is_some(),
            self.input_state.is_some(),
            self.audio_sample.is_some(),
            self.audio_sample_batch.is_some(),
            self.log.is_some(),
            self.frame_time.is_some(),
        ]
        .into_iter()
        .filter(|&set| set)
        .count()
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<CallbackRegistry>> = const { RefCell::new(None) };
}

/// Per-session closure registry. Cloning shares the same slots.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    slots: Rc<RefCell<Slots>>,
}

/// Keeps a registry active on the current thread; restores the previous one on drop.
#[must_use = "the registry is only active while the guard is alive"]
pub struct ActiveGuard {
    previous: Option<CallbackRegistry>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route upcalls on this thread to this registry until the guard is dropped.
    pub fn enter(&self) -> ActiveGuard {
        let previous = ACTIVE.with(|active| active.borrow_mut().replace(self.clone()));
        ActiveGuard { previous }
    }

    /// Whether this registry is the one upcalls are currently routed to.
    pub fn is_active(&self) -> bool {
        ACTIVE.with(|active| {
            active
                .borrow()
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(&current.slots, &self.slots))
        })
    }

    pub fn register_environment(
        &self,
        handler: impl Fn(c_uint, *mut c_void) -> bool + 'static,
    ) -> EnvironmentFn {
        self.slots.borrow_mut().environment = Some(Rc::new(handler));
        imports::environment
    }

    pub fn register_video_refresh(
        &self,
        handler: impl Fn(*const c_void, c_uint, c_uint, usize) + 'static,
    ) -> VideoRefreshFn {
        self.slots.borrow_mut().video_refresh = Some(Rc::new(handler));
        imports::video_refresh
    }

    pub fn register_input_poll(&self, handler: impl Fn() + 'static) -> InputPollFn {
        self.slots.borrow_mut().input_poll = Some(Rc::new(handler));
        imports::input_poll
    }

    pub fn register_input_state(
        &self,
        handler: impl Fn(c_uint, c_uint, c_uint, c_uint) -> i16 + 'static,
    ) -> InputStateFn {
        self.slots.borrow_mut().input_state = Some(Rc::new(handler));
        imports::input_state
    }

    pub fn register_audio_sample(&self, handler: impl Fn(i16, i16) + 'static) -> AudioSampleFn {
        self.slots.borrow_mut().audio_sample = Some(Rc::new(handler));
        imports::audio_sample
    }

    pub fn register_audio_sample_batch(
        &self,
        handler: impl Fn(&[i16]) -> usize + 'static,
    ) -> AudioSampleBatchFn {
        self.slots.borrow_mut().audio_sample_batch = Some(Rc::new(handler));
        imports::audio_sample_batch
    }

    pub fn register_log(&self, handler: impl Fn(LogLevel, &CStr) + 'static) -> LogShimFn {
        self.slots.borrow_mut().log = Some(Rc::new(handler));
        imports::log_printf
    }

    pub fn register_frame_time(&self, handler: impl Fn(i64) + 'static) -> FrameTimeCallbackFn {
        self.slots.borrow_mut().frame_time = Some(Rc::new(handler));
        imports::frame_time
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.borrow().occupied()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every retained closure.
    pub fn clear(&self) {
        // Take the slots out first so closure destructors run without the borrow held.
        let old = std::mem::take(&mut *self.slots.borrow_mut());
        drop(old);
    }
}

/// Clone a handler out of the active registry, if any.
///
/// Borrows are released before returning, so the handler may itself register callbacks.
pub(crate) fn active_handler<T>(select: impl FnOnce(&Slots) -> Option<T>) -> Option<T> {
    ACTIVE.with(|active| {
        let active = active.borrow();
        let registry = active.as_ref()?;
        let slots = registry.slots.borrow();
        select(&slots)
    })
}
