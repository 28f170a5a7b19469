// Deterministic libretro test core.
//
// Built as a cdylib it behaves like any other core; linked as an rlib, its `retro_*` functions
// can be handed to the host directly. State is thread-local so every test thread gets its own
// core.
//
// ROM layout:
// - byte 0: pixel format code requested through SET_PIXEL_FORMAT (0, 1 or 2)
// - byte 1: `flags::*`
// - rest:   mixed into the PRNG seed
//
// Each `retro_run`:
// - polls input and reads the 16 joypad buttons of port 0
// - advances the PRNG (input is folded in)
// - presents one 160x144 frame with `ROW_PADDING` extra bytes per row
// - emits one single audio sample and one batch of `AUDIO_BATCH_FRAMES` frames

use std::cell::RefCell;
use std::ffi::{CStr, c_char, c_uint, c_void};
use std::path::PathBuf;
use std::ptr;

use libretro_sys::{GameInfo, SystemAvInfo, SystemInfo};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 144;
pub const FPS: f64 = 59.7275;
pub const SAMPLE_RATE: f64 = 32768.0;
pub const ROW_PADDING: usize = 24;
pub const AUDIO_BATCH_FRAMES: usize = 64;
/// Bytes written by `retro_serialize`.
pub const STATE_SIZE: usize = 16;
pub const PADDING_BYTE: u8 = 0xEE;

pub mod flags {
    /// Report a serialize size of 0.
    pub const NO_SAVESTATE: u8 = 1 << 0;
    /// Present odd frames as a null ("repeat previous") frame.
    pub const DUPE_ODD_FRAMES: u8 = 1 << 1;
    /// Refuse the game in `retro_load_game`.
    pub const REJECT: u8 = 1 << 2;
    /// Send an unknown and an experimental environment command on every `retro_run`.
    pub const QUERY_UNSUPPORTED: u8 = 1 << 3;
}

// Environment commands used by this core.
const ENV_GET_CAN_DUPE: c_uint = 3;
const ENV_GET_SYSTEM_DIRECTORY: c_uint = 9;
const ENV_SET_PIXEL_FORMAT: c_uint = 10;
const ENV_GET_LOG_INTERFACE: c_uint = 27;
pub const ENV_UNKNOWN: c_uint = 0xDEAD;
pub const ENV_EXPERIMENTAL_QUERY: c_uint = 0x10000 | 42;

const DEVICE_JOYPAD: c_uint = 1;
const LOG_INFO: c_uint = 1;
const LOG_ERROR: c_uint = 3;

pub type EnvironmentFn = unsafe extern "C" fn(cmd: c_uint, data: *mut c_void) -> bool;
pub type VideoRefreshFn =
    unsafe extern "C" fn(data: *const c_void, width: c_uint, height: c_uint, pitch: usize);
pub type InputPollFn = unsafe extern "C" fn();
pub type InputStateFn =
    unsafe extern "C" fn(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16;
pub type AudioSampleFn = unsafe extern "C" fn(left: i16, right: i16);
pub type AudioSampleBatchFn = unsafe extern "C" fn(data: *const i16, frames: usize) -> usize;
pub type LogPrintfFn = unsafe extern "C" fn(level: c_uint, fmt: *const c_char, ...);

#[repr(C)]
struct LogCallback {
    log: Option<LogPrintfFn>,
}

/// Lifecycle counters, for asserting what the host called.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub inits: u32,
    pub deinits: u32,
    pub loads: u32,
    pub unloads: u32,
    pub resets: u32,
}

#[derive(Clone, Copy, Default)]
struct Callbacks {
    environment: Option<EnvironmentFn>,
    video: Option<VideoRefreshFn>,
    input_poll: Option<InputPollFn>,
    input_state: Option<InputStateFn>,
    audio_sample: Option<AudioSampleFn>,
    audio_batch: Option<AudioSampleBatchFn>,
    log: Option<LogPrintfFn>,
}

/// Everything that a save state captures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Machine {
    frame: u32,
    rng: u32,
    buttons: u16,
}

impl Machine {
    fn step(&mut self, buttons: u16) {
        self.buttons = buttons;
        self.rng = self.rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223) ^ u32::from(buttons);
        self.frame = self.frame.wrapping_add(1);
    }

    fn to_bytes(self) -> [u8; STATE_SIZE] {
        let mut out = [0u8; STATE_SIZE];
        out[0..4].copy_from_slice(&self.frame.to_le_bytes());
        out[4..8].copy_from_slice(&self.rng.to_le_bytes());
        out[8..10].copy_from_slice(&self.buttons.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != STATE_SIZE {
            return None;
        }
        Some(Self {
            frame: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            rng: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            buttons: u16::from_le_bytes(bytes[8..10].try_into().ok()?),
        })
    }
}

#[derive(Default)]
struct TestCore {
    callbacks: Callbacks,
    need_fullpath: bool,
    system_directory: Option<String>,
    pixel_format: c_uint,
    flags: u8,
    seed: u32,
    game_loaded: bool,
    game_path: Option<Vec<u8>>,
    unsupported_answers: Vec<bool>,
    machine: Machine,
    lifecycle: Lifecycle,
}

thread_local! {
    static CORE: RefCell<TestCore> = RefCell::new(TestCore::default());
}

fn with_core<R>(f: impl FnOnce(&mut TestCore) -> R) -> R {
    CORE.with(|core| f(&mut core.borrow_mut()))
}

fn callbacks() -> Callbacks {
    with_core(|core| core.callbacks)
}

/// Make `retro_get_system_info` report `need_fullpath` on this thread.
pub fn set_need_fullpath(need_fullpath: bool) {
    with_core(|core| core.need_fullpath = need_fullpath);
}

pub fn lifecycle() -> Lifecycle {
    with_core(|core| core.lifecycle)
}

/// The system directory the host reported during `retro_init`.
pub fn system_directory() -> Option<String> {
    with_core(|core| core.system_directory.clone())
}

/// Raw bytes of the path the host passed to the last `retro_load_game`.
pub fn game_path() -> Option<Vec<u8>> {
    with_core(|core| core.game_path.clone())
}

/// What the host answered to each `QUERY_UNSUPPORTED` command, in order.
pub fn unsupported_answers() -> Vec<bool> {
    with_core(|core| core.unsupported_answers.clone())
}

/// Build a ROM image for this core.
pub fn rom(pixel_format: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut rom = vec![pixel_format, flags];
    rom.extend_from_slice(payload);
    rom
}

fn bytes_per_pixel(format: c_uint) -> usize {
    if format == 1 { 4 } else { 2 }
}

/// One frame in the core's native layout, `pitch` bytes per row.
pub fn render(rng: u32, format: c_uint, pitch: usize) -> Vec<u8> {
    let bpp = bytes_per_pixel(format);
    let mut buf = vec![PADDING_BYTE; pitch * HEIGHT as usize];
    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            for b in 0..bpp {
                let value = (rng >> ((b % 4) * 8)) as u8 ^ (x as u8).wrapping_add(y as u8);
                buf[y * pitch + x * bpp + b] = value;
            }
        }
    }
    buf
}

unsafe fn core_log(level: c_uint, fmt: &CStr, arg: c_uint) {
    if let Some(log) = callbacks().log {
        unsafe { log(level, fmt.as_ptr(), arg) };
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_api_version() -> c_uint {
    1
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_get_system_info(info: *mut SystemInfo) {
    let Some(info) = (unsafe { info.as_mut() }) else {
        return;
    };
    info.library_name = c"retrohost test core".as_ptr();
    info.library_version = c"0.1.0".as_ptr();
    info.valid_extensions = c"rtc|bin".as_ptr();
    info.need_fullpath = with_core(|core| core.need_fullpath);
    info.block_extract = false;
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_get_system_av_info(info: *mut SystemAvInfo) {
    let Some(info) = (unsafe { info.as_mut() }) else {
        return;
    };
    info.geometry.base_width = WIDTH;
    info.geometry.base_height = HEIGHT;
    info.geometry.max_width = WIDTH;
    info.geometry.max_height = HEIGHT;
    info.geometry.aspect_ratio = 0.0;
    info.timing.fps = FPS;
    info.timing.sample_rate = SAMPLE_RATE;
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_set_environment(cb: EnvironmentFn) {
    with_core(|core| core.callbacks.environment = Some(cb));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_set_video_refresh(cb: VideoRefreshFn) {
    with_core(|core| core.callbacks.video = Some(cb));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_set_input_poll(cb: InputPollFn) {
    with_core(|core| core.callbacks.input_poll = Some(cb));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_set_input_state(cb: InputStateFn) {
    with_core(|core| core.callbacks.input_state = Some(cb));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_set_audio_sample(cb: AudioSampleFn) {
    with_core(|core| core.callbacks.audio_sample = Some(cb));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_set_audio_sample_batch(cb: AudioSampleBatchFn) {
    with_core(|core| core.callbacks.audio_batch = Some(cb));
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_set_controller_port_device(_port: c_uint, _device: c_uint) {}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_init() {
    let Some(env) = callbacks().environment else {
        return;
    };

    let mut log_cb = LogCallback { log: None };
    let log = if unsafe { env(ENV_GET_LOG_INTERFACE, (&raw mut log_cb).cast()) } {
        log_cb.log
    } else {
        None
    };

    let mut dir: *const c_char = ptr::null();
    let system_directory = if unsafe { env(ENV_GET_SYSTEM_DIRECTORY, (&raw mut dir).cast()) }
        && !dir.is_null()
    {
        Some(unsafe { CStr::from_ptr(dir) }.to_string_lossy().into_owned())
    } else {
        None
    };

    let mut can_dupe = false;
    unsafe { env(ENV_GET_CAN_DUPE, (&raw mut can_dupe).cast()) };

    with_core(|core| {
        core.callbacks.log = log;
        core.system_directory = system_directory;
        core.lifecycle.inits += 1;
    });
    unsafe { core_log(LOG_INFO, c"test core initialised (api %u)\n", retro_api_version()) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_deinit() {
    with_core(|core| {
        let lifecycle = core.lifecycle;
        let need_fullpath = core.need_fullpath;
        *core = TestCore::default();
        core.lifecycle = lifecycle;
        core.lifecycle.deinits += 1;
        core.need_fullpath = need_fullpath;
    });
}

fn path_from_c(path: &CStr) -> Option<PathBuf> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Some(PathBuf::from(std::ffi::OsStr::from_bytes(path.to_bytes())))
    }
    #[cfg(not(unix))]
    {
        path.to_str().ok().map(PathBuf::from)
    }
}

fn read_game(info: &GameInfo) -> Option<Vec<u8>> {
    if !info.data.is_null() {
        // SAFETY: the host passes `size` readable bytes at `data`.
        let data = unsafe { std::slice::from_raw_parts(info.data.cast::<u8>(), info.size) };
        return Some(data.to_vec());
    }
    if info.path.is_null() {
        return None;
    }
    // SAFETY: NUL-terminated path provided by the host.
    let path = path_from_c(unsafe { CStr::from_ptr(info.path) })?;
    std::fs::read(path).ok()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_load_game(info: *const GameInfo) -> bool {
    let Some(info) = (unsafe { info.as_ref() }) else {
        return false;
    };
    let game_path =
        (!info.path.is_null()).then(|| unsafe { CStr::from_ptr(info.path) }.to_bytes().to_vec());
    with_core(|core| core.game_path = game_path);
    let Some(rom) = read_game(info) else {
        return false;
    };
    let &[format, flags, ..] = rom.as_slice() else {
        unsafe { core_log(LOG_ERROR, c"rom too short (%u bytes)\n", rom.len() as c_uint) };
        return false;
    };
    if flags & self::flags::REJECT != 0 {
        return false;
    }

    let Some(env) = callbacks().environment else {
        return false;
    };
    let mut code = c_uint::from(format);
    if !unsafe { env(ENV_SET_PIXEL_FORMAT, (&raw mut code).cast()) } {
        return false;
    }

    let seed = rom
        .iter()
        .fold(0x1234_5678u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b));
    with_core(|core| {
        core.pixel_format = code;
        core.flags = flags;
        core.seed = seed;
        core.machine = Machine {
            rng: seed,
            ..Machine::default()
        };
        core.game_loaded = true;
        core.lifecycle.loads += 1;
    });
    unsafe { core_log(LOG_INFO, c"loaded %u byte rom\n", rom.len() as c_uint) };
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_load_game_special(
    _game_type: c_uint,
    _info: *const GameInfo,
    _num_info: usize,
) -> bool {
    false
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_unload_game() {
    with_core(|core| {
        core.game_loaded = false;
        core.machine = Machine::default();
        core.lifecycle.unloads += 1;
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_reset() {
    with_core(|core| {
        core.machine = Machine {
            rng: core.seed,
            ..Machine::default()
        };
        core.lifecycle.resets += 1;
    });
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_run() {
    if !with_core(|core| core.game_loaded) {
        return;
    }
    let cb = callbacks();

    if let Some(poll) = cb.input_poll {
        unsafe { poll() };
    }
    let mut buttons = 0u16;
    if let Some(state) = cb.input_state {
        for id in 0..16 {
            if unsafe { state(0, DEVICE_JOYPAD, 0, id) } != 0 {
                buttons |= 1 << id;
            }
        }
    }

    let (machine, format, flags) = with_core(|core| {
        core.machine.step(buttons);
        (core.machine, core.pixel_format, core.flags)
    });

    if let Some(env) = cb.environment.filter(|_| flags & self::flags::QUERY_UNSUPPORTED != 0) {
        let mut scratch = [0u8; 32];
        let answers = [ENV_UNKNOWN, ENV_EXPERIMENTAL_QUERY]
            .map(|cmd| unsafe { env(cmd, scratch.as_mut_ptr().cast()) });
        with_core(|core| core.unsupported_answers.extend(answers));
    }

    if let Some(video) = cb.video {
        let pitch = WIDTH as usize * bytes_per_pixel(format) + ROW_PADDING;
        if flags & self::flags::DUPE_ODD_FRAMES != 0 && machine.frame % 2 == 1 {
            unsafe { video(ptr::null(), WIDTH, HEIGHT, pitch) };
        } else {
            let frame = render(machine.rng, format, pitch);
            unsafe { video(frame.as_ptr().cast(), WIDTH, HEIGHT, pitch) };
        }
    }

    if let Some(sample) = cb.audio_sample {
        unsafe { sample(machine.rng as i16, (machine.rng >> 16) as i16) };
    }
    if let Some(batch) = cb.audio_batch {
        let samples: Vec<i16> = (0..AUDIO_BATCH_FRAMES as u32)
            .flat_map(|i| {
                let left = machine.rng.wrapping_add(i * 7) as i16;
                [left, left.wrapping_neg()]
            })
            .collect();
        unsafe { batch(samples.as_ptr(), AUDIO_BATCH_FRAMES) };
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_serialize_size() -> usize {
    with_core(|core| {
        if core.flags & flags::NO_SAVESTATE != 0 {
            0
        } else {
            STATE_SIZE
        }
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_serialize(data: *mut c_void, size: usize) -> bool {
    if data.is_null() || size < STATE_SIZE {
        return false;
    }
    let bytes = with_core(|core| core.machine.to_bytes());
    // SAFETY: the host provides `size >= STATE_SIZE` writable bytes.
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), data.cast::<u8>(), STATE_SIZE) };
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_unserialize(data: *const c_void, size: usize) -> bool {
    if data.is_null() {
        return false;
    }
    // SAFETY: the host provides `size` readable bytes.
    let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size) };
    let Some(machine) = Machine::from_bytes(bytes) else {
        return false;
    };
    with_core(|core| core.machine = machine);
    true
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_get_region() -> c_uint {
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_get_memory_data(_id: c_uint) -> *mut c_void {
    ptr::null_mut()
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_get_memory_size(_id: c_uint) -> usize {
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_cheat_reset() {}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_cheat_set(_index: c_uint, _enabled: bool, _code: *const c_char) {}
