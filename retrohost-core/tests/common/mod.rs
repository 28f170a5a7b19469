#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use retrohost_core::{CoreApi, Frame, HostConfig, RetroHost};
use retrohost_test_core as tc;

/// Entry points of the in-tree test core, linked statically.
pub fn test_core_api() -> CoreApi {
    CoreApi {
        retro_set_environment: tc::retro_set_environment,
        retro_set_video_refresh: tc::retro_set_video_refresh,
        retro_set_input_poll: tc::retro_set_input_poll,
        retro_set_input_state: tc::retro_set_input_state,
        retro_set_audio_sample: tc::retro_set_audio_sample,
        retro_set_audio_sample_batch: tc::retro_set_audio_sample_batch,
        retro_init: tc::retro_init,
        retro_deinit: tc::retro_deinit,
        retro_get_system_info: tc::retro_get_system_info,
        retro_load_game: tc::retro_load_game,
        retro_get_system_av_info: tc::retro_get_system_av_info,
        retro_run: tc::retro_run,

        retro_api_version: Some(tc::retro_api_version),
        retro_reset: Some(tc::retro_reset),
        retro_unload_game: Some(tc::retro_unload_game),
        retro_serialize_size: Some(tc::retro_serialize_size),
        retro_serialize: Some(tc::retro_serialize),
        retro_unserialize: Some(tc::retro_unserialize),
    }
}

pub fn host() -> RetroHost {
    RetroHost::from_api(test_core_api(), HostConfig::default()).unwrap()
}

pub fn write_rom(dir: &Path, name: &str, pixel_format: u8, flags: u8) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, tc::rom(pixel_format, flags, b"retrohost")).unwrap();
    path
}

/// Everything the sinks saw, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Capture {
    pub frames: Vec<(u32, u32, Vec<u8>)>,
    pub audio: Vec<Vec<u8>>,
}

pub type SharedCapture = Rc<RefCell<Capture>>;

pub fn capture(host: &mut RetroHost) -> SharedCapture {
    let capture = SharedCapture::default();
    let c = capture.clone();
    host.set_frame_sink(move |frame: &Frame<'_>| {
        c.borrow_mut()
            .frames
            .push((frame.width, frame.height, frame.data.to_vec()));
    });
    let c = capture.clone();
    host.set_audio_sink(move |samples: &[u8]| c.borrow_mut().audio.push(samples.to_vec()));
    capture
}

/// Run `ticks` frames and return what the sinks received during them.
pub fn run_and_take(host: &mut RetroHost, capture: &SharedCapture, ticks: usize) -> Capture {
    capture.take();
    for _ in 0..ticks {
        host.run().unwrap();
    }
    capture.take()
}
