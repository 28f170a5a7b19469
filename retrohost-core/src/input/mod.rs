//! Input module for retrohost-core.
//!
//! Responsibilities:
//! - Define the collaborator that answers the core's input queries ([`InputSource`]).
//! - Translate the input-state upcall's `(port, device, index, id)` tuple into that query and the
//!   boolean answer back into the libretro `int16_t` convention (1 pressed, 0 released).
//!
//! Notes:
//! - Device mapping (keyboards, pads, remapping) is the caller's concern; the host never
//!   interprets `id` beyond passing it on.
//! - With no source installed every query reads as "released".

use std::ffi::c_uint;

use crate::abi::{JoypadButton, device};

/// Answers the core's input queries.
pub trait InputSource {
    /// Called once per input-poll upcall, before the core's queries for that frame.
    fn poll(&mut self) {}

    fn is_pressed(&mut self, port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> bool;
}

impl<F: FnMut(c_uint, c_uint, c_uint, c_uint) -> bool> InputSource for F {
    fn is_pressed(&mut self, port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> bool {
        self(port, device, index, id)
    }
}

/// A source that never reports anything pressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputSource for NoInput {
    fn is_pressed(&mut self, _: c_uint, _: c_uint, _: c_uint, _: c_uint) -> bool {
        false
    }
}

/// Fixed joypad state per port: a bitmask indexed by [`JoypadButton`] id.
#[derive(Debug, Default, Clone)]
pub struct JoypadState {
    ports: Vec<u16>,
}

impl JoypadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, port: usize, button: JoypadButton, pressed: bool) {
        if self.ports.len() <= port {
            self.ports.resize(port + 1, 0);
        }
        let bit = 1u16 << (button as u32);
        if pressed {
            self.ports[port] |= bit;
        } else {
            self.ports[port] &= !bit;
        }
    }

    pub fn pressed(&self, port: usize, button: JoypadButton) -> bool {
        self.ports
            .get(port)
            .is_some_and(|mask| mask & (1u16 << (button as u32)) != 0)
    }
}

impl InputSource for JoypadState {
    fn is_pressed(&mut self, port: c_uint, dev: c_uint, _index: c_uint, id: c_uint) -> bool {
        if dev != device::JOYPAD {
            return false;
        }
        JoypadButton::from_id(id).is_some_and(|button| self.pressed(port as usize, button))
    }
}

/// Convert a source answer to the value returned from the input-state upcall.
pub fn to_input_state(pressed: bool) -> i16 {
    i16::from(pressed)
}
