//! Core log forwarding.
//!
//! Cores log through a printf-style callback. The variadic arguments are never read: conversion
//! specifiers in the format string are replaced with [`PLACEHOLDER`] and the result goes to a
//! [`LogSink`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::abi::LogLevel;

/// Stands in for every conversion specifier in a core log message.
pub const PLACEHOLDER: &str = "<?>";

/// Log target used by [`ForwardToLog`].
pub const CORE_LOG_TARGET: &str = "retrohost::core";

/// Receives sanitized core log messages.
pub trait LogSink {
    fn log(&mut self, level: LogLevel, message: &str);
}

/// The session's log sink, replaceable while the log shim holds a handle to it.
pub(crate) type SharedLogSink = Rc<RefCell<Box<dyn LogSink>>>;

pub(crate) fn default_log_sink() -> SharedLogSink {
    Rc::new(RefCell::new(Box::new(ForwardToLog)))
}

impl<F: FnMut(LogLevel, &str)> LogSink for F {
    fn log(&mut self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

/// Default sink: forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardToLog;

impl LogSink for ForwardToLog {
    fn log(&mut self, level: LogLevel, message: &str) {
        let level = match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        };
        log::log!(target: CORE_LOG_TARGET, level, "{message}");
    }
}

/// Replace printf conversion specifiers with [`PLACEHOLDER`].
///
/// A specifier is `%`, optional flags, width, precision and length modifiers, then a conversion
/// character. `%%` is a literal percent. A `%` that does not start a valid specifier is kept
/// verbatim and scanning resumes right after it. Trailing newlines are trimmed.
pub fn sanitize_format(fmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut rest = fmt;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let spec = &rest[pos..];
        match specifier_len(spec) {
            Some(2) if spec.as_bytes()[1] == b'%' => {
                out.push('%');
                rest = &spec[2..];
            }
            Some(len) => {
                out.push_str(PLACEHOLDER);
                rest = &spec[len..];
            }
            None => {
                out.push('%');
                rest = &spec[1..];
            }
        }
    }
    out.push_str(rest);

    let trimmed = out.trim_end_matches(['\n', '\r']).len();
    out.truncate(trimmed);
    out
}

/// Length in bytes of the specifier at the start of `spec` (which begins with `%`).
fn specifier_len(spec: &str) -> Option<usize> {
    let bytes = spec.as_bytes();
    let mut i = 1;

    if bytes.get(i) == Some(&b'%') {
        return Some(2);
    }
    while matches!(bytes.get(i), Some(b'-' | b'+' | b' ' | b'#' | b'0' | b'\'')) {
        i += 1;
    }
    while matches!(bytes.get(i), Some(b'0'..=b'9' | b'*')) {
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while matches!(bytes.get(i), Some(b'0'..=b'9' | b'*')) {
            i += 1;
        }
    }
    loop {
        match bytes.get(i) {
            Some(b'h' | b'l' | b'L' | b'q' | b'j' | b'z' | b't') => i += 1,
            // MSVC: `I`, `I32`, `I64`
            Some(b'I') => {
                i += 1;
                if matches!(bytes.get(i..i + 2), Some(b"32" | b"64")) {
                    i += 2;
                }
            }
            _ => break,
        }
    }
    match bytes.get(i) {
        Some(
            b'd' | b'i' | b'u' | b'o' | b'x' | b'X' | b'f' | b'F' | b'e' | b'E' | b'g' | b'G'
            | b'a' | b'A' | b'c' | b's' | b'p' | b'n',
        ) => Some(i + 1),
        _ => None,
    }
}
