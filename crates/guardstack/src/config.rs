use crate::hardening::checksum::ChecksumKind;
use crate::util::{BACKTRACE_MAX_FRAMES, DEFAULT_DUMP_BYTES, MAX_DUMP_BYTES};
use std::ffi::OsStr;

/// Per-instance hardening switches. Chosen at construction, fixed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackConfig {
    /// Bracket the data region with guard words and keep record guards.
    pub enable_guards: bool,
    /// Maintain a digest of the data region across every mutation.
    pub enable_checksum: bool,
    pub checksum: ChecksumKind,
    /// Install the process-wide crash handler on first construction.
    pub install_crash_handler: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            enable_guards: true,
            enable_checksum: true,
            checksum: ChecksumKind::Crc64,
            install_crash_handler: true,
        }
    }
}

impl StackConfig {
    /// Everything off: a plain dynamic array.
    pub const fn unprotected() -> Self {
        StackConfig {
            enable_guards: false,
            enable_checksum: false,
            checksum: ChecksumKind::Crc64,
            install_crash_handler: false,
        }
    }

    /// Defaults overridden by `GUARDSTACK_GUARDS`, `GUARDSTACK_CHECKSUM`,
    /// `GUARDSTACK_CRC` and `GUARDSTACK_NO_CRASH_HANDLER`.
    pub fn from_env() -> Self {
        let mut cfg = StackConfig::default();
        if let Some(v) = env_flag("GUARDSTACK_GUARDS") {
            cfg.enable_guards = v;
        }
        if let Some(v) = env_flag("GUARDSTACK_CHECKSUM") {
            cfg.enable_checksum = v;
        }
        match env_usize("GUARDSTACK_CRC") {
            Some(32) => cfg.checksum = ChecksumKind::Crc32,
            Some(64) => cfg.checksum = ChecksumKind::Crc64,
            _ => {}
        }
        if std::env::var_os("GUARDSTACK_NO_CRASH_HANDLER").is_some() {
            cfg.install_crash_handler = false;
        }
        cfg
    }
}

/// What the crash handler prints. Read once when the handler is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashConfig {
    /// Bytes dumped starting at the faulting instruction.
    pub dump_bytes: usize,
    /// Maximum frames printed in the backtrace.
    pub backtrace_depth: usize,
    /// Hand the dumped bytes to the registered instruction renderer.
    pub disassemble: bool,
}

impl Default for CrashConfig {
    fn default() -> Self {
        CrashConfig {
            dump_bytes: DEFAULT_DUMP_BYTES,
            backtrace_depth: BACKTRACE_MAX_FRAMES,
            disassemble: false,
        }
    }
}

impl CrashConfig {
    /// Defaults overridden by `GUARDSTACK_DUMP_BYTES`,
    /// `GUARDSTACK_BACKTRACE_DEPTH` and `GUARDSTACK_DISASM`.
    pub fn from_env() -> Self {
        let mut cfg = CrashConfig::default();
        if let Some(n) = env_usize("GUARDSTACK_DUMP_BYTES") {
            cfg.dump_bytes = n;
        }
        if let Some(n) = env_usize("GUARDSTACK_BACKTRACE_DEPTH") {
            cfg.backtrace_depth = n;
        }
        if let Some(v) = env_flag("GUARDSTACK_DISASM") {
            cfg.disassemble = v;
        }
        cfg.clamped()
    }

    /// Clamp sizes into the ranges the handler's preallocated buffers hold.
    pub fn clamped(mut self) -> Self {
        self.dump_bytes = self.dump_bytes.clamp(1, MAX_DUMP_BYTES);
        self.backtrace_depth = self.backtrace_depth.clamp(1, BACKTRACE_MAX_FRAMES);
        self
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var_os(key).and_then(|v| parse_flag(&v))
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var_os(key).and_then(|v| parse_usize(v.as_encoded_bytes()))
}

fn parse_flag(val: &OsStr) -> Option<bool> {
    match val.to_str()?.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Parse a decimal usize. Rejects empty input, non-digits and overflow.
fn parse_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }
    let mut result: usize = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((byte - b'0') as usize)?;
    }
    Some(result)
}
