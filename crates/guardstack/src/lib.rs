//! A self-verifying dynamic array plus a crash-diagnostics signal handler.
//!
//! [`ProtectedStack`] keeps guard canaries around its data region and a CRC
//! over it, and can validate its own memory against the process's mappings.
//! [`crash::install`] registers a handler that prints a forensic dump on
//! SIGSEGV/SIGILL/SIGFPE/SIGBUS before aborting.

extern crate libc;

pub mod api;
pub mod config;
pub mod crash;
pub mod error;
pub mod hardening;
pub mod platform;
pub mod stack;
pub mod util;

pub use config::{CrashConfig, StackConfig};
pub use error::{StackError, StackStatus};
pub use hardening::checksum::ChecksumKind;
pub use stack::{DebugOrigin, ProtectedStack, StackDump};

/// Hooks for corrupting a stack on purpose in tests. Not part of the API.
#[doc(hidden)]
pub mod __test_support {
    use crate::stack::ProtectedStack;

    /// The whole arena, guard words included.
    pub fn arena_mut(stack: &mut ProtectedStack) -> &mut [u8] {
        stack.arena_mut()
    }

    /// Offset of the first data byte within the arena.
    pub fn data_offset(stack: &ProtectedStack) -> usize {
        stack.data_offset()
    }
}
