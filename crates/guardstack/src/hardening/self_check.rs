use crate::error::StackError;

/// Result of a full, non-short-circuiting integrity audit of one stack.
///
/// `ProtectedStack::check` stops at the first failure; this records every
/// condition so a dump can show all of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityReport {
    pub record_readable: bool,
    pub arena_readable: bool,
    /// `None` when guards are disabled for the instance.
    pub record_guards_ok: Option<bool>,
    pub arena_guards_ok: Option<bool>,
    /// `None` when the checksum is disabled for the instance.
    pub checksum_ok: Option<bool>,
    pub stored_checksum: u64,
    pub computed_checksum: u64,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.first_error().is_none()
    }

    pub fn guards_ok(&self) -> bool {
        self.record_guards_ok.unwrap_or(true) && self.arena_guards_ok.unwrap_or(true)
    }

    /// The error `check` would report, using its ordering.
    pub fn first_error(&self) -> Option<StackError> {
        if !self.record_readable || !self.arena_readable {
            return Some(StackError::NotInitialized);
        }
        if !self.guards_ok() {
            return Some(StackError::GuardCorrupted);
        }
        if self.checksum_ok == Some(false) {
            return Some(StackError::ChecksumMismatch);
        }
        None
    }
}
