//! The protected stack: a fixed-element-size dynamic array that verifies its
//! own storage.
//!
//! Arena layout (guards enabled):
//!
//! ```text
//! [header guard: 8] [data: capacity bytes] [trailer guard: 8]
//! ```
//!
//! With guards disabled the arena is just the data region. Every access goes
//! through offsets computed from the record and is bounds-checked against the
//! arena; nothing holds a pointer into the arena across a reallocation.

mod dump;

pub use dump::StackDump;

use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::hardening::canary;
use crate::hardening::self_check::IntegrityReport;
use crate::util::{GUARD_SIZE, MIN_CAPACITY, SHRINK_DIVISOR};
use crate::{crash, platform};
use core::ops::Range;
use std::borrow::Cow;

/// Where a stack was constructed. Supplied by the caller, usually through
/// [`debug_origin!`](crate::debug_origin).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugOrigin {
    pub file: Cow<'static, str>,
    pub line: u32,
    pub name: Cow<'static, str>,
}

impl DebugOrigin {
    pub fn new(
        file: impl Into<Cow<'static, str>>,
        line: u32,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        DebugOrigin {
            file: file.into(),
            line,
            name: name.into(),
        }
    }
}

/// Capture the current source location and a name for a stack.
///
/// `debug_origin!(requests)` names the origin `"requests"`;
/// `debug_origin!("job queue")` uses the string as given.
#[macro_export]
macro_rules! debug_origin {
    ($name:ident) => {
        $crate::DebugOrigin::new(file!(), line!(), stringify!($name))
    };
    ($name:expr) => {
        $crate::DebugOrigin::new(file!(), line!(), $name)
    };
}

/// Caller-owned stack record. The data arena is a separate owned buffer.
///
/// A record starts out unconstructed ([`ProtectedStack::new`]); it becomes
/// usable after [`construct`](Self::construct) and returns to the zeroed
/// state after [`destruct`](Self::destruct).
#[repr(C)]
pub struct ProtectedStack {
    header_guard: u64,
    arena: Vec<u8>,
    len: usize,
    /// Bytes reserved for the data region.
    capacity: usize,
    elem_size: usize,
    /// Capacity in elements at the last allocation change.
    last_grow_watermark: usize,
    checksum: u64,
    config: StackConfig,
    origin: Option<DebugOrigin>,
    trailer_guard: u64,
}

impl Default for ProtectedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectedStack {
    /// An unconstructed, zeroed record.
    pub const fn new() -> Self {
        ProtectedStack {
            header_guard: 0,
            arena: Vec::new(),
            len: 0,
            capacity: 0,
            elem_size: 0,
            last_grow_watermark: 0,
            checksum: 0,
            config: StackConfig::unprotected(),
            origin: None,
            trailer_guard: 0,
        }
    }

    /// Construct a record in one step.
    pub fn with_capacity(
        elem_size: usize,
        initial_capacity: usize,
        config: StackConfig,
    ) -> Result<Self> {
        let mut stack = Self::new();
        stack.construct(elem_size, initial_capacity, config, None)?;
        Ok(stack)
    }

    /// Allocate and guard the arena.
    ///
    /// Capacity is raised to [`MIN_CAPACITY`] elements. Fails with
    /// `AlreadyInitialized` on a live record, `NullArgument` for a zero
    /// element size and `AllocationFailed` if the arena cannot be reserved;
    /// on failure the record is left untouched.
    pub fn construct(
        &mut self,
        elem_size: usize,
        initial_capacity: usize,
        config: StackConfig,
        origin: Option<DebugOrigin>,
    ) -> Result<()> {
        if self.is_initialized() {
            return Err(StackError::AlreadyInitialized);
        }
        if elem_size == 0 {
            return Err(StackError::NullArgument);
        }

        let slots = initial_capacity.max(MIN_CAPACITY);
        let capacity = slots
            .checked_mul(elem_size)
            .ok_or(StackError::AllocationFailed)?;
        let arena = allocate_arena(capacity, guard_len(&config))?;

        if config.install_crash_handler {
            if let Err(err) = crash::install() {
                tracing::warn!(%err, "crash handler could not be installed");
            }
        }

        self.arena = arena;
        self.len = 0;
        self.capacity = capacity;
        self.elem_size = elem_size;
        self.last_grow_watermark = slots;
        self.config = config;
        self.origin = origin;
        self.set_guards();
        self.recompute_checksum();

        tracing::debug!(
            elem_size,
            capacity = slots,
            name = self.origin.as_ref().map(|o| &*o.name),
            "stack constructed"
        );
        Ok(())
    }

    /// Release the arena and zero every field, guards and checksum included.
    pub fn destruct(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Err(StackError::NotInitialized);
        }
        tracing::debug!(len = self.len, capacity = self.capacity(), "stack destructed");
        *self = Self::new();
        Ok(())
    }

    /// Push one element of exactly `elem_size` bytes, doubling the capacity
    /// first if the stack is full.
    pub fn push(&mut self, element: &[u8]) -> Result<()> {
        self.require_initialized()?;
        self.require_elem_len(element.len())?;

        if self.len * self.elem_size >= self.capacity {
            self.grow()?;
        }

        let range = self.slot_range(self.len).ok_or(StackError::NotInitialized)?;
        self.arena[range].copy_from_slice(element);
        self.len += 1;
        self.recompute_checksum();
        Ok(())
    }

    /// Pop the top element into `out` (exactly `elem_size` bytes).
    ///
    /// Shrinks before reading once occupancy has fallen to a quarter of the
    /// capacity set at the last allocation change, never below the floor.
    pub fn pop(&mut self, out: &mut [u8]) -> Result<()> {
        self.require_initialized()?;
        self.require_elem_len(out.len())?;
        if self.len == 0 {
            return Err(StackError::EmptyContainer);
        }

        if self.should_shrink() {
            self.shrink()?;
        }

        let range = self
            .slot_range(self.len - 1)
            .ok_or(StackError::NotInitialized)?;
        out.copy_from_slice(&self.arena[range]);
        self.len -= 1;
        self.recompute_checksum();
        Ok(())
    }

    /// Copy the top element into `out` without removing it.
    pub fn peek(&self, out: &mut [u8]) -> Result<()> {
        self.require_initialized()?;
        self.require_elem_len(out.len())?;
        if self.len == 0 {
            return Err(StackError::EmptyContainer);
        }
        let range = self
            .slot_range(self.len - 1)
            .ok_or(StackError::NotInitialized)?;
        out.copy_from_slice(&self.arena[range]);
        Ok(())
    }

    /// Read-only integrity validation, first failure wins:
    /// record memory, arena memory, guards, checksum.
    pub fn check(&self) -> Result<()> {
        if !platform::is_valid(self as *const Self, "r") {
            return self.report_corruption(StackError::NotInitialized);
        }
        if !self.is_initialized() || !platform::is_valid(self.arena.as_ptr(), "r") {
            return self.report_corruption(StackError::NotInitialized);
        }
        if self.config.enable_guards && !(self.record_guards_ok() && self.arena_guards_ok()) {
            return self.report_corruption(StackError::GuardCorrupted);
        }
        if self.config.enable_checksum && self.compute_checksum() != self.checksum {
            return self.report_corruption(StackError::ChecksumMismatch);
        }
        Ok(())
    }

    /// Full audit of every integrity condition, without short-circuiting.
    pub fn audit(&self) -> IntegrityReport {
        let initialized = self.is_initialized();
        let guards = self.config.enable_guards && initialized;
        let computed = if initialized { self.compute_checksum() } else { 0 };
        IntegrityReport {
            record_readable: platform::is_valid(self as *const Self, "r"),
            arena_readable: initialized && platform::is_valid(self.arena.as_ptr(), "r"),
            record_guards_ok: guards.then(|| self.record_guards_ok()),
            arena_guards_ok: guards.then(|| self.arena_guards_ok()),
            checksum_ok: (self.config.enable_checksum && initialized)
                .then_some(computed == self.checksum),
            stored_checksum: self.checksum,
            computed_checksum: computed,
        }
    }

    /// Human-readable report: counts, guards, checksum status, every slot.
    pub fn dump(&self) -> StackDump<'_> {
        StackDump::new(self)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !self.arena.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in elements.
    #[inline]
    pub fn capacity(&self) -> usize {
        if self.elem_size == 0 {
            0
        } else {
            self.capacity / self.elem_size
        }
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    #[inline]
    pub fn last_grow_watermark(&self) -> usize {
        self.last_grow_watermark
    }

    #[inline]
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    #[inline]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn origin(&self) -> Option<&DebugOrigin> {
        self.origin.as_ref()
    }

    /// Record guards as `(header, trailer)`.
    pub fn record_guards(&self) -> (u64, u64) {
        (self.header_guard, self.trailer_guard)
    }

    /// Arena guard words as `(header, trailer)`, if guards are enabled.
    pub fn arena_guards(&self) -> Option<(u64, u64)> {
        if !self.config.enable_guards {
            return None;
        }
        Some((
            canary::read_guard(&self.arena, 0)?,
            canary::read_guard(&self.arena, self.trailer_offset())?,
        ))
    }

    /// Bytes of slot `index`, live or not.
    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.slot_range(index).map(|r| &self.arena[r])
    }

    pub(crate) fn data_offset(&self) -> usize {
        guard_len(&self.config)
    }

    pub(crate) fn arena_mut(&mut self) -> &mut [u8] {
        &mut self.arena
    }

    pub(crate) fn arena_ptr(&self) -> *const u8 {
        self.arena.as_ptr()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(StackError::NotInitialized)
        }
    }

    fn require_elem_len(&self, actual: usize) -> Result<()> {
        if actual == self.elem_size {
            Ok(())
        } else {
            Err(StackError::SizeMismatch {
                expected: self.elem_size,
                actual,
            })
        }
    }

    fn trailer_offset(&self) -> usize {
        self.data_offset() + self.capacity
    }

    fn data_range(&self) -> Option<Range<usize>> {
        let start = self.data_offset();
        let end = start.checked_add(self.capacity)?;
        (end <= self.arena.len()).then_some(start..end)
    }

    /// Byte range of slot `index`, bounds-checked against the data region.
    fn slot_range(&self, index: usize) -> Option<Range<usize>> {
        let data = self.data_range()?;
        let start = data.start.checked_add(index.checked_mul(self.elem_size)?)?;
        let end = start.checked_add(self.elem_size)?;
        (end <= data.end).then_some(start..end)
    }

    fn compute_checksum(&self) -> u64 {
        match self.data_range() {
            Some(range) => self.config.checksum.digest(&self.arena[range]),
            None => 0,
        }
    }

    fn recompute_checksum(&mut self) {
        if self.config.enable_checksum {
            self.checksum = self.compute_checksum();
        }
    }

    /// Write the sentinel into the record and both arena guard words.
    /// Called after every (re)allocation since the arena may have moved.
    fn set_guards(&mut self) {
        if !self.config.enable_guards {
            return;
        }
        let sentinel = canary::sentinel();
        self.header_guard = sentinel;
        self.trailer_guard = sentinel;
        let trailer = self.trailer_offset();
        canary::write_guard(&mut self.arena, 0);
        canary::write_guard(&mut self.arena, trailer);
    }

    fn record_guards_ok(&self) -> bool {
        let sentinel = canary::sentinel();
        self.header_guard == sentinel && self.trailer_guard == sentinel
    }

    fn arena_guards_ok(&self) -> bool {
        canary::check_guard(&self.arena, 0)
            && canary::check_guard(&self.arena, self.trailer_offset())
    }

    fn should_shrink(&self) -> bool {
        self.len <= self.last_grow_watermark / SHRINK_DIVISOR
            && self.capacity() / 2 >= MIN_CAPACITY
    }

    fn grow(&mut self) -> Result<()> {
        let new_capacity = self
            .capacity
            .checked_mul(2)
            .ok_or(StackError::AllocationFailed)?;
        self.reallocate(new_capacity)?;
        tracing::debug!(capacity = self.capacity(), len = self.len, "stack grown");
        Ok(())
    }

    fn shrink(&mut self) -> Result<()> {
        self.reallocate(self.capacity / 2)?;
        tracing::debug!(capacity = self.capacity(), len = self.len, "stack shrunk");
        Ok(())
    }

    /// Move the live elements into a freshly reserved arena of
    /// `new_capacity` data bytes. The old arena is released only after the
    /// new one exists, so a failed reservation loses nothing.
    fn reallocate(&mut self, new_capacity: usize) -> Result<()> {
        let live = self.len * self.elem_size;
        debug_assert!(live <= new_capacity);

        let guard = guard_len(&self.config);
        let mut arena = allocate_arena(new_capacity, guard)?;
        let src = self.data_offset();
        arena[guard..guard + live].copy_from_slice(&self.arena[src..src + live]);

        self.arena = arena;
        self.capacity = new_capacity;
        self.last_grow_watermark = self.capacity();
        self.set_guards();
        self.recompute_checksum();
        Ok(())
    }

    fn report_corruption(&self, err: StackError) -> Result<()> {
        tracing::warn!(
            error = %err,
            name = self.origin.as_ref().map(|o| &*o.name),
            record = ?(self as *const Self),
            "stack integrity check failed"
        );
        Err(err)
    }
}

impl core::fmt::Debug for ProtectedStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProtectedStack")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("elem_size", &self.elem_size)
            .field("checksum", &format_args!("{:#x}", self.checksum))
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[inline]
fn guard_len(config: &StackConfig) -> usize {
    if config.enable_guards {
        GUARD_SIZE
    } else {
        0
    }
}

/// Reserve and zero-fill `guard + capacity + guard` bytes without aborting
/// on allocation failure.
fn allocate_arena(capacity: usize, guard: usize) -> Result<Vec<u8>> {
    let total = capacity
        .checked_add(guard * 2)
        .ok_or(StackError::AllocationFailed)?;
    #[cfg(test)]
    if tests::ARENA_LIMIT.with(|l| l.get()).is_some_and(|limit| total > limit) {
        return Err(StackError::AllocationFailed);
    }
    let mut arena = Vec::new();
    arena
        .try_reserve_exact(total)
        .map_err(|_| StackError::AllocationFailed)?;
    arena.resize(total, 0);
    Ok(arena)
}
