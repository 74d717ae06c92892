use crate::platform;
use crate::util::GUARD_SIZE;
use std::sync::OnceLock;

static SENTINEL: OnceLock<u64> = OnceLock::new();

/// The process-wide guard value, drawn once from the OS CSPRNG.
///
/// Zero is redrawn so a zeroed (destroyed) record can never pass as guarded.
pub fn sentinel() -> u64 {
    *SENTINEL.get_or_init(|| loop {
        let v = platform::secure_random_u64();
        if v != 0 {
            break v;
        }
    })
}

/// Write the sentinel into the guard word at `offset`.
///
/// Returns false (and writes nothing) if the word does not fit in `arena`.
#[inline]
pub fn write_guard(arena: &mut [u8], offset: usize) -> bool {
    match guard_slot_mut(arena, offset) {
        Some(slot) => {
            slot.copy_from_slice(&sentinel().to_ne_bytes());
            true
        }
        None => false,
    }
}

/// Read the guard word at `offset`, if it lies inside `arena`.
#[inline]
pub fn read_guard(arena: &[u8], offset: usize) -> Option<u64> {
    let end = offset.checked_add(GUARD_SIZE)?;
    let bytes = arena.get(offset..end)?;
    let mut word = [0u8; GUARD_SIZE];
    word.copy_from_slice(bytes);
    Some(u64::from_ne_bytes(word))
}

/// True if the guard word at `offset` still holds the sentinel.
#[inline]
pub fn check_guard(arena: &[u8], offset: usize) -> bool {
    read_guard(arena, offset) == Some(sentinel())
}

fn guard_slot_mut(arena: &mut [u8], offset: usize) -> Option<&mut [u8]> {
    let end = offset.checked_add(GUARD_SIZE)?;
    arena.get_mut(offset..end)
}
