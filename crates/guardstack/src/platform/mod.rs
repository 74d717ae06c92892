pub mod maps;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

#[cfg(all(unix, not(target_os = "linux")))]
pub mod unix;
#[cfg(all(unix, not(target_os = "linux")))]
pub use unix as sys;

pub use maps::{MapRegion, MemoryMap};

use crate::hardening::abort_with_message;
use core::mem::{self, MaybeUninit};

/// True if `ptr` lies in a mapped region of this process carrying every
/// permission character in `perms` (e.g. `"r"`, `"rw"`).
///
/// Reads the OS region listing on each call, so this is meant for explicit
/// validation, not hot paths. Where no listing exists it degrades to a
/// non-null check.
pub fn is_valid<T: ?Sized>(ptr: *const T, perms: &str) -> bool {
    let addr = ptr as *const u8 as usize;
    if addr == 0 {
        return false;
    }
    if !sys::HAS_MAPS {
        return true;
    }
    match MemoryMap::current() {
        Ok(map) => map.find(addr).is_some_and(|r| r.has_perms(perms)),
        Err(_) => false,
    }
}

/// Map anonymous read-write memory. Returns null on failure.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    sys::map_anonymous(size)
}

/// Unmap memory returned by [`map_anonymous`].
///
/// # Safety
/// `ptr` and `size` must match an earlier `map_anonymous` call.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    sys::unmap(ptr, size);
}

/// 64 bits from the OS CSPRNG. Aborts if the OS has no entropy source.
pub fn secure_random_u64() -> u64 {
    let mut buf = [0u8; 8];
    if let Err(err) = getrandom::getrandom(&mut buf) {
        let mut code = [0u8; 20];
        let n = crate::util::decimal_into(err.code().get() as u64, &mut code);
        abort_with_message(&[
            &b"guardstack: no OS entropy source for guard values (error "[..],
            &code[..n],
            b")\n",
        ]);
    }
    u64::from_ne_bytes(buf)
}

/// Copy `dst.len()` bytes of this process's memory starting at `addr`.
/// Returns false instead of faulting if any byte is unreadable.
/// Async-signal-safe.
#[inline]
pub fn read_own_memory(addr: usize, dst: &mut [u8]) -> bool {
    sys::read_own_memory(addr, dst)
}

/// True if every byte of `*ptr` can be read without faulting.
///
/// One copy syscall instead of a region-listing scan, so it is cheap enough
/// for per-operation use. Degrades to a non-null check where no fault-free
/// read exists.
pub fn is_readable<T>(ptr: *const T) -> bool {
    if ptr.is_null() {
        return false;
    }
    if !sys::HAS_FAULT_FREE_READ {
        return true;
    }
    let mut copy = MaybeUninit::<T>::uninit();
    let bytes = unsafe {
        core::slice::from_raw_parts_mut(copy.as_mut_ptr() as *mut u8, mem::size_of::<T>())
    };
    read_own_memory(ptr as usize, bytes)
}
