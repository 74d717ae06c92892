//! Non-Linux unix targets: no region listing, no cross-process read.

use core::ptr;
use std::io;

pub const HAS_MAPS: bool = false;

pub const HAS_FAULT_FREE_READ: bool = false;

pub fn read_self_maps() -> io::Result<String> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no /proc/self/maps on this platform",
    ))
}

pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    let result = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON,
        -1,
        0,
    );
    if result == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        result as *mut u8
    }
}

pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

/// Without a fault-free copy primitive, bytes are never dumped.
pub fn read_own_memory(_addr: usize, dst: &mut [u8]) -> bool {
    dst.is_empty()
}

pub unsafe fn instruction_pointer(_uc: *mut libc::c_void) -> usize {
    0
}

pub unsafe fn fault_address(info: *const libc::siginfo_t) -> usize {
    if info.is_null() {
        return 0;
    }
    (*info).si_addr as usize
}
