use core::ptr;
use std::io;

/// `/proc/self/maps` is available.
pub const HAS_MAPS: bool = true;

/// `read_own_memory` reports unreadable pages instead of faulting.
pub const HAS_FAULT_FREE_READ: bool = true;

pub fn read_self_maps() -> io::Result<String> {
    std::fs::read_to_string("/proc/self/maps")
}

/// Map anonymous read-write memory.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    let result = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if result == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        result as *mut u8
    }
}

/// Unmap memory.
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` with the same `size`.
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

/// Copy own memory through process_vm_readv(2), which reports EFAULT for
/// unmapped or unreadable source pages instead of raising SIGSEGV.
pub fn read_own_memory(addr: usize, dst: &mut [u8]) -> bool {
    if dst.is_empty() {
        return true;
    }
    let local = libc::iovec {
        iov_base: dst.as_mut_ptr() as *mut libc::c_void,
        iov_len: dst.len(),
    };
    let remote = libc::iovec {
        iov_base: addr as *mut libc::c_void,
        iov_len: dst.len(),
    };
    let n = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
    if n >= 0 {
        return n as usize == dst.len();
    }
    match io::Error::last_os_error().raw_os_error() {
        // Syscall filtered (seccomp) or unavailable: copy through a pipe
        Some(libc::EPERM) | Some(libc::ENOSYS) => read_via_pipe(addr, dst),
        _ => false,
    }
}

/// write(2) from an unreadable source fails with EFAULT rather than faulting,
/// so bouncing the bytes through a pipe is a fault-free copy.
fn read_via_pipe(addr: usize, dst: &mut [u8]) -> bool {
    let mut fds = [0 as libc::c_int; 2];
    unsafe {
        if libc::pipe(fds.as_mut_ptr()) != 0 {
            return false;
        }
        let written = libc::write(fds[1], addr as *const libc::c_void, dst.len());
        let ok = written >= 0
            && written as usize == dst.len()
            && libc::read(fds[0], dst.as_mut_ptr() as *mut libc::c_void, dst.len())
                == written;
        libc::close(fds[0]);
        libc::close(fds[1]);
        ok
    }
}

/// Instruction pointer saved in a signal `ucontext_t`.
///
/// # Safety
/// `uc` must be the third argument of an `SA_SIGINFO` handler (or null).
#[allow(unused_variables)]
pub unsafe fn instruction_pointer(uc: *mut libc::c_void) -> usize {
    if uc.is_null() {
        return 0;
    }
    let uc = uc as *const libc::ucontext_t;
    #[cfg(target_arch = "x86_64")]
    {
        (*uc).uc_mcontext.gregs[libc::REG_RIP as usize] as usize
    }
    #[cfg(target_arch = "aarch64")]
    {
        (*uc).uc_mcontext.pc as usize
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        0
    }
}

/// Fault address carried in `siginfo_t` (`si_addr`).
///
/// # Safety
/// `info` must come from an `SA_SIGINFO` handler (or be null).
pub unsafe fn fault_address(info: *const libc::siginfo_t) -> usize {
    if info.is_null() {
        return 0;
    }
    (*info).si_addr() as usize
}
