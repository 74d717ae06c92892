pub mod canary;
pub mod checksum;
pub mod self_check;

use crate::crash::FdWriter;

/// Write `parts` back to back on stderr, then abort.
///
/// Goes through a stack-buffered [`FdWriter`], so it is usable from the
/// crash handler and from paths where the heap may be unusable.
#[cold]
#[inline(never)]
pub fn abort_with_message(parts: &[&[u8]]) -> ! {
    let mut out = FdWriter::stderr();
    for part in parts {
        out.write_bytes(part);
    }
    out.flush();
    unsafe { libc::abort() }
}
