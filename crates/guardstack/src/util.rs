/// Minimum number of element slots a stack ever holds.
pub const MIN_CAPACITY: usize = 16;

/// Width of one guard word in the arena (and of the record guards).
pub const GUARD_SIZE: usize = core::mem::size_of::<u64>();

/// Default number of bytes dumped at the faulting instruction.
pub const DEFAULT_DUMP_BYTES: usize = 15;

/// Upper bound for the instruction dump (sizes the handler's stack buffer).
pub const MAX_DUMP_BYTES: usize = 64;

/// Maximum number of return addresses captured by the crash handler.
pub const BACKTRACE_MAX_FRAMES: usize = 100;

/// Size of the alternate signal stack the crash handler runs on.
pub const ALT_STACK_SIZE: usize = 256 * 1024;

/// Shrink once occupancy falls to `watermark / SHRINK_DIVISOR`.
pub const SHRINK_DIVISOR: usize = 4;

/// Render `bytes` as lowercase hex pairs separated by spaces into `out`.
/// Returns the number of bytes written. Never allocates.
pub fn hex_bytes_into(bytes: &[u8], out: &mut [u8]) -> usize {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut n = 0;
    for &b in bytes {
        if n + 3 > out.len() {
            break;
        }
        out[n] = DIGITS[(b >> 4) as usize];
        out[n + 1] = DIGITS[(b & 0x0f) as usize];
        out[n + 2] = b' ';
        n += 3;
    }
    n
}

/// Render `value` in decimal into `out`. Returns the number of bytes
/// written, or 0 if `out` is too small. Never allocates.
pub fn decimal_into(mut value: u64, out: &mut [u8]) -> usize {
    let mut digits = [0u8; 20];
    let mut n = 0;
    loop {
        digits[n] = b'0' + (value % 10) as u8;
        n += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    if n > out.len() {
        return 0;
    }
    for (dst, src) in out.iter_mut().zip(digits[..n].iter().rev()) {
        *dst = *src;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_rendering() {
        let mut buf = [0u8; 16];
        let n = hex_bytes_into(&[0x00, 0xab, 0x7f], &mut buf);
        assert_eq!(&buf[..n], b"00 ab 7f ");
    }

    #[test]
    fn hex_rendering_truncates() {
        let mut buf = [0u8; 5];
        let n = hex_bytes_into(&[1, 2, 3], &mut buf);
        assert_eq!(&buf[..n], b"01 ");
    }

    #[test]
    fn decimal_rendering() {
        let mut out = [0u8; 20];
        let n = decimal_into(0, &mut out);
        assert_eq!(&out[..n], b"0");
        let n = decimal_into(1234567, &mut out);
        assert_eq!(&out[..n], b"1234567");
        let n = decimal_into(u64::MAX, &mut out);
        assert_eq!(&out[..n], b"18446744073709551615");
        assert_eq!(decimal_into(100, &mut [0u8; 2]), 0);
    }
}
