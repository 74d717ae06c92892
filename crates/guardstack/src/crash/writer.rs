use core::fmt;

const LINE_CAPACITY: usize = 256;

/// Buffered `fmt::Write` sink over a raw file descriptor.
///
/// Lives on the stack, never allocates and only calls write(2), so it is
/// usable from a signal handler. Output is flushed when the buffer fills,
/// on [`flush`](Self::flush) and on drop.
pub struct FdWriter {
    fd: libc::c_int,
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl FdWriter {
    pub const fn new(fd: libc::c_int) -> Self {
        FdWriter {
            fd,
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    pub const fn stderr() -> Self {
        Self::new(libc::STDERR_FILENO)
    }

    pub fn write_bytes(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.len == LINE_CAPACITY {
                self.flush();
            }
            let n = bytes.len().min(LINE_CAPACITY - self.len);
            self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
            self.len += n;
            bytes = &bytes[n..];
        }
    }

    pub fn flush(&mut self) {
        let mut off = 0;
        while off < self.len {
            let ret = unsafe {
                libc::write(
                    self.fd,
                    self.buf[off..].as_ptr() as *const libc::c_void,
                    self.len - off,
                )
            };
            if ret < 0 {
                if errno() == libc::EINTR {
                    continue;
                }
                // Nowhere left to report to
                break;
            }
            off += ret as usize;
        }
        self.len = 0;
    }
}

impl fmt::Write for FdWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl Drop for FdWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

fn errno() -> libc::c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn pipe() -> (libc::c_int, libc::c_int) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn read_all(fd: libc::c_int) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = unsafe { libc::read(fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len()) };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n as usize]);
        }
        out
    }

    #[test]
    fn formats_and_flushes_on_drop() {
        let (r, w) = pipe();
        {
            let mut out = FdWriter::new(w);
            write!(out, "signal {} at {:#x}", "SIGSEGV", 0xdead_usize).unwrap();
        }
        unsafe { libc::close(w) };
        assert_eq!(read_all(r), b"signal SIGSEGV at 0xdead");
        unsafe { libc::close(r) };
    }

    #[test]
    fn output_longer_than_buffer() {
        let (r, w) = pipe();
        let long = "x".repeat(LINE_CAPACITY * 3 + 7);
        {
            let mut out = FdWriter::new(w);
            out.write_str(&long).unwrap();
        }
        unsafe { libc::close(w) };
        assert_eq!(read_all(r).len(), long.len());
        unsafe { libc::close(r) };
    }
}
