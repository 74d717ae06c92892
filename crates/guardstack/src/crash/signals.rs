/// Fatal signals the crash handler subscribes to.
pub const FATAL_SIGNALS: [libc::c_int; 4] = [libc::SIGSEGV, libc::SIGILL, libc::SIGFPE, libc::SIGBUS];

/// Static name for `sig` (strsignal(3) is not async-signal-safe).
pub fn signal_name(sig: libc::c_int) -> &'static str {
    match sig {
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGILL => "SIGILL",
        libc::SIGFPE => "SIGFPE",
        libc::SIGBUS => "SIGBUS",
        libc::SIGABRT => "SIGABRT",
        _ => "unknown signal",
    }
}

pub fn signal_description(sig: libc::c_int) -> &'static str {
    match sig {
        libc::SIGSEGV => "Segmentation fault",
        libc::SIGILL => "Illegal instruction",
        libc::SIGFPE => "Floating point exception",
        libc::SIGBUS => "Bus error",
        libc::SIGABRT => "Aborted",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fatal_signal_is_named() {
        for sig in FATAL_SIGNALS {
            assert!(signal_name(sig).starts_with("SIG"));
            assert!(!signal_description(sig).is_empty());
        }
        assert_eq!(signal_name(0), "unknown signal");
    }
}
