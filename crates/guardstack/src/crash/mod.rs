//! Process-wide crash diagnostics for fatal memory/arithmetic signals.
//!
//! Once installed, a SIGSEGV, SIGILL, SIGFPE or SIGBUS anywhere in the
//! process prints, in order:
//!
//! 1. the signal name, the faulting instruction and the fault address;
//! 2. a hex dump of the bytes at the faulting instruction;
//! 3. optionally, those bytes rendered by an [`InstructionRenderer`];
//! 4. the call stack, symbolized where possible;
//!
//! and then aborts. Nothing is recovered: a fault that reaches the handler is
//! always fatal.
//!
//! # Signal safety
//!
//! Steps 1, 2 and the frame capture of step 4 touch only preallocated or
//! stack memory and async-signal-safe syscalls. The bytes are copied with a
//! fault-free primitive, so an unmapped instruction pointer prints
//! `<unreadable>` instead of faulting again. The handler runs on an alternate
//! stack mapped at install time (for the installing thread), so stack
//! overflows are reported too. Symbol resolution and the instruction renderer
//! may allocate; they run last and are best-effort. A fault inside the handler
//! itself exits immediately with status `128 + signal`.

mod render;
mod signals;
mod writer;

pub use render::{InstructionRenderer, NdisasmRenderer};
pub use signals::{signal_description, signal_name, FATAL_SIGNALS};
pub use writer::FdWriter;

use crate::config::CrashConfig;
use crate::hardening::abort_with_message;
use crate::platform;
use crate::util::{hex_bytes_into, ALT_STACK_SIZE, BACKTRACE_MAX_FRAMES, MAX_DUMP_BYTES};
use core::ffi::c_void;
use core::fmt::Write;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::io;
use std::sync::OnceLock;

const UNINSTALLED: u8 = 0;
const INSTALLING: u8 = 1;
const INSTALLED: u8 = 2;

/// One-shot installation state plus the configuration the handler reads.
///
/// The configuration is published only once installation succeeds, so a
/// failed attempt leaves the installer free to retry with another config.
struct Installer {
    state: AtomicU8,
    config: OnceLock<CrashConfig>,
}

impl Installer {
    const fn new() -> Self {
        Installer {
            state: AtomicU8::new(UNINSTALLED),
            config: OnceLock::new(),
        }
    }

    fn install(
        &self,
        config: CrashConfig,
        register: impl FnOnce() -> io::Result<()>,
    ) -> io::Result<bool> {
        match self
            .state
            .compare_exchange(UNINSTALLED, INSTALLING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(INSTALLING) => {
                while self.state.load(Ordering::Acquire) == INSTALLING {
                    core::hint::spin_loop();
                }
                return if self.is_installed() {
                    Ok(false)
                } else {
                    Err(io::Error::other("concurrent crash handler install failed"))
                };
            }
            Err(_) => return Ok(false),
        }

        match register() {
            Ok(()) => {
                // Handlers fall back to the default config until this lands
                let _ = self.config.set(config);
                self.state.store(INSTALLED, Ordering::Release);
                Ok(true)
            }
            Err(err) => {
                self.state.store(UNINSTALLED, Ordering::Release);
                Err(err)
            }
        }
    }

    fn is_installed(&self) -> bool {
        self.state.load(Ordering::Acquire) == INSTALLED
    }

    fn config(&self) -> CrashConfig {
        self.config.get().copied().unwrap_or_default()
    }
}

static INSTALLER: Installer = Installer::new();
static RENDERER: OnceLock<Box<dyn InstructionRenderer>> = OnceLock::new();
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

/// Install the handler with [`CrashConfig::from_env`]. Idempotent.
pub fn install() -> io::Result<()> {
    install_with(CrashConfig::from_env())
}

/// Install the handler with an explicit configuration.
///
/// Only the first successful call takes effect; later calls return `Ok`
/// without changing anything. After a failed call the next one starts over.
pub fn install_with(config: CrashConfig) -> io::Result<()> {
    let config = config.clamped();
    if INSTALLER.install(config, || unsafe { install_handlers() })? {
        tracing::info!(
            dump_bytes = config.dump_bytes,
            backtrace_depth = config.backtrace_depth,
            disassemble = config.disassemble,
            "crash handler installed"
        );
    }
    Ok(())
}

pub fn is_installed() -> bool {
    INSTALLER.is_installed()
}

/// Register the renderer used when [`CrashConfig::disassemble`] is set.
/// Only the first registration is kept; a rejected renderer is handed back.
pub fn set_instruction_renderer(
    renderer: Box<dyn InstructionRenderer>,
) -> Result<(), Box<dyn InstructionRenderer>> {
    RENDERER.set(renderer)
}

unsafe fn install_handlers() -> io::Result<()> {
    install_alt_stack()?;

    for sig in FATAL_SIGNALS {
        let mut sa: libc::sigaction = core::mem::zeroed();
        // NODEFER lets a nested fault re-enter and hit the re-entrancy exit
        sa.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK | libc::SA_NODEFER;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_sigaction = fatal_signal_handler
            as extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void)
            as libc::sighandler_t;
        if libc::sigaction(sig, &sa, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Map an alternate signal stack for the calling thread.
unsafe fn install_alt_stack() -> io::Result<()> {
    let stack = platform::map_anonymous(ALT_STACK_SIZE);
    if stack.is_null() {
        return Err(io::Error::new(
            io::ErrorKind::OutOfMemory,
            "cannot map alternate signal stack",
        ));
    }
    let ss = libc::stack_t {
        ss_sp: stack as *mut c_void,
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    if libc::sigaltstack(&ss, ptr::null_mut()) != 0 {
        let err = io::Error::last_os_error();
        platform::unmap(stack, ALT_STACK_SIZE);
        return Err(err);
    }
    Ok(())
}

extern "C" fn fatal_signal_handler(
    sig: libc::c_int,
    info: *mut libc::siginfo_t,
    ucontext: *mut c_void,
) {
    if IN_HANDLER.swap(true, Ordering::AcqRel) {
        unsafe { libc::_exit(128 + sig) };
    }

    let config = INSTALLER.config();
    let ip = unsafe { platform::sys::instruction_pointer(ucontext) };
    let fault_addr = unsafe { platform::sys::fault_address(info) };

    let mut out = FdWriter::stderr();
    let _ = writeln!(
        out,
        "Caught exception! - {} ({})",
        signal_name(sig),
        signal_description(sig)
    );
    let _ = writeln!(
        out,
        "Crash happened at {:#x} (fault address {:#x})",
        ip, fault_addr
    );
    out.flush();

    let mut code = [0u8; MAX_DUMP_BYTES];
    let code = &mut code[..config.dump_bytes];
    let readable = ip != 0 && platform::read_own_memory(ip, code);
    dump_code(&mut out, readable.then_some(&*code));

    if readable && config.disassemble {
        if let Some(renderer) = RENDERER.get() {
            match renderer.render(ip, code) {
                Ok(text) => {
                    out.write_bytes(text.as_bytes());
                    out.write_bytes(b"\n");
                }
                Err(err) => {
                    let _ = writeln!(out, "disassembly unavailable: {}\n", err);
                }
            }
            out.flush();
        }
    }

    let mut frames = [0usize; BACKTRACE_MAX_FRAMES];
    let count = capture_frames(&mut frames[..config.backtrace_depth]);
    print_backtrace(&mut out, &frames[..count]);
    drop(out);

    unsafe { restore_default_handlers() };
    abort_with_message(&[&b"guardstack: aborting after "[..], signal_name(sig).as_bytes(), b"\n"]);
}

fn dump_code(out: &mut FdWriter, code: Option<&[u8]>) {
    match code {
        Some(bytes) => {
            let mut hex = [0u8; MAX_DUMP_BYTES * 3];
            let n = hex_bytes_into(bytes, &mut hex);
            out.write_bytes(b"\nCode: < ");
            out.write_bytes(&hex[..n]);
            out.write_bytes(b"... >\n\n");
        }
        None => out.write_bytes(b"\nCode: <unreadable>\n\n"),
    }
    out.flush();
}

/// Collect return addresses into `frames` without allocating.
fn capture_frames(frames: &mut [usize]) -> usize {
    let mut count = 0;
    if frames.is_empty() {
        return 0;
    }
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            frames[count] = frame.ip() as usize;
            count += 1;
            count < frames.len()
        });
    }
    count
}

fn print_backtrace(out: &mut FdWriter, frames: &[usize]) {
    let _ = writeln!(out, "Backtrace ({}):", frames.len());
    out.write_bytes(b"-------------------------------------------------------\n");
    out.flush();
    for &ip in frames {
        let _ = write!(out, "|-{:#018x}", ip);
        let mut named = false;
        unsafe {
            backtrace::resolve_unsynchronized(ip as *mut c_void, |symbol| {
                if named {
                    return;
                }
                if let Some(name) = symbol.name() {
                    let _ = write!(out, " {}", name);
                    if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                        let _ = write!(out, " ({}:{})", file.display(), line);
                    }
                    named = true;
                }
            });
        }
        out.write_bytes(b"\n");
        out.flush();
    }
    out.write_bytes(b"\n");
}

unsafe fn restore_default_handlers() {
    for sig in FATAL_SIGNALS {
        let mut sa: libc::sigaction = core::mem::zeroed();
        sa.sa_sigaction = libc::SIG_DFL;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(sig, &sa, ptr::null_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        install_with(CrashConfig::default()).unwrap();
        assert!(is_installed());
        install_with(CrashConfig {
            dump_bytes: 3,
            ..CrashConfig::default()
        })
        .unwrap();
        // First configuration sticks
        assert_eq!(INSTALLER.config().dump_bytes, CrashConfig::default().dump_bytes);
    }

    #[test]
    fn failed_install_keeps_no_config() {
        let installer = Installer::new();
        let first = CrashConfig {
            dump_bytes: 3,
            ..CrashConfig::default()
        };
        let err = installer
            .install(first, || Err(io::Error::other("sigaction refused")))
            .unwrap_err();
        assert_eq!(err.to_string(), "sigaction refused");
        assert!(!installer.is_installed());
        assert_eq!(installer.config(), CrashConfig::default());

        let retry = CrashConfig {
            dump_bytes: 7,
            backtrace_depth: 10,
            disassemble: true,
        };
        assert!(installer.install(retry, || Ok(())).unwrap());
        assert!(installer.is_installed());
        assert_eq!(installer.config(), retry);

        // Registration is not repeated once installed
        assert!(!installer
            .install(first, || panic!("registered twice"))
            .unwrap());
        assert_eq!(installer.config(), retry);
    }

    #[test]
    fn frames_are_captured() {
        let mut frames = [0usize; 8];
        let n = capture_frames(&mut frames);
        assert!(n > 0);
        assert!(frames[..n].iter().all(|&ip| ip != 0));
        assert_eq!(capture_frames(&mut []), 0);
    }
}
