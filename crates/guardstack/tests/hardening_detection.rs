//! Hardening verification tests for guardstack.
//!
//! These tests verify that corruption of a stack's guard words or data is
//! reported by `check`, and that the crash handler prints its report before
//! the process dies.
//!
//! Tests that expect the process to abort are run as subprocesses: we spawn
//! the test binary with a specific scenario name and check that the child
//! exits unsuccessfully and prints the expected diagnostic on stderr.

use guardstack::__test_support::{arena_mut, data_offset};
use guardstack::crash::{self, InstructionRenderer};
use guardstack::hardening::canary;
use guardstack::{CrashConfig, ProtectedStack, StackConfig, StackError};
use std::io;

fn quiet() -> StackConfig {
    StackConfig {
        install_crash_handler: false,
        ..StackConfig::default()
    }
}

fn filled(n: i32) -> ProtectedStack {
    let mut s = ProtectedStack::with_capacity(4, 16, quiet()).unwrap();
    for i in 0..n {
        s.push(&i.to_ne_bytes()).unwrap();
    }
    s
}

// ---------------------------------------------------------------------------
// Guard words
// ---------------------------------------------------------------------------

#[test]
fn header_guard_overwrite_detected() {
    let mut s = filled(3);
    assert!(s.check().is_ok());
    let off = data_offset(&s);
    arena_mut(&mut s)[off - 1] ^= 0x01;
    assert_eq!(s.check(), Err(StackError::GuardCorrupted));
}

#[test]
fn trailer_guard_overwrite_detected() {
    let mut s = filled(16);
    let end = data_offset(&s) + s.capacity_bytes();
    arena_mut(&mut s)[end] ^= 0x01;
    assert_eq!(s.check(), Err(StackError::GuardCorrupted));
    assert_eq!(s.audit().first_error(), Some(StackError::GuardCorrupted));
}

#[test]
fn guards_follow_the_arena_through_growth() {
    let mut s = filled(16);
    s.push(&99i32.to_ne_bytes()).unwrap();
    assert_eq!(s.capacity(), 32);
    let (head, tail) = s.arena_guards().unwrap();
    assert_eq!(head, canary::sentinel());
    assert_eq!(tail, canary::sentinel());

    let end = data_offset(&s) + s.capacity_bytes();
    arena_mut(&mut s)[end + 7] ^= 0x80;
    assert_eq!(s.check(), Err(StackError::GuardCorrupted));
}

#[test]
fn guard_overwrite_ignored_when_guards_disabled() {
    let cfg = StackConfig {
        enable_guards: false,
        ..quiet()
    };
    let mut s = ProtectedStack::with_capacity(4, 16, cfg).unwrap();
    s.push(&1i32.to_ne_bytes()).unwrap();
    assert_eq!(data_offset(&s), 0);
    assert_eq!(s.arena_guards(), None);
    assert!(s.check().is_ok());
}

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

#[test]
fn live_element_flip_detected() {
    let mut s = filled(4);
    let off = data_offset(&s);
    arena_mut(&mut s)[off + 5] ^= 0x10;
    assert_eq!(s.check(), Err(StackError::ChecksumMismatch));

    let report = s.audit();
    assert_eq!(report.checksum_ok, Some(false));
    assert!(report.guards_ok());
    assert_ne!(report.stored_checksum, report.computed_checksum);
}

#[test]
fn spare_capacity_flip_detected() {
    // The digest spans the whole data region, not only live slots
    let mut s = filled(2);
    let off = data_offset(&s);
    let last = off + s.capacity_bytes() - 1;
    arena_mut(&mut s)[last] = 0x5A;
    assert_eq!(s.check(), Err(StackError::ChecksumMismatch));
}

#[test]
fn guard_failure_reported_before_checksum() {
    let mut s = filled(4);
    let off = data_offset(&s);
    arena_mut(&mut s)[off] ^= 0xFF;
    arena_mut(&mut s)[0] ^= 0xFF;
    assert_eq!(s.check(), Err(StackError::GuardCorrupted));

    let report = s.audit();
    assert_eq!(report.arena_guards_ok, Some(false));
    assert_eq!(report.checksum_ok, Some(false));
}

#[test]
fn data_flip_ignored_when_checksum_disabled() {
    let cfg = StackConfig {
        enable_checksum: false,
        ..quiet()
    };
    let mut s = ProtectedStack::with_capacity(4, 16, cfg).unwrap();
    s.push(&1i32.to_ne_bytes()).unwrap();
    let off = data_offset(&s);
    arena_mut(&mut s)[off] ^= 0xFF;
    assert!(s.check().is_ok());
}

#[test]
fn dump_flags_corruption() {
    let mut s = filled(2);
    let off = data_offset(&s);
    arena_mut(&mut s)[off] ^= 0xFF;
    arena_mut(&mut s)[off - 8] ^= 0xFF;
    let text = s.dump().to_string();
    assert!(text.contains("INCORRECT"), "{}", text);
    assert!(text.contains("CORRUPTED"), "{}", text);
}

// ---------------------------------------------------------------------------
// Helper: run a subprocess that executes a specific "scenario" and check
// that it dies with the expected report on stderr.
// ---------------------------------------------------------------------------

/// Run the current test binary with `GUARDSTACK_CRASH_SCENARIO` set to
/// `scenario_name`. The child runs `scenario_driver`, which performs the
/// scenario instead of its normal (empty) body.
fn expect_crash_subprocess(scenario_name: &str, expected: &[&str]) -> String {
    let exe = std::env::current_exe().expect("cannot determine test binary path");

    let output = std::process::Command::new(&exe)
        .env("GUARDSTACK_CRASH_SCENARIO", scenario_name)
        .arg("--exact")
        .arg("scenario_driver")
        .arg("--nocapture")
        .env("RUST_TEST_THREADS", "1")
        .output()
        .expect("failed to spawn subprocess");

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    assert!(
        !output.status.success(),
        "subprocess for scenario '{}' should have aborted, \
         but exited successfully. stderr:\n{}",
        scenario_name,
        stderr
    );

    for msg in expected {
        assert!(
            stderr.contains(msg),
            "subprocess for scenario '{}' stderr does not contain '{}'. \
             Full stderr:\n{}",
            scenario_name,
            msg,
            stderr
        );
    }
    stderr
}

// ---------------------------------------------------------------------------
// Scenario driver
// ---------------------------------------------------------------------------

#[test]
fn scenario_driver() {
    let scenario = match std::env::var("GUARDSTACK_CRASH_SCENARIO") {
        Ok(s) => s,
        Err(_) => return,
    };

    match scenario.as_str() {
        "null_read" => scenario_null_read(),
        "failing_renderer" => scenario_failing_renderer(),
        "custom_renderer" => scenario_custom_renderer(),
        "through_stack" => scenario_through_stack(),
        _ => panic!("unknown scenario: {}", scenario),
    }
}

#[inline(never)]
fn read_invalid() -> u64 {
    let bad = std::hint::black_box(0x8usize) as *const u64;
    unsafe { core::ptr::read_volatile(bad) }
}

fn scenario_null_read() {
    crash::install_with(CrashConfig::default()).unwrap();
    let v = read_invalid();
    unreachable!("read {} from an unmapped page", v);
}

struct Failing;

impl InstructionRenderer for Failing {
    fn render(&self, _address: usize, _bytes: &[u8]) -> io::Result<String> {
        Err(io::Error::other("renderer offline"))
    }
}

fn scenario_failing_renderer() {
    assert!(crash::set_instruction_renderer(Box::new(Failing)).is_ok());
    crash::install_with(CrashConfig {
        disassemble: true,
        ..CrashConfig::default()
    })
    .unwrap();
    let v = read_invalid();
    unreachable!("read {}", v);
}

struct Counting;

impl InstructionRenderer for Counting {
    fn render(&self, address: usize, bytes: &[u8]) -> io::Result<String> {
        Ok(format!("{} bytes at {:#x}", bytes.len(), address))
    }
}

fn scenario_custom_renderer() {
    assert!(crash::set_instruction_renderer(Box::new(Counting)).is_ok());
    crash::install_with(CrashConfig {
        dump_bytes: 4,
        backtrace_depth: 5,
        disassemble: true,
    })
    .unwrap();
    let v = read_invalid();
    unreachable!("read {}", v);
}

/// Constructing a stack with the default configuration installs the handler.
fn scenario_through_stack() {
    let s = ProtectedStack::with_capacity(4, 16, StackConfig::default()).unwrap();
    assert!(crash::is_installed());
    let v = read_invalid();
    unreachable!("read {} with {:?}", v, s);
}

// ---------------------------------------------------------------------------
// Crash reports
// ---------------------------------------------------------------------------

#[test]
fn segv_report_is_printed() {
    let stderr = expect_crash_subprocess(
        "null_read",
        &[
            "Caught exception! - SIGSEGV",
            "Crash happened at 0x",
            "fault address 0x8",
            "Code: <",
            "Backtrace (",
            "aborting after SIGSEGV",
        ],
    );
    assert!(stderr.contains("|-0x"), "no frames in:\n{}", stderr);
}

#[test]
fn renderer_failure_keeps_report_going() {
    expect_crash_subprocess(
        "failing_renderer",
        &[
            "SIGSEGV",
            "disassembly unavailable: renderer offline",
            "Backtrace (",
        ],
    );
}

#[test]
fn dump_and_depth_settings_apply() {
    expect_crash_subprocess(
        "custom_renderer",
        &["SIGSEGV", "4 bytes at 0x", "Backtrace ("],
    );
}

#[test]
fn stack_construction_installs_handler() {
    expect_crash_subprocess("through_stack", &["Caught exception! - SIGSEGV", "Backtrace ("]);
}
