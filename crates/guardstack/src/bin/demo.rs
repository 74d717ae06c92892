//! Pushes and pops integers through a protected stack, printing each status.
//!
//! `--crash` installs the crash handler and dereferences an invalid address.

use clap::Parser;
use guardstack::{crash, debug_origin, CrashConfig, ProtectedStack, StackConfig, StackStatus};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "guardstack-demo", about = "Exercise a protected stack")]
struct Args {
    /// Number of integers to push and pop.
    #[arg(long, default_value_t = 1000)]
    count: i32,

    /// Initial capacity requested at construction.
    #[arg(long, default_value_t = 20)]
    initial: usize,

    /// Print the stack dump for the last N pops.
    #[arg(long, default_value_t = 8)]
    dump_last: i32,

    /// Extra pops past empty (each reports STACK_ERR_EMPTY).
    #[arg(long, default_value_t = 3)]
    extra_pops: usize,

    /// Run the crash handler on a deliberate invalid read.
    #[arg(long)]
    crash: bool,

    /// Pipe the faulting bytes through ndisasm in the crash report.
    #[arg(long)]
    disasm: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.crash {
        return crash_demo(args.disasm);
    }

    let mut s = ProtectedStack::new();
    if let Err(err) = s.construct(4, args.initial, StackConfig::from_env(), Some(debug_origin!(s))) {
        eprintln!("construct failed: {}", err);
        return ExitCode::FAILURE;
    }

    for i in 0..args.count {
        let status = StackStatus::from(s.push(&i.to_ne_bytes()));
        if !status.is_ok() {
            println!("Stack status: {}", status);
            return ExitCode::FAILURE;
        }
    }

    let mut out = [0u8; 4];
    for i in 0..args.count {
        let status = StackStatus::from(s.pop(&mut out));
        println!("Stack status: {}", status);
        if args.count - i <= args.dump_last {
            print!("{}", s.dump());
        }
    }

    for _ in 0..args.extra_pops {
        let status = StackStatus::from(s.pop(&mut out));
        println!("Stack status: {}", status);
        println!("cur: {}", i32::from_ne_bytes(out));
    }

    let status = StackStatus::from(s.check());
    println!("Final check: {}", status);
    if let Err(err) = s.destruct() {
        eprintln!("destruct failed: {}", err);
        return ExitCode::FAILURE;
    }
    if status.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn crash_demo(disasm: bool) -> ExitCode {
    if disasm {
        let _ = crash::set_instruction_renderer(Box::new(crash::NdisasmRenderer::default()));
    }
    let config = CrashConfig {
        disassemble: disasm,
        ..CrashConfig::from_env()
    };
    if let Err(err) = crash::install_with(config) {
        eprintln!("cannot install crash handler: {}", err);
        return ExitCode::FAILURE;
    }
    let bad = std::hint::black_box(0x8usize) as *const u64;
    let value = unsafe { core::ptr::read_volatile(bad) };
    println!("read {} from {:p}; the handler did not fire", value, bad);
    ExitCode::FAILURE
}
