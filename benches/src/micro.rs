/// Microbenchmarks for guardstack.
///
/// Measures push/pop latency under each protection setting so the cost of
/// guard words and the per-mutation checksum can be compared directly.
use guardstack::{ChecksumKind, ProtectedStack, StackConfig};
use std::hint::black_box;
use std::time::Instant;

fn configs() -> [(&'static str, StackConfig); 4] {
    let base = StackConfig {
        install_crash_handler: false,
        ..StackConfig::default()
    };
    [
        ("unprotected", StackConfig::unprotected()),
        (
            "guards",
            StackConfig {
                enable_checksum: false,
                ..base
            },
        ),
        (
            "guards+crc32",
            StackConfig {
                checksum: ChecksumKind::Crc32,
                ..base
            },
        ),
        ("guards+crc64", base),
    ]
}

/// Push then pop `depth` i32 values, `iterations` times. Returns ns/op.
fn bench_push_pop(config: StackConfig, depth: usize, iterations: usize) -> f64 {
    let mut stack = ProtectedStack::with_capacity(4, 16, config).unwrap();
    let mut out = [0u8; 4];

    let start = Instant::now();
    for _ in 0..iterations {
        for i in 0..depth as i32 {
            stack.push(black_box(&i.to_ne_bytes())).unwrap();
        }
        for _ in 0..depth {
            stack.pop(black_box(&mut out)).unwrap();
        }
    }
    let elapsed = start.elapsed();
    elapsed.as_nanos() as f64 / (iterations * depth * 2) as f64
}

/// Cost of a full `check` on a stack holding `depth` elements. Returns ns/op.
fn bench_check(config: StackConfig, depth: usize, iterations: usize) -> f64 {
    let mut stack = ProtectedStack::with_capacity(4, depth, config).unwrap();
    for i in 0..depth as i32 {
        stack.push(&i.to_ne_bytes()).unwrap();
    }
    let start = Instant::now();
    for _ in 0..iterations {
        black_box(stack.check()).unwrap();
    }
    start.elapsed().as_nanos() as f64 / iterations as f64
}

fn main() {
    let iterations = 200;

    println!("=== guardstack microbenchmarks ===\n");

    println!("--- push/pop latency (ns/op) ---");
    for (name, config) in configs() {
        for &depth in &[16usize, 256, 4096] {
            let ns = bench_push_pop(config, depth, iterations);
            println!("  {:>14} depth={:>5}: {:>10.1} ns", name, depth, ns);
        }
    }

    println!("\n--- check latency (ns/op) ---");
    for (name, config) in configs() {
        for &depth in &[16usize, 4096] {
            let ns = bench_check(config, depth, iterations * 10);
            println!("  {:>14} depth={:>5}: {:>10.1} ns", name, depth, ns);
        }
    }

    println!("\nDone.");
}
