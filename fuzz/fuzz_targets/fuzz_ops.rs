#![no_main]

use guardstack::{ChecksumKind, ProtectedStack, StackConfig, StackError};
use libfuzzer_sys::fuzz_target;

/// Fuzz target that interprets a byte slice as a sequence of stack operations
/// and checks them against a `Vec` model.
///
/// The first byte selects the element size (1..=32) and configuration.
/// Each following operation is encoded as:
///   byte 0: opcode (0=push, 1=pop, 2=peek, 3=check)
///   byte 1: fill byte for pushed elements
fuzz_target!(|data: &[u8]| {
    let Some((&head, ops)) = data.split_first() else {
        return;
    };
    let elem_size = (head as usize & 0x1F) + 1;
    let config = StackConfig {
        enable_guards: head & 0x20 == 0,
        enable_checksum: head & 0x40 == 0,
        checksum: if head & 0x80 == 0 {
            ChecksumKind::Crc64
        } else {
            ChecksumKind::Crc32
        },
        install_crash_handler: false,
    };

    let mut stack = match ProtectedStack::with_capacity(elem_size, ops.len() % 40, config) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut model: Vec<Vec<u8>> = Vec::new();
    let mut out = vec![0u8; elem_size];

    for op in ops.chunks_exact(2) {
        match op[0] & 0x03 {
            0 => {
                let element = vec![op[1]; elem_size];
                stack.push(&element).unwrap();
                model.push(element);
            }
            1 => match model.pop() {
                Some(expected) => {
                    stack.pop(&mut out).unwrap();
                    assert_eq!(out, expected);
                }
                None => assert_eq!(stack.pop(&mut out), Err(StackError::EmptyContainer)),
            },
            2 => match model.last() {
                Some(expected) => {
                    stack.peek(&mut out).unwrap();
                    assert_eq!(&out, expected);
                }
                None => assert_eq!(stack.peek(&mut out), Err(StackError::EmptyContainer)),
            },
            _ => assert_eq!(stack.check(), Ok(())),
        }
        assert_eq!(stack.len(), model.len());
        assert!(stack.capacity() >= 16);
    }

    assert_eq!(stack.check(), Ok(()));
    stack.destruct().unwrap();
});
