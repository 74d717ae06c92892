//! Table-driven CRC-32 and CRC-64 over a byte range.
//!
//! Both use the reflected (LSB-first) table technique and are complemented at
//! the start and the end. Tables are built on first use through a `OnceLock`,
//! so concurrent first callers never observe a half-built table.

use std::sync::OnceLock;

/// Reflected CRC-32 (IEEE 802.3) polynomial.
const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

/// Reflected CRC-64/XZ (ECMA-182) polynomial.
const CRC64_POLYNOMIAL: u64 = 0xC96C_5795_D787_0F42;

static CRC32_TABLE: OnceLock<[u32; 256]> = OnceLock::new();
static CRC64_TABLE: OnceLock<[u64; 256]> = OnceLock::new();

fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        *entry = crc;
    }
    table
}

fn build_crc64_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u64;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC64_POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        *entry = crc;
    }
    table
}

pub fn crc32(data: &[u8]) -> u32 {
    let table = CRC32_TABLE.get_or_init(build_crc32_table);
    let mut crc = u32::MAX;
    for &byte in data {
        crc = (crc >> 8) ^ table[((crc ^ byte as u32) & 0xFF) as usize];
    }
    !crc
}

pub fn crc64(data: &[u8]) -> u64 {
    let table = CRC64_TABLE.get_or_init(build_crc64_table);
    let mut crc = u64::MAX;
    for &byte in data {
        crc = (crc >> 8) ^ table[((crc ^ byte as u64) & 0xFF) as usize];
    }
    !crc
}

/// Digest algorithm used for a stack's checksum field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumKind {
    Crc32,
    #[default]
    Crc64,
}

impl ChecksumKind {
    /// Digest `data`, widened to 64 bits.
    #[inline]
    pub fn digest(self, data: &[u8]) -> u64 {
        match self {
            ChecksumKind::Crc32 => crc32(data) as u64,
            ChecksumKind::Crc64 => crc64(data),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumKind::Crc32 => "crc32",
            ChecksumKind::Crc64 => "crc64",
        }
    }
}
