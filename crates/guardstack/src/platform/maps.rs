//! Parser for the `/proc/<pid>/maps` region listing.

use std::cell::Cell;
use std::io;

thread_local! {
    /// Listings read by this thread.
    static SNAPSHOTS: Cell<u64> = const { Cell::new(0) };
}

/// One mapped region: `start-end perms offset dev inode [path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRegion {
    pub start: usize,
    pub end: usize,
    pub perms: String,
    pub offset: u64,
    pub path: Option<String>,
}

impl MapRegion {
    /// Half-open containment: `end` belongs to the next region.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }

    /// True if every character of `required` appears in the permission field.
    pub fn has_perms(&self, required: &str) -> bool {
        required.chars().all(|c| self.perms.contains(c))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    pub regions: Vec<MapRegion>,
}

impl MemoryMap {
    /// Snapshot of the calling process's own mappings.
    pub fn current() -> io::Result<Self> {
        SNAPSHOTS.with(|n| n.set(n.get() + 1));
        let content = super::sys::read_self_maps()?;
        Ok(Self::parse(&content))
    }

    /// Number of [`current`](Self::current) calls made on this thread.
    pub fn snapshots_taken() -> u64 {
        SNAPSHOTS.with(Cell::get)
    }

    /// Parse listing text. Malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        MemoryMap {
            regions: content.lines().filter_map(parse_line).collect(),
        }
    }

    pub fn find(&self, addr: usize) -> Option<&MapRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }
}

fn parse_line(line: &str) -> Option<MapRegion> {
    let mut parts = line.split_whitespace();
    let range = parts.next()?;
    let perms = parts.next()?.to_string();
    let offset = u64::from_str_radix(parts.next()?, 16).ok()?;
    let _dev = parts.next();
    let _inode = parts.next();
    let path = {
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }
    };

    let (start, end) = range.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    if end < start {
        return None;
    }

    Some(MapRegion {
        start,
        end,
        perms,
        offset,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
55d0c0a00000-55d0c0a21000 r--p 00000000 08:01 1312 /usr/bin/cat
55d0c0a21000-55d0c0a40000 r-xp 00021000 08:01 1312 /usr/bin/cat
7ffc1c5e0000-7ffc1c601000 rw-p 00000000 00:00 0                          [stack]
7ffc1c6f0000-7ffc1c6f4000 r--p 00000000 00:00 0                          [vvar]
garbage line
ffffffffff600000-ffffffffff601000 --xp 00000000 00:00 0                  [vsyscall]
";

    #[test]
    fn parses_regions_and_skips_garbage() {
        let map = MemoryMap::parse(SAMPLE);
        assert_eq!(map.regions.len(), 5);
        let text = &map.regions[1];
        assert_eq!(text.start, 0x55d0_c0a2_1000);
        assert_eq!(text.end, 0x55d0_c0a4_0000);
        assert_eq!(text.perms, "r-xp");
        assert_eq!(text.offset, 0x21000);
        assert_eq!(text.path.as_deref(), Some("/usr/bin/cat"));
    }

    #[test]
    fn anonymous_region_has_no_path() {
        let map = MemoryMap::parse("7f0000000000-7f0000001000 rw-p 00000000 00:00 0\n");
        assert_eq!(map.regions[0].path, None);
    }

    #[test]
    fn containment_is_half_open() {
        let map = MemoryMap::parse(SAMPLE);
        let stack = map.find(0x7ffc_1c5e_0000).unwrap();
        assert_eq!(stack.path.as_deref(), Some("[stack]"));
        assert!(map.find(0x7ffc_1c60_1000).is_none());
        assert!(map.find(0x7ffc_1c60_0fff).is_some());
    }

    #[test]
    fn permission_matching() {
        let map = MemoryMap::parse(SAMPLE);
        let stack = map.find(0x7ffc_1c5e_0010).unwrap();
        assert!(stack.has_perms("r"));
        assert!(stack.has_perms("rw"));
        assert!(!stack.has_perms("x"));
        assert!(stack.has_perms(""));
        let vsyscall = map.find(0xffff_ffff_ff60_0000).unwrap();
        assert!(!vsyscall.has_perms("r"));
    }
}
