//! Delimiter scanning over raw byte buffers.

use memchr::memmem;

use crate::config::Delimiter;

/// Line boundaries found in one buffer.
///
/// `offsets` always starts with `0` and holds one further entry per
/// delimiter: the byte offset immediately after it. `offsets.len()` is
/// therefore `count + 1`, and `offsets[count]` marks the end of the last
/// terminated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    pub count: usize,
    pub offsets: Vec<usize>,
}

impl LineIndex {
    /// Byte length of the delimiter-terminated prefix of the buffer.
    pub fn terminated_len(&self) -> usize {
        self.offsets[self.count]
    }
}

/// Scans `buf` once and records the offset following every delimiter.
///
/// Any input is valid; a buffer without delimiters yields `count = 0`
/// and `offsets = [0]`. Multi-byte delimiters match left to right without
/// overlap.
pub fn scan(buf: &[u8], delimiter: &Delimiter) -> LineIndex {
    let needle = delimiter.as_bytes();
    let mut offsets = vec![0];

    match needle {
        [] => {}
        [byte] => offsets.extend(memchr::memchr_iter(*byte, buf).map(|pos| pos + 1)),
        _ => {
            let finder = memmem::Finder::new(needle);
            let mut start = 0;
            while let Some(pos) = finder.find(&buf[start..]) {
                start += pos + needle.len();
                offsets.push(start);
            }
        }
    }

    LineIndex {
        count: offsets.len() - 1,
        offsets,
    }
}
