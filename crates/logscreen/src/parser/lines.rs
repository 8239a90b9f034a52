//! Lines — split a chunked byte stream into bounded, lossily decoded lines.

use memchr::memchr;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Line content without `\n` / `\r\n`.
    pub text: String,
    /// Input bytes this line accounts for, terminator included.
    pub consumed: u64,
    /// The line was cut at `max_line_bytes` and continues in the next piece.
    pub cut: bool,
}

/// Incremental line splitter.
///
/// Holds at most one partial line between chunks. A partial line that grows
/// past `max_line_bytes` is emitted in pieces of at most `max_line_bytes`,
/// cut on a UTF-8 boundary where possible.
#[derive(Debug)]
pub struct LineSplitter {
    carry: Vec<u8>,
    max_line_bytes: usize,
    at_start: bool,
    /// Skipped bytes not yet attributed to a line (the BOM).
    pending: u64,
}

impl LineSplitter {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            carry: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            at_start: true,
            pending: 0,
        }
    }

    /// Append a chunk, pushing every completed line onto `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<RawLine>) {
        let mut scan_from = self.carry.len();
        self.carry.extend_from_slice(chunk);

        if self.at_start {
            if self.carry.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&self.carry) {
                return;
            }
            if self.carry.starts_with(UTF8_BOM) {
                self.carry.drain(..UTF8_BOM.len());
                self.pending += UTF8_BOM.len() as u64;
            }
            self.at_start = false;
            scan_from = 0;
        }

        let mut line_start = 0;
        while let Some(pos) = memchr(b'\n', &self.carry[scan_from..]) {
            let end = scan_from + pos;
            let consumed = (end - line_start + 1) as u64 + std::mem::take(&mut self.pending);
            out.push(decode(&self.carry[line_start..end], consumed, false));
            line_start = end + 1;
            scan_from = line_start;
        }
        self.carry.drain(..line_start);

        while self.carry.len() > self.max_line_bytes {
            let cut = cut_point(&self.carry, self.max_line_bytes);
            let consumed = cut as u64 + std::mem::take(&mut self.pending);
            let piece: Vec<u8> = self.carry.drain(..cut).collect();
            out.push(decode(&piece, consumed, true));
        }
    }

    /// Flush the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<RawLine> {
        if self.carry.is_empty() {
            return None;
        }
        let consumed = self.carry.len() as u64 + std::mem::take(&mut self.pending);
        let line = decode(&self.carry, consumed, false);
        self.carry.clear();
        Some(line)
    }

    /// Bytes currently held for an incomplete line.
    pub fn buffered(&self) -> usize {
        self.carry.len()
    }
}

/// Largest cut `<= max` that does not split a UTF-8 sequence. Falls back to
/// `max` for input that is not UTF-8. `bytes.len()` must exceed `max`.
fn cut_point(bytes: &[u8], max: usize) -> usize {
    let is_continuation = |b: u8| b & 0xC0 == 0x80;
    let floor = max.saturating_sub(3).max(1);
    let mut cut = max;
    while cut > floor && is_continuation(bytes[cut]) {
        cut -= 1;
    }
    if is_continuation(bytes[cut]) {
        max
    } else {
        cut
    }
}

fn decode(bytes: &[u8], consumed: u64, cut: bool) -> RawLine {
    let bytes = if cut {
        bytes
    } else {
        bytes.strip_suffix(b"\r").unwrap_or(bytes)
    };
    RawLine {
        text: String::from_utf8_lossy(bytes).into_owned(),
        consumed,
        cut,
    }
}
