//! Progress accounting shared by the sender and the connection handler.

/// Percent complete, floored. An empty transfer is complete by definition.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(done.min(total)) * 100) / u128::from(total);
    pct as u8
}

/// Tracks bytes moved for one transfer and reports percent changes.
///
/// Only changes are reported, so a large file produces at most 101 progress
/// events no matter how small the chunks are.
#[derive(Debug)]
pub struct Progress {
    total: u64,
    done: u64,
    last_percent: Option<u8>,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            done: 0,
            last_percent: None,
        }
    }

    /// Called before the first chunk. Returns `Some(100)` for a zero-byte
    /// transfer, which never reaches 100 any other way.
    pub fn start(&mut self) -> Option<u8> {
        if self.total == 0 {
            self.report()
        } else {
            None
        }
    }

    /// Record `n` more bytes. Returns the new percent if it moved.
    pub fn advance(&mut self, n: usize) -> Option<u8> {
        self.done = self.done.saturating_add(n as u64);
        self.report()
    }

    fn report(&mut self) -> Option<u8> {
        let pct = percent_of(self.done, self.total);
        if self.last_percent == Some(pct) {
            return None;
        }
        self.last_percent = Some(pct);
        Some(pct)
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes still expected, capped for a buffer of `buf_len`.
    pub fn next_read_len(&self, buf_len: usize) -> usize {
        let remaining = self.total.saturating_sub(self.done);
        remaining.min(buf_len as u64) as usize
    }

    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}
