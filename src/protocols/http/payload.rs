//! Status line and random header generator for the HTTP tarpit.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::protocols::PayloadSource;

/// First bytes sent on every HTTP connection.
pub const STATUS_LINE: &[u8] = b"HTTP/1.1 200 OK\r\n";

/// Emits the status line, then one random header per tick.
#[derive(Debug)]
pub struct HttpPayload {
    rng: SmallRng,
}

impl HttpPayload {
    /// Create a generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Create a generator with a fixed seed.
    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Non-negative 63-bit value.
    fn next_int63(&mut self) -> u64 {
        self.rng.gen::<u64>() >> 1
    }

    fn header_line(&mut self) -> Bytes {
        let (name, value) = (self.next_int63(), self.next_int63());
        Bytes::from(format!("X-{name:x}: {value:x}\r\n"))
    }
}

impl Default for HttpPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadSource for HttpPayload {
    fn greets(&self) -> bool {
        true
    }

    fn next_chunk(&mut self, is_first: bool) -> Bytes {
        if is_first {
            Bytes::from_static(STATUS_LINE)
        } else {
            self.header_line()
        }
    }
}
