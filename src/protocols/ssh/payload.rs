//! Fixed pre-banner line for the SSH tarpit.

use bytes::Bytes;

use crate::protocols::PayloadSource;

const TOKEN: &str = "HelloWorld";
const TOKEN_REPEAT: usize = 25;

/// Emits the same pre-banner line on every tick.
#[derive(Debug, Clone)]
pub struct SshPayload {
    line: Bytes,
}

impl SshPayload {
    pub fn new() -> Self {
        let mut line = TOKEN.repeat(TOKEN_REPEAT);
        line.push_str("\r\n");
        Self {
            line: Bytes::from(line),
        }
    }
}

impl Default for SshPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadSource for SshPayload {
    fn greets(&self) -> bool {
        false
    }

    fn next_chunk(&mut self, _is_first: bool) -> Bytes {
        // Cloning `Bytes` bumps a refcount, the line itself is shared.
        self.line.clone()
    }
}
