//! HTTP tarpit payload.
//!
//! The server answers immediately with a success status line and then never
//! finishes the header block. Every interval another random header is added,
//! so a client waiting for the blank line that ends the headers waits forever.
//!
//! ## Protocol Format
//!
//! ```text
//! Server (on accept):         HTTP/1.1 200 OK\r\n
//! Server (after 1 interval):  X-3f2a9c0d1e7b4455: 6a1b2c3d4e5f6071\r\n
//! Server (after 2 intervals): X-1c0ffee15bad5eed: 2badc0de0ddba11\r\n
//! ...
//! ```
//!
//! Header names and values are lowercase hex of two fresh 63-bit random
//! numbers per line, without padding.

pub mod payload;

pub use payload::{HttpPayload, STATUS_LINE};
