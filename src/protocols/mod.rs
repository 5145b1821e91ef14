//! Payload generators for the tarpit.
//!
//! Each protocol decides what bytes a trapped client sees. The session engine
//! only knows the `PayloadSource` trait.
//!
//! ## Protocols
//! - `ssh`: an endless pre-banner line, repeated every tick
//! - `http`: a status line, then one random header per tick

pub mod http;
pub mod ssh;

use bytes::Bytes;

use crate::config::ProtocolType;

/// Produces the chunks a session writes, one per tick.
///
/// Implementations never block and never return an empty chunk. A source is
/// owned by a single session, so it may keep per-connection state such as an
/// RNG.
pub trait PayloadSource: Send {
    /// Whether the first chunk is written right after accept instead of
    /// after the first pacing interval.
    fn greets(&self) -> bool;

    /// Next chunk to write. `is_first` is true only for the very first chunk
    /// of the connection.
    fn next_chunk(&mut self, is_first: bool) -> Bytes;
}

/// Build a fresh payload source for one connection.
pub fn payload_for(protocol: ProtocolType) -> Box<dyn PayloadSource> {
    match protocol {
        ProtocolType::Ssh => Box::new(ssh::SshPayload::new()),
        ProtocolType::Http => Box::new(http::HttpPayload::new()),
    }
}
