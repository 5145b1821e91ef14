//! SSH tarpit payload.
//!
//! A real SSH server opens with a single version line such as
//! `SSH-2.0-OpenSSH_9.6\r\n`, and RFC 4253 allows it to send other lines
//! first. Clients keep reading until they see the `SSH-` prefix, so a server
//! that never sends one keeps them waiting for as long as it keeps talking.
//!
//! ## Protocol Format
//!
//! ```text
//! Server (after 1 interval):  HelloWorldHelloWorld...HelloWorld\r\n
//! Server (after 2 intervals): HelloWorldHelloWorld...HelloWorld\r\n
//! ...
//! ```
//!
//! There is no greeting: the first line goes out after the first pacing
//! interval, like every line after it.

pub mod payload;

pub use payload::SshPayload;
