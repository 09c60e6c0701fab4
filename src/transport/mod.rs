//! Transport module - stream sockets carrying frames.
//!
//! Frames run over plain TCP; the framing layer supplies message boundaries
//! and integrity checks.

mod tcp;

pub use tcp::{bind, configure, connect};
