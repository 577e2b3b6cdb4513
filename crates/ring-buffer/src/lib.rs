//! Circular Byte Buffer
//!
//! Stages raw serial bytes between arrival and consumption. Writes of any
//! size are accepted up to the free space; reads hand back the oldest bytes
//! first. The buffer never grows on its own: it is resized only on request.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
