//! Buffered fan-out transport underlying ports.
//!
//! A [WritePipe] broadcasts to any number of linked [ReadPipe]s. Each
//! read-side delivers values in write order through [PipeReceiver] and never
//! makes a writer wait: a slow consumer only grows that read-side's buffer.
//!
//! - Values written before a read-side is linked are never replayed to it.
//! - Values written after unlink (or after the read-side closes) are dropped.
//! - Closing a read-side unlinks it from every write-side automatically.

mod read_pipe;
mod write_pipe;
#[cfg(test)]
mod write_pipe_test;

pub use read_pipe::{PipeReceiver, ReadPipe};
pub use write_pipe::WritePipe;
