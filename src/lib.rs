//! # streamweave-packet
//!
//! In-process packet substrate for StreamWeave node graphs.
//!
//! ## Architecture
//!
//! - `pipe`: non-blocking fan-out transport. A [ReadPipe] buffers
//!   internally so writers never wait; a [WritePipe] broadcasts to every
//!   linked read-side.
//! - `port`: [InPort]/[OutPort] hand each [Process] a private
//!   [Reader]/[Writer] pair over the shared topology. Readers answer what
//!   they read and the answer travels back to the writer as an [Ack].
//! - `read_group`: [ReadGroup] joins one value per participant into ordered rows.
//! - `tracer`: [Tracer] records packet lineage and forwards downstream
//!   answers to the upstream writer responsible for them.
//! - `dependency_graph`: [DependencyGraph] tracks stem/leaf dependencies
//!   and signals when an identity or the whole graph has drained.
//! - `nodes`: [OneToOneNode] and [ManyToOneNode] drive user actions over
//!   ports with every read and write traced.

pub mod config;
pub mod dependency_graph;
#[cfg(test)]
mod dependency_graph_test;
pub mod error;
pub mod nodes;
pub mod pipe;
pub mod port;
pub mod process;
pub mod read_group;
#[cfg(test)]
mod read_group_test;
pub mod signal;
pub mod tracer;
pub mod types;

pub use config::Config;
pub use dependency_graph::DependencyGraph;
pub use error::ConfigError;
pub use nodes::{Action, ManyToOneNode, Merge, OneToOneNode};
pub use pipe::{PipeReceiver, ReadPipe, WritePipe};
pub use port::{Ack, InPort, OutPort, Reader, Writer};
pub use process::Process;
pub use read_group::ReadGroup;
pub use signal::Signal;
pub use tracer::{Merger, Tracer};
pub use types::{Packet, PacketId, ProcessId};
