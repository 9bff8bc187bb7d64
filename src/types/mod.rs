//! Core value types shared by pipes, ports and the tracer.

mod ids;
mod packet;
#[cfg(test)]
mod packet_test;

pub use ids::{PacketId, PipeId, PortId, ProcessId, ReaderId, WriterId};
pub use packet::Packet;
