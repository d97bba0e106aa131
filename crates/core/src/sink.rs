//! Packet sinks consuming the pipeline's output.

use crate::error::Result;

/// Writes one serialized RTP packet at a time.
///
/// Each call is atomic: the packet is either handed to the transport whole
/// or the call fails and the packet is dropped by the caller.
pub trait PacketSink: Send {
    fn write_packet(&mut self, packet: &[u8]) -> Result<()>;
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        (**self).write_packet(packet)
    }
}
