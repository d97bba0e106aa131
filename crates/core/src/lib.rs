pub mod config;
pub mod demux;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod source;
pub mod timestamp;
pub mod transport;

pub use config::{StartCode, StreamConfig, TimestampMode};
pub use demux::{NalDemuxer, NalUnit};
pub use error::{LiveRtpError, Result};
pub use media::Packetizer;
pub use media::h264::H264Packetizer;
pub use pipeline::{Pipeline, PipelineStats};
pub use protocol::{SdpHandle, SessionDescription};
pub use server::SdpServer;
pub use sink::PacketSink;
pub use source::{ByteSource, ReadStatus, ReaderSource};
pub use timestamp::TimestampSynthesizer;
pub use transport::UdpSink;
