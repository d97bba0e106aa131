use std::fs::File;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use livertp::protocol::SDP_PATH;
use livertp::transport::udp::DEFAULT_MULTICAST_TTL;
use livertp::{
    H264Packetizer, Packetizer, Pipeline, ReaderSource, SdpHandle, SdpServer, SessionDescription,
    StartCode, StreamConfig, TimestampMode, UdpSink,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// clock-rate / frame-rate samples per access unit delimiter
    Ratio,
    /// monotonic time elapsed between NAL units
    Elapsed,
}

impl From<Mode> for TimestampMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Ratio => TimestampMode::Ratio,
            Mode::Elapsed => TimestampMode::Elapsed,
        }
    }
}

/// Stream raw H.264 from a capture device over RTP, with the session
/// description served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "livertp", version, about)]
struct Args {
    /// Annex-B byte source: device node, FIFO or file; `-` reads stdin.
    #[arg(long, short, default_value = "-")]
    input: String,

    /// Port for the HTTP endpoint serving /stream.sdp.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// RTP destination address (unicast or multicast).
    #[arg(long, default_value = "224.0.190.128")]
    rtp_ip: IpAddr,

    /// RTP destination port.
    #[arg(long, default_value_t = 16384)]
    rtp_port: u16,

    /// Maximum serialized RTP packet size, header included.
    #[arg(long, default_value_t = 1400)]
    rtp_mtu: usize,

    /// RTP payload type.
    #[arg(long, default_value_t = 96)]
    rtp_type: u8,

    /// RTP clock rate in Hz.
    #[arg(long, default_value_t = 90_000)]
    rtp_clockrate: u32,

    /// Nominal frame rate of the source.
    #[arg(long, default_value_t = 60)]
    rtp_framerate: u32,

    /// RTP synchronization source identifier (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0xDFDF1000", value_parser = parse_u32)]
    ssrc: u32,

    #[arg(long, value_enum, default_value_t = Mode::Ratio)]
    timestamp_mode: Mode,

    /// Start-code length the demuxer scans for (3 or 4).
    #[arg(long, default_value_t = 3)]
    start_code: usize,

    /// Keep the byte before each start code instead of dropping it.
    #[arg(long, default_value_t = false)]
    keep_boundary_byte: bool,

    /// Bytes requested per source read.
    #[arg(long, default_value_t = 2048)]
    buffer_size: usize,

    /// Upper bound on the delay between retries after a read error, in ms.
    #[arg(long, default_value_t = 250)]
    max_backoff_ms: u64,

    /// TTL for multicast destinations.
    #[arg(long, default_value_t = DEFAULT_MULTICAST_TTL)]
    multicast_ttl: u32,
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid 32-bit value {value:?}: {e}"))
}

impl Args {
    fn stream_config(&self) -> Result<StreamConfig> {
        let config = StreamConfig {
            clock_rate: self.rtp_clockrate,
            frame_rate: self.rtp_framerate,
            mtu: self.rtp_mtu,
            payload_type: self.rtp_type,
            start_code: StartCode::from_len(self.start_code)?,
            trim_boundary_byte: !self.keep_boundary_byte,
            read_buffer_size: self.buffer_size,
            timestamp_mode: self.timestamp_mode.into(),
            ssrc: self.ssrc,
            read_retry_max_backoff: Duration::from_millis(self.max_backoff_ms),
        };
        config.validate()?;
        Ok(config)
    }

    fn open_input(&self) -> Result<ReaderSource<Box<dyn Read + Send>>> {
        let reader: Box<dyn Read + Send> = if self.input == "-" {
            Box::new(io::stdin())
        } else {
            let file = File::open(&self.input)
                .with_context(|| format!("failed to open input {}", self.input))?;
            Box::new(file)
        };
        Ok(ReaderSource::new(reader))
    }
}

/// Loopback and link-local addresses are unreachable for other hosts.
fn is_advertised(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(v6) => {
            !v6.is_loopback() && !v6.is_unicast_link_local() && !v6.is_unspecified()
        }
    }
}

fn discovery_urls(addrs: impl IntoIterator<Item = IpAddr>, http_port: u16) -> Vec<String> {
    addrs
        .into_iter()
        .filter(is_advertised)
        .map(|ip| format!("http://{}{}", SocketAddr::new(ip, http_port), SDP_PATH))
        .collect()
}

fn log_discovery_urls(http_port: u16) {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "could not list network interfaces");
            return;
        }
    };
    let urls = discovery_urls(interfaces.into_iter().map(|(_, ip)| ip), http_port);
    if urls.is_empty() {
        warn!("no routable local address to advertise");
    }
    for url in urls {
        info!("session description at {url}");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.stream_config().context("invalid stream configuration")?;

    let destination = SocketAddr::new(args.rtp_ip, args.rtp_port);
    let sink = UdpSink::connect_with_ttl(destination, args.multicast_ttl)
        .with_context(|| format!("failed to open RTP socket to {destination}"))?;

    let packetizer = H264Packetizer::from_config(&config);
    let sdp = SdpHandle::new(SessionDescription::for_stream(
        args.rtp_ip,
        args.rtp_port,
        &packetizer,
    ));

    let mut server = SdpServer::new(&format!("0.0.0.0:{}", args.http_port), sdp.clone());
    server
        .start()
        .with_context(|| format!("failed to start HTTP server on port {}", args.http_port))?;
    log_discovery_urls(args.http_port);

    let source = args.open_input()?;
    info!(
        input = %args.input,
        %destination,
        ssrc = format_args!("{:#010X}", config.ssrc),
        seq = packetizer.next_sequence(),
        "streaming"
    );

    let mut pipeline = Pipeline::with_packetizer(&config, source, sink, Box::new(packetizer))?
        .with_sdp(sdp);

    let worker = thread::Builder::new()
        .name("rtp-pipeline".to_string())
        .spawn(move || pipeline.run())
        .context("failed to spawn pipeline thread")?;

    let result = worker.join();
    server.stop();

    match result {
        Ok(stats) => {
            info!(
                chunks = stats.chunks_read,
                bytes = stats.bytes_read,
                nals = stats.nals,
                frames = stats.frames,
                packets = stats.packets_written,
                dropped = stats.packets_dropped,
                read_errors = stats.read_errors,
                "input exhausted"
            );
            Ok(())
        }
        Err(_) => anyhow::bail!("pipeline thread panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::parse_from(["livertp"]);
        let config = args.stream_config().unwrap();

        assert_eq!(args.input, "-");
        assert_eq!(args.http_port, 8080);
        assert_eq!(args.rtp_ip.to_string(), "224.0.190.128");
        assert_eq!(args.rtp_port, 16384);
        assert_eq!(config.mtu, 1400);
        assert_eq!(config.payload_type, 96);
        assert_eq!(config.clock_rate, 90_000);
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.ssrc, 0xDFDF_1000);
        assert_eq!(config.start_code, StartCode::Short);
        assert_eq!(config.timestamp_mode, TimestampMode::Ratio);
        assert_eq!(config.read_buffer_size, 2048);
        assert!(config.trim_boundary_byte);
    }

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from([
            "livertp",
            "--input",
            "/dev/video0",
            "--start-code",
            "4",
            "--timestamp-mode",
            "elapsed",
            "--ssrc",
            "1234",
            "--keep-boundary-byte",
        ]);
        let config = args.stream_config().unwrap();

        assert_eq!(config.start_code, StartCode::Long);
        assert_eq!(config.timestamp_mode, TimestampMode::Elapsed);
        assert_eq!(config.ssrc, 1234);
        assert!(!config.trim_boundary_byte);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Args::parse_from(["livertp", "--start-code", "5"]).stream_config().is_err());
        assert!(Args::parse_from(["livertp", "--rtp-type", "200"]).stream_config().is_err());
        assert!(Args::try_parse_from(["livertp", "--ssrc", "0xZZ"]).is_err());
    }

    #[test]
    fn parses_hex_ssrc() {
        assert_eq!(parse_u32("0xDFDF1000"), Ok(0xDFDF_1000));
        assert_eq!(parse_u32("42"), Ok(42));
        assert!(parse_u32("0x1_0000_0000").is_err());
    }

    #[test]
    fn discovery_skips_loopback_and_link_local() {
        let addrs: Vec<IpAddr> = [
            "127.0.0.1",
            "169.254.10.20",
            "192.168.1.20",
            "::1",
            "fe80::1",
            "febf::1",
            "2001:db8::5",
            "10.0.0.7",
        ]
        .iter()
        .map(|a| a.parse().unwrap())
        .collect();

        assert_eq!(
            discovery_urls(addrs, 8080),
            vec![
                "http://192.168.1.20:8080/stream.sdp",
                "http://[2001:db8::5]:8080/stream.sdp",
                "http://10.0.0.7:8080/stream.sdp",
            ]
        );
    }
}
