//! Integration test: fetch the session description over HTTP.
//!
//! Starts the server on a fixed port, issues plain HTTP requests with a
//! TCP client, and verifies each response.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use livertp::media::rtp::RtpHeader;
use livertp::{H264Packetizer, SdpHandle, SdpServer, SessionDescription};

/// Fixed port for integration test. bind_addr must be explicit (no port 0).
const TEST_BIND: &str = "127.0.0.1:18080";

/// Send `method target` with `Connection: close` and read to EOF.
fn http_request(method: &str, target: &str) -> std::io::Result<String> {
    let addr = TEST_BIND.to_socket_addrs()?.next().unwrap();
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))?;
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    stream.set_write_timeout(Some(Duration::from_secs(2)))?;

    let request =
        format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response)
}

fn status(response: &str) -> u16 {
    response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response
        .split("\r\n\r\n")
        .next()?
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

#[test]
fn serves_sdp_and_rejects_everything_else() {
    let packetizer =
        H264Packetizer::with_header(RtpHeader::new(96, 0xDFDF_1000, 0), 1400, 90_000);
    let address = IpAddr::V4(Ipv4Addr::new(224, 0, 190, 128));
    let sdp = SdpHandle::new(SessionDescription::for_stream(address, 16384, &packetizer));

    let mut server = SdpServer::new(TEST_BIND, sdp.clone());
    server.start().expect("server start");
    assert!(server.is_running());

    // GET
    let resp = http_request("GET", "/stream.sdp").expect("GET response");
    assert_eq!(status(&resp), 200);
    assert_eq!(header(&resp, "content-type"), Some("application/sdp"));
    let sdp_body = body(&resp);
    assert_eq!(sdp_body, sdp.render());
    assert!(sdp_body.starts_with("v=0\r\n"));
    assert!(sdp_body.contains("c=IN IP4 224.0.190.128\r\n"));
    assert!(sdp_body.contains("m=video 16384 RTP/AVP 96\r\n"));
    assert!(sdp_body.contains("a=rtpmap:96 H264/90000\r\n"));

    // Query strings are ignored.
    let resp = http_request("GET", "/stream.sdp?t=1").expect("query response");
    assert_eq!(status(&resp), 200);

    // HEAD carries no body.
    let resp = http_request("HEAD", "/stream.sdp").expect("HEAD response");
    assert_eq!(status(&resp), 200);
    assert_eq!(body(&resp), "");

    // Updates are visible to the next request.
    sdp.update_media_attributes(vec![
        "a=rtpmap:96 H264/90000".to_string(),
        "a=fmtp:96 packetization-mode=1;profile-level-id=42001e".to_string(),
    ]);
    let resp = http_request("GET", "/stream.sdp").expect("GET after update");
    assert!(body(&resp).contains("o=fpv 0 1 IN IP4 224.0.190.128\r\n"));
    assert!(body(&resp).contains("profile-level-id=42001e"));

    // Unknown path
    let resp = http_request("GET", "/index.html").expect("404 response");
    assert_eq!(status(&resp), 404);

    // Unsupported method
    let resp = http_request("POST", "/stream.sdp").expect("405 response");
    assert_eq!(status(&resp), 405);
    let allow = header(&resp, "allow").expect("Allow header");
    assert!(allow.contains("GET"));

    server.stop();
    assert!(!server.is_running());
}
