//! Client lifecycle over a real TCP socket, with a recording transport
//! standing in for the autopilot link.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mavlink::common::MavMessage;
use mavlink::error::{MessageReadError, MessageWriteError};
use mavlink::MavHeader;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rover_fc::mav::MavTransport;
use rover_fc::FcSession;
use rover_gateway::{Gateway, GatewayConfig};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<MavMessage>>,
}

impl MavTransport for RecordingTransport {
    fn send(&self, _header: &MavHeader, msg: &MavMessage) -> Result<usize, MessageWriteError> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(0)
    }

    fn recv(&self) -> Result<(MavHeader, MavMessage), MessageReadError> {
        Err(std::io::Error::from(std::io::ErrorKind::WouldBlock).into())
    }
}

async fn start_gateway() -> (Arc<RecordingTransport>, std::net::SocketAddr) {
    let transport = Arc::new(RecordingTransport::default());
    let session = FcSession::with_transport(transport.clone(), 255, 190);
    let gateway = Arc::new(Gateway::with_session(GatewayConfig::default(), session));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        let _ = gateway.serve_on(listener).await;
    });
    (transport, addr)
}

async fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.expect("write line");
    stream.write_all(b"\n").await.expect("write newline");
}

/// Wait for the next override to land on the transport and return it.
async fn await_override(transport: &RecordingTransport) -> mavlink::common::RC_CHANNELS_OVERRIDE_DATA {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let sent = transport.sent.lock().unwrap();
            if let Some(MavMessage::RC_CHANNELS_OVERRIDE(d)) = sent.last() {
                return d.clone();
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no override reached the transport"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn malformed_frame_ends_only_that_client() {
    let (transport, addr) = start_gateway().await;

    // First client: a line that is not JSON closes this client's socket.
    let mut first = TcpStream::connect(addr).await.expect("connect first client");
    send_line(&mut first, "this is not json").await;
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), first.read_to_end(&mut rest))
        .await
        .expect("server did not close the bad client")
        .expect("read after bad frame");

    // Second client is served by the retained session: its command lands on
    // the very same transport, with no reconnect in between.
    let mut second = TcpStream::connect(addr).await.expect("connect second client");
    send_line(&mut second, r#"{"type":"COMMAND","command":"FORWARD"}"#).await;

    let over = await_override(&transport).await;
    assert_eq!(over.chan3_raw, 2000);
    assert_eq!(over.chan1_raw, 1500);
}

#[tokio::test]
async fn channel_state_resets_between_clients() {
    let (transport, addr) = start_gateway().await;

    let mut first = TcpStream::connect(addr).await.expect("connect first client");
    send_line(&mut first, r#"{"type":"MANUAL_CONTROL","throttle":1900,"steer":1300}"#).await;
    let over = await_override(&transport).await;
    assert_eq!((over.chan1_raw, over.chan3_raw), (1300, 1900));
    drop(first);

    // A fresh client starts from neutral; LEFT moves steer only.
    let mut second = TcpStream::connect(addr).await.expect("connect second client");
    send_line(&mut second, r#"{"type":"COMMAND","command":"LEFT"}"#).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let sent = transport.sent.lock().unwrap();
            if let Some(MavMessage::RC_CHANNELS_OVERRIDE(d)) = sent.last() {
                if d.chan1_raw == 1450 {
                    assert_eq!(d.chan3_raw, 1500);
                    break;
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "second client's override never arrived"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
