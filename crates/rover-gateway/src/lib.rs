//! Client-facing gateway: accepts remote-control connections, translates
//! JSON control frames into autopilot commands and streams translated
//! telemetry back over the same socket.

pub mod translate;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OnceCell};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use rover_fc::mav::log_send_error;
use rover_fc::{DriveTuning, FcConfig, FcSession, RcChannels};
use rover_proto::wire::{ClientFrame, CommandName, GotoReply};

use crate::translate::translate;

fn default_listen() -> String {
    "0.0.0.0:8765".to_string()
}

fn default_poll_interval_ms() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Address the client socket listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Telemetry drain cadence per client, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub tuning: DriveTuning,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            poll_interval_ms: default_poll_interval_ms(),
            tuning: DriveTuning::default(),
        }
    }
}

/// The gateway server. Holds the lazily-opened autopilot session, which
/// outlives any individual client connection.
pub struct Gateway {
    cfg: GatewayConfig,
    fc_cfg: FcConfig,
    session: OnceCell<Arc<FcSession>>,
}

impl Gateway {
    pub fn new(cfg: GatewayConfig, fc_cfg: FcConfig) -> Self {
        Self {
            cfg,
            fc_cfg,
            session: OnceCell::new(),
        }
    }

    /// Gateway over an already-established session; the lazy connect never
    /// runs. Lets tests (and embedders with their own transport) skip the
    /// heartbeat wait entirely.
    pub fn with_session(cfg: GatewayConfig, session: Arc<FcSession>) -> Self {
        Self {
            cfg,
            fc_cfg: FcConfig::default(),
            session: OnceCell::new_with(Some(session)),
        }
    }

    /// Bind the configured address and serve forever.
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.cfg.listen)
            .await
            .with_context(|| format!("binding client socket on {}", self.cfg.listen))?;
        self.serve_on(listener).await
    }

    /// Accept loop over an already-bound listener. Clients are served one at
    /// a time; a failed session tears down that connection only.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        let listen = listener.local_addr().context("listener address")?;
        info!(%listen, "gateway listening");

        loop {
            let (stream, peer) = listener.accept().await.context("accepting client")?;
            info!(%peer, "client connected");
            match self.handle_client(stream).await {
                Ok(()) => info!(%peer, "client disconnected"),
                Err(e) => warn!(%peer, "client session ended: {e:#}"),
            }
        }
    }

    /// The autopilot session is opened on the first client and then reused;
    /// connect blocks on the first heartbeat, so it runs off the runtime.
    async fn session(&self) -> Result<Arc<FcSession>> {
        self.session
            .get_or_try_init(|| async {
                let cfg = self.fc_cfg.clone();
                tokio::task::spawn_blocking(move || FcSession::connect(&cfg))
                    .await
                    .context("autopilot connect task")?
                    .context("connecting to autopilot")
            })
            .await
            .cloned()
    }

    /// One client session: two concurrent duties over the same socket.
    /// Telemetry streaming (out) and command handling (in) race in a select;
    /// whichever duty fails or finishes first ends both.
    async fn handle_client(&self, stream: TcpStream) -> Result<()> {
        let session = self.session().await?;
        let (rd, wr) = stream.into_split();

        let telemetry = session.subscribe();
        let (reply_tx, reply_rx) = mpsc::channel(8);
        let poll = Duration::from_millis(self.cfg.poll_interval_ms.max(1));
        let mut rc = RcChannels::default();

        tokio::select! {
            r = stream_telemetry(wr, telemetry, reply_rx, &session, poll) => r,
            r = run_commands(rd, &session, &mut rc, reply_tx, &self.cfg.tuning) => r,
        }
    }
}

/// Outbound duty: on every poll tick, flush pending GOTO replies then drain
/// whatever telemetry accumulated since the last tick. A lagged receiver
/// skips the overwritten frames and keeps going; losing stale telemetry is
/// preferable to backpressure on the receive pump.
async fn stream_telemetry(
    mut wr: OwnedWriteHalf,
    mut telemetry: broadcast::Receiver<mavlink::common::MavMessage>,
    mut replies: mpsc::Receiver<String>,
    session: &FcSession,
    poll: Duration,
) -> Result<()> {
    let mut tick = tokio::time::interval(poll);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tick.tick().await;

        while let Ok(line) = replies.try_recv() {
            write_line(&mut wr, &line).await?;
        }

        loop {
            match telemetry.try_recv() {
                Ok(msg) => {
                    if let Some(frame) = translate(&msg, &session.mode_name(), session.is_armed())
                    {
                        let line =
                            serde_json::to_string(&frame).context("encoding telemetry frame")?;
                        write_line(&mut wr, &line).await?;
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("client lagged, skipped {n} telemetry frames");
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(anyhow!("telemetry channel closed"));
                }
            }
        }
    }
}

async fn write_line(wr: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    wr.write_all(line.as_bytes()).await?;
    wr.write_all(b"\n").await?;
    Ok(())
}

/// Inbound duty: read newline-delimited JSON frames until EOF. A frame that
/// fails to parse ends the session; a command the autopilot rejects does not.
async fn run_commands(
    rd: OwnedReadHalf,
    session: &FcSession,
    rc: &mut RcChannels,
    replies: mpsc::Sender<String>,
    tuning: &DriveTuning,
) -> Result<()> {
    let mut lines = BufReader::new(rd).lines();
    while let Some(line) = lines.next_line().await.context("reading client frame")? {
        if line.trim().is_empty() {
            continue;
        }
        let frame: ClientFrame =
            serde_json::from_str(&line).context("malformed client frame")?;
        match frame {
            ClientFrame::ManualControl { throttle, steer } => {
                rc.throttle = throttle;
                rc.steer = steer;
                log_send_error("rc override", session.send_override(rc.steer, rc.throttle));
            }
            ClientFrame::Command { command, value } => {
                dispatch_command(session, rc, command, value, tuning);
            }
            ClientFrame::Goto { lat, lon, speed } => {
                let reply = match session.set_guided_target(lat, lon, speed) {
                    Ok(()) => GotoReply::success(lat, lon, speed),
                    Err(e) => {
                        warn!("goto rejected: {e}");
                        GotoReply::error(e.to_string())
                    }
                };
                let line = serde_json::to_string(&reply).context("encoding goto reply")?;
                if replies.send(line).await.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Named commands update the channel state, dispatch any link-level action,
/// and always refresh the RC override so the autopilot sees the new channels
/// immediately.
fn dispatch_command(
    session: &FcSession,
    rc: &mut RcChannels,
    command: CommandName,
    value: Option<String>,
    tuning: &DriveTuning,
) {
    rc.apply(command, tuning);
    match command {
        CommandName::SetMode => match value.as_deref() {
            Some(name) => log_send_error("set mode", session.set_mode(name)),
            None => warn!("SET_MODE command without a mode name"),
        },
        CommandName::Arm => log_send_error("arm", session.arm()),
        CommandName::Disarm => log_send_error("disarm", session.disarm()),
        _ => {}
    }
    log_send_error("rc override", session.send_override(rc.steer, rc.throttle));
}
