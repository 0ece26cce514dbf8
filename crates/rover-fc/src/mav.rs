use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use mavlink::common::{
    MavCmd, MavFrame, MavMessage, MavModeFlag, MavType, PositionTargetTypemask,
    COMMAND_LONG_DATA, HEARTBEAT_DATA, RC_CHANNELS_OVERRIDE_DATA, SET_MODE_DATA,
    SET_POSITION_TARGET_GLOBAL_INT_DATA,
};
use mavlink::error::{MessageReadError, MessageWriteError};
use mavlink::{MavConnection, MavHeader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::modes;
use crate::FcConfig;

/// Position-only type mask for SET_POSITION_TARGET_GLOBAL_INT: velocity,
/// acceleration and yaw fields are all ignored.
const POSITION_ONLY_TYPE_MASK: u16 = 0x0DF8;

/// Capacity of the telemetry fan-out. Slow consumers lag and skip rather
/// than slow the receive pump down.
const TELEMETRY_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no heartbeat from autopilot within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("unknown mode {name:?} (available: {available})")]
    UnknownMode { name: String, available: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Send/receive surface of a MAVLink connection. The production impl wraps
/// whatever `mavlink::connect` returns; tests substitute a recorder.
pub trait MavTransport: Send + Sync {
    fn send(&self, header: &MavHeader, msg: &MavMessage) -> Result<usize, MessageWriteError>;
    fn recv(&self) -> Result<(MavHeader, MavMessage), MessageReadError>;
}

struct ConnTransport {
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
}

impl MavTransport for ConnTransport {
    fn send(&self, header: &MavHeader, msg: &MavMessage) -> Result<usize, MessageWriteError> {
        self.conn.send(header, msg)
    }

    fn recv(&self) -> Result<(MavHeader, MavMessage), MessageReadError> {
        self.conn.recv()
    }
}

#[derive(Debug)]
struct LinkShared {
    seq: u8,
    target_system: u8,
    target_component: u8,
    vehicle_type: MavType,
    custom_mode: u32,
    armed: bool,
    have_heartbeat: bool,
}

impl Default for LinkShared {
    fn default() -> Self {
        Self {
            seq: 0,
            target_system: 1,
            target_component: 0,
            vehicle_type: MavType::MAV_TYPE_GROUND_ROVER,
            custom_mode: 0,
            armed: false,
            have_heartbeat: false,
        }
    }
}

/// The one live autopilot session. Created lazily on first use, shared by
/// every client the gateway serves, destroyed only at process exit.
pub struct FcSession {
    transport: Arc<dyn MavTransport>,
    sys_id: u8,
    comp_id: u8,
    shared: Mutex<LinkShared>,
    telemetry: broadcast::Sender<MavMessage>,
}

impl FcSession {
    fn new(transport: Arc<dyn MavTransport>, sys_id: u8, comp_id: u8) -> Self {
        let (telemetry, _) = broadcast::channel(TELEMETRY_CHANNEL_CAPACITY);
        Self {
            transport,
            sys_id,
            comp_id,
            shared: Mutex::new(LinkShared::default()),
            telemetry,
        }
    }

    /// Build a session over an already-open transport. No receive pump is
    /// spawned, so telemetry only flows if the caller drives one; the command
    /// surface works as usual. This is the seam gateway tests hang off.
    pub fn with_transport(transport: Arc<dyn MavTransport>, sys_id: u8, comp_id: u8) -> Arc<Self> {
        Arc::new(Self::new(transport, sys_id, comp_id))
    }

    /// Open the autopilot link and block the caller until the first heartbeat
    /// arrives. Spawns the receive pump; the pump and the session live for
    /// the rest of the process.
    pub fn connect(cfg: &FcConfig) -> Result<Arc<Self>, LinkError> {
        let timeout = Duration::from_secs(cfg.heartbeat_timeout_s);
        info!(endpoint = %cfg.endpoint, "waiting for autopilot heartbeat");

        let conn = mavlink::connect::<MavMessage>(&cfg.endpoint)?;
        let session = Arc::new(Self::new(
            Arc::new(ConnTransport { conn }),
            cfg.sys_id,
            cfg.comp_id,
        ));

        let (hb_tx, hb_rx) = mpsc::channel();
        {
            let session = session.clone();
            std::thread::Builder::new()
                .name("fc-pump".into())
                .spawn(move || session.pump(hb_tx))?;
        }

        match hb_rx.recv_timeout(timeout) {
            Ok(header) => {
                info!(
                    system = header.system_id,
                    component = header.component_id,
                    "autopilot heartbeat received"
                );
                Ok(session)
            }
            Err(_) => Err(LinkError::ConnectionTimeout(timeout)),
        }
    }

    /// Receive pump: runs on its own thread for the life of the process,
    /// updating session state from heartbeats and fanning everything out to
    /// telemetry subscribers. Receive errors are transient by definition.
    fn pump(&self, hb_tx: mpsc::Sender<MavHeader>) {
        let mut announced = false;
        loop {
            match self.transport.recv() {
                Ok((header, msg)) => {
                    if let MavMessage::HEARTBEAT(hb) = &msg {
                        self.note_heartbeat(&header, hb);
                        if !announced {
                            let _ = hb_tx.send(header);
                            announced = true;
                        }
                    }
                    // No subscribers is fine; frames just drop.
                    let _ = self.telemetry.send(msg);
                }
                Err(e) => {
                    debug!("mavlink recv failed: {e}");
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    fn note_heartbeat(&self, header: &MavHeader, hb: &HEARTBEAT_DATA) {
        let mut shared = self.shared.lock().unwrap();
        if !shared.have_heartbeat {
            shared.target_system = header.system_id;
            shared.target_component = header.component_id;
            shared.have_heartbeat = true;
        }
        if header.system_id == shared.target_system {
            shared.vehicle_type = hb.mavtype;
            shared.custom_mode = hb.custom_mode;
            shared.armed = hb
                .base_mode
                .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
        }
    }

    /// Subscribe to the raw telemetry fan-out.
    pub fn subscribe(&self) -> broadcast::Receiver<MavMessage> {
        self.telemetry.subscribe()
    }

    /// Name of the mode the autopilot last reported, resolved against the
    /// table for its reported vehicle type.
    pub fn mode_name(&self) -> String {
        let shared = self.shared.lock().unwrap();
        if !shared.have_heartbeat {
            return "UNKNOWN".into();
        }
        modes::mode_name(shared.vehicle_type, shared.custom_mode)
            .map(str::to_string)
            .unwrap_or_else(|| format!("MODE({})", shared.custom_mode))
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().unwrap().armed
    }

    fn targets(&self) -> (u8, u8) {
        let shared = self.shared.lock().unwrap();
        (shared.target_system, shared.target_component)
    }

    fn next_header(&self) -> MavHeader {
        let mut shared = self.shared.lock().unwrap();
        shared.seq = shared.seq.wrapping_add(1);
        MavHeader {
            system_id: self.sys_id,
            component_id: self.comp_id,
            sequence: shared.seq,
        }
    }

    fn send(&self, msg: MavMessage) -> Result<(), LinkError> {
        let header = self.next_header();
        self.transport
            .send(&header, &msg)
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        Ok(())
    }

    /// RC override addressed to the fixed target ids: chan1 carries steering,
    /// chan3 throttle. Called on every client command, so it must stay cheap.
    pub fn send_override(&self, steer: u16, throttle: u16) -> Result<(), LinkError> {
        let (target_system, target_component) = self.targets();
        self.send(MavMessage::RC_CHANNELS_OVERRIDE(RC_CHANNELS_OVERRIDE_DATA {
            target_system,
            target_component,
            chan1_raw: steer,
            chan3_raw: throttle,
            ..Default::default()
        }))
    }

    /// Switch flight mode by name. Resolution is against the live table for
    /// the vehicle type from the latest heartbeat; unknown names fail without
    /// any side effect.
    pub fn set_mode(&self, name: &str) -> Result<(), LinkError> {
        let (vehicle_type, target_system) = {
            let shared = self.shared.lock().unwrap();
            (shared.vehicle_type, shared.target_system)
        };
        let custom_mode = modes::mode_id(vehicle_type, name).ok_or_else(|| {
            LinkError::UnknownMode {
                name: name.to_string(),
                available: modes::available_names(vehicle_type),
            }
        })?;
        info!(mode = name, custom_mode, "setting flight mode");
        self.send(MavMessage::SET_MODE(SET_MODE_DATA {
            target_system,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            custom_mode,
        }))
    }

    pub fn arm(&self) -> Result<(), LinkError> {
        info!("sending ARM");
        self.send_arm_disarm(1.0)
    }

    pub fn disarm(&self) -> Result<(), LinkError> {
        info!("sending DISARM");
        self.send_arm_disarm(0.0)
    }

    fn send_arm_disarm(&self, param1: f32) -> Result<(), LinkError> {
        let (target_system, target_component) = self.targets();
        self.send(MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system,
            target_component,
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            confirmation: 0,
            param1,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        }))
    }

    /// Autonomous goto: mode switch to GUIDED, optional ground-speed change,
    /// then the position target. The mode switch must land before the target
    /// or the autopilot ignores it, hence the fixed order.
    pub fn set_guided_target(
        &self,
        lat: f64,
        lon: f64,
        speed: Option<f32>,
    ) -> Result<(), LinkError> {
        self.set_mode("GUIDED")?;

        let (target_system, target_component) = self.targets();

        if let Some(speed) = speed {
            info!(speed, "setting ground speed");
            self.send(MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
                target_system,
                target_component,
                command: MavCmd::MAV_CMD_DO_CHANGE_SPEED,
                confirmation: 0,
                param1: 1.0,  // ground speed
                param2: speed,
                param3: -1.0, // throttle unchanged
                param4: 0.0,
                param5: 0.0,
                param6: 0.0,
                param7: 0.0,
            }))?;
        }

        info!(lat, lon, "sending position target");
        self.send(MavMessage::SET_POSITION_TARGET_GLOBAL_INT(
            SET_POSITION_TARGET_GLOBAL_INT_DATA {
                time_boot_ms: 0,
                target_system,
                target_component,
                coordinate_frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
                type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_ONLY_TYPE_MASK),
                lat_int: encode_wgs84_e7(lat),
                lon_int: encode_wgs84_e7(lon),
                alt: 0.0,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
                afx: 0.0,
                afy: 0.0,
                afz: 0.0,
                yaw: 0.0,
                yaw_rate: 0.0,
            },
        ))
    }
}

/// Degrees to the MAVLink fixed-point representation (degrees × 10^7).
pub fn encode_wgs84_e7(deg: f64) -> i32 {
    (deg * 1e7).round() as i32
}

/// Best-effort send: log the failure, never propagate it. Matches the
/// fire-and-forget contract of every control path.
pub fn log_send_error(what: &str, result: Result<(), LinkError>) {
    if let Err(e) = result {
        warn!("{what} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn session_with_recorder() -> (Arc<RecordingTransport>, FcSession) {
        let transport = Arc::new(RecordingTransport::default());
        let session = FcSession::new(transport.clone(), 255, 190);
        {
            let mut shared = session.shared.lock().unwrap();
            shared.have_heartbeat = true;
            shared.target_system = 1;
            shared.target_component = 1;
            shared.vehicle_type = MavType::MAV_TYPE_GROUND_ROVER;
        }
        (transport, session)
    }

    #[test]
    fn override_carries_steer_on_chan1_throttle_on_chan3() {
        let (transport, session) = session_with_recorder();
        session.send_override(1450, 2000).unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            MavMessage::RC_CHANNELS_OVERRIDE(d) => {
                assert_eq!(d.target_system, 1);
                assert_eq!(d.chan1_raw, 1450);
                assert_eq!(d.chan3_raw, 2000);
                assert_eq!(d.chan2_raw, 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_fails_without_sending() {
        let (transport, session) = session_with_recorder();
        let err = session.set_mode("WARP").unwrap_err();
        match err {
            LinkError::UnknownMode { name, available } => {
                assert_eq!(name, "WARP");
                assert!(available.contains("GUIDED"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn guided_target_sends_three_messages_in_order() {
        let (transport, session) = session_with_recorder();
        session.set_guided_target(35.0, 139.0, Some(1.5)).unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);

        match &sent[0] {
            MavMessage::SET_MODE(d) => assert_eq!(d.custom_mode, 15),
            other => panic!("expected SET_MODE first, got {other:?}"),
        }
        match &sent[1] {
            MavMessage::COMMAND_LONG(d) => {
                assert_eq!(d.command, MavCmd::MAV_CMD_DO_CHANGE_SPEED);
                assert_eq!(d.param1, 1.0);
                assert_eq!(d.param2, 1.5);
                assert_eq!(d.param3, -1.0);
            }
            other => panic!("expected COMMAND_LONG second, got {other:?}"),
        }
        match &sent[2] {
            MavMessage::SET_POSITION_TARGET_GLOBAL_INT(d) => {
                assert_eq!(d.lat_int, 350_000_000);
                assert_eq!(d.lon_int, 1_390_000_000);
                assert_eq!(
                    d.type_mask,
                    PositionTargetTypemask::from_bits_truncate(0x0DF8)
                );
            }
            other => panic!("expected position target last, got {other:?}"),
        }
    }

    #[test]
    fn guided_target_without_speed_skips_speed_change() {
        let (transport, session) = session_with_recorder();
        session.set_guided_target(-35.5, 149.25, None).unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], MavMessage::SET_MODE(_)));
        match &sent[1] {
            MavMessage::SET_POSITION_TARGET_GLOBAL_INT(d) => {
                assert_eq!(d.lat_int, -355_000_000);
                assert_eq!(d.lon_int, 1_492_500_000);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn arm_and_disarm_flip_param1() {
        let (transport, session) = session_with_recorder();
        session.arm().unwrap();
        session.disarm().unwrap();

        let sent = transport.sent.lock().unwrap();
        match (&sent[0], &sent[1]) {
            (MavMessage::COMMAND_LONG(a), MavMessage::COMMAND_LONG(b)) => {
                assert_eq!(a.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
                assert_eq!(a.param1, 1.0);
                assert_eq!(b.param1, 0.0);
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[test]
    fn wgs84_fixed_point_round_trips_within_1e7() {
        for deg in [0.0, 35.0, 139.0, 35.123_456_7, -120.999_999_9, -0.000_000_1] {
            let encoded = encode_wgs84_e7(deg);
            let back = encoded as f64 / 1e7;
            assert!((back - deg).abs() <= 1e-7, "{deg} -> {encoded} -> {back}");
        }
    }

    #[test]
    fn heartbeat_updates_mode_and_armed() {
        let (_, session) = session_with_recorder();
        let header = MavHeader { system_id: 1, component_id: 1, sequence: 0 };
        session.note_heartbeat(
            &header,
            &HEARTBEAT_DATA {
                custom_mode: 15,
                mavtype: MavType::MAV_TYPE_GROUND_ROVER,
                base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
                    | MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED,
                ..Default::default()
            },
        );
        assert_eq!(session.mode_name(), "GUIDED");
        assert!(session.is_armed());
    }
}
