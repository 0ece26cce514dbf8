//! MAVLink-to-JSON telemetry translation for the client socket.

use mavlink::common::MavMessage;
use serde::Serialize;
use serde_json::{json, Value};

use rover_proto::wire::TelemetryFrame;

fn to_value<T: Serialize>(data: &T) -> Option<Value> {
    serde_json::to_value(data).ok()
}

fn frame(kind: &str, data: Value) -> Option<TelemetryFrame> {
    Some(TelemetryFrame::new(kind, data))
}

/// Translates one inbound autopilot message into a client telemetry frame.
///
/// Only a small allow-list of message types reaches the client; everything
/// else returns `None` and is dropped. HEARTBEAT frames are enriched with
/// the decoded mode name and armed flag so the client never has to parse
/// `base_mode` bitfields itself. DISTANCE_SENSOR is not forwarded verbatim:
/// it becomes a synthetic `TELEMETRY` frame carrying `sonar_range`.
pub fn translate(msg: &MavMessage, mode_name: &str, armed: bool) -> Option<TelemetryFrame> {
    match msg {
        MavMessage::ATTITUDE(d) => frame("ATTITUDE", to_value(d)?),
        MavMessage::GLOBAL_POSITION_INT(d) => frame("GLOBAL_POSITION_INT", to_value(d)?),
        MavMessage::VFR_HUD(d) => frame("VFR_HUD", to_value(d)?),
        MavMessage::SYS_STATUS(d) => frame("SYS_STATUS", to_value(d)?),
        MavMessage::RC_CHANNELS(d) => frame("RC_CHANNELS", to_value(d)?),
        MavMessage::RC_CHANNELS_RAW(d) => frame("RC_CHANNELS_RAW", to_value(d)?),
        MavMessage::HEARTBEAT(d) => {
            let mut data = to_value(d)?;
            if let Some(obj) = data.as_object_mut() {
                obj.insert("mode_name".to_string(), json!(mode_name));
                obj.insert("is_armed".to_string(), json!(armed));
            }
            frame("HEARTBEAT", data)
        }
        MavMessage::STATUSTEXT(d) => {
            let nul = d.text.iter().position(|&b| b == 0).unwrap_or(d.text.len());
            let text = String::from_utf8_lossy(&d.text[..nul]).into_owned();
            frame(
                "STATUSTEXT",
                json!({ "severity": to_value(&d.severity)?, "text": text }),
            )
        }
        MavMessage::DISTANCE_SENSOR(d) => {
            frame("TELEMETRY", json!({ "sonar_range": d.current_distance }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{
        ATTITUDE_DATA, COMMAND_ACK_DATA, DISTANCE_SENSOR_DATA, HEARTBEAT_DATA, STATUSTEXT_DATA,
    };

    #[test]
    fn attitude_passes_through() {
        let msg = MavMessage::ATTITUDE(ATTITUDE_DATA {
            time_boot_ms: 1234,
            roll: 0.1,
            pitch: -0.2,
            yaw: 1.5,
            ..Default::default()
        });
        let frame = translate(&msg, "MANUAL", false).unwrap();
        assert_eq!(frame.kind, "ATTITUDE");
        assert_eq!(frame.data["time_boot_ms"], 1234);
        assert!((frame.data["yaw"].as_f64().unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn unlisted_messages_are_dropped() {
        let msg = MavMessage::COMMAND_ACK(COMMAND_ACK_DATA::default());
        assert!(translate(&msg, "MANUAL", false).is_none());
    }

    #[test]
    fn heartbeat_gains_mode_name_and_armed_flag() {
        let msg = MavMessage::HEARTBEAT(HEARTBEAT_DATA::default());
        let frame = translate(&msg, "GUIDED", true).unwrap();
        assert_eq!(frame.kind, "HEARTBEAT");
        assert_eq!(frame.data["mode_name"], "GUIDED");
        assert_eq!(frame.data["is_armed"], true);
    }

    #[test]
    fn statustext_trims_trailing_nuls() {
        let mut text = [0u8; 50];
        text[..5].copy_from_slice(b"ready");
        let msg = MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            text,
            ..Default::default()
        });
        let frame = translate(&msg, "MANUAL", false).unwrap();
        assert_eq!(frame.data["text"], "ready");
    }

    #[test]
    fn statustext_decodes_utf8() {
        let payload = "préarmé ✓".as_bytes();
        let mut text = [0u8; 50];
        text[..payload.len()].copy_from_slice(payload);
        let msg = MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            text,
            ..Default::default()
        });
        let frame = translate(&msg, "MANUAL", false).unwrap();
        assert_eq!(frame.data["text"], "préarmé ✓");
    }

    #[test]
    fn statustext_without_terminator_uses_full_buffer() {
        let text = [b'x'; 50];
        let msg = MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            text,
            ..Default::default()
        });
        let frame = translate(&msg, "MANUAL", false).unwrap();
        assert_eq!(frame.data["text"], "x".repeat(50));
    }

    #[test]
    fn distance_sensor_becomes_sonar_telemetry() {
        let msg = MavMessage::DISTANCE_SENSOR(DISTANCE_SENSOR_DATA {
            current_distance: 250,
            ..Default::default()
        });
        let frame = translate(&msg, "MANUAL", false).unwrap();
        assert_eq!(frame.kind, "TELEMETRY");
        assert_eq!(frame.data["sonar_range"], 250);
        assert!(frame.data.get("min_distance").is_none());
    }
}
