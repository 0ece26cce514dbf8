use serde::{Deserialize, Serialize};

/// Outbound telemetry frame: `{"type": <kind>, "data": {..}}`.
///
/// `data` is an opaque field mapping taken from the decoded MAVLink payload;
/// the gateway decides which message kinds are forwarded at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl TelemetryFrame {
    pub fn new(kind: &str, data: serde_json::Value) -> Self {
        Self { kind: kind.to_string(), data }
    }
}

fn neutral_pwm() -> u16 {
    1500
}

/// Inbound control frame from the client, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "MANUAL_CONTROL")]
    ManualControl {
        #[serde(default = "neutral_pwm")]
        throttle: u16,
        #[serde(default = "neutral_pwm")]
        steer: u16,
    },
    #[serde(rename = "COMMAND")]
    Command {
        command: CommandName,
        value: Option<String>,
    },
    #[serde(rename = "GOTO")]
    Goto {
        lat: f64,
        lon: f64,
        speed: Option<f32>,
    },
}

/// Closed command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CommandName {
    #[serde(rename = "FORWARD")]
    Forward,
    #[serde(rename = "BACKWARD")]
    Backward,
    #[serde(rename = "LEFT")]
    Left,
    #[serde(rename = "RIGHT")]
    Right,
    #[serde(rename = "STOP")]
    Stop,
    #[serde(rename = "SET_MODE")]
    SetMode,
    #[serde(rename = "ARM")]
    Arm,
    #[serde(rename = "DISARM")]
    Disarm,
}

/// Reply to a GOTO frame.
#[derive(Debug, Clone, Serialize)]
pub struct GotoReply {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<GotoTarget>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GotoTarget {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

impl GotoReply {
    pub fn success(lat: f64, lon: f64, speed: Option<f32>) -> Self {
        Self {
            status: "success",
            message: None,
            target: Some(GotoTarget { lat, lon, speed }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            target: None,
        }
    }
}
