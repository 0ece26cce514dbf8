pub mod mav;
pub mod modes;
pub mod state;

use serde::Deserialize;

pub use mav::{FcSession, LinkError};
pub use state::{DriveTuning, RcChannels};

fn default_endpoint() -> String {
    "udpin:0.0.0.0:14552".into()
}

fn default_sys_id() -> u8 {
    255
}

fn default_comp_id() -> u8 {
    190
}

fn default_heartbeat_timeout_s() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// MAVLink connection string for the autopilot link.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// MAVLink ids we use (GCS side).
    #[serde(default = "default_sys_id")]
    pub sys_id: u8,
    #[serde(default = "default_comp_id")]
    pub comp_id: u8,

    /// Bound on the initial heartbeat wait. The session never comes up
    /// without one, so connect fails instead of hanging forever.
    #[serde(default = "default_heartbeat_timeout_s")]
    pub heartbeat_timeout_s: u64,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            sys_id: default_sys_id(),
            comp_id: default_comp_id(),
            heartbeat_timeout_s: default_heartbeat_timeout_s(),
        }
    }
}
