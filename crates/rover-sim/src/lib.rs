pub mod bridge;
pub mod distance;
pub mod error;
pub mod fdm;
pub mod mixer;
pub mod vehicle;

use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;

pub use bridge::{physics_port, run_instance};
pub use distance::DistanceSensorReading;
pub use error::SimulatorError;
pub use fdm::{ControlSurfaceFrame, FdmFrame};
pub use vehicle::{DifferentialDriveModel, ModelConfig, RangeSample, SimVehicle};

fn default_base_port() -> u16 {
    9002
}

fn default_instances() -> u16 {
    1
}

fn default_sitl_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_relay_port() -> u16 {
    14551
}

fn default_motor_velocity_cap() -> f32 {
    f32::INFINITY
}

fn default_recv_timeout_ms() -> u64 {
    1000
}

fn default_range_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Physics port for instance 0; instance i listens on base + 10·i.
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of vehicle workers to run.
    #[serde(default = "default_instances")]
    pub instances: u16,

    /// Where the autopilot's physics input lives. FDM frames go to
    /// `sitl_address:port+1`.
    #[serde(default = "default_sitl_address")]
    pub sitl_address: IpAddr,

    /// Fixed well-known port of the distance-sensor forwarding relay.
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    /// Cap on the mixed wheel speed; the device maximum still applies.
    #[serde(default = "default_motor_velocity_cap")]
    pub motor_velocity_cap: f32,

    /// How long to wait for an actuator frame before resending FDM.
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Distance telemetry cadence, in simulated milliseconds.
    #[serde(default = "default_range_interval_ms")]
    pub range_interval_ms: u64,

    /// Built-in vehicle model parameters.
    #[serde(default)]
    pub model: ModelConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_port: default_base_port(),
            instances: default_instances(),
            sitl_address: default_sitl_address(),
            relay_port: default_relay_port(),
            motor_velocity_cap: default_motor_velocity_cap(),
            recv_timeout_ms: default_recv_timeout_ms(),
            range_interval_ms: default_range_interval_ms(),
            model: ModelConfig::default(),
        }
    }
}
