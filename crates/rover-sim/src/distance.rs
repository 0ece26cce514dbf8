//! Distance-sensor telemetry path: readings converted to MAVLink
//! DISTANCE_SENSOR datagrams and sent to the forwarding relay discovered
//! from the first inbound physics packet.

use std::net::IpAddr;

use mavlink::common::{MavDistanceSensor, MavMessage, MavSensorOrientation, DISTANCE_SENSOR_DATA};
use mavlink::error::MessageWriteError;
use mavlink::{MavConnection, MavHeader};
use tracing::{info, warn};

use crate::vehicle::RangeSample;

/// MAVLink source ids for the telemetry side channel. Distinct from the GCS
/// ids so the relay can tell the two apart.
const RELAY_SYS_ID: u8 = 2;
const RELAY_COMP_ID: u8 = 158;

/// One ranging measurement, in the unsigned-centimeter units DISTANCE_SENSOR
/// carries. The current distance is always clamped into [min, max]; a
/// non-finite reading reports the maximum range, never a raw inf/NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSensorReading {
    pub current_cm: u16,
    pub min_cm: u16,
    pub max_cm: u16,
    pub sensor_type: MavDistanceSensor,
    pub id: u8,
    pub orientation: MavSensorOrientation,
}

impl DistanceSensorReading {
    pub fn from_sample(sample: &RangeSample) -> Self {
        let min_cm = (sample.min_m.max(0.0) * 100.0).round().min(65534.0) as u16;
        let max_cm = (sample.max_m * 100.0)
            .round()
            .clamp(f64::from(min_cm) + 1.0, 65535.0) as u16;

        let distance_m = if sample.distance_m.is_finite() {
            sample.distance_m
        } else {
            sample.max_m
        };
        let current_cm = (distance_m * 100.0)
            .round()
            .clamp(f64::from(min_cm), f64::from(max_cm)) as u16;

        Self {
            current_cm,
            min_cm,
            max_cm,
            sensor_type: MavDistanceSensor::MAV_DISTANCE_SENSOR_LASER,
            id: 0,
            orientation: MavSensorOrientation::MAV_SENSOR_ROTATION_NONE,
        }
    }
}

/// Outbound path to the forwarding relay. Opened once, when the peer address
/// is discovered; send failures are the caller's to swallow.
pub struct DistanceRelay {
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
    seq: u8,
}

impl DistanceRelay {
    pub fn open(peer_ip: IpAddr, relay_port: u16) -> Option<Self> {
        let url = format!("udpout:{peer_ip}:{relay_port}");
        match mavlink::connect::<MavMessage>(&url) {
            Ok(conn) => {
                info!(%url, "distance sensor relay path opened");
                Some(Self { conn, seq: 0 })
            }
            Err(e) => {
                warn!("distance sensor relay unavailable ({url}): {e}");
                None
            }
        }
    }

    pub fn send(
        &mut self,
        reading: &DistanceSensorReading,
        time_boot_ms: u32,
    ) -> Result<usize, MessageWriteError> {
        self.seq = self.seq.wrapping_add(1);
        let header = MavHeader {
            system_id: RELAY_SYS_ID,
            component_id: RELAY_COMP_ID,
            sequence: self.seq,
        };
        let msg = MavMessage::DISTANCE_SENSOR(DISTANCE_SENSOR_DATA {
            time_boot_ms,
            min_distance: reading.min_cm,
            max_distance: reading.max_cm,
            current_distance: reading.current_cm,
            mavtype: reading.sensor_type,
            id: reading.id,
            orientation: reading.orientation,
            covariance: 0,
            ..Default::default()
        });
        self.conn.send(&header, &msg)
    }
}
