//! Binary frames exchanged with the autopilot's physics-input socket.
//!
//! Both layouts are fixed 16-field native-endian records: the FDM frame is
//! 16 doubles of sensor state sent once per simulation timestep, the control
//! surface frame is 16 floats of actuator output coming back.

use bytes::{Buf, BufMut};

use crate::error::SimulatorError;

pub const FDM_FIELDS: usize = 16;
pub const FDM_FRAME_LEN: usize = FDM_FIELDS * 8;
pub const CONTROL_FRAME_LEN: usize = FDM_FIELDS * 4;

/// Actuator channel carrying steering.
pub const STEERING_CHANNEL: usize = 0;
/// Actuator channel carrying throttle.
pub const THROTTLE_CHANNEL: usize = 2;

/// Flight-dynamics-model state sampled from the simulator, one per timestep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FdmFrame {
    /// Simulation time in seconds.
    pub timestamp_s: f64,
    /// Body angular velocity, roll/pitch/yaw rates (rad/s).
    pub angular_velocity_rpy: [f64; 3],
    /// Body linear acceleration (m/s²).
    pub linear_acceleration_xyz: [f64; 3],
    /// Orientation, roll/pitch/yaw (rad).
    pub orientation_rpy: [f64; 3],
    /// World-frame velocity (m/s).
    pub velocity_xyz: [f64; 3],
    /// World-frame position (m).
    pub position_xyz: [f64; 3],
}

impl FdmFrame {
    pub fn encode(&self) -> [u8; FDM_FRAME_LEN] {
        let mut out = [0u8; FDM_FRAME_LEN];
        let mut buf = &mut out[..];
        buf.put_f64_ne(self.timestamp_s);
        for triple in [
            &self.angular_velocity_rpy,
            &self.linear_acceleration_xyz,
            &self.orientation_rpy,
            &self.velocity_xyz,
            &self.position_xyz,
        ] {
            for &v in triple {
                buf.put_f64_ne(v);
            }
        }
        out
    }
}

/// One actuator output record from the autopilot. Only the steering and
/// throttle channels are consumed; the rest ride along untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSurfaceFrame {
    pub channels: [f32; FDM_FIELDS],
}

impl ControlSurfaceFrame {
    /// Decode the leading 64 bytes of a datagram. Longer datagrams are fine
    /// (trailing bytes ignored), shorter ones are malformed.
    pub fn decode(data: &[u8]) -> Result<Self, SimulatorError> {
        if data.len() < CONTROL_FRAME_LEN {
            return Err(SimulatorError::ShortFrame(data.len()));
        }
        let mut buf = &data[..CONTROL_FRAME_LEN];
        let mut channels = [0f32; FDM_FIELDS];
        for ch in &mut channels {
            *ch = buf.get_f32_ne();
        }
        Ok(Self { channels })
    }

    pub fn steering(&self) -> f32 {
        self.channels[STEERING_CHANNEL]
    }

    pub fn throttle(&self) -> f32 {
        self.channels[THROTTLE_CHANNEL]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fdm_frame_is_128_bytes_in_field_order() {
        let frame = FdmFrame {
            timestamp_s: 1.5,
            angular_velocity_rpy: [0.1, 0.2, 0.3],
            linear_acceleration_xyz: [1.0, 2.0, 3.0],
            orientation_rpy: [0.01, 0.02, 0.03],
            velocity_xyz: [4.0, 5.0, 6.0],
            position_xyz: [7.0, 8.0, 9.0],
        };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), FDM_FRAME_LEN);

        let field = |i: usize| {
            f64::from_ne_bytes(bytes[i * 8..(i + 1) * 8].try_into().unwrap())
        };
        assert_eq!(field(0), 1.5);
        assert_eq!(field(1), 0.1);
        assert_eq!(field(3), 0.3);
        assert_eq!(field(4), 1.0);
        assert_eq!(field(7), 0.01);
        assert_eq!(field(10), 4.0);
        assert_eq!(field(13), 7.0);
        assert_eq!(field(15), 9.0);
    }

    #[test]
    fn control_frame_picks_steering_and_throttle_channels() {
        let mut raw = [0f32; FDM_FIELDS];
        raw[STEERING_CHANNEL] = 0.25;
        raw[THROTTLE_CHANNEL] = 0.75;
        raw[1] = 0.99; // unused channel must not leak into either accessor

        let mut bytes = Vec::with_capacity(CONTROL_FRAME_LEN);
        for v in raw {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }

        let frame = ControlSurfaceFrame::decode(&bytes).unwrap();
        assert_eq!(frame.steering(), 0.25);
        assert_eq!(frame.throttle(), 0.75);
    }

    #[test]
    fn short_datagram_is_rejected() {
        let err = ControlSurfaceFrame::decode(&[0u8; 63]).unwrap_err();
        assert!(matches!(err, SimulatorError::ShortFrame(63)));
    }

    #[test]
    fn oversized_datagram_ignores_trailing_bytes() {
        let bytes = vec![0u8; CONTROL_FRAME_LEN + 32];
        assert!(ControlSurfaceFrame::decode(&bytes).is_ok());
    }
}
