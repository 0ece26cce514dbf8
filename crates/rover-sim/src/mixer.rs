//! Arcade-drive skid-steer mixing: two servo channels in, one wheel speed
//! per side out.

/// Per-side wheel speeds after mixing, in rad/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorMix {
    pub left: f32,
    pub right: f32,
}

/// Channels arrive in [0,1]; -1 is the "no signal" sentinel and maps to the
/// neutral midpoint. Output is [-1,1].
pub fn normalize(raw: f32) -> f32 {
    let v = if raw == -1.0 { 0.5 } else { raw };
    v * 2.0 - 1.0
}

/// Mix normalized steer/throttle into per-side speeds, clamped to [-1,1]
/// before scaling. `scale` is min(device max wheel velocity, configured cap).
pub fn mix_normalized(steer: f32, throttle: f32, scale: f32) -> MotorMix {
    let left = (throttle + steer).clamp(-1.0, 1.0);
    let right = (throttle - steer).clamp(-1.0, 1.0);
    MotorMix { left: left * scale, right: right * scale }
}

/// Full path from raw channel values to wheel speeds.
pub fn mix(raw_steer: f32, raw_throttle: f32, scale: f32) -> MotorMix {
    mix_normalized(normalize(raw_steer), normalize(raw_throttle), scale)
}
