//! Flight mode name tables, keyed by the vehicle type the autopilot reports
//! in its heartbeat. Lookups happen per request against the latest reported
//! type, so a vehicle that changes identity mid-session is never resolved
//! against a stale table.

use mavlink::common::MavType;

pub type ModeTable = &'static [(&'static str, u32)];

/// ArduPilot Rover custom mode numbers.
pub const ROVER_MODES: ModeTable = &[
    ("MANUAL", 0),
    ("ACRO", 1),
    ("STEERING", 3),
    ("HOLD", 4),
    ("LOITER", 5),
    ("FOLLOW", 6),
    ("SIMPLE", 7),
    ("AUTO", 10),
    ("RTL", 11),
    ("SMART_RTL", 12),
    ("GUIDED", 15),
    ("INITIALISING", 16),
];

/// ArduPilot Copter custom mode numbers.
pub const COPTER_MODES: ModeTable = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("LAND", 9),
    ("DRIFT", 11),
    ("SPORT", 13),
    ("POSHOLD", 16),
    ("BRAKE", 17),
    ("SMART_RTL", 21),
];

/// Pick the mode table for a reported vehicle type. Ground vehicles are the
/// primary target here, so anything unrecognized falls back to the rover
/// table rather than an empty one.
pub fn mode_table(vehicle_type: MavType) -> ModeTable {
    match vehicle_type {
        MavType::MAV_TYPE_QUADROTOR
        | MavType::MAV_TYPE_HEXAROTOR
        | MavType::MAV_TYPE_OCTOROTOR
        | MavType::MAV_TYPE_TRICOPTER
        | MavType::MAV_TYPE_COAXIAL
        | MavType::MAV_TYPE_HELICOPTER => COPTER_MODES,
        _ => ROVER_MODES,
    }
}

pub fn mode_id(vehicle_type: MavType, name: &str) -> Option<u32> {
    mode_table(vehicle_type)
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, id)| id)
}

pub fn mode_name(vehicle_type: MavType, custom_mode: u32) -> Option<&'static str> {
    mode_table(vehicle_type)
        .iter()
        .find(|&&(_, id)| id == custom_mode)
        .map(|&(n, _)| n)
}

pub fn available_names(vehicle_type: MavType) -> String {
    mode_table(vehicle_type)
        .iter()
        .map(|&(n, _)| n)
        .collect::<Vec<_>>()
        .join(", ")
}
