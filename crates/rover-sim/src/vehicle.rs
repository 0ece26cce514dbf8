//! The simulator device surface, plus a built-in differential drive model.
//!
//! The built-in model keeps the whole stack runnable without an external 3D
//! simulator: it integrates skid-steer kinematics, synthesizes FDM state with
//! optional sensor noise, and exposes a forward range sensor against a
//! configurable obstacle.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::SimulatorError;
use crate::fdm::FdmFrame;

/// One range-sensor reading in metres. `distance_m` may be non-finite when
/// nothing is in range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSample {
    pub distance_m: f64,
    pub min_m: f64,
    pub max_m: f64,
}

/// Device surface the bridge worker drives. One implementation per simulator
/// backend; the worker owns exactly one instance per vehicle.
pub trait SimVehicle: Send {
    /// Simulation timestep in milliseconds.
    fn timestep_ms(&self) -> u32;

    /// Current simulation time in seconds.
    fn sim_time_s(&self) -> f64;

    /// Device-reported maximum wheel angular velocity (rad/s).
    fn max_wheel_velocity(&self) -> f32;

    /// Sample current sensor state as an FDM frame.
    fn sample_fdm(&mut self) -> FdmFrame;

    /// Apply per-side wheel speeds (rad/s), uniform across each side.
    fn apply_motor_speeds(&mut self, left: f32, right: f32);

    /// Read the range sensor, if the vehicle carries one.
    fn read_range(&mut self) -> Option<RangeSample>;

    /// Advance the simulation exactly one timestep.
    /// `Err(Disconnected)` means the simulator closed; terminal.
    fn step(&mut self) -> Result<(), SimulatorError>;
}

const GRAVITY_MSS: f64 = 9.80665;

fn default_timestep_ms() -> u32 {
    20
}

fn default_wheel_radius_m() -> f32 {
    0.11
}

fn default_track_width_m() -> f32 {
    0.4
}

fn default_max_wheel_velocity() -> f32 {
    12.3
}

fn default_range_min_m() -> f64 {
    0.2
}

fn default_range_max_m() -> f64 {
    5.0
}

fn default_gyro_noise() -> f64 {
    0.005
}

fn default_accel_noise() -> f64 {
    0.05
}

/// Configuration for the built-in model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_timestep_ms")]
    pub timestep_ms: u32,
    #[serde(default = "default_wheel_radius_m")]
    pub wheel_radius_m: f32,
    #[serde(default = "default_track_width_m")]
    pub track_width_m: f32,
    #[serde(default = "default_max_wheel_velocity")]
    pub max_wheel_velocity: f32,
    #[serde(default = "default_range_min_m")]
    pub range_min_m: f64,
    #[serde(default = "default_range_max_m")]
    pub range_max_m: f64,
    /// Forward distance (m) of a simulated wall; None means open field and
    /// the range sensor reads out-of-range.
    #[serde(default)]
    pub obstacle_at_m: Option<f64>,
    #[serde(default = "default_gyro_noise")]
    pub gyro_noise_rads: f64,
    #[serde(default = "default_accel_noise")]
    pub accel_noise_mss: f64,
    /// RNG seed for deterministic runs. None = entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            timestep_ms: default_timestep_ms(),
            wheel_radius_m: default_wheel_radius_m(),
            track_width_m: default_track_width_m(),
            max_wheel_velocity: default_max_wheel_velocity(),
            range_min_m: default_range_min_m(),
            range_max_m: default_range_max_m(),
            obstacle_at_m: None,
            gyro_noise_rads: default_gyro_noise(),
            accel_noise_mss: default_accel_noise(),
            seed: None,
        }
    }
}

/// Built-in skid-steer kinematics model.
pub struct DifferentialDriveModel {
    cfg: ModelConfig,
    rng: StdRng,
    sim_time_s: f64,
    x: f64,
    y: f64,
    heading: f64,
    velocity: f64,
    yaw_rate: f64,
    prev_velocity: f64,
    wheel_left: f32,
    wheel_right: f32,
}

impl DifferentialDriveModel {
    pub fn new(cfg: ModelConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            cfg,
            rng,
            sim_time_s: 0.0,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            velocity: 0.0,
            yaw_rate: 0.0,
            prev_velocity: 0.0,
            wheel_left: 0.0,
            wheel_right: 0.0,
        }
    }

    fn noise(&mut self, amplitude: f64) -> f64 {
        if amplitude > 0.0 {
            self.rng.gen_range(-amplitude..amplitude)
        } else {
            0.0
        }
    }
}

impl SimVehicle for DifferentialDriveModel {
    fn timestep_ms(&self) -> u32 {
        self.cfg.timestep_ms
    }

    fn sim_time_s(&self) -> f64 {
        self.sim_time_s
    }

    fn max_wheel_velocity(&self) -> f32 {
        self.cfg.max_wheel_velocity
    }

    fn sample_fdm(&mut self) -> FdmFrame {
        let dt = self.cfg.timestep_ms as f64 / 1000.0;
        let accel_x = if dt > 0.0 {
            (self.velocity - self.prev_velocity) / dt
        } else {
            0.0
        };
        let gyro_n = self.cfg.gyro_noise_rads;
        let accel_n = self.cfg.accel_noise_mss;
        FdmFrame {
            timestamp_s: self.sim_time_s,
            angular_velocity_rpy: [0.0, 0.0, self.yaw_rate + self.noise(gyro_n)],
            linear_acceleration_xyz: [
                accel_x + self.noise(accel_n),
                self.noise(accel_n),
                -GRAVITY_MSS + self.noise(accel_n),
            ],
            orientation_rpy: [0.0, 0.0, self.heading],
            velocity_xyz: [
                self.velocity * self.heading.cos(),
                self.velocity * self.heading.sin(),
                0.0,
            ],
            position_xyz: [self.x, self.y, 0.0],
        }
    }

    fn apply_motor_speeds(&mut self, left: f32, right: f32) {
        self.wheel_left = left;
        self.wheel_right = right;
    }

    fn read_range(&mut self) -> Option<RangeSample> {
        let distance_m = match self.cfg.obstacle_at_m {
            Some(wall_x) => wall_x - self.x,
            None => f64::INFINITY,
        };
        Some(RangeSample {
            distance_m,
            min_m: self.cfg.range_min_m,
            max_m: self.cfg.range_max_m,
        })
    }

    fn step(&mut self) -> Result<(), SimulatorError> {
        let dt = self.cfg.timestep_ms as f64 / 1000.0;
        let r = self.cfg.wheel_radius_m as f64;
        let track = self.cfg.track_width_m as f64;

        self.prev_velocity = self.velocity;
        self.velocity = r * (self.wheel_left as f64 + self.wheel_right as f64) / 2.0;
        self.yaw_rate = r * (self.wheel_left as f64 - self.wheel_right as f64) / track;

        self.heading += self.yaw_rate * dt;
        self.x += self.velocity * self.heading.cos() * dt;
        self.y += self.velocity * self.heading.sin() * dt;
        self.sim_time_s += dt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DifferentialDriveModel {
        DifferentialDriveModel::new(ModelConfig {
            seed: Some(7),
            gyro_noise_rads: 0.0,
            accel_noise_mss: 0.0,
            ..ModelConfig::default()
        })
    }

    #[test]
    fn equal_wheel_speeds_drive_straight() {
        let mut m = model();
        m.apply_motor_speeds(5.0, 5.0);
        for _ in 0..50 {
            m.step().unwrap();
        }
        assert!(m.x > 0.0);
        assert_eq!(m.heading, 0.0);
        assert!(m.y.abs() < 1e-9);
    }

    #[test]
    fn opposite_wheel_speeds_spin_in_place() {
        let mut m = model();
        m.apply_motor_speeds(3.0, -3.0);
        for _ in 0..10 {
            m.step().unwrap();
        }
        assert!(m.heading > 0.0);
        assert!(m.x.abs() < 1e-9);
    }

    #[test]
    fn sim_time_advances_one_timestep_per_step() {
        let mut m = model();
        m.step().unwrap();
        m.step().unwrap();
        let frame = m.sample_fdm();
        assert!((frame.timestamp_s - 0.04).abs() < 1e-9);
        assert_eq!(m.sim_time_s(), frame.timestamp_s);
    }

    #[test]
    fn open_field_range_is_out_of_range() {
        let mut m = model();
        let s = m.read_range().unwrap();
        assert!(s.distance_m.is_infinite());
    }

    #[test]
    fn obstacle_range_shrinks_as_vehicle_advances() {
        let mut m = DifferentialDriveModel::new(ModelConfig {
            obstacle_at_m: Some(3.0),
            seed: Some(7),
            ..ModelConfig::default()
        });
        let before = m.read_range().unwrap().distance_m;
        m.apply_motor_speeds(8.0, 8.0);
        for _ in 0..100 {
            m.step().unwrap();
        }
        let after = m.read_range().unwrap().distance_m;
        assert!(after < before);
    }
}
