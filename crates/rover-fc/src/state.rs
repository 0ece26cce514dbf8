use rover_proto::wire::CommandName;
use serde::Deserialize;

/// Neutral RC pulse width in microseconds.
pub const NEUTRAL_PWM: u16 = 1500;

/// Steer/throttle channel values carried between client commands. Mutated by
/// inbound commands, read on every override send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcChannels {
    pub steer: u16,
    pub throttle: u16,
}

impl Default for RcChannels {
    fn default() -> Self {
        Self { steer: NEUTRAL_PWM, throttle: NEUTRAL_PWM }
    }
}

fn default_forward_pwm() -> u16 {
    2000
}

fn default_backward_pwm() -> u16 {
    1100
}

fn default_left_pwm() -> u16 {
    1450
}

fn default_right_pwm() -> u16 {
    1550
}

/// Pulse widths applied by the named motion commands. Observed deployments
/// disagree on the forward magnitude (1900 vs 2000), so these are config, not
/// constants.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveTuning {
    #[serde(default = "default_forward_pwm")]
    pub forward_pwm: u16,
    #[serde(default = "default_backward_pwm")]
    pub backward_pwm: u16,
    #[serde(default = "default_left_pwm")]
    pub left_pwm: u16,
    #[serde(default = "default_right_pwm")]
    pub right_pwm: u16,
}

impl Default for DriveTuning {
    fn default() -> Self {
        Self {
            forward_pwm: default_forward_pwm(),
            backward_pwm: default_backward_pwm(),
            left_pwm: default_left_pwm(),
            right_pwm: default_right_pwm(),
        }
    }
}

impl RcChannels {
    /// Apply a named command to the channel state. Motion commands set the
    /// corresponding channel absolutely; SET_MODE/ARM/DISARM leave the
    /// channels untouched (the gateway dispatches those to the link).
    pub fn apply(&mut self, cmd: CommandName, tuning: &DriveTuning) {
        match cmd {
            CommandName::Forward => self.throttle = tuning.forward_pwm,
            CommandName::Backward => self.throttle = tuning.backward_pwm,
            CommandName::Left => self.steer = tuning.left_pwm,
            CommandName::Right => self.steer = tuning.right_pwm,
            CommandName::Stop => *self = Self::default(),
            CommandName::SetMode | CommandName::Arm | CommandName::Disarm => {}
        }
    }
}
