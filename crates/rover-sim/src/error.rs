/// Errors from the simulator bridge. `Disconnected` is terminal for one
/// vehicle worker; everything else is recoverable per attempt.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("simulator disconnected")]
    Disconnected,

    #[error("actuator frame too short: {0} bytes")]
    ShortFrame(usize),

    #[error("physics port out of range: {0}")]
    InvalidPort(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
