use thiserror::Error;

/// Errors surfaced by the device transport.
#[derive(Debug, Error)]
pub enum HidError {
    #[error("no compatible WinWing device found")]
    DeviceNotFound,

    #[error("device disconnected: {0}")]
    Disconnected(String),
}

/// Errors surfaced by the simulator link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("simulator link unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
}
