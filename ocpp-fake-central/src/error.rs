use thiserror::Error;

/// Errors surfaced to test code driving the fake central system.
#[derive(Error, Debug)]
pub enum CentralError {
    #[error("No charge point is connected")]
    NoActiveSession,

    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}
