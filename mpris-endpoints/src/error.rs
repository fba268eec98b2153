use thiserror::Error;

/// Failures reported by a [`Bus`](crate::media_listener::bus::Bus) implementation.
#[derive(Error, Debug)]
pub enum BusError {
    #[error(transparent)]
    Zbus(#[from] zbus::Error),

    #[error(transparent)]
    Fdo(#[from] zbus::fdo::Error),

    #[error(transparent)]
    Variant(#[from] zbus::zvariant::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by endpoints and the registry.
#[derive(Error, Debug)]
pub enum MprisError {
    /// A value did not have the expected overall shape, e.g. metadata that
    /// is not a dict.
    #[error("not a valid structure: {0}")]
    Decode(&'static str),

    /// The capability query failed or returned false.
    #[error("{operation}: unsupported")]
    Unsupported { operation: &'static str },

    #[error("{operation}: not implemented")]
    NotImplemented { operation: &'static str },

    #[error("destination is not valid: {0}")]
    InvalidDestination(String),

    #[error("transport: {0}")]
    Transport(#[from] BusError),
}

impl MprisError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, MprisError::Unsupported { .. })
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, MprisError::NotImplemented { .. })
    }
}

pub type Result<T> = std::result::Result<T, MprisError>;
