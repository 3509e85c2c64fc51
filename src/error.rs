//! Error types for GazeMemory

use crate::version::Version;
use std::io;
use thiserror::Error;

/// Result type for GazeMemory operations
pub type Result<T> = std::result::Result<T, GazeError>;

/// Longest failure message carried across the public boundary (excluding NUL)
pub const MAX_ERROR_MESSAGE_LEN: usize = 1023;

/// Errors that can occur while connecting to the eye tracker service
#[derive(Debug, Error)]
pub enum GazeError {
    /// Failed to open shared memory
    #[error("Failed to open shared memory '{name}': {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to map memory
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Segment is smaller than the header claims
    #[error("Shared memory segment too small: need {needed} bytes, segment has {actual}")]
    SegmentTooSmall { needed: usize, actual: usize },

    /// Name contains an interior NUL or is otherwise unusable
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Header geometry violates the layout contract
    #[error("Invalid shared memory header: {0}")]
    InvalidHeader(String),

    /// Service is older than the oldest supported version
    #[error("Library doesn't support service in version: {found}, lowest supported version is: {lowest}")]
    VersionTooLow { found: Version, lowest: Version },

    /// Service is at or above the first unsupported version
    #[error("Library doesn't support service in version: {found}, highest supported version is: {highest}")]
    VersionTooHigh { found: Version, highest: Version },

    /// Handshake endpoint is missing or refused the connection
    #[error("Failed to open handshake channel '{path}': {source}")]
    HandshakeUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Every server instance of the handshake endpoint is busy
    #[error("All handshake channel instances are busy")]
    HandshakeBusy,

    /// I/O failure while exchanging handshake frames
    #[error("Handshake exchange failed: {0}")]
    HandshakeIo(#[source] io::Error),

    /// Peer answered with a frame of the wrong type
    #[error("Invalid message type sent by the handshake server, message type: {0}")]
    InvalidMessageType(u32),

    /// Peer answered with a truncated or otherwise unusable frame
    #[error("Malformed handshake frame: {0}")]
    MalformedFrame(String),

    /// Shared buffer path in the response has no NUL terminator
    #[error("Failed to read shared memory path: missing terminator")]
    MissingTerminator,

    /// Caller asked to stop
    #[error("Cancelled")]
    Cancelled,

    /// Deadline elapsed before initialization completed
    #[error("Timed out")]
    Timeout,
}

impl GazeError {
    /// Status code reported at the public boundary for this error
    pub fn status(&self) -> InitStatus {
        match self {
            GazeError::ShmOpen { .. } | GazeError::InvalidName(_) => {
                InitStatus::FailedToAccessSharedResources
            }
            GazeError::Mmap(_) | GazeError::SegmentTooSmall { .. } => {
                InitStatus::FailedToMapSharedResources
            }
            GazeError::HandshakeUnavailable { .. } | GazeError::HandshakeIo(_) => {
                InitStatus::FailedToInitializeHandshakeChannel
            }
            GazeError::HandshakeBusy => InitStatus::AllHandshakeChannelsBusy,
            GazeError::VersionTooLow { .. } => InitStatus::ServiceVersionTooLow,
            GazeError::VersionTooHigh { .. } => InitStatus::ServiceVersionTooHigh,
            GazeError::Cancelled => InitStatus::Cancelled,
            GazeError::Timeout => InitStatus::Timeout,
            GazeError::InvalidHeader(_)
            | GazeError::InvalidMessageType(_)
            | GazeError::MalformedFrame(_)
            | GazeError::MissingTerminator => InitStatus::Failure,
        }
    }
}

/// Initialization outcome codes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStatus {
    Success = 0,
    FailedToAccessSharedResources = 1,
    FailedToMapSharedResources = 2,
    FailedToInitializeHandshakeChannel = 3,
    AllHandshakeChannelsBusy = 4,
    ServiceVersionTooLow = 5,
    ServiceVersionTooHigh = 6,
    Cancelled = 7,
    Timeout = 8,
    InternalError = 9,
    Failure = 10,
}

/// Failed reader creation: a status code plus a bounded message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status:?}: {message}")]
pub struct InitFailure {
    pub status: InitStatus,
    pub message: String,
}

impl InitFailure {
    pub fn new(status: InitStatus, message: impl Into<String>) -> Self {
        let mut message = message.into();
        truncate_on_char_boundary(&mut message, MAX_ERROR_MESSAGE_LEN);
        Self { status, message }
    }
}

impl From<GazeError> for InitFailure {
    fn from(err: GazeError) -> Self {
        InitFailure::new(err.status(), err.to_string())
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
