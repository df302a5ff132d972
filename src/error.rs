//! Error types for duetrec

use thiserror::Error;

use crate::audio::graph::NodeCreationStatus;

/// Result type alias for duetrec operations
pub type Result<T> = std::result::Result<T, Error>;

/// duetrec error type
#[derive(Error, Debug)]
pub enum Error {
    // Capture errors
    #[error("Capture session error: {0}")]
    CaptureSession(String),

    #[error("Capture session closed")]
    CaptureClosed,

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("Surface copy failed: {0}")]
    SurfaceCopy(String),

    // Audio errors
    #[error("Audio graph creation failed: {0:?}")]
    GraphCreation(NodeCreationStatus),

    #[error("Audio node creation failed: {0:?}")]
    NodeCreation(NodeCreationStatus),

    #[error("Loopback capture error: {0}")]
    LoopbackCapture(String),

    #[error("Audio underrun")]
    AudioUnderrun,

    #[error("Audio buffer unreadable: {0}")]
    AudioBuffer(String),

    // Timeline errors
    #[error("Timeline origin already established")]
    TimelineAlreadyEstablished,

    #[error("Timeline origin not established")]
    TimelineNotEstablished,

    // Pump / session errors
    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("Invalid engine state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    // Sink errors
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Transcode error: {0}")]
    Transcode(String),

    // General errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transient data faults: recovered locally (retry or a null sample for
    /// one pull), never escalated to teardown.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::AudioUnderrun | Error::AudioBuffer(_))
    }

    /// Fatal faults: propagate as a null sample plus full ordered teardown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DeviceLost(_) | Error::CaptureClosed | Error::SurfaceCopy(_)
        )
    }

    /// Setup faults: reported to the caller of initialize; the affected
    /// subsystem may stay unavailable for the session without aborting it.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Error::GraphCreation(_) | Error::NodeCreation(_) | Error::Config(_)
        )
    }
}
