//! Error taxonomy for the adaptive-trigger agent.

use thiserror::Error;

/// Transport-layer failure kinds, mirrored from the UDP backend's error surface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    #[error("socket creation failed")]
    SocketCreate,
    #[error("bind failed")]
    Bind,
    #[error("send failed")]
    Send,
    #[error("transport not initialized")]
    NotInitialized,
    #[error("transport already running")]
    AlreadyRunning,
    #[error("no callback provided")]
    CallbackMissing,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("failed to initialize device after retries")]
    InitFailed,

    #[error("no controllers detected")]
    NoControllersDetected,

    #[error("transport error: {0}")]
    TransportError(TransportErrorKind),

    #[error("malformed payload")]
    MalformedPayload,

    #[error("unknown payload kind: {0}")]
    UnknownPayloadKind(u8),

    #[error("operation not applicable in current mode")]
    NotApplicableInMode,

    #[error("encoder precondition violated for profile {0:?}")]
    EncoderPreconditionViolated(crate::trigger::TriggerProfile),

    #[error("underlying HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
