//! DualSense adaptive-trigger agent
//!
//! Exposes the adaptive-trigger feature of the Sony DualSense gamepad
//! through one API usable in three operating modes: solo (direct device
//! access), server (owns the device on behalf of bound clients), and
//! client (forwards requests to a server over loopback UDP).

pub mod agent;
pub mod config;
pub mod device;
pub mod error;
pub mod output;
pub mod transport;
pub mod trigger;
pub mod wire;

pub use agent::{Agent, AgentMode};
pub use config::AgentConfig;
pub use device::{DeviceBackend, HidBackend};
pub use error::{AgentError, Result};
pub use output::{Side, TriggerSetting};
pub use trigger::TriggerProfile;
