//! Owns the device handle: connect/reconnect with bounded retry, writing
//! output reports, and probing for liveness.
//!
//! I/O goes through the `DeviceBackend`/`DeviceHandle` ports so the session
//! state machine is testable without real hardware, the way the teacher's
//! `DualSense::find_and_connect` wraps `hidapi` behind a narrow surface.

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::{AgentError, Result};
use crate::output::OUTPUT_REPORT_SIZE;

pub const MAX_RETRIES: u32 = 5;
pub const RETRY_DELAY_MS: u64 = 500;

const SONY_VENDOR_ID: u16 = 0x054C;
const DUALSENSE_PRODUCT_ID: u16 = 0x0CE6;
const DUALSENSE_EDGE_PRODUCT_ID: u16 = 0x0DF2;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// An open device handle, opaque to `DeviceSession` beyond this contract.
pub trait DeviceHandle: Send {
    fn write_output(&self, report: &[u8]) -> Result<()>;
    /// Non-blocking read of the input report; returns bytes read.
    fn read_input(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Enumerates and opens DualSense controllers.
pub trait DeviceBackend: Send {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;
    fn open(&self, info: &DeviceInfo) -> Result<Box<dyn DeviceHandle>>;
}

/// Production backend wrapping `hidapi`.
pub struct HidBackend;

struct HidHandle {
    device: hidapi::HidDevice,
}

// hidapi::HidDevice is not Sync by default on all platforms; writes and
// reads are always issued from the Agent's single owning thread, so a
// manual Send is sound as long as no two threads use the handle concurrently.
unsafe impl Send for HidHandle {}

impl DeviceHandle for HidHandle {
    fn write_output(&self, report: &[u8]) -> Result<()> {
        self.device.write(report)?;
        Ok(())
    }

    fn read_input(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.device.read_timeout(buf, 0)?;
        Ok(n)
    }
}

impl DeviceBackend for HidBackend {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let api = hidapi::HidApi::new()?;
        let infos = api
            .device_list()
            .filter(|d| {
                d.vendor_id() == SONY_VENDOR_ID
                    && (d.product_id() == DUALSENSE_PRODUCT_ID
                        || d.product_id() == DUALSENSE_EDGE_PRODUCT_ID)
            })
            .map(|d| DeviceInfo {
                path: d.path().to_string_lossy().to_string(),
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
            })
            .collect::<Vec<_>>();
        Ok(infos)
    }

    fn open(&self, info: &DeviceInfo) -> Result<Box<dyn DeviceHandle>> {
        let api = hidapi::HidApi::new()?;
        let path = std::ffi::CString::new(info.path.clone())
            .map_err(|_| AgentError::InitFailed)?;
        let device = api.open_path(&path)?;
        Ok(Box::new(HidHandle { device }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Closed,
}

/// Owns a device handle across its connected lifetime.
pub struct DeviceSession {
    backend: Box<dyn DeviceBackend>,
    handle: Option<Box<dyn DeviceHandle>>,
    state: SessionState,
}

impl DeviceSession {
    pub fn new(backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            handle: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Enumerates, opens the first controller found, retrying up to
    /// `MAX_RETRIES` times with `RETRY_DELAY_MS` between attempts.
    pub fn connect(&mut self) -> Result<()> {
        let mut last_err = AgentError::NoControllersDetected;
        for attempt in 1..=MAX_RETRIES {
            match self.try_connect_once() {
                Ok(()) => {
                    self.state = SessionState::Connected;
                    info!("DualSense controller connected");
                    return Ok(());
                }
                Err(e) => {
                    debug!("connect attempt {attempt} failed: {e}");
                    last_err = e;
                    thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
        error!("failed to connect after {MAX_RETRIES} attempts");
        Err(last_err)
    }

    fn try_connect_once(&mut self) -> Result<()> {
        let infos = self.backend.enumerate()?;
        let info = infos.first().ok_or(AgentError::NoControllersDetected)?;
        let handle = self.backend.open(info)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Reconnects using the same retry policy as `connect`.
    pub fn reconnect(&mut self) -> Result<()> {
        self.handle = None;
        self.state = SessionState::Disconnected;
        self.connect()
    }

    pub fn write(&self, report: &[u8; OUTPUT_REPORT_SIZE]) -> Result<()> {
        let handle = self.handle.as_ref().ok_or(AgentError::InitFailed)?;
        handle.write_output(report)
    }

    /// Non-blocking liveness probe; a failed read implicitly transitions the
    /// session to `Disconnected`.
    pub fn probe_input(&mut self) -> bool {
        let Some(handle) = self.handle.as_ref() else {
            return false;
        };
        let mut buf = [0u8; 64];
        match handle.read_input(&mut buf) {
            Ok(_) => true,
            Err(_) => {
                self.state = SessionState::Disconnected;
                false
            }
        }
    }

    pub fn close(&mut self) {
        self.handle = None;
        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct FakeHandleState {
        pub writes: Vec<Vec<u8>>,
        pub input_available: bool,
    }

    pub struct FakeHandle {
        pub state: Arc<Mutex<FakeHandleState>>,
    }

    impl DeviceHandle for FakeHandle {
        fn write_output(&self, report: &[u8]) -> Result<()> {
            self.state.lock().unwrap().writes.push(report.to_vec());
            Ok(())
        }

        fn read_input(&self, _buf: &mut [u8]) -> Result<usize> {
            if self.state.lock().unwrap().input_available {
                Ok(64)
            } else {
                Err(AgentError::InitFailed)
            }
        }
    }

    pub struct FakeBackend {
        pub has_device: bool,
        pub state: Arc<Mutex<FakeHandleState>>,
    }

    impl DeviceBackend for FakeBackend {
        fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
            if self.has_device {
                Ok(vec![DeviceInfo {
                    path: "fake".into(),
                    vendor_id: SONY_VENDOR_ID,
                    product_id: DUALSENSE_PRODUCT_ID,
                }])
            } else {
                Ok(vec![])
            }
        }

        fn open(&self, _info: &DeviceInfo) -> Result<Box<dyn DeviceHandle>> {
            Ok(Box::new(FakeHandle {
                state: Arc::clone(&self.state),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn connect_succeeds_when_device_present() {
        let state = Arc::new(Mutex::new(FakeHandleState {
            input_available: true,
            ..Default::default()
        }));
        let backend = FakeBackend {
            has_device: true,
            state,
        };
        let mut session = DeviceSession::new(Box::new(backend));
        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn probe_input_reflects_backend_availability() {
        let state = Arc::new(Mutex::new(FakeHandleState {
            input_available: true,
            ..Default::default()
        }));
        let backend = FakeBackend {
            has_device: true,
            state: Arc::clone(&state),
        };
        let mut session = DeviceSession::new(Box::new(backend));
        session.connect().unwrap();
        assert!(session.probe_input());

        state.lock().unwrap().input_available = false;
        assert!(!session.probe_input());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn write_reaches_backend() {
        let state = Arc::new(Mutex::new(FakeHandleState {
            input_available: true,
            ..Default::default()
        }));
        let backend = FakeBackend {
            has_device: true,
            state: Arc::clone(&state),
        };
        let mut session = DeviceSession::new(Box::new(backend));
        session.connect().unwrap();
        let report = [7u8; OUTPUT_REPORT_SIZE];
        session.write(&report).unwrap();
        assert_eq!(state.lock().unwrap().writes.len(), 1);
    }

    #[test]
    fn close_clears_handle() {
        let state = Arc::new(Mutex::new(FakeHandleState {
            input_available: true,
            ..Default::default()
        }));
        let backend = FakeBackend {
            has_device: true,
            state,
        };
        let mut session = DeviceSession::new(Box::new(backend));
        session.connect().unwrap();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.write(&[0u8; OUTPUT_REPORT_SIZE]).is_err());
    }
}
