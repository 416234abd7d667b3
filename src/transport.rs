//! Loopback-only UDP transport used to carry `wire::Payload` datagrams
//! between a client and server agent on the same machine.
//!
//! The reference implementation cancels its receive loop with a Windows
//! `WSAEVENT` signalled alongside the socket in `WSAWaitForMultipleEvents`.
//! There is no portable equivalent, so this transport instead gives the
//! receiver socket a short read timeout and checks an `AtomicBool` flag on
//! every tick; `stop_server` also fires a zero-length wake datagram at the
//! socket so the thread doesn't wait out the last tick before noticing.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AgentError, Result, TransportErrorKind};

pub const MAX_PAYLOAD_SIZE: usize = 1024;
const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const LOOPBACK: &str = "127.0.0.1";

pub type RecvCallback = Box<dyn Fn(&[u8]) + Send + 'static>;

struct ServerHandle {
    cancel: Arc<AtomicBool>,
    port: u16,
    join: Option<JoinHandle<()>>,
}

/// A UDP endpoint that is either an idle client socket or a running server
/// with a dedicated receive thread.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    server: Option<ServerHandle>,
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    pub fn new() -> Self {
        Self {
            socket: None,
            server: None,
        }
    }

    /// Binds a client-side socket used only for `send`.
    pub fn start_client(&mut self, _port: u16) -> Result<()> {
        let socket = UdpSocket::bind((LOOPBACK, 0))
            .map_err(|_| AgentError::TransportError(TransportErrorKind::Bind))?;
        self.socket = Some(socket);
        Ok(())
    }

    /// Sends a datagram to the given port on the loopback interface.
    pub fn send(&self, port: u16, bytes: &[u8]) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(AgentError::TransportError(TransportErrorKind::NotInitialized))?;
        let dest: SocketAddr = format!("{LOOPBACK}:{port}")
            .parse()
            .expect("loopback address is always valid");
        socket
            .send_to(bytes, dest)
            .map_err(|_| AgentError::TransportError(TransportErrorKind::Send))?;
        Ok(())
    }

    /// Binds to `port` and spawns a native thread that invokes `callback`
    /// for every received datagram until `stop_server` is called.
    pub fn start_server(&mut self, port: u16, callback: RecvCallback) -> Result<()> {
        if self.server.is_some() {
            return Err(AgentError::TransportError(TransportErrorKind::AlreadyRunning));
        }
        let socket = UdpSocket::bind((LOOPBACK, port))
            .map_err(|_| AgentError::TransportError(TransportErrorKind::Bind))?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|_| AgentError::TransportError(TransportErrorKind::SocketCreate))?;

        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);
        let bound_port = socket
            .local_addr()
            .map_err(|_| AgentError::TransportError(TransportErrorKind::SocketCreate))?
            .port();

        let join = thread::spawn(move || {
            let mut buf = [0u8; MAX_PAYLOAD_SIZE];
            while !thread_cancel.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf) {
                    Ok((0, _)) => {
                        // wake datagram from stop_server; loop to re-check cancel
                    }
                    Ok((n, _)) => callback(&buf[..n]),
                    Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                        continue;
                    }
                    Err(e) => {
                        warn!("udp receive error: {e}");
                        continue;
                    }
                }
            }
            debug!("udp server thread exiting");
        });

        self.server = Some(ServerHandle {
            cancel,
            port: bound_port,
            join: Some(join),
        });
        Ok(())
    }

    /// Signals the receive thread to stop, wakes it with an empty datagram,
    /// and joins it. Idempotent: calling it with no server running is a no-op.
    pub fn stop_server(&mut self) {
        let Some(mut handle) = self.server.take() else {
            return;
        };
        handle.cancel.store(true, Ordering::SeqCst);
        if let Ok(waker) = UdpSocket::bind((LOOPBACK, 0)) {
            let _ = waker.send_to(&[], (LOOPBACK, handle.port));
        }
        if let Some(join) = handle.join.take() {
            let _ = join.join();
        }
    }

    /// Drops the client socket. Idempotent.
    pub fn stop_client(&mut self) {
        self.socket = None;
    }

    pub fn is_server_running(&self) -> bool {
        self.server.is_some()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop_server();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn client_send_reaches_server_callback() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let mut server = UdpTransport::new();
        server
            .start_server(0, Box::new(move |bytes| {
                let _ = tx.send(bytes.to_vec());
            }))
            .unwrap();
        let port = server.server.as_ref().unwrap().port;

        let mut client = UdpTransport::new();
        client.start_client(port).unwrap();
        client.send(port, &[0xAA, 0xBB]).unwrap();

        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, vec![0xAA, 0xBB]);

        server.stop_server();
    }

    #[test]
    fn stop_server_is_idempotent() {
        let mut server = UdpTransport::new();
        server.start_server(0, Box::new(|_| {})).unwrap();
        server.stop_server();
        server.stop_server();
        assert!(!server.is_server_running());
    }

    #[test]
    fn starting_server_twice_errors() {
        let mut server = UdpTransport::new();
        server.start_server(0, Box::new(|_| {})).unwrap();
        let err = server.start_server(0, Box::new(|_| {})).unwrap_err();
        assert!(matches!(
            err,
            AgentError::TransportError(TransportErrorKind::AlreadyRunning)
        ));
        server.stop_server();
    }

    #[test]
    fn send_without_client_socket_errors() {
        let transport = UdpTransport::new();
        let err = transport.send(12345, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            AgentError::TransportError(TransportErrorKind::NotInitialized)
        ));
    }

    #[test]
    fn stop_server_unblocks_thread_promptly() {
        let mut server = UdpTransport::new();
        server.start_server(0, Box::new(|_| {})).unwrap();
        let start = std::time::Instant::now();
        server.stop_server();
        assert!(start.elapsed() < Duration::from_millis(900));
    }
}
