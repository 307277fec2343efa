use std::{
    io::{self, Read, Write},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use serialport::SerialPort;
use strum::Display;
use thiserror::Error;

use crate::config::LinkConfig;

pub mod protocol;

/* === Definitions === */

/// Exclusive owner of the serial device and its lifecycle state.
///
/// Every operation takes the single internal lock, so the operator command
/// path and the telemetry pump never touch the device concurrently.
pub struct LinkChannel {
    connector: Box<dyn Connector>,
    generation: AtomicU64,
    shared: Mutex<Shared>,
}

struct Shared {
    state: LinkState,
    transport: Option<Box<dyn Transport>>,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
pub enum LinkState {
    Closed,
    Open,
    Faulted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenOutcome {
    Opened,
    AlreadyOpen,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial device unavailable: {0}")]
    Unavailable(String),

    #[error("link not open")]
    NotOpen,

    #[error("serial write timed out")]
    WriteTimeout,

    #[error("link disconnected: {0}")]
    Disconnected(String),
}

/// Byte-level surface of the physical device, factored out so the pipeline
/// can run against an in-memory port in tests.
pub trait Transport: Send {
    /// Appends all currently pending bytes to `buf` without blocking.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;

    /// Writes the whole buffer within the configured timeout.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Transport>, LinkError>;
}

/* === Implementations === */

impl LinkChannel {
    pub fn serial(config: &LinkConfig) -> Self {
        Self::with_connector(Box::new(SerialConnector::from_config(config)))
    }

    pub fn with_connector(connector: Box<dyn Connector>) -> Self {
        LinkChannel {
            connector,
            generation: AtomicU64::new(0),
            shared: Mutex::new(Shared {
                state: LinkState::Closed,
                transport: None,
            }),
        }
    }

    /// Acquires the device. Reopening an already open link is a no-op
    /// reported through [`OpenOutcome::AlreadyOpen`].
    pub fn open(&self) -> Result<OpenOutcome, LinkError> {
        let mut shared = self.lock();

        if shared.state == LinkState::Open {
            return Ok(OpenOutcome::AlreadyOpen);
        }

        shared.transport = Some(self.connector.connect()?);
        shared.state = LinkState::Open;

        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Link opened");

        Ok(OpenOutcome::Opened)
    }

    /// Releases the device. Idempotent and safe from any state, including
    /// `Faulted`.
    pub fn close(&self) {
        let mut shared = self.lock();

        if shared.transport.take().is_some() {
            tracing::info!("Link closed");
        }

        shared.state = LinkState::Closed;
    }

    /// Writes one complete frame. Either the full buffer is written or the
    /// operation fails and the link transitions to `Faulted`.
    pub fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut shared = self.lock();

        let Some(transport) = shared.open_transport() else {
            return Err(LinkError::NotOpen);
        };

        match transport.write_all(bytes) {
            Ok(()) => Ok(()),

            Err(err) => {
                tracing::warn!("Link write failed: {err}");
                shared.fault();

                Err(match err.kind() {
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::WriteTimeout,
                    _ => LinkError::Disconnected(err.to_string()),
                })
            }
        }
    }

    /// Appends any pending bytes to `buf` without blocking and returns the
    /// count added. A read failure flips the link to `Faulted` instead of
    /// raising, so callers can tell a quiet device from a lost link.
    pub fn poll_available(&self, buf: &mut Vec<u8>) -> usize {
        let mut shared = self.lock();

        let Some(transport) = shared.open_transport() else {
            return 0;
        };

        match transport.read_available(buf) {
            Ok(count) => count,

            Err(err) => {
                tracing::warn!("Link read failed: {err}");
                shared.fault();
                0
            }
        }
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    /// Monotonic count of successful opens. Consumers compare snapshots to
    /// detect a reopen and reset any per-connection decode state.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Shared {
    fn open_transport(&mut self) -> Option<&mut Box<dyn Transport>> {
        match self.state {
            LinkState::Open => self.transport.as_mut(),
            _ => None,
        }
    }

    fn fault(&mut self) {
        self.state = LinkState::Faulted;
        self.transport = None;
    }
}

/* == Serial transport == */

pub struct SerialConnector {
    path: String,
    baud_rate: u32,
    timeout: Duration,
}

struct SerialTransport(Box<dyn SerialPort>);

impl SerialConnector {
    pub fn from_config(config: &LinkConfig) -> Self {
        SerialConnector {
            path: config.port.clone(),
            baud_rate: config.baud_rate,
            timeout: config.write_timeout(),
        }
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<Box<dyn Transport>, LinkError> {
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(self.timeout)
            .open()
            .map_err(|err| LinkError::Unavailable(err.to_string()))?;

        Ok(Box::new(SerialTransport(port)))
    }
}

impl Transport for SerialTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let pending = self.0.bytes_to_read().map_err(io::Error::from)? as usize;

        if pending == 0 {
            return Ok(0);
        }

        let start = buf.len();
        buf.resize(start + pending, 0);

        let count = self.0.read(&mut buf[start..])?;
        buf.truncate(start + count);

        Ok(count)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_all(bytes)?;
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct FakePort {
        rx: Vec<u8>,
        tx: Vec<u8>,
        fail_with: Option<io::ErrorKind>,
    }

    type SharedPort = Arc<Mutex<FakePort>>;

    struct FakeTransport(SharedPort);

    struct FakeConnector {
        port: SharedPort,
        refuse: bool,
    }

    impl FakePort {
        fn check(&self) -> io::Result<()> {
            match self.fail_with {
                Some(kind) => Err(io::Error::new(kind, "fake port failure")),
                None => Ok(()),
            }
        }
    }

    impl Transport for FakeTransport {
        fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
            let mut port = self.0.lock().unwrap();

            port.check()?;
            buf.extend_from_slice(&port.rx);

            let count = port.rx.len();
            port.rx.clear();

            Ok(count)
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            let mut port = self.0.lock().unwrap();

            port.check()?;
            port.tx.extend_from_slice(bytes);

            Ok(())
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self) -> Result<Box<dyn Transport>, LinkError> {
            match self.refuse {
                true => Err(LinkError::Unavailable("device busy".to_owned())),
                false => Ok(Box::new(FakeTransport(self.port.clone()))),
            }
        }
    }

    fn fake_link() -> (LinkChannel, SharedPort) {
        let port = SharedPort::default();

        let link = LinkChannel::with_connector(Box::new(FakeConnector {
            port: port.clone(),
            refuse: false,
        }));

        (link, port)
    }

    #[test]
    fn test_lifecycle() {
        let (link, _port) = fake_link();
        assert_eq!(link.state(), LinkState::Closed);

        assert_eq!(link.open().unwrap(), OpenOutcome::Opened);
        assert_eq!(link.open().unwrap(), OpenOutcome::AlreadyOpen);
        assert_eq!(link.state(), LinkState::Open);

        link.close();
        assert_eq!(link.state(), LinkState::Closed);

        let mut buf = Vec::new();
        assert_eq!(link.poll_available(&mut buf), 0);
        assert_eq!(link.state(), LinkState::Closed);

        assert!(matches!(link.send(&[0x55]), Err(LinkError::NotOpen)));

        // Closing a closed link stays a no-op.
        link.close();
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[test]
    fn test_open_unavailable() {
        let link = LinkChannel::with_connector(Box::new(FakeConnector {
            port: SharedPort::default(),
            refuse: true,
        }));

        assert!(matches!(link.open(), Err(LinkError::Unavailable(_))));
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[test]
    fn test_send_writes_whole_frame() {
        let (link, port) = fake_link();
        link.open().unwrap();

        link.send(&[0x55, 0x01, 0x13, 0x88, 0xAA]).unwrap();

        assert_eq!(port.lock().unwrap().tx, [0x55, 0x01, 0x13, 0x88, 0xAA]);
    }

    #[test]
    fn test_poll_appends_pending_bytes() {
        let (link, port) = fake_link();
        link.open().unwrap();

        port.lock().unwrap().rx.extend_from_slice(&[0x55, 0x02]);

        let mut buf = vec![0x12];
        assert_eq!(link.poll_available(&mut buf), 2);
        assert_eq!(buf, [0x12, 0x55, 0x02]);

        // Nothing pending on the next poll.
        assert_eq!(link.poll_available(&mut buf), 0);
    }

    #[test]
    fn test_poll_faults_on_dropped_connection() {
        let (link, port) = fake_link();
        link.open().unwrap();

        port.lock().unwrap().fail_with = Some(io::ErrorKind::BrokenPipe);

        let mut buf = Vec::new();
        assert_eq!(link.poll_available(&mut buf), 0);
        assert_eq!(link.state(), LinkState::Faulted);

        // A faulted link can still be closed and reopened.
        link.close();
        assert_eq!(link.state(), LinkState::Closed);

        port.lock().unwrap().fail_with = None;
        assert_eq!(link.open().unwrap(), OpenOutcome::Opened);
    }

    #[test]
    fn test_send_timeout_faults() {
        let (link, port) = fake_link();
        link.open().unwrap();

        port.lock().unwrap().fail_with = Some(io::ErrorKind::TimedOut);

        assert!(matches!(
            link.send(&[0x55, 0x01, 0x00, 0x00, 0xAA]),
            Err(LinkError::WriteTimeout)
        ));

        assert_eq!(link.state(), LinkState::Faulted);
    }

    #[test]
    fn test_generation_counts_reopens() {
        let (link, _port) = fake_link();
        assert_eq!(link.generation(), 0);

        link.open().unwrap();
        assert_eq!(link.generation(), 1);

        // An already-open notice does not bump the generation.
        link.open().unwrap();
        assert_eq!(link.generation(), 1);

        link.close();
        link.open().unwrap();
        assert_eq!(link.generation(), 2);
    }
}
