//! Handshake with the eye tracker service
//!
//! Before the shared segment can be opened the client asks the service
//! for its version and the segment name over a message-oriented local
//! socket. One request frame, one response frame:
//!
//! - request:  `message_type: u32 = 0`
//! - response: `message_type: u32 = 1`, `version: 3 x u32`,
//!   `shared_buffer_path: [u8; 1008]` NUL terminated
//!
//! All integers are little-endian.

use crate::error::{GazeError, Result};
use crate::version::Version;
use crate::wire;
use rustix::fd::OwnedFd;
use rustix::io::Errno;
use rustix::net::{
    connect_unix, recv, send, socket, sockopt, AddressFamily, RecvFlags, SendFlags,
    SocketAddrUnix, SocketType,
};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Size of every handshake frame buffer
pub const MAX_MESSAGE_LEN: usize = 1024;

const MESSAGE_TYPE_SIZE: usize = 4;
const PATH_OFFSET: usize = MESSAGE_TYPE_SIZE + Version::WIRE_SIZE;

/// Capacity of the response's path field
pub const SHARED_BUFFER_PATH_LEN: usize = MAX_MESSAGE_LEN - PATH_OFFSET;

/// Longest socket timeout handed to the kernel
const MAX_SOCKET_TIMEOUT: Duration = Duration::from_secs(i32::MAX as u64);

/// Frame discriminators
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ServiceInfoRequest = 0,
    ServiceInfoResponse = 1,
}

/// What the service told us about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_version: Version,
    pub shared_buffer_name: String,
}

/// Encode a service info request; returns the frame length
pub fn encode_request(out: &mut [u8]) -> usize {
    wire::encode(MessageType::ServiceInfoRequest as u32, out, 0);
    MESSAGE_TYPE_SIZE
}

/// Parse a service info response frame
pub fn decode_response(received: &[u8]) -> Result<ServiceInfo> {
    if received.len() < MESSAGE_TYPE_SIZE {
        return Err(GazeError::MalformedFrame(format!(
            "expected at least {} bytes, got {}",
            MESSAGE_TYPE_SIZE,
            received.len()
        )));
    }
    if received.len() > MAX_MESSAGE_LEN {
        return Err(GazeError::MalformedFrame(format!(
            "frame of {} bytes exceeds {} bytes",
            received.len(),
            MAX_MESSAGE_LEN
        )));
    }

    // Short frames are zero padded like a fresh receive buffer
    let mut frame = [0u8; MAX_MESSAGE_LEN];
    frame[..received.len()].copy_from_slice(received);

    let message_type: u32 = wire::decode(&frame, 0);
    if message_type != MessageType::ServiceInfoResponse as u32 {
        return Err(GazeError::InvalidMessageType(message_type));
    }
    if received.len() < PATH_OFFSET {
        return Err(GazeError::MalformedFrame(format!(
            "response of {} bytes is missing the version field",
            received.len()
        )));
    }

    let service_version: Version = wire::decode(&frame, MESSAGE_TYPE_SIZE);

    let path = &frame[PATH_OFFSET..];
    let end = path
        .iter()
        .position(|&b| b == 0)
        .ok_or(GazeError::MissingTerminator)?;
    let shared_buffer_name = std::str::from_utf8(&path[..end])
        .map_err(|_| GazeError::MalformedFrame("shared buffer path is not UTF-8".into()))?
        .to_string();
    if shared_buffer_name.is_empty() {
        return Err(GazeError::MalformedFrame("shared buffer path is empty".into()));
    }

    Ok(ServiceInfo {
        service_version,
        shared_buffer_name,
    })
}

/// Deadline plus caller predicate, checked around blocking steps
pub struct Cancellation<'a> {
    deadline: Option<Instant>,
    should_cancel: &'a dyn Fn() -> bool,
}

impl<'a> Cancellation<'a> {
    /// A timeout too large to represent as an instant means no deadline
    pub fn new(timeout: Option<Duration>, should_cancel: &'a dyn Fn() -> bool) -> Self {
        Self {
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
            should_cancel,
        }
    }

    /// `Timeout` once the deadline passed, `Cancelled` if the caller asks
    pub fn check(&self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(GazeError::Timeout);
            }
        }
        if (self.should_cancel)() {
            return Err(GazeError::Cancelled);
        }
        Ok(())
    }

    /// Time left until the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Duplex, message-preserving channel to the service
pub trait MessageChannel {
    /// Send one whole frame
    fn send_message(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Receive one whole frame into `buf`; returns its length
    fn recv_message(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// `SOCK_SEQPACKET` Unix socket to the service
pub struct PipeChannel {
    fd: OwnedFd,
}

impl PipeChannel {
    /// Connect to the endpoint at `path`
    pub fn connect(path: &Path, timeout: Option<Duration>) -> Result<Self> {
        let unavailable = |source: io::Error| GazeError::HandshakeUnavailable {
            path: path.display().to_string(),
            source,
        };

        let addr = SocketAddrUnix::new(path).map_err(|e| unavailable(e.into()))?;
        let fd = socket(AddressFamily::UNIX, SocketType::SEQPACKET, None)
            .map_err(|e| unavailable(e.into()))?;

        if let Some(timeout) = timeout {
            let timeout = socket_timeout(timeout);
            sockopt::set_socket_timeout(&fd, sockopt::Timeout::Recv, Some(timeout))
                .map_err(|e| unavailable(e.into()))?;
            sockopt::set_socket_timeout(&fd, sockopt::Timeout::Send, Some(timeout))
                .map_err(|e| unavailable(e.into()))?;
        }

        match connect_unix(&fd, &addr) {
            Ok(()) => Ok(Self { fd }),
            Err(e) if e == Errno::AGAIN || e == Errno::WOULDBLOCK => Err(GazeError::HandshakeBusy),
            Err(e) => Err(unavailable(e.into())),
        }
    }
}

/// Clamp a timeout to what `SO_RCVTIMEO`/`SO_SNDTIMEO` accept
///
/// Sub-microsecond remainders are dropped; rounding them up can produce
/// `tv_usec == 1_000_000`, which the kernel rejects with `EDOM`. A zero
/// timeout would mean "block forever", so the floor is 1 ms.
fn socket_timeout(timeout: Duration) -> Duration {
    let micros = timeout.min(MAX_SOCKET_TIMEOUT).as_micros() as u64;
    Duration::from_micros(micros).max(Duration::from_millis(1))
}

impl MessageChannel for PipeChannel {
    fn send_message(&mut self, frame: &[u8]) -> io::Result<()> {
        let sent = send(&self.fd, frame, SendFlags::empty())?;
        if sent != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, frame.len()),
            ));
        }
        Ok(())
    }

    fn recv_message(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(recv(&self.fd, buf, RecvFlags::empty())?)
    }
}

/// Request/response client; exchanges are serialized
pub struct HandshakeClient<C = PipeChannel> {
    channel: Mutex<C>,
}

impl HandshakeClient<PipeChannel> {
    /// Open the endpoint, checking for cancellation before and after the
    /// blocking connect
    pub fn connect(path: &Path, cancel: &Cancellation<'_>) -> Result<Self> {
        cancel.check()?;
        let channel = PipeChannel::connect(path, cancel.remaining());
        cancel.check()?;
        Ok(Self::from_channel(channel?))
    }
}

impl<C: MessageChannel> HandshakeClient<C> {
    pub fn from_channel(channel: C) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    /// Ask the service for its version and shared buffer name
    pub fn service_info(&self) -> Result<ServiceInfo> {
        let mut channel = self.channel.lock().unwrap_or_else(|e| e.into_inner());

        let mut request = [0u8; MAX_MESSAGE_LEN];
        let len = encode_request(&mut request);
        channel
            .send_message(&request[..len])
            .map_err(map_exchange_error)?;

        // One spare byte detects frames longer than the protocol allows
        let mut response = [0u8; MAX_MESSAGE_LEN + 1];
        let received = channel
            .recv_message(&mut response)
            .map_err(map_exchange_error)?;

        decode_response(&response[..received]).map_err(|e| {
            warn!(error = %e, "Service sent an invalid handshake response");
            e
        })
    }
}

fn map_exchange_error(err: io::Error) -> GazeError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => GazeError::Timeout,
        _ => GazeError::HandshakeIo(err),
    }
}

/// Connect and run the service info exchange
pub fn connect(path: &Path, cancel: &Cancellation<'_>) -> Result<ServiceInfo> {
    let client = HandshakeClient::connect(path, cancel)?;
    let info = client.service_info()?;
    debug!(
        service_version = %info.service_version,
        shared_buffer = %info.shared_buffer_name,
        "Handshake completed"
    );
    Ok(info)
}

/// Whether a handshake endpoint exists at `path`
pub fn is_service_available(path: &Path) -> bool {
    match rustix::fs::stat(path) {
        Ok(stat) => rustix::fs::FileType::from_raw_mode(stat.st_mode) == rustix::fs::FileType::Socket,
        Err(_) => false,
    }
}
