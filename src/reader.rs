//! High-level eye tracker reader
//!
//! Runs the handshake, opens and validates the shared segment, and then
//! polls the ring. Creation failures are reported as an `InitFailure`
//! (status code + message); reads never fail, they just return `None`.

use crate::error::{GazeError, InitFailure, Result};
use crate::handshake::{self, Cancellation, ServiceInfo};
use crate::header::{Geometry, SharedHeader};
use crate::ring::{RingCursor, SharedRing};
use crate::sample::GazeSample;
use crate::shm::GazeShm;
use crate::version::Version;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Where the service listens for handshakes unless configured otherwise
pub const DEFAULT_HANDSHAKE_PATH: &str = "/tmp/gaze-desktop-service.sock";

/// Default bound on reader creation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Socket the service answers handshakes on
    pub handshake_path: PathBuf,
    /// Upper bound on the whole creation sequence
    pub timeout: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            handshake_path: PathBuf::from(DEFAULT_HANDSHAKE_PATH),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ReaderConfig {
    pub fn with_handshake_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.handshake_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Single-consumer reader of the service's sample ring
///
/// Reads move the cursor and take `&mut self`; callers sharing a reader
/// across threads wrap it in their own lock.
pub struct EyeTrackerReader {
    // Views unmap before the segment handle closes
    ring: SharedRing,
    cursor: RingCursor,
    service_version: Version,
    _segment: GazeShm,
}

impl EyeTrackerReader {
    /// Connect with the default configuration and the given timeout
    pub fn create(timeout: Duration) -> std::result::Result<Self, InitFailure> {
        Self::create_with_config(&ReaderConfig::default().with_timeout(timeout))
    }

    pub fn create_with_config(config: &ReaderConfig) -> std::result::Result<Self, InitFailure> {
        Self::create_with_cancel(config, || false)
    }

    /// Connect, aborting with `Cancelled` once `should_cancel` returns true
    pub fn create_with_cancel<F>(
        config: &ReaderConfig,
        should_cancel: F,
    ) -> std::result::Result<Self, InitFailure>
    where
        F: Fn() -> bool,
    {
        let cancel = Cancellation::new(Some(config.timeout), &should_cancel);
        Self::init(config, &cancel).map_err(|e| {
            warn!(status = ?e.status(), error = %e, "Failed to create eye tracker reader");
            InitFailure::from(e)
        })
    }

    /// Attach to a segment by name, skipping the handshake
    pub fn attach(segment_name: &str) -> std::result::Result<Self, InitFailure> {
        Self::open_segment(segment_name, None).map_err(InitFailure::from)
    }

    fn init(config: &ReaderConfig, cancel: &Cancellation<'_>) -> Result<Self> {
        let ServiceInfo {
            service_version,
            shared_buffer_name,
        } = handshake::connect(&config.handshake_path, cancel)?;
        service_version.check_supported()?;
        cancel.check()?;

        Self::open_segment(&shared_buffer_name, Some(service_version))
    }

    fn open_segment(name: &str, service_version: Option<Version>) -> Result<Self> {
        let segment = GazeShm::open(name)?;
        let header = SharedHeader::open(&segment)?;

        let buffer_size = header.buffer_size() as usize;
        if segment.size() < buffer_size {
            return Err(GazeError::SegmentTooSmall {
                needed: buffer_size,
                actual: segment.size(),
            });
        }
        let buffer = segment.map(buffer_size)?;

        let service_version = service_version.unwrap_or_else(|| header.version());
        debug!(
            segment = segment.name(),
            %service_version,
            header_version = %header.version(),
            "Eye tracker reader ready"
        );

        Ok(Self {
            ring: SharedRing::new(header, buffer),
            cursor: RingCursor::new(),
            service_version,
            _segment: segment,
        })
    }

    /// Next unread sample, in order
    #[inline]
    pub fn try_read_next(&mut self) -> Option<GazeSample> {
        self.cursor.try_read_next(&self.ring)
    }

    /// Newest sample, skipping any unread backlog
    #[inline]
    pub fn try_read_latest(&mut self) -> Option<GazeSample> {
        self.cursor.try_read_latest(&self.ring)
    }

    /// True when a sample newer than the last one read has been published
    #[inline]
    pub fn is_data_available(&self) -> bool {
        self.cursor.is_data_available(&self.ring)
    }

    /// Version reported by the service (or the header when attached directly)
    pub fn service_version(&self) -> Version {
        self.service_version
    }

    pub fn header_version(&self) -> Version {
        self.ring.header().version()
    }

    pub fn geometry(&self) -> Geometry {
        self.ring.header().geometry()
    }

    /// Whether the service's handshake endpoint exists
    pub fn is_service_available(config: &ReaderConfig) -> bool {
        handshake::is_service_available(&config.handshake_path)
    }
}
