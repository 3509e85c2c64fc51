//! Service and layout versions

use crate::error::{GazeError, Result};
use crate::wire::WireValue;
use std::fmt;

/// Oldest service version this library can talk to
pub const LOWEST_SUPPORTED_SERVICE_VERSION: Version = Version::new(0, 0, 1);

/// First service version this library can no longer talk to (exclusive)
pub const HIGHEST_SUPPORTED_SERVICE_VERSION: Version = Version::new(1, 0, 0);

/// `major.minor.patch`, ordered lexicographically
///
/// The derived ordering compares fields in declaration order, so
/// `major` dominates `minor` which dominates `patch`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Encoded width: three packed u32 fields
    pub const WIRE_SIZE: usize = 12;

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Check against the supported range `[lowest, highest)`
    pub fn check_supported(&self) -> Result<()> {
        if *self < LOWEST_SUPPORTED_SERVICE_VERSION {
            return Err(GazeError::VersionTooLow {
                found: *self,
                lowest: LOWEST_SUPPORTED_SERVICE_VERSION,
            });
        }
        if *self >= HIGHEST_SUPPORTED_SERVICE_VERSION {
            return Err(GazeError::VersionTooHigh {
                found: *self,
                highest: HIGHEST_SUPPORTED_SERVICE_VERSION,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl WireValue for Version {
    const SIZE: usize = Self::WIRE_SIZE;

    fn from_host_bytes(bytes: &[u8]) -> Self {
        Self {
            major: u32::from_host_bytes(&bytes[0..4]),
            minor: u32::from_host_bytes(&bytes[4..8]),
            patch: u32::from_host_bytes(&bytes[8..12]),
        }
    }

    fn write_host_bytes(self, out: &mut [u8]) {
        self.major.write_host_bytes(&mut out[0..4]);
        self.minor.write_host_bytes(&mut out[4..8]);
        self.patch.write_host_bytes(&mut out[8..12]);
    }

    fn swap_order(self) -> Self {
        Self {
            major: self.major.swap_bytes(),
            minor: self.minor.swap_bytes(),
            patch: self.patch.swap_bytes(),
        }
    }
}
