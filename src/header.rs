//! Shared memory header protocol
//!
//! The service places a version-tagged header at the start of the segment.
//! The version is probed first through a 12-byte mapping, then the layout
//! registered for that version range is parsed. Only v1 exists today:
//!
//! | offset | field             | type            |
//! |--------|-------------------|-----------------|
//! | 0      | `version`         | 3 x u32         |
//! | 12     | `header_size`     | u32             |
//! | 16     | `buffer_size`     | u32             |
//! | 20     | `sample_size`     | u32             |
//! | 24     | `samples_written` | u32, live       |

use crate::error::{GazeError, Result};
use crate::sample::GazeSample;
use crate::shm::{GazeShm, ShmView};
use crate::version::{Version, HIGHEST_SUPPORTED_SERVICE_VERSION, LOWEST_SUPPORTED_SERVICE_VERSION};
use crate::wire;
use std::sync::atomic::{fence, Ordering};
use tracing::{debug, trace};

/// Size of the packed v1 header record
pub const HEADER_V1_SIZE: usize = 28;

const HEADER_SIZE_OFFSET: usize = 12;
const BUFFER_SIZE_OFFSET: usize = 16;
const SAMPLE_SIZE_OFFSET: usize = 20;
const SAMPLES_WRITTEN_OFFSET: usize = 24;

/// Header layouts the library knows how to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    V1,
}

/// Layouts keyed by the half-open version range `[from, until)` they cover.
/// A new layout is added here together with a `SharedHeader` variant.
const LAYOUTS: &[(Version, Version, Layout)] = &[(
    LOWEST_SUPPORTED_SERVICE_VERSION,
    HIGHEST_SUPPORTED_SERVICE_VERSION,
    Layout::V1,
)];

fn layout_for(version: Version) -> Option<Layout> {
    LAYOUTS
        .iter()
        .find(|(from, until, _)| *from <= version && version < *until)
        .map(|(_, _, layout)| *layout)
}

/// Ring geometry described by a header, immutable after parsing
///
/// Only `Geometry::new` builds one, so `sample_count` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    header_size: u32,
    buffer_size: u32,
    sample_size: u32,
    sample_count: u32,
}

impl Geometry {
    /// Validate raw header fields and derive the slot count
    pub fn new(header_size: u32, buffer_size: u32, sample_size: u32) -> Result<Self> {
        if sample_size == 0 {
            return Err(GazeError::InvalidHeader("sample size is zero".into()));
        }
        if buffer_size <= header_size {
            return Err(GazeError::InvalidHeader(format!(
                "buffer size {} does not exceed header size {}",
                buffer_size, header_size
            )));
        }
        if (header_size as usize) < HEADER_V1_SIZE {
            return Err(GazeError::InvalidHeader(format!(
                "header size {} is smaller than the {}-byte header record",
                header_size, HEADER_V1_SIZE
            )));
        }
        if (sample_size as usize) < GazeSample::WIRE_SIZE {
            return Err(GazeError::InvalidHeader(format!(
                "sample size {} is smaller than the {}-byte sample record",
                sample_size,
                GazeSample::WIRE_SIZE
            )));
        }
        let data_size = buffer_size - header_size;
        if data_size % sample_size != 0 {
            return Err(GazeError::InvalidHeader(format!(
                "data region of {} bytes is not a multiple of sample size {}",
                data_size, sample_size
            )));
        }
        Ok(Self {
            header_size,
            buffer_size,
            sample_size,
            sample_count: data_size / sample_size,
        })
    }

    #[inline(always)]
    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    #[inline(always)]
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    #[inline(always)]
    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }

    /// Number of slots in the ring, at least one
    #[inline(always)]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Byte offset of the slot holding sample `index`
    #[inline(always)]
    pub fn slot_offset(&self, index: u32) -> usize {
        let slot = (index % self.sample_count) as usize;
        self.header_size as usize + self.sample_size as usize * slot
    }
}

/// Read the version tag through a transient 12-byte mapping
pub fn probe_version(segment: &GazeShm) -> Result<Version> {
    let view = segment.map(Version::WIRE_SIZE)?;
    let mut raw = [0u8; Version::WIRE_SIZE];
    view.read_into(0, &mut raw);
    Ok(wire::decode(&raw, 0))
}

/// Parsed v1 header; keeps its mapping to re-read the live counter
pub struct HeaderV1 {
    view: ShmView,
    version: Version,
    geometry: Geometry,
}

impl HeaderV1 {
    fn open(segment: &GazeShm, version: Version) -> Result<Self> {
        let view = segment.map(HEADER_V1_SIZE)?;
        let mut raw = [0u8; HEADER_V1_SIZE];
        view.read_into(0, &mut raw);

        let header_size: u32 = wire::decode(&raw, HEADER_SIZE_OFFSET);
        let buffer_size: u32 = wire::decode(&raw, BUFFER_SIZE_OFFSET);
        let sample_size: u32 = wire::decode(&raw, SAMPLE_SIZE_OFFSET);
        let geometry = Geometry::new(header_size, buffer_size, sample_size)?;

        Ok(Self {
            view,
            version,
            geometry,
        })
    }

    #[inline]
    fn samples_written(&self) -> u32 {
        let mut raw = [0u8; 4];
        self.view.read_into(SAMPLES_WRITTEN_OFFSET, &mut raw);
        fence(Ordering::Acquire);
        wire::decode(&raw, 0)
    }
}

/// Header of the shared segment, one variant per supported layout
pub enum SharedHeader {
    V1(HeaderV1),
}

impl SharedHeader {
    /// Probe the version, gate it, and parse the matching layout
    pub fn open(segment: &GazeShm) -> Result<Self> {
        let version = probe_version(segment)?;
        trace!(%version, segment = segment.name(), "Probed shared memory header version");
        version.check_supported()?;

        let header = match layout_for(version) {
            Some(Layout::V1) => SharedHeader::V1(HeaderV1::open(segment, version)?),
            None => {
                return Err(GazeError::InvalidHeader(format!(
                    "no header layout registered for version {}",
                    version
                )))
            }
        };

        let geometry = header.geometry();
        debug!(
            %version,
            header_size = geometry.header_size(),
            buffer_size = geometry.buffer_size(),
            sample_size = geometry.sample_size(),
            sample_count = geometry.sample_count(),
            "Parsed shared memory header"
        );
        Ok(header)
    }

    pub fn version(&self) -> Version {
        match self {
            SharedHeader::V1(h) => h.version,
        }
    }

    pub fn geometry(&self) -> Geometry {
        match self {
            SharedHeader::V1(h) => h.geometry,
        }
    }

    /// Fresh read of the producer's counter; never cached
    #[inline]
    pub fn samples_written(&self) -> u32 {
        match self {
            SharedHeader::V1(h) => h.samples_written(),
        }
    }

    #[inline(always)]
    pub fn header_size(&self) -> u32 {
        self.geometry().header_size()
    }

    #[inline(always)]
    pub fn sample_size(&self) -> u32 {
        self.geometry().sample_size()
    }

    #[inline(always)]
    pub fn sample_count(&self) -> u32 {
        self.geometry().sample_count()
    }

    #[inline(always)]
    pub fn buffer_size(&self) -> u32 {
        self.geometry().buffer_size()
    }
}
