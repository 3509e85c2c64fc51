//! GazeMemory - lock-free reader for eye tracker telemetry in shared memory
//!
//! An external service publishes fixed-size gaze samples into a ring
//! buffer in POSIX shared memory. This library finds the segment through
//! a short handshake, validates its versioned header, and polls the ring
//! without ever blocking the producer.
//!
//! # Architecture
//!
//! - **Handshake**: ask the service for its version and segment name
//! - **Header**: probe the version, pick the layout, read the geometry
//! - **Ring**: follow the producer's counter, detect laps and torn reads
//!
//! # Example
//!
//! ```no_run
//! use gaze_memory::EyeTrackerReader;
//! use std::time::Duration;
//!
//! let mut reader = EyeTrackerReader::create(Duration::from_secs(5)).unwrap();
//! while let Some(sample) = reader.try_read_next() {
//!     println!("{} {}", sample.time, sample.gaze_event);
//! }
//! ```

pub mod error;
pub mod wire;
pub mod version;
pub mod shm;
pub mod header;
pub mod sample;
pub mod ring;
pub mod handshake;
pub mod reader;
pub mod bindings;

#[cfg(test)]
mod testing;

pub use error::{GazeError, InitFailure, InitStatus, Result};
pub use reader::{EyeTrackerReader, ReaderConfig};
pub use ring::{RingCursor, RingSource};
pub use sample::{GazeEvent, GazeSample};
pub use version::{Version, HIGHEST_SUPPORTED_SERVICE_VERSION, LOWEST_SUPPORTED_SERVICE_VERSION};
