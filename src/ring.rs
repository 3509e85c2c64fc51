//! Lock-free ring reader
//!
//! The service overwrites fixed-size slots in a circular buffer and bumps
//! `samples_written` after each slot is complete. The reader never blocks
//! the producer; it follows the counter with its own cursor and validates
//! every read after the fact.
//!
//! # Protocol
//! - Sample `n` lives in slot `n % sample_count`
//! - `samples_written == UNWRITTEN_SAMPLE_INDEX` means nothing was produced
//! - A cursor more than `sample_count` behind is moved to the oldest slot
//!   that can still hold valid data
//! - The counter is re-read after decoding; if the slot may have been
//!   overwritten meanwhile the read is retried, at most
//!   `MAX_READ_ATTEMPTS` more times

use crate::header::{Geometry, SharedHeader};
use crate::sample::GazeSample;
use crate::shm::ShmView;
use std::sync::atomic::{fence, Ordering};
use tracing::trace;

/// Cursor value before the first read
pub const UNREAD_SAMPLE_INDEX: u32 = 0;

/// Counter value published before the producer writes its first sample
pub const UNWRITTEN_SAMPLE_INDEX: u32 = u32::MAX;

/// Retries allowed after a torn read
pub const MAX_READ_ATTEMPTS: u32 = 10;

/// Memory the ring reader polls
pub trait RingSource {
    /// Geometry of the ring, fixed for the lifetime of the source
    fn geometry(&self) -> Geometry;

    /// Fresh read of the producer's counter
    fn samples_written(&self) -> u32;

    /// Decode the record stored at byte `offset`
    fn read_sample(&self, offset: usize) -> GazeSample;
}

/// Consumer-local read position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    last_sample_index: u32,
}

impl Default for RingCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl RingCursor {
    pub const fn new() -> Self {
        Self {
            last_sample_index: UNREAD_SAMPLE_INDEX,
        }
    }

    /// Index of the last sample handed out
    #[inline(always)]
    pub fn last_sample_index(&self) -> u32 {
        self.last_sample_index
    }

    /// True when the producer has published past the cursor
    #[inline]
    pub fn is_data_available<S: RingSource + ?Sized>(&self, source: &S) -> bool {
        let current = source.samples_written();
        current != UNWRITTEN_SAMPLE_INDEX && current != self.last_sample_index
    }

    /// Read the sample after the cursor
    ///
    /// Returns `None` when nothing new was published or when every attempt
    /// raced with the producer. Neither case is an error; poll again later.
    #[inline]
    pub fn try_read_next<S: RingSource + ?Sized>(&mut self, source: &S) -> Option<GazeSample> {
        let geometry = source.geometry();
        let sample_count = geometry.sample_count();

        for attempt in 0..=MAX_READ_ATTEMPTS {
            let current = source.samples_written();
            if current == UNWRITTEN_SAMPLE_INDEX {
                return None;
            }
            if current == self.last_sample_index {
                return None;
            }

            if current.wrapping_sub(self.last_sample_index) > sample_count {
                // Producer lapped us; skip to the oldest slot still intact
                self.last_sample_index = current.wrapping_sub(sample_count);
            }
            self.last_sample_index = self.last_sample_index.wrapping_add(1);

            let offset = geometry.slot_offset(self.last_sample_index);
            let sample = source.read_sample(offset);

            let after = source.samples_written();
            if after.wrapping_sub(self.last_sample_index) > sample_count {
                trace!(
                    attempt,
                    index = self.last_sample_index,
                    samples_written = after,
                    "Slot overwritten during read, retrying"
                );
                continue;
            }
            return Some(sample);
        }

        trace!(
            attempts = MAX_READ_ATTEMPTS + 1,
            "Producer outran reader on every attempt"
        );
        None
    }

    /// Skip any backlog and read the newest sample
    #[inline]
    pub fn try_read_latest<S: RingSource + ?Sized>(&mut self, source: &S) -> Option<GazeSample> {
        let latest = source.samples_written();
        if latest == UNWRITTEN_SAMPLE_INDEX {
            return None;
        }
        self.last_sample_index = self.last_sample_index.max(latest.wrapping_sub(1));
        self.try_read_next(source)
    }
}

/// Ring backed by a mapped shared memory segment
pub struct SharedRing {
    header: SharedHeader,
    buffer: ShmView,
}

impl SharedRing {
    /// `buffer` must map at least `header.buffer_size()` bytes
    pub fn new(header: SharedHeader, buffer: ShmView) -> Self {
        assert!(
            buffer.len() >= header.buffer_size() as usize,
            "ring buffer view smaller than header buffer size"
        );
        Self { header, buffer }
    }

    pub fn header(&self) -> &SharedHeader {
        &self.header
    }
}

impl RingSource for SharedRing {
    #[inline(always)]
    fn geometry(&self) -> Geometry {
        self.header.geometry()
    }

    #[inline(always)]
    fn samples_written(&self) -> u32 {
        self.header.samples_written()
    }

    #[inline]
    fn read_sample(&self, offset: usize) -> GazeSample {
        let mut raw = [0u8; GazeSample::WIRE_SIZE];
        self.buffer.read_into(offset, &mut raw);
        // Keep the slot read ahead of the counter re-check that follows
        fence(Ordering::Acquire);
        GazeSample::decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SharedHeader;
    use crate::shm::GazeShm;
    use crate::testing::{sample_for, TestSegment};
    use crate::version::Version;
    use std::cell::{Cell, RefCell};

    /// In-process ring whose counter can be scripted per read
    struct ScriptedRing {
        geometry: Geometry,
        slots: RefCell<Vec<GazeSample>>,
        counter: Cell<u32>,
        // Added to the counter after every counter read
        drift: Cell<u32>,
        counter_reads: Cell<u32>,
        sample_reads: Cell<u32>,
    }

    impl ScriptedRing {
        fn new(sample_count: u32) -> Self {
            let geometry = Geometry::new(28, 28 + 28 * sample_count, 28).unwrap();
            Self {
                geometry,
                slots: RefCell::new(vec![GazeSample::default(); sample_count as usize]),
                counter: Cell::new(UNWRITTEN_SAMPLE_INDEX),
                drift: Cell::new(0),
                counter_reads: Cell::new(0),
                sample_reads: Cell::new(0),
            }
        }

        fn publish(&self, index: u32) {
            let slot = (index % self.geometry.sample_count()) as usize;
            self.slots.borrow_mut()[slot] = sample_for(index);
            self.counter.set(index);
        }

        fn publish_through(&self, from: u32, to: u32) {
            for i in from..=to {
                self.publish(i);
            }
        }
    }

    impl RingSource for ScriptedRing {
        fn geometry(&self) -> Geometry {
            self.geometry
        }

        fn samples_written(&self) -> u32 {
            self.counter_reads.set(self.counter_reads.get() + 1);
            let value = self.counter.get();
            self.counter.set(value.wrapping_add(self.drift.get()));
            value
        }

        fn read_sample(&self, offset: usize) -> GazeSample {
            self.sample_reads.set(self.sample_reads.get() + 1);
            let slot = (offset - self.geometry.header_size() as usize) / self.geometry.sample_size() as usize;
            self.slots.borrow()[slot]
        }
    }

    #[test]
    fn test_nothing_written() {
        let ring = ScriptedRing::new(10);
        let mut cursor = RingCursor::new();
        assert!(!cursor.is_data_available(&ring));
        assert_eq!(cursor.try_read_next(&ring), None);
        assert_eq!(cursor.try_read_latest(&ring), None);
        assert_eq!(cursor.last_sample_index(), UNREAD_SAMPLE_INDEX);
        assert_eq!(ring.sample_reads.get(), 0);
    }

    #[test]
    fn test_sequential_reads_full_ring() {
        let n = 10;
        let ring = ScriptedRing::new(n);
        ring.publish_through(1, n);

        let mut cursor = RingCursor::new();
        for i in 1..=n {
            assert!(cursor.is_data_available(&ring));
            assert_eq!(cursor.try_read_next(&ring), Some(sample_for(i)));
        }
        assert_eq!(cursor.try_read_next(&ring), None);
        assert!(!cursor.is_data_available(&ring));
        assert_eq!(ring.sample_reads.get(), n);
    }

    #[test]
    fn test_interleaved_producer_and_reader() {
        let ring = ScriptedRing::new(4);
        let mut cursor = RingCursor::new();
        for i in 1..=50 {
            ring.publish(i);
            assert_eq!(cursor.try_read_next(&ring), Some(sample_for(i)));
            assert_eq!(cursor.try_read_next(&ring), None);
        }
    }

    #[test]
    fn test_overwrite_resumes_at_oldest_valid() {
        let n = 8;
        let ring = ScriptedRing::new(n);
        let mut cursor = RingCursor::new();

        ring.publish_through(1, 3);
        assert_eq!(cursor.try_read_next(&ring), Some(sample_for(1)));

        // Producer laps the ring several times between polls
        ring.publish_through(4, 40);
        assert_eq!(cursor.try_read_next(&ring), Some(sample_for(40 - n + 1)));
        assert_eq!(cursor.last_sample_index(), 40 - n + 1);

        for i in (40 - n + 2)..=40 {
            assert_eq!(cursor.try_read_next(&ring), Some(sample_for(i)));
        }
        assert_eq!(cursor.try_read_next(&ring), None);
    }

    #[test]
    fn test_exactly_one_lap_behind_is_not_clamped() {
        let n = 5;
        let ring = ScriptedRing::new(n);
        let mut cursor = RingCursor::new();
        ring.publish_through(1, 2);
        assert_eq!(cursor.try_read_next(&ring), Some(sample_for(1)));

        ring.publish_through(3, 1 + n);
        assert_eq!(cursor.try_read_next(&ring), Some(sample_for(2)));
    }

    #[test]
    fn test_torn_read_retries_are_bounded() {
        let n = 6;
        let ring = ScriptedRing::new(n);
        ring.publish_through(1, n);
        // Every counter read jumps past a full lap
        ring.drift.set(2 * n);

        let mut cursor = RingCursor::new();
        assert_eq!(cursor.try_read_next(&ring), None);
        assert_eq!(ring.sample_reads.get(), MAX_READ_ATTEMPTS + 1);
        assert_eq!(ring.counter_reads.get(), 2 * (MAX_READ_ATTEMPTS + 1));
    }

    #[test]
    fn test_torn_read_recovers_on_retry() {
        let n = 6;
        let ring = ScriptedRing::new(n);
        ring.publish_through(1, 2);

        struct OneShotTear<'a> {
            inner: &'a ScriptedRing,
            torn: Cell<bool>,
        }
        impl RingSource for OneShotTear<'_> {
            fn geometry(&self) -> Geometry {
                self.inner.geometry()
            }
            fn samples_written(&self) -> u32 {
                self.inner.samples_written()
            }
            fn read_sample(&self, offset: usize) -> GazeSample {
                let sample = self.inner.read_sample(offset);
                if !self.torn.replace(true) {
                    // Producer laps the ring while the first slot is copied
                    self.inner.publish_through(3, 20);
                }
                sample
            }
        }

        let source = OneShotTear {
            inner: &ring,
            torn: Cell::new(false),
        };
        let mut cursor = RingCursor::new();
        assert_eq!(cursor.try_read_next(&source), Some(sample_for(20 - n + 1)));
        assert_eq!(ring.sample_reads.get(), 2);
    }

    #[test]
    fn test_read_latest_skips_backlog() {
        let ring = ScriptedRing::new(10);
        let mut cursor = RingCursor::new();
        ring.publish_through(1, 7);

        assert_eq!(cursor.try_read_latest(&ring), Some(sample_for(7)));
        assert_eq!(cursor.try_read_latest(&ring), None);
        assert_eq!(cursor.try_read_next(&ring), None);

        ring.publish_through(8, 9);
        assert_eq!(cursor.try_read_latest(&ring), Some(sample_for(9)));
    }

    #[test]
    fn test_read_latest_never_moves_cursor_backwards() {
        let ring = ScriptedRing::new(10);
        let mut cursor = RingCursor::new();
        ring.publish_through(1, 3);
        for i in 1..=3 {
            assert_eq!(cursor.try_read_next(&ring), Some(sample_for(i)));
        }
        assert_eq!(cursor.try_read_latest(&ring), None);
        assert_eq!(cursor.last_sample_index(), 3);
    }

    #[test]
    fn test_shared_memory_scenario() {
        let fixture = TestSegment::new("ring_scenario", Version::new(0, 1, 0), 28, 28, 10);
        let segment = GazeShm::open(fixture.name()).unwrap();
        let header = SharedHeader::open(&segment).unwrap();
        let buffer = segment.map(header.buffer_size() as usize).unwrap();
        let ring = SharedRing::new(header, buffer);
        let mut cursor = RingCursor::new();

        assert!(!cursor.is_data_available(&ring));
        assert_eq!(cursor.try_read_next(&ring), None);

        let first = sample_for(1);
        fixture.publish(1, &first);
        assert!(cursor.is_data_available(&ring));
        assert_eq!(cursor.try_read_next(&ring), Some(first));
        assert_eq!(cursor.try_read_next(&ring), None);

        for i in 2..=25 {
            fixture.publish(i, &sample_for(i));
        }
        assert_eq!(cursor.try_read_next(&ring), Some(sample_for(16)));
        assert_eq!(cursor.try_read_latest(&ring), Some(sample_for(25)));
        assert!(!cursor.is_data_available(&ring));
    }
}
