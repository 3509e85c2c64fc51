//! Service-side fixtures for tests: stage a segment and answer a handshake
//! the way the service does

use crate::header::Geometry;
use crate::ring::UNWRITTEN_SAMPLE_INDEX;
use crate::sample::GazeSample;
use crate::version::Version;
use crate::wire;
use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::net::{
    accept, bind_unix, listen, recv, send, socket, sockopt, AddressFamily, RecvFlags, SendFlags,
    SocketAddrUnix, SocketType,
};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

/// How long a fake service waits for its client before giving up
const SERVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Writable segment owned by the test; unmapped and unlinked on drop
pub struct TestSegment {
    name: String,
    addr: NonNull<u8>,
    len: usize,
    _fd: OwnedFd,
    geometry: Option<Geometry>,
}

impl TestSegment {
    /// Zero-filled segment of `len` bytes with no header
    pub fn raw(tag: &str, len: usize) -> Self {
        let name = format!(
            "/gaze_test_{}_{}_{}",
            tag,
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::Relaxed)
        );
        let _ = shm_unlink(name.as_str());
        let fd = shm_open(
            name.as_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR,
        )
        .unwrap();
        ftruncate(&fd, len as u64).unwrap();

        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
            .unwrap()
        };

        Self {
            name,
            addr: NonNull::new(addr.cast::<u8>()).unwrap(),
            len,
            _fd: fd,
            geometry: None,
        }
    }

    /// Valid v1 segment with `sample_count` slots and no samples written
    pub fn new(tag: &str, version: Version, header_size: u32, sample_size: u32, sample_count: u32) -> Self {
        let buffer_size = header_size + sample_size * sample_count;
        let mut fixture = Self::with_raw_header(tag, version, header_size, buffer_size, sample_size, buffer_size as usize);
        fixture.geometry = Some(Geometry::new(header_size, buffer_size, sample_size).unwrap());
        fixture
    }

    /// Segment of `segment_len` bytes with arbitrary header fields
    pub fn with_raw_header(
        tag: &str,
        version: Version,
        header_size: u32,
        buffer_size: u32,
        sample_size: u32,
        segment_len: usize,
    ) -> Self {
        let fixture = Self::raw(tag, segment_len);

        let mut raw = [0u8; 28];
        wire::encode(version, &mut raw, 0);
        wire::encode(header_size, &mut raw, 12);
        wire::encode(buffer_size, &mut raw, 16);
        wire::encode(sample_size, &mut raw, 20);
        wire::encode(UNWRITTEN_SAMPLE_INDEX, &mut raw, 24);
        fixture.write_bytes(0, &raw);
        fixture
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len, "write past end of test segment");
        for (i, byte) in bytes.iter().enumerate() {
            unsafe { std::ptr::write_volatile(self.addr.as_ptr().add(offset + i), *byte) };
        }
    }

    pub fn set_samples_written(&self, count: u32) {
        let mut raw = [0u8; 4];
        wire::encode(count, &mut raw, 0);
        fence(Ordering::Release);
        self.write_bytes(24, &raw);
    }

    /// Write sample `index` into its slot, then advance the counter to it
    pub fn publish(&self, index: u32, sample: &GazeSample) {
        self.write_slot(index, sample);
        self.set_samples_written(index);
    }

    pub fn write_slot(&self, index: u32, sample: &GazeSample) {
        let geometry = self.geometry.expect("fixture built without valid geometry");
        let mut raw = [0u8; GazeSample::WIRE_SIZE];
        sample.encode(&mut raw);
        self.write_bytes(geometry.slot_offset(index), &raw);
    }
}

impl Drop for TestSegment {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.len);
        }
        let _ = shm_unlink(self.name.as_str());
    }
}

/// Distinct sample for index `i`
pub fn sample_for(i: u32) -> GazeSample {
    GazeSample {
        time: 1_700_000_000_000 + i as u64,
        left_eye_x: i as f32 * 0.001,
        left_eye_y: -(i as f32) * 0.001,
        right_eye_x: i as f32 * 0.002,
        right_eye_y: -(i as f32) * 0.002,
        gaze_event: crate::sample::GazeEvent::from_raw(i % 64),
    }
}

/// Listening `SOCK_SEQPACKET` endpoint at `path`; connects queue until accepted
pub fn listen_at(path: &Path) -> OwnedFd {
    let _ = std::fs::remove_file(path);
    let listener = socket(AddressFamily::UNIX, SocketType::SEQPACKET, None).unwrap();
    bind_unix(&listener, &SocketAddrUnix::new(path).unwrap()).unwrap();
    listen(&listener, 8).unwrap();
    listener
}

/// Fake service answering one handshake with `reply`
///
/// Yields the request it received, or `None` when no client showed up
/// within `SERVE_TIMEOUT`, so a failing client never wedges `join`.
pub fn serve_handshake(path: &Path, reply: Vec<u8>) -> thread::JoinHandle<Option<Vec<u8>>> {
    let listener = listen_at(path);
    // Bounds accept(2) as well as recv(2) on Linux
    sockopt::set_socket_timeout(&listener, sockopt::Timeout::Recv, Some(SERVE_TIMEOUT)).unwrap();

    thread::spawn(move || {
        let conn = accept(&listener).ok()?;
        sockopt::set_socket_timeout(&conn, sockopt::Timeout::Recv, Some(SERVE_TIMEOUT)).ok()?;
        let mut buf = [0u8; 1024];
        let n = recv(&conn, &mut buf, RecvFlags::empty()).ok()?;
        if n == 0 {
            return None;
        }
        send(&conn, &reply, SendFlags::empty()).ok()?;
        Some(buf[..n].to_vec())
    })
}
