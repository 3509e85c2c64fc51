//! Low-level POSIX shared memory operations
//!
//! The consumer opens the service's segment read-only and maps views of
//! it on demand. It never creates, resizes or unlinks a segment.

use crate::error::{GazeError, Result};
use rustix::fd::OwnedFd;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, Mode, ShmOFlags};
use std::ffi::CString;
use std::ptr::NonNull;

/// Longest name accepted by `shm_open` on the platforms we target
const MAX_NAME_LEN: usize = 255;

/// Handle to a named shared memory segment
pub struct GazeShm {
    fd: OwnedFd,
    name: String,
    size: usize,
}

impl GazeShm {
    /// Open an existing segment read-only
    pub fn open(name: &str) -> Result<Self> {
        let full_name = full_name(name)?;
        let c_name = c_name(&full_name)?;

        let fd = shm_open(c_name.as_c_str(), ShmOFlags::RDONLY, Mode::empty()).map_err(|e| {
            GazeError::ShmOpen {
                name: full_name.clone(),
                source: e.into(),
            }
        })?;

        let stat = rustix::fs::fstat(&fd).map_err(|e| GazeError::ShmOpen {
            name: full_name.clone(),
            source: e.into(),
        })?;

        Ok(Self {
            fd,
            name: full_name,
            size: stat.st_size as usize,
        })
    }

    /// Map the first `len` bytes read-only
    pub fn map(&self, len: usize) -> Result<ShmView> {
        if len == 0 || len > self.size {
            return Err(GazeError::SegmentTooSmall {
                needed: len,
                actual: self.size,
            });
        }

        let addr = unsafe {
            mmap(std::ptr::null_mut(), len, ProtFlags::READ, MapFlags::SHARED, &self.fd, 0)
                .map_err(|e| GazeError::Mmap(e.into()))?
        };

        let addr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
            GazeError::Mmap(std::io::Error::from(std::io::ErrorKind::AddrNotAvailable))
        })?;

        Ok(ShmView { addr, len })
    }

    /// Size of the segment in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Full name, including the leading '/'
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A read-only window onto the start of a segment, unmapped on drop
pub struct ShmView {
    addr: NonNull<u8>,
    len: usize,
}

// SAFETY: the view is a plain address range; all concurrent access to the
// bytes behind it goes through volatile reads and fences in the callers.
unsafe impl Send for ShmView {}
unsafe impl Sync for ShmView {}

impl ShmView {
    /// Raw pointer to the first mapped byte
    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.addr.as_ptr()
    }

    /// Number of mapped bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `out.len()` bytes starting at `offset` out of the view
    ///
    /// The source may be written concurrently by another process; the
    /// copy is volatile so every call observes memory afresh.
    #[inline]
    pub fn read_into(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.len, "read past end of mapped view");
        let src = unsafe { self.as_ptr().add(offset) };
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = unsafe { std::ptr::read_volatile(src.add(i)) };
        }
    }
}

impl Drop for ShmView {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.len);
        }
    }
}

fn full_name(name: &str) -> Result<String> {
    let full_name = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    };
    if full_name.len() > MAX_NAME_LEN || full_name.len() < 2 || full_name[1..].contains('/') {
        return Err(GazeError::InvalidName(name.to_string()));
    }
    Ok(full_name)
}

fn c_name(full_name: &str) -> Result<CString> {
    CString::new(full_name).map_err(|_| GazeError::InvalidName(full_name.to_string()))
}
