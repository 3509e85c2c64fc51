//! C Bindings for GazeMemory
//!
//! Provides a raw C API for creating a reader and polling samples.

use crate::error::{InitFailure, InitStatus};
use crate::reader::{EyeTrackerReader, ReaderConfig};
use crate::sample::GazeSample;
use crate::version::{Version, HIGHEST_SUPPORTED_SERVICE_VERSION, LOWEST_SUPPORTED_SERVICE_VERSION};
use std::os::raw::c_char;
use std::ptr;
use std::time::Duration;

// Opaque handle
pub struct GazeReaderHandle(EyeTrackerReader);

/// Sample record as seen from C
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GazeSampleC {
    pub time: u64,
    pub left_eye_x: f32,
    pub left_eye_y: f32,
    pub right_eye_x: f32,
    pub right_eye_y: f32,
    pub gaze_event: u32,
}

impl From<GazeSample> for GazeSampleC {
    fn from(s: GazeSample) -> Self {
        Self {
            time: s.time,
            left_eye_x: s.left_eye_x,
            left_eye_y: s.left_eye_y,
            right_eye_x: s.right_eye_x,
            right_eye_y: s.right_eye_y,
            gaze_event: s.gaze_event.bits(),
        }
    }
}

/// Create a reader, writing the handle to `*out` on success
///
/// On failure the message is copied NUL-terminated into `err_buf`
/// (truncated to `err_len - 1` bytes) when `err_buf` is non-null.
///
/// # Safety
/// `out` must be valid for writes; `err_buf` must be null or valid for
/// `err_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn gaze_reader_create(
    out: *mut *mut GazeReaderHandle,
    timeout_ms: u32,
    err_buf: *mut c_char,
    err_len: usize,
) -> InitStatus {
    if out.is_null() {
        write_error(err_buf, err_len, "output pointer is null");
        return InitStatus::InternalError;
    }
    *out = ptr::null_mut();

    let config = ReaderConfig::default().with_timeout(Duration::from_millis(timeout_ms as u64));
    match EyeTrackerReader::create_with_config(&config) {
        Ok(reader) => {
            *out = Box::into_raw(Box::new(GazeReaderHandle(reader)));
            InitStatus::Success
        }
        Err(InitFailure { status, message }) => {
            write_error(err_buf, err_len, &message);
            status
        }
    }
}

/// Destroy a reader and null the caller's pointer
///
/// # Safety
/// `handle` must be null or point to a pointer returned by `gaze_reader_create`
#[no_mangle]
pub unsafe extern "C" fn gaze_reader_destroy(handle: *mut *mut GazeReaderHandle) {
    if handle.is_null() || (*handle).is_null() {
        return;
    }
    drop(Box::from_raw(*handle));
    *handle = ptr::null_mut();
}

/// Read the next unread sample into `out`
///
/// # Safety
/// `handle` must be null or a live reader; `out` must be null or writable
#[no_mangle]
pub unsafe extern "C" fn gaze_reader_try_read_next(
    handle: *mut GazeReaderHandle,
    out: *mut GazeSampleC,
) -> bool {
    if handle.is_null() || out.is_null() {
        return false;
    }
    let reader = &mut (*handle).0;
    match reader.try_read_next() {
        Some(sample) => {
            *out = sample.into();
            true
        }
        None => false,
    }
}

/// Skip to and read the newest sample into `out`
///
/// # Safety
/// `handle` must be null or a live reader; `out` must be null or writable
#[no_mangle]
pub unsafe extern "C" fn gaze_reader_try_read_latest(
    handle: *mut GazeReaderHandle,
    out: *mut GazeSampleC,
) -> bool {
    if handle.is_null() || out.is_null() {
        return false;
    }
    let reader = &mut (*handle).0;
    match reader.try_read_latest() {
        Some(sample) => {
            *out = sample.into();
            true
        }
        None => false,
    }
}

/// Whether a sample newer than the last read is available
///
/// # Safety
/// `handle` must be null or a live reader
#[no_mangle]
pub unsafe extern "C" fn gaze_reader_is_data_available(handle: *const GazeReaderHandle) -> bool {
    if handle.is_null() {
        return false;
    }
    (*handle).0.is_data_available()
}

/// Whether the service's handshake endpoint exists
#[no_mangle]
pub extern "C" fn gaze_is_service_available() -> bool {
    EyeTrackerReader::is_service_available(&ReaderConfig::default())
}

/// Oldest supported service version
#[no_mangle]
pub extern "C" fn gaze_lowest_supported_version() -> Version {
    LOWEST_SUPPORTED_SERVICE_VERSION
}

/// First unsupported service version
#[no_mangle]
pub extern "C" fn gaze_highest_supported_version() -> Version {
    HIGHEST_SUPPORTED_SERVICE_VERSION
}

unsafe fn write_error(buf: *mut c_char, len: usize, message: &str) {
    if buf.is_null() || len == 0 {
        return;
    }
    let n = message.len().min(len - 1);
    ptr::copy_nonoverlapping(message.as_ptr().cast::<c_char>(), buf, n);
    *buf.add(n) = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::GazeEvent;
    use std::ffi::CStr;

    #[test]
    fn test_null_handles_are_harmless() {
        let mut sample = GazeSampleC::default();
        unsafe {
            assert!(!gaze_reader_try_read_next(ptr::null_mut(), &mut sample));
            assert!(!gaze_reader_try_read_latest(ptr::null_mut(), &mut sample));
            assert!(!gaze_reader_is_data_available(ptr::null()));
            gaze_reader_destroy(ptr::null_mut());
            let mut handle: *mut GazeReaderHandle = ptr::null_mut();
            gaze_reader_destroy(&mut handle);
            assert_eq!(
                gaze_reader_create(ptr::null_mut(), 0, ptr::null_mut(), 0),
                InitStatus::InternalError
            );
        }
    }

    #[test]
    fn test_error_buffer_is_terminated_and_bounded() {
        let mut buf = [0x7f as c_char; 8];
        unsafe { write_error(buf.as_mut_ptr(), buf.len(), "Cancelled by caller") };
        let text = unsafe { CStr::from_ptr(buf.as_ptr()) };
        assert_eq!(text.to_str().unwrap(), "Cancell");
    }

    #[test]
    fn test_sample_conversion() {
        let sample = GazeSample {
            time: 5,
            left_eye_x: 0.5,
            left_eye_y: -0.5,
            right_eye_x: 0.25,
            right_eye_y: -0.25,
            gaze_event: GazeEvent::HEADSET_DISMOUNT,
        };
        let c: GazeSampleC = sample.into();
        assert_eq!(c.time, 5);
        assert_eq!(c.right_eye_y, -0.25);
        assert_eq!(c.gaze_event, 32);
    }

    #[test]
    fn test_version_constants() {
        assert_eq!(gaze_lowest_supported_version(), Version::new(0, 0, 1));
        assert_eq!(gaze_highest_supported_version(), Version::new(1, 0, 0));
    }
}
