//! Eye tracker sample record
//!
//! One packed little-endian record per ring slot:
//!
//! | offset | field         | type |
//! |--------|---------------|------|
//! | 0      | `time`        | u64  |
//! | 8      | `left_eye_x`  | f32  |
//! | 12     | `left_eye_y`  | f32  |
//! | 16     | `right_eye_x` | f32  |
//! | 20     | `right_eye_y` | f32  |
//! | 24     | `gaze_event`  | u32  |

use crate::wire::{WireCodec, NATIVE};
use std::fmt;

/// Gaze event bitmask reported with each sample
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GazeEvent(u32);

impl GazeEvent {
    /// Nothing particular happened
    pub const NONE: Self = Self(0);
    /// Left eye is closed or blinked
    pub const BLINK_LEFT: Self = Self(1 << 0);
    /// Right eye is closed or blinked
    pub const BLINK_RIGHT: Self = Self(1 << 1);
    /// Both eyes are closed or blinked together
    pub const BLINK_BOTH: Self = Self(1 << 2);
    /// Saccade occurred
    pub const SACCADE: Self = Self(1 << 3);
    /// Headset was put on
    pub const HEADSET_MOUNT: Self = Self(1 << 4);
    /// Headset was taken off
    pub const HEADSET_DISMOUNT: Self = Self(1 << 5);
    /// Event introduced by a newer service than this library knows
    pub const UNKNOWN: Self = Self(1 << 6);

    /// Build from a raw wire value, clamping anything unrecognised to `UNKNOWN`
    #[inline(always)]
    pub const fn from_raw(raw: u32) -> Self {
        if raw >= Self::UNKNOWN.0 {
            Self::UNKNOWN
        } else {
            Self(raw)
        }
    }

    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `flag` is set
    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }
}

impl fmt::Display for GazeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("None"),
            Self::BLINK_LEFT => f.write_str("Blink Left"),
            Self::BLINK_RIGHT => f.write_str("Blink Right"),
            Self::BLINK_BOTH => f.write_str("Blink Both"),
            Self::SACCADE => f.write_str("Saccade"),
            Self::HEADSET_MOUNT => f.write_str("HeadsetMount"),
            Self::HEADSET_DISMOUNT => f.write_str("HeadsetDismount"),
            Self::UNKNOWN => f.write_str("Unknown"),
            other => write!(f, "Unknown (Invalid value of: {})", other.0),
        }
    }
}

/// A single eye tracker measurement
///
/// Angles are in radians relative to the headset's forward axis and stay
/// within half of the device field of view; the reader does not check this.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GazeSample {
    /// Milliseconds since the Unix epoch
    pub time: u64,
    pub left_eye_x: f32,
    pub left_eye_y: f32,
    pub right_eye_x: f32,
    pub right_eye_y: f32,
    pub gaze_event: GazeEvent,
}

const TIME_OFFSET: usize = 0;
const LEFT_X_OFFSET: usize = 8;
const LEFT_Y_OFFSET: usize = 12;
const RIGHT_X_OFFSET: usize = 16;
const RIGHT_Y_OFFSET: usize = 20;
const EVENT_OFFSET: usize = 24;

impl GazeSample {
    /// Packed record width in bytes
    pub const WIRE_SIZE: usize = 28;

    /// Decode a record from the start of `bytes`
    #[inline]
    pub fn decode(bytes: &[u8]) -> Self {
        Self::decode_with(NATIVE, bytes)
    }

    #[inline]
    pub fn decode_with(codec: WireCodec, bytes: &[u8]) -> Self {
        Self {
            time: codec.decode(bytes, TIME_OFFSET),
            left_eye_x: codec.decode(bytes, LEFT_X_OFFSET),
            left_eye_y: codec.decode(bytes, LEFT_Y_OFFSET),
            right_eye_x: codec.decode(bytes, RIGHT_X_OFFSET),
            right_eye_y: codec.decode(bytes, RIGHT_Y_OFFSET),
            gaze_event: GazeEvent::from_raw(codec.decode(bytes, EVENT_OFFSET)),
        }
    }

    /// Encode into the start of `out` as a producer would
    #[inline]
    pub fn encode(&self, out: &mut [u8]) {
        self.encode_with(NATIVE, out)
    }

    #[inline]
    pub fn encode_with(&self, codec: WireCodec, out: &mut [u8]) {
        codec.encode(self.time, out, TIME_OFFSET);
        codec.encode(self.left_eye_x, out, LEFT_X_OFFSET);
        codec.encode(self.left_eye_y, out, LEFT_Y_OFFSET);
        codec.encode(self.right_eye_x, out, RIGHT_X_OFFSET);
        codec.encode(self.right_eye_y, out, RIGHT_Y_OFFSET);
        codec.encode(self.gaze_event.bits(), out, EVENT_OFFSET);
    }
}
